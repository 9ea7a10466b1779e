use std::net::SocketAddr;
use std::sync::Arc;

use tempo_web::config::Config;
use tempo_web::ratelimit::RateLimiters;
use tempo_web::services::auth::AuthService;
use tempo_web::services::processor::Processor;
use tempo_web::services::storage::Storage;
use tempo_web::services::table::GameTable;
use tempo_web::services::validator::Validator;
use tempo_web::services::waiters::WaitRegistry;
use tempo_web::{AppState, build_router, db};
use uci_engine::{EngineAdapter, EnginePool, QUEUE_CAPACITY};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tempo_web=debug".into()),
        )
        .init();

    let config = Config::from_env();

    // Persistence is optional; games are authoritative in memory either way.
    let storage = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await.expect("Failed to open database");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run migrations");
            Storage::open(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, persistence disabled");
            Storage::disabled()
        }
    };

    // One engine for synchronous validation, a pool for search tasks.
    let validator = Validator::new(
        EngineAdapter::spawn(&config.engine_path)
            .await
            .expect("Failed to spawn validator engine"),
    );
    let engine_pool = Arc::new(
        EnginePool::start(&config.engine_path, config.engine_workers, QUEUE_CAPACITY)
            .await
            .expect("Failed to start engine pool"),
    );

    let auth = AuthService::new(storage.pool().cloned(), &config.token_secret);
    let processor = Arc::new(Processor::new(
        GameTable::new(),
        WaitRegistry::new(),
        storage,
        engine_pool,
        validator,
        Processor::default_ids(),
    ));

    let state = AppState {
        processor: Arc::clone(&processor),
        auth: Arc::new(auth),
        limiters: Arc::new(RateLimiters::new(config.dev_mode)),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_addr, config.port);
    tracing::info!("Starting tempo-web on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    tracing::info!("Draining subsystems");
    processor.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
