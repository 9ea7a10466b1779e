#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use tempo_web::ratelimit::RateLimiters;
use tempo_web::services::auth::AuthService;
use tempo_web::services::processor::Processor;
use tempo_web::services::storage::Storage;
use tempo_web::services::table::GameTable;
use tempo_web::services::validator::Validator;
use tempo_web::services::waiters::WaitRegistry;
use tempo_web::{AppState, build_router, db};
use uci_engine::{EngineAdapter, EnginePool};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

static SEQ: AtomicU32 = AtomicU32::new(0);

/// Write a stub UCI engine script. It tracks the last `position` command
/// (including appended moves) so `d` echoes a position that changes when a
/// move is applied. The move `a1a1` is swallowed, giving the tests a
/// deterministic "illegal" move.
fn write_stub(go_body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
FEN="{START_FEN}"
while IFS= read -r line; do
  set -- $line
  case "$1" in
    uci) echo "id name stubfish"; echo "uciok" ;;
    isready) echo "readyok" ;;
    ucinewgame) FEN="{START_FEN}" ;;
    position)
      shift
      if [ "$1" = "startpos" ]; then
        FEN="{START_FEN}"
        shift
      elif [ "$1" = "fen" ]; then
        shift
        FEN=""
        while [ $# -gt 0 ] && [ "$1" != "moves" ]; do
          FEN="${{FEN}}${{FEN:+ }}$1"
          shift
        done
      fi
      if [ "$1" = "moves" ]; then
        shift
        case "$*" in
          *a1a1*) ;;
          *) FEN="$FEN $*" ;;
        esac
      fi
      ;;
    d) echo "Fen: $FEN"; echo "Checkers:" ;;
    go) {go_body} ;;
    quit) exit 0 ;;
  esac
done
"#
    );

    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("tempo-stub-{}-{seq}.sh", std::process::id()));
    std::fs::write(&path, script).expect("write stub");
    let mut perms = std::fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

/// A running in-process server over a shared-cache in-memory database and
/// a stub engine.
pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub processor: Arc<Processor>,
}

impl TestServer {
    pub async fn start() -> TestServer {
        Self::build(
            r#"echo "info depth 5 score cp 23"; echo "bestmove e7e5""#,
            true,
        )
        .await
    }

    /// A server whose engine takes about a second per search; used to
    /// observe the `pending` window.
    pub async fn start_slow_engine() -> TestServer {
        Self::build(
            r#"sleep 1; echo "info depth 5 score cp 23"; echo "bestmove e7e5""#,
            true,
        )
        .await
    }

    pub async fn start_without_db() -> TestServer {
        Self::build(
            r#"echo "info depth 5 score cp 23"; echo "bestmove e7e5""#,
            false,
        )
        .await
    }

    async fn build(go_body: &str, with_db: bool) -> TestServer {
        let engine_path = write_stub(go_body);

        let storage = if with_db {
            let seq = SEQ.fetch_add(1, Ordering::Relaxed);
            let url = format!(
                "sqlite:file:apitest{}-{seq}?mode=memory&cache=shared",
                std::process::id()
            );
            let pool = db::create_pool(&url).await.expect("open db");
            db::run_migrations(&pool).await.expect("migrate");
            Storage::open(pool)
        } else {
            Storage::disabled()
        };

        let validator = Validator::new(
            EngineAdapter::spawn(&engine_path).await.expect("spawn validator"),
        );
        let engine_pool = Arc::new(
            EnginePool::start(&engine_path, 2, 16)
                .await
                .expect("start pool"),
        );

        let auth = AuthService::new(storage.pool().cloned(), "test-secret");
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
            limiters: Arc::new(RateLimiters::new(true)),
        };
        let app = build_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("serve");
        });

        TestServer {
            base: format!("http://{addr}/api/v1"),
            client: reqwest::Client::new(),
            processor,
        }
    }

    pub async fn post(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn put(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .put(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .expect("request");
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn delete(&self, path: &str) -> reqwest::StatusCode {
        self.client
            .delete(format!("{}{path}", self.base))
            .send()
            .await
            .expect("request")
            .status()
    }

    pub async fn health(&self) -> Value {
        let url = self.base.replace("/api/v1", "/health");
        self.client
            .get(url)
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("health json")
    }

    /// Create a human-vs-human game and return its id.
    pub async fn create_human_game(&self) -> String {
        let (status, body) = self
            .post(
                "/games",
                json!({"white": {"type": 1}, "black": {"type": 1}}),
            )
            .await;
        assert_eq!(status, reqwest::StatusCode::CREATED, "{body}");
        body["gameId"].as_str().expect("gameId").to_string()
    }

    /// Create a computer(white)-vs-human(black) game and return its id.
    pub async fn create_computer_game(&self) -> String {
        let (status, body) = self
            .post(
                "/games",
                json!({
                    "white": {"type": 2, "level": 5, "searchTime": 200},
                    "black": {"type": 1}
                }),
            )
            .await;
        assert_eq!(status, reqwest::StatusCode::CREATED, "{body}");
        body["gameId"].as_str().expect("gameId").to_string()
    }

    /// Long-poll until the game leaves `state`, with an overall deadline.
    pub async fn wait_for_state_change(&self, game_id: &str, known_count: u64) -> Value {
        let (status, body) = self
            .get(&format!("/games/{game_id}?wait=true&moveCount={known_count}"))
            .await;
        assert_eq!(status, reqwest::StatusCode::OK, "{body}");
        body
    }
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or("<missing>")
}

pub async fn eventually(mut cond: impl AsyncFnMut() -> bool) {
    for _ in 0..50 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached within 5s");
}
