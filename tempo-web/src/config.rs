use rand::RngExt;

/// Server configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    /// Absent means persistence is disabled; games live in memory only.
    pub database_url: Option<String>,
    pub engine_path: String,
    pub engine_workers: usize,
    pub token_secret: String,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Config {
        let dev_mode = !std::env::var("ENVIRONMENT").is_ok_and(|v| v == "production");
        Config {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: std::env::var("DATABASE_URL").ok(),
            engine_path: std::env::var("ENGINE_PATH").unwrap_or_else(|_| "stockfish".to_string()),
            engine_workers: std::env::var("ENGINE_WORKERS")
                .ok()
                .and_then(|w| w.parse().ok())
                .unwrap_or(uci_engine::DEFAULT_WORKERS),
            // Without a configured secret, tokens die with the process.
            token_secret: std::env::var("TOKEN_SECRET").unwrap_or_else(|_| generate_secret()),
            dev_mode,
        }
    }
}

fn generate_secret() -> String {
    let mut rng = rand::rng();
    (0..48)
        .map(|_| {
            let idx = rng.random_range(0..62);
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789"[idx] as char
        })
        .collect()
}
