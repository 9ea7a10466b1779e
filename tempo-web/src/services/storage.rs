use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::game::Color;
use crate::models::player::Player;

pub const WRITE_QUEUE_CAPACITY: usize = 1000;
const DRAIN_BUDGET: Duration = Duration::from_secs(2);

/// One self-contained transactional write.
#[derive(Debug)]
pub enum WriteUnit {
    InsertGame {
        game_id: Uuid,
        initial_fen: String,
        white: Player,
        black: Player,
        start_time: DateTime<Utc>,
    },
    InsertMove {
        game_id: Uuid,
        move_number: i64,
        move_uci: String,
        fen_after: String,
        color: Color,
        at: DateTime<Utc>,
    },
    DeleteMovesAfter {
        game_id: Uuid,
        keep: i64,
    },
    DeleteGame {
        game_id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageHealth {
    Ok,
    Degraded,
    Disabled,
}

/// Best-effort async persistence for game state.
///
/// Game writes are absorbed into a bounded queue and committed by a single
/// writer task, one transaction per unit. The first error latches the
/// `degraded` flag: from then on every unit is dropped until restart. The
/// authoritative state lives in memory, so callers never block on or hear
/// about persistence failures.
///
/// Synchronous read paths (auth, user CRUD) bypass the queue and use
/// [`pool`](Self::pool) directly.
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

#[derive(Debug)]
struct StorageInner {
    pool: Option<DbPool>,
    degraded: Arc<AtomicBool>,
    tx: StdMutex<Option<mpsc::Sender<WriteUnit>>>,
    writer: StdMutex<Option<JoinHandle<()>>>,
}

impl Storage {
    /// Persistence disabled: every enqueue is a no-op, health reports
    /// `disabled`.
    pub fn disabled() -> Storage {
        Storage {
            inner: Arc::new(StorageInner {
                pool: None,
                degraded: Arc::new(AtomicBool::new(false)),
                tx: StdMutex::new(None),
                writer: StdMutex::new(None),
            }),
        }
    }

    /// Start the writer task over an open pool.
    pub fn open(pool: DbPool) -> Storage {
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let degraded = Arc::new(AtomicBool::new(false));
        let writer = tokio::spawn(run_writer(pool.clone(), Arc::clone(&degraded), rx));
        Storage {
            inner: Arc::new(StorageInner {
                pool: Some(pool),
                degraded,
                tx: StdMutex::new(Some(tx)),
                writer: StdMutex::new(Some(writer)),
            }),
        }
    }

    pub fn pool(&self) -> Option<&DbPool> {
        self.inner.pool.as_ref()
    }

    pub fn health(&self) -> StorageHealth {
        match (&self.inner.pool, self.inner.degraded.load(Ordering::Acquire)) {
            (None, _) => StorageHealth::Disabled,
            (Some(_), true) => StorageHealth::Degraded,
            (Some(_), false) => StorageHealth::Ok,
        }
    }

    /// Non-blocking enqueue. Dropped silently when disabled or degraded,
    /// dropped with a warning when the queue is full.
    pub fn enqueue(&self, unit: WriteUnit) {
        if self.inner.pool.is_none() || self.inner.degraded.load(Ordering::Acquire) {
            return;
        }
        let guard = self.inner.tx.lock().expect("storage sender lock");
        let Some(tx) = guard.as_ref() else { return };
        match tx.try_send(unit) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("storage write queue full, dropping unit");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Close the queue, give the writer a 2s drain budget, close the pool.
    pub async fn shutdown(&self) {
        self.inner.tx.lock().expect("storage sender lock").take();
        let handle = self.inner.writer.lock().expect("storage writer lock").take();
        if let Some(handle) = handle
            && tokio::time::timeout(DRAIN_BUDGET, handle).await.is_err()
        {
            tracing::warn!("storage writer did not drain within the shutdown budget");
        }
        if let Some(pool) = &self.inner.pool {
            pool.close().await;
        }
    }
}

async fn run_writer(pool: DbPool, degraded: Arc<AtomicBool>, mut rx: mpsc::Receiver<WriteUnit>) {
    while let Some(unit) = rx.recv().await {
        if degraded.load(Ordering::Acquire) {
            continue;
        }
        if let Err(e) = apply(&pool, unit).await {
            tracing::error!("storage write failed, latching degraded mode: {e}");
            degraded.store(true, Ordering::Release);
        }
    }
    tracing::debug!("storage writer drained");
}

async fn apply(pool: &DbPool, unit: WriteUnit) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    match unit {
        WriteUnit::InsertGame {
            game_id,
            initial_fen,
            white,
            black,
            start_time,
        } => {
            sqlx::query(
                "INSERT INTO games (game_id, initial_fen,
                    white_player_id, white_type, white_level, white_search_time,
                    black_player_id, black_type, black_level, black_search_time,
                    start_time_utc)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(game_id.to_string())
            .bind(initial_fen)
            .bind(&white.id)
            .bind(white.kind as u8 as i64)
            .bind(white.level.map(i64::from))
            .bind(white.search_time_ms.map(|ms| ms as i64))
            .bind(&black.id)
            .bind(black.kind as u8 as i64)
            .bind(black.level.map(i64::from))
            .bind(black.search_time_ms.map(|ms| ms as i64))
            .bind(start_time)
            .execute(&mut *tx)
            .await?;
        }
        WriteUnit::InsertMove {
            game_id,
            move_number,
            move_uci,
            fen_after,
            color,
            at,
        } => {
            sqlx::query(
                "INSERT INTO moves (game_id, move_number, move_uci, fen_after_move,
                    player_color, move_time_utc)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(game_id.to_string())
            .bind(move_number)
            .bind(move_uci)
            .bind(fen_after)
            .bind(color.as_str())
            .bind(at)
            .execute(&mut *tx)
            .await?;
        }
        WriteUnit::DeleteMovesAfter { game_id, keep } => {
            sqlx::query("DELETE FROM moves WHERE game_id = $1 AND move_number > $2")
                .bind(game_id.to_string())
                .bind(keep)
                .execute(&mut *tx)
                .await?;
        }
        WriteUnit::DeleteGame { game_id } => {
            sqlx::query("DELETE FROM games WHERE game_id = $1")
                .bind(game_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await
}
