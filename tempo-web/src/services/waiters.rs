use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Hard cap on a long-poll wait.
pub const WAIT_LIMIT: Duration = Duration::from_secs(25);

/// Long-poll wait registry: per-game lists of suspended clients.
///
/// Notification is non-blocking: each waiter holds a single-slot channel,
/// and a full slot means one wake-up is already pending, which is enough.
/// Critical sections are short and synchronous, so mutation paths can
/// notify while still holding the game-table write lock.
#[derive(Debug, Clone, Default)]
pub struct WaitRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rooms: RwLock<HashMap<Uuid, Vec<Waiter>>>,
    closed: AtomicBool,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    last_known: usize,
    tx: mpsc::Sender<()>,
}

/// A registered wait. Dropping the ticket (client cancel, handler return)
/// removes the waiter from the registry.
#[derive(Debug)]
pub struct WaitTicket {
    rx: mpsc::Receiver<()>,
    _guard: WaitGuard,
}

#[derive(Debug)]
struct WaitGuard {
    inner: Arc<Inner>,
    game_id: Uuid,
    id: u64,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut rooms = self.inner.rooms.write().expect("wait registry lock");
        if let Some(list) = rooms.get_mut(&self.game_id) {
            list.retain(|w| w.id != self.id);
            if list.is_empty() {
                rooms.remove(&self.game_id);
            }
        }
    }
}

/// Why a wait ended. Handlers treat every outcome the same way: re-read
/// the game state and respond with whatever is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Notified,
    TimedOut,
    Closed,
}

impl WaitTicket {
    /// Suspend until notified, the 25s cap, or registry shutdown.
    pub async fn wait(mut self) -> WaitOutcome {
        match tokio::time::timeout(WAIT_LIMIT, self.rx.recv()).await {
            Ok(Some(())) => WaitOutcome::Notified,
            Ok(None) => WaitOutcome::Closed,
            Err(_) => WaitOutcome::TimedOut,
        }
    }
}

impl WaitRegistry {
    pub fn new() -> Self {
        WaitRegistry::default()
    }

    /// Register a waiter for `game_id` that considers `last_known` the
    /// current move count. Callers must re-read the live move count after
    /// registering and skip the wait if it already advanced; that closes
    /// the register/notify race.
    pub fn register(&self, game_id: Uuid, last_known: usize) -> WaitTicket {
        let (tx, rx) = mpsc::channel(1);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = WaitGuard {
            inner: Arc::clone(&self.inner),
            game_id,
            id,
        };
        if self.inner.closed.load(Ordering::Acquire) {
            // Shut down: hand back a ticket whose channel is already
            // closed so the caller returns immediately.
            drop(tx);
        } else {
            let mut rooms = self.inner.rooms.write().expect("wait registry lock");
            rooms.entry(game_id).or_default().push(Waiter {
                id,
                last_known,
                tx,
            });
        }
        WaitTicket { rx, _guard: guard }
    }

    /// Wake every waiter whose recorded move count differs from
    /// `current_move_count`. Non-blocking; a full slot is left as is.
    pub fn notify_game(&self, game_id: &Uuid, current_move_count: usize) {
        let rooms = self.inner.rooms.read().expect("wait registry lock");
        if let Some(list) = rooms.get(game_id) {
            for waiter in list.iter().filter(|w| w.last_known != current_move_count) {
                let _ = waiter.tx.try_send(());
            }
        }
    }

    /// Detach and wake all waiters of a deleted game; they observe the
    /// disappearance on re-read.
    pub fn remove_game(&self, game_id: &Uuid) {
        let detached = self
            .inner
            .rooms
            .write()
            .expect("wait registry lock")
            .remove(game_id);
        if let Some(list) = detached {
            for waiter in &list {
                let _ = waiter.tx.try_send(());
            }
        }
    }

    /// Stop accepting waiters and wake everyone currently suspended.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let rooms = std::mem::take(&mut *self.inner.rooms.write().expect("wait registry lock"));
        for list in rooms.values() {
            for waiter in list {
                let _ = waiter.tx.try_send(());
            }
        }
    }

    pub fn waiter_count(&self, game_id: &Uuid) -> usize {
        self.inner
            .rooms
            .read()
            .expect("wait registry lock")
            .get(game_id)
            .map_or(0, |l| l.len())
    }
}
