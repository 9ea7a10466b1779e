use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::game::Game;

/// In-memory authoritative store of live games.
///
/// Readers are concurrent; every state transition happens inside
/// [`with_game_mut`](Self::with_game_mut) while the write lock is held, so
/// transitions on one game are serialized and "apply then notify" can run
/// atomically with respect to other mutators.
#[derive(Debug, Clone, Default)]
pub struct GameTable {
    games: Arc<RwLock<HashMap<Uuid, Game>>>,
}

impl GameTable {
    pub fn new() -> Self {
        GameTable::default()
    }

    pub async fn insert(&self, game: Game) {
        self.games.write().await.insert(game.id, game);
    }

    pub async fn get(&self, id: &Uuid) -> Option<Game> {
        self.games.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.games.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.games.read().await.len()
    }

    /// Mutate a game under the write lock. Returns `None` when the game is
    /// absent, otherwise the closure's result.
    pub async fn with_game_mut<R>(&self, id: &Uuid, f: impl FnOnce(&mut Game) -> R) -> Option<R> {
        let mut games = self.games.write().await;
        games.get_mut(id).map(f)
    }

    /// Remove a game, but only if `check` admits it; the check runs under
    /// the write lock so it cannot race a state transition.
    pub async fn remove_if<E>(
        &self,
        id: &Uuid,
        check: impl FnOnce(&Game) -> Result<(), E>,
    ) -> Option<Result<Game, E>> {
        let mut games = self.games.write().await;
        let game = games.get(id)?;
        match check(game) {
            Ok(()) => Some(Ok(games.remove(id).expect("checked above"))),
            Err(e) => Some(Err(e)),
        }
    }
}
