//! Per-game mutual exclusion.

use crate::session::GameId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{instrument, trace};

/// Hands out one async lock per game.
///
/// Holding the guard serializes every read-modify-write-broadcast sequence
/// against that game; different games proceed in parallel.
#[derive(Debug, Default)]
pub struct GameLocks {
    locks: Mutex<HashMap<GameId, Arc<AsyncMutex<()>>>>,
}

impl GameLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of games that have a lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no game has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for exclusive access to `game_id`.
    ///
    /// Entries are never removed, so callers only lock games known to exist.
    #[instrument(skip(self))]
    pub async fn acquire(&self, game_id: GameId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(game_id)
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        trace!("Game lock acquired");
        guard
    }
}
