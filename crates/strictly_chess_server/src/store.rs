//! Collaborator interfaces for auth and game lookups, plus an in-memory
//! implementation.

use crate::db::DbError;
use crate::session::{AuthData, GameId, GameSession};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use strictly_chess::Game;
use tracing::{debug, info, instrument, warn};

/// Resolves auth tokens to users.
pub trait AuthLookup: Send + Sync {
    /// Returns the auth record for `token`, or `None` if it is unknown.
    fn resolve(&self, token: &str) -> Result<Option<AuthData>, DbError>;
}

/// Reads and writes game sessions.
pub trait GameStore: Send + Sync {
    /// Loads a game, or `None` if no game has that ID.
    fn get(&self, game_id: GameId) -> Result<Option<GameSession>, DbError>;

    /// Overwrites the stored copy of `session`.
    ///
    /// Fails if no game with the session's ID exists.
    fn update(&self, session: &GameSession) -> Result<(), DbError>;
}

/// Process-local store backing both lookups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    auths: Mutex<HashMap<String, AuthData>>,
    games: Mutex<HashMap<GameId, GameSession>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory store");
        Self::default()
    }

    /// Registers `token` for `username`.
    #[instrument(skip(self, token))]
    pub fn insert_auth(&self, token: &str, username: &str) {
        let auth = AuthData::new(token.to_string(), username.to_string());
        debug!(username = %auth.username, "Auth token stored");
        lock(&self.auths).insert(auth.auth_token.clone(), auth);
    }

    /// Creates a game at the opening position under the next free ID.
    #[instrument(skip(self))]
    pub fn create_game(
        &self,
        game_name: &str,
        white_username: Option<&str>,
        black_username: Option<&str>,
    ) -> GameSession {
        let mut games = lock(&self.games);
        let game_id = games.keys().max().map_or(1, |max| max + 1);
        let session = GameSession::new(
            game_id,
            white_username.map(str::to_string),
            black_username.map(str::to_string),
            game_name.to_string(),
            Game::new(),
        );
        games.insert(game_id, session.clone());
        info!(game_id, "Game created");
        session
    }

    /// Inserts or replaces a game.
    #[instrument(skip(self, session), fields(game_id = session.game_id))]
    pub fn insert_game(&self, session: GameSession) {
        debug!("Game stored");
        lock(&self.games).insert(session.game_id, session);
    }
}

impl AuthLookup for MemoryStore {
    #[instrument(skip(self, token))]
    fn resolve(&self, token: &str) -> Result<Option<AuthData>, DbError> {
        Ok(lock(&self.auths).get(token).cloned())
    }
}

impl GameStore for MemoryStore {
    #[instrument(skip(self))]
    fn get(&self, game_id: GameId) -> Result<Option<GameSession>, DbError> {
        Ok(lock(&self.games).get(&game_id).cloned())
    }

    #[instrument(skip(self, session), fields(game_id = session.game_id))]
    fn update(&self, session: &GameSession) -> Result<(), DbError> {
        let mut games = lock(&self.games);
        match games.get_mut(&session.game_id) {
            Some(stored) => {
                *stored = session.clone();
                debug!("Game updated");
                Ok(())
            }
            None => {
                warn!("Update for unknown game");
                Err(DbError::new(format!("game {} does not exist", session.game_id)))
            }
        }
    }
}
