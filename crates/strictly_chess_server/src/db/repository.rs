//! SQLite repository for auth tokens and games.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use strictly_chess::Game;
use tracing::{debug, info, instrument, warn};

use crate::db::models::{AuthRow, GameChanges, GameRow, NewGame};
use crate::db::{DbError, schema};
use crate::session::{AuthData, GameId, GameSession};
use crate::store::{AuthLookup, GameStore};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Database repository backing the auth and game lookups.
///
/// Every operation opens its own connection, so the path must name a file;
/// `":memory:"` would give each call a fresh, empty database.
#[derive(Debug, Clone)]
pub struct ChessRepository {
    db_path: String,
}

impl ChessRepository {
    /// Creates a repository for the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating ChessRepository");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))
    }

    /// Applies any pending schema migrations. Returns how many ran.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migrations failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(applied.len())
    }

    /// Stores an auth token for `username`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the token already exists or a database error occurs.
    #[instrument(skip(self, token))]
    pub fn create_auth(&self, token: &str, username: &str) -> Result<AuthData, DbError> {
        let mut conn = self.connection()?;
        let row = AuthRow::new(token.to_string(), username.to_string());

        let row = diesel::insert_into(schema::auth_tokens::table)
            .values(&row)
            .returning(AuthRow::as_returning())
            .get_result(&mut conn)?;

        info!(username = %row.username(), "Auth token created");
        Ok(row.into())
    }

    /// Creates a game at the opening position with the given seats.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn create_game(
        &self,
        game_name: &str,
        white_username: Option<&str>,
        black_username: Option<&str>,
    ) -> Result<GameSession, DbError> {
        let mut conn = self.connection()?;
        let new_game = NewGame::new(
            white_username.map(str::to_string),
            black_username.map(str::to_string),
            game_name.to_string(),
            serde_json::to_string(&Game::new())?,
        );

        let row = diesel::insert_into(schema::games::table)
            .values(&new_game)
            .returning(GameRow::as_returning())
            .get_result(&mut conn)?;

        info!(game_id = row.game_id(), "Game created");
        row.into_session()
    }
}

impl AuthLookup for ChessRepository {
    #[instrument(skip(self, token))]
    fn resolve(&self, token: &str) -> Result<Option<AuthData>, DbError> {
        let mut conn = self.connection()?;
        let row = schema::auth_tokens::table
            .find(token)
            .select(AuthRow::as_select())
            .first(&mut conn)
            .optional()?;

        if row.is_none() {
            debug!("Unknown auth token");
        }
        Ok(row.map(AuthData::from))
    }
}

impl GameStore for ChessRepository {
    #[instrument(skip(self))]
    fn get(&self, game_id: GameId) -> Result<Option<GameSession>, DbError> {
        let mut conn = self.connection()?;
        let row = schema::games::table
            .find(game_id)
            .select(GameRow::as_select())
            .first(&mut conn)
            .optional()?;

        match row {
            Some(row) => row.into_session().map(Some),
            None => {
                debug!("Game not found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, session), fields(game_id = session.game_id))]
    fn update(&self, session: &GameSession) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let changes = GameChanges::try_from(session)?;

        let updated = diesel::update(schema::games::table.find(session.game_id))
            .set(&changes)
            .execute(&mut conn)?;

        if updated == 0 {
            warn!("Update matched no game");
            return Err(DbError::new(format!("game {} does not exist", session.game_id)));
        }
        debug!("Game updated");
        Ok(())
    }
}
