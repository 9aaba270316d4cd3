//! Database row types and their mapping to session records.

use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use tracing::instrument;

use crate::db::{DbError, schema};
use crate::session::{AuthData, GameSession};

/// Auth token row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Getters, new)]
#[diesel(table_name = schema::auth_tokens)]
pub struct AuthRow {
    token: String,
    username: String,
}

impl From<AuthRow> for AuthData {
    fn from(row: AuthRow) -> Self {
        AuthData::new(row.token, row.username)
    }
}

/// Game row; the chess state is stored as JSON.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Getters)]
#[diesel(table_name = schema::games, primary_key(game_id))]
pub struct GameRow {
    game_id: i32,
    white_username: Option<String>,
    black_username: Option<String>,
    game_name: String,
    game_json: String,
}

impl GameRow {
    /// Decodes the stored game into a session record.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub fn into_session(self) -> Result<GameSession, DbError> {
        let game = serde_json::from_str(&self.game_json)?;
        Ok(GameSession::new(
            self.game_id,
            self.white_username,
            self.black_username,
            self.game_name,
            game,
        ))
    }
}

/// Insertable game row.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::games)]
pub struct NewGame {
    white_username: Option<String>,
    black_username: Option<String>,
    game_name: String,
    game_json: String,
}

/// Full overwrite of a game row; open seats are written as NULL.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = schema::games, treat_none_as_null = true)]
pub struct GameChanges {
    white_username: Option<String>,
    black_username: Option<String>,
    game_name: String,
    game_json: String,
}

impl TryFrom<&GameSession> for GameChanges {
    type Error = DbError;

    #[track_caller]
    fn try_from(session: &GameSession) -> Result<Self, Self::Error> {
        Ok(Self {
            white_username: session.white_username.clone(),
            black_username: session.black_username.clone(),
            game_name: session.game_name.clone(),
            game_json: serde_json::to_string(&session.game)?,
        })
    }
}
