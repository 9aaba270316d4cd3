//! Game session records shared with the persistence layer.

use derive_new::new;
use serde::{Deserialize, Serialize};
use strictly_chess::{Color, Game};
use tracing::{debug, instrument};

/// Identifier of a game session.
pub type GameId = i32;

/// Result of resolving an auth token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct AuthData {
    /// Token presented by the client.
    pub auth_token: String,
    /// User the token belongs to.
    pub username: String,
}

/// A persisted game: its seats, name and current state.
///
/// `None` in a seat means it is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    /// Session ID.
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    /// Player seated as White.
    pub white_username: Option<String>,
    /// Player seated as Black.
    pub black_username: Option<String>,
    /// Display name of the game.
    pub game_name: String,
    /// The chess game itself.
    pub game: Game,
}

impl GameSession {
    /// Color `username` plays, or `None` for observers.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub fn seat_of(&self, username: &str) -> Option<Color> {
        let seat = if self.white_username.as_deref() == Some(username) {
            Some(Color::White)
        } else if self.black_username.as_deref() == Some(username) {
            Some(Color::Black)
        } else {
            None
        };
        debug!(username, ?seat, "Resolved seat");
        seat
    }

    /// Player seated as `color`, if any.
    pub fn player(&self, color: Color) -> Option<&str> {
        match color {
            Color::White => self.white_username.as_deref(),
            Color::Black => self.black_username.as_deref(),
        }
    }

    /// Name used in notifications for the player of `color`.
    pub fn display_name(&self, color: Color) -> String {
        self.player(color)
            .map(str::to_string)
            .unwrap_or_else(|| format!("the {} player", color))
    }

    /// Opens the seat `username` occupies. Returns the vacated color.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub fn vacate(&mut self, username: &str) -> Option<Color> {
        let seat = self.seat_of(username)?;
        match seat {
            Color::White => self.white_username = None,
            Color::Black => self.black_username = None,
        }
        Some(seat)
    }
}
