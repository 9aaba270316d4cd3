//! Wire messages exchanged over the game socket.

use crate::error::SessionError;
use crate::session::{GameId, GameSession};
use serde::{Deserialize, Serialize};
use strictly_chess::ChessMove;

/// Kind of inbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    /// Attach to a game as player or observer.
    Connect,
    /// Submit a move.
    MakeMove,
    /// Detach from a game, giving up any seat.
    Leave,
    /// Concede the game.
    Resign,
}

/// Command sent by a client.
///
/// Token and game ID are optional on the wire so that a missing value is
/// reported as an auth or lookup failure rather than a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGameCommand {
    /// What the client wants to do.
    pub command_type: CommandType,
    /// Token identifying the user.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Game the command targets.
    #[serde(rename = "gameID", default)]
    pub game_id: Option<GameId>,
    /// The move, for `MAKE_MOVE` only.
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub chess_move: Option<ChessMove>,
}

impl UserGameCommand {
    /// Builds a command without a move.
    pub fn new(command_type: CommandType, auth_token: &str, game_id: GameId) -> Self {
        Self {
            command_type,
            auth_token: Some(auth_token.to_string()),
            game_id: Some(game_id),
            chess_move: None,
        }
    }

    /// Builds a `MAKE_MOVE` command.
    pub fn make_move(auth_token: &str, game_id: GameId, chess_move: ChessMove) -> Self {
        Self {
            chess_move: Some(chess_move),
            ..Self::new(CommandType::MakeMove, auth_token, game_id)
        }
    }
}

/// Message sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "serverMessageType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Full game snapshot.
    LoadGame {
        /// The game, seats included.
        game: GameSession,
    },
    /// Human-readable event.
    Notification {
        /// Event text.
        message: String,
    },
    /// Private failure report.
    Error {
        /// Failure text.
        message: String,
    },
}

impl ServerMessage {
    /// Builds a notification.
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }
}

impl From<&SessionError> for ServerMessage {
    fn from(err: &SessionError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}
