//! Errors raised while processing a client command.

use crate::db::DbError;
use derive_more::{Display, Error};
use strictly_chess::MoveError;
use tracing::instrument;

/// What went wrong with a command.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionErrorKind {
    /// Missing or unknown auth token.
    #[display("unauthorized")]
    Unauthorized,

    /// Missing or unknown game ID.
    #[display("game not found")]
    GameNotFound,

    /// Rejected by the rules engine, out of turn, or game already over.
    #[display("invalid move: {}", _0)]
    InvalidMove(String),

    /// Observer tried to act as a player.
    #[display("{}", _0)]
    IllegalRole(String),

    /// The game store refused a write; the move did not durably apply.
    #[display("failed to save the game, your action was not applied ({})", _0)]
    PersistenceFailure(String),

    /// Payload could not be understood.
    #[display("malformed command: {}", _0)]
    ProtocolError(String),
}

/// Command failure with location tracking.
///
/// `Display` yields the text sent to the client; the location is for logs.
#[derive(Debug, Clone, Display, Error)]
#[display("Error: {}", kind)]
pub struct SessionError {
    /// Error category and detail.
    pub kind: SessionErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SessionError {
    /// Creates a new session error with caller location tracking.
    #[track_caller]
    #[instrument]
    pub fn new(kind: SessionErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<MoveError> for SessionError {
    #[track_caller]
    fn from(err: MoveError) -> Self {
        Self::new(SessionErrorKind::InvalidMove(err.to_string()))
    }
}

impl From<DbError> for SessionError {
    #[track_caller]
    fn from(err: DbError) -> Self {
        Self::new(SessionErrorKind::PersistenceFailure(err.message))
    }
}

impl From<serde_json::Error> for SessionError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(SessionErrorKind::ProtocolError(err.to_string()))
    }
}
