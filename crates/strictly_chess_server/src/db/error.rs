//! Failures reading or writing auth tokens and saved games.

use derive_more::{Display, Error};
use tracing::instrument;

/// A store operation failed: the SQLite file could not be opened, a query or
/// migration failed, a game row holds unreadable JSON, or an update named a
/// game that does not exist.
///
/// The handler turns this into a `PersistenceFailure` for the client, using
/// `message` as the detail; the location stays in the logs.
#[derive(Debug, Clone, Display, Error)]
#[display("Store error: {} at {}:{}", message, file, line)]
pub struct DbError {
    /// What the store reported.
    pub message: String,
    /// Line that raised the error.
    pub line: u32,
    /// File that raised the error.
    pub file: &'static str,
}

impl DbError {
    /// Wraps a store failure, recording the caller's location.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<diesel::result::Error> for DbError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        Self::new(format!("query failed: {}", err))
    }
}

impl From<diesel::ConnectionError> for DbError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::new(format!("cannot open game database: {}", err))
    }
}

impl From<serde_json::Error> for DbError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("stored game is not valid JSON: {}", err))
    }
}
