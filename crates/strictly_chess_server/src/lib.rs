//! Strictly Chess server - live chess sessions over WebSocket
//!
//! Clients connect to a game as a player or observer and exchange JSON
//! commands; every accepted change is persisted and then broadcast to the
//! other clients watching that game.
//!
//! # Architecture
//!
//! - **Handler**: authenticates, validates and applies commands
//! - **Registry**: live connections per game and message fan-out
//! - **Store**: auth and game lookups, in memory or SQLite
//! - **Server**: axum WebSocket endpoint and graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_chess_server::{ConnectionRegistry, MemoryStore, SessionHandler};
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert_auth("token-a", "alice");
//! store.create_game("Friendly", Some("alice"), None);
//!
//! let handler = SessionHandler::new(
//!     store.clone(),
//!     store,
//!     Arc::new(ConnectionRegistry::new()),
//! );
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod cli;
mod config;
mod db;
mod error;
mod handler;
mod locks;
mod messages;
mod registry;
mod server;
mod session;
mod store;
mod transport;

// Crate-level exports - Command line
pub use cli::{Cli, Command};

// Crate-level exports - Configuration
pub use config::{ConfigError, ServerConfig};

// Crate-level exports - Persistence
pub use db::{ChessRepository, DbError};
pub use store::{AuthLookup, GameStore, MemoryStore};

// Crate-level exports - Errors
pub use error::{SessionError, SessionErrorKind};

// Crate-level exports - Session protocol
pub use handler::SessionHandler;
pub use locks::GameLocks;
pub use messages::{CommandType, ServerMessage, UserGameCommand};
pub use session::{AuthData, GameId, GameSession};

// Crate-level exports - Connections
pub use registry::{Addressing, Connection, ConnectionRegistry, DeliveryReport};
pub use transport::{ChannelTransport, ConnectionId, Transport, TransportError};

// Crate-level exports - Server
pub use server::{AppState, router, serve};
