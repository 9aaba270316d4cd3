//! Command-line interface for strictly_chess_server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Chess - live chess games over WebSocket
#[derive(Parser, Debug)]
#[command(name = "strictly_chess_server")]
#[command(about = "Multiplayer chess server with live observers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the WebSocket game server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the database file (overrides the config file)
        #[arg(long)]
        db_path: Option<String>,

        /// Keep games in memory instead of SQLite
        #[arg(long)]
        memory: bool,

        /// With --memory, a user to register as TOKEN:USERNAME (repeatable).
        /// The first two are seated as White and Black in game 1.
        #[arg(long = "user", value_parser = parse_seed_user, requires = "memory")]
        users: Vec<(String, String)>,
    },

    /// Create or upgrade the database schema
    Migrate {
        /// Path to the database file (created if it doesn't exist)
        #[arg(long, default_value = "strictly_chess.db")]
        db_path: String,
    },

    /// Register an auth token for a user
    SeedUser {
        /// Token the client will present
        #[arg(long)]
        token: String,

        /// Username the token resolves to
        #[arg(long)]
        username: String,

        /// Path to the database file
        #[arg(long, default_value = "strictly_chess.db")]
        db_path: String,
    },

    /// Create a game at the opening position
    SeedGame {
        /// Display name of the game
        #[arg(long)]
        name: String,

        /// User seated as White
        #[arg(long)]
        white: Option<String>,

        /// User seated as Black
        #[arg(long)]
        black: Option<String>,

        /// Path to the database file
        #[arg(long, default_value = "strictly_chess.db")]
        db_path: String,
    },
}

/// Splits `TOKEN:USERNAME`.
fn parse_seed_user(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((token, username)) if !token.is_empty() && !username.is_empty() => {
            Ok((token.to_string(), username.to_string()))
        }
        _ => Err(format!("expected TOKEN:USERNAME, got '{}'", value)),
    }
}
