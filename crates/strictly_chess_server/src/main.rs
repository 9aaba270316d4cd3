//! Strictly Chess - game server CLI

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use strictly_chess_server::{
    AuthLookup, ChessRepository, Cli, Command, ConnectionRegistry, GameStore, MemoryStore,
    ServerConfig, SessionHandler,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            db_path,
            memory,
            users,
        } => {
            let mut settings = load_config(config)?;
            if let Some(host) = host {
                settings = settings.with_host(host);
            }
            if let Some(port) = port {
                settings = settings.with_port(port);
            }
            if let Some(db_path) = db_path {
                settings = settings.with_database_path(db_path);
            }
            run_server(settings, memory, users).await
        }
        Command::Migrate { db_path } => {
            open_repository(db_path)?;
            info!("Database is up to date");
            Ok(())
        }
        Command::SeedUser {
            token,
            username,
            db_path,
        } => {
            let repo = open_repository(db_path)?;
            let auth = repo.create_auth(&token, &username)?;
            println!("Registered token for {}", auth.username);
            Ok(())
        }
        Command::SeedGame {
            name,
            white,
            black,
            db_path,
        } => {
            let repo = open_repository(db_path)?;
            let game = repo.create_game(&name, white.as_deref(), black.as_deref())?;
            println!("Created game {} ({})", game.game_id, game.game_name);
            Ok(())
        }
    }
}

/// Reads the config file if one was given, otherwise uses defaults.
fn load_config(path: Option<PathBuf>) -> Result<ServerConfig> {
    match path {
        Some(path) => Ok(ServerConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?),
        None => {
            info!("No config file given, using defaults");
            Ok(ServerConfig::default())
        }
    }
}

/// Opens the SQLite database and brings its schema up to date.
fn open_repository(db_path: String) -> Result<ChessRepository> {
    let repo = ChessRepository::new(db_path)?;
    repo.run_migrations()?;
    Ok(repo)
}

/// Runs the WebSocket server until ctrl-c.
#[instrument(skip(config, users))]
async fn run_server(
    config: ServerConfig,
    memory: bool,
    users: Vec<(String, String)>,
) -> Result<()> {
    let auth: Arc<dyn AuthLookup>;
    let games: Arc<dyn GameStore>;
    if memory {
        let store = Arc::new(MemoryStore::new());
        for (token, username) in &users {
            store.insert_auth(token, username);
        }
        let white = users.first().map(|(_, username)| username.as_str());
        let black = users.get(1).map(|(_, username)| username.as_str());
        let game = store.create_game("Casual game", white, black);
        warn!(game_id = game.game_id, "Running in memory, games are lost on exit");
        auth = store.clone();
        games = store;
    } else {
        let repo = Arc::new(open_repository(config.database_path().clone())?);
        auth = repo.clone();
        games = repo;
    }

    let handler = Arc::new(SessionHandler::new(
        auth,
        games,
        Arc::new(ConnectionRegistry::new()),
    ));
    strictly_chess_server::serve(&config, handler).await
}
