//! Inbound command dispatch.
//!
//! The handler is stateless: games live in the [`GameStore`], connections in
//! the [`ConnectionRegistry`]. Each command runs while holding its game's
//! lock, from loading the game through the last broadcast, so concurrent
//! commands against one game apply one at a time. Store calls block, so
//! they run on tokio's blocking pool.

use crate::db::DbError;
use crate::error::{SessionError, SessionErrorKind};
use crate::locks::GameLocks;
use crate::messages::{CommandType, ServerMessage, UserGameCommand};
use crate::registry::{Addressing, Connection, ConnectionRegistry};
use crate::session::{AuthData, GameId, GameSession};
use crate::store::{AuthLookup, GameStore};
use crate::transport::Transport;
use std::sync::Arc;
use strictly_chess::{ChessMove, Color};
use tracing::{debug, error, info, instrument, warn};

/// Dispatches client commands against the rules engine and fans out results.
pub struct SessionHandler {
    auth: Arc<dyn AuthLookup>,
    games: Arc<dyn GameStore>,
    registry: Arc<ConnectionRegistry>,
    locks: GameLocks,
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl SessionHandler {
    /// Creates a handler over the given collaborators.
    #[instrument(skip_all)]
    pub fn new(
        auth: Arc<dyn AuthLookup>,
        games: Arc<dyn GameStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        info!("Creating session handler");
        Self {
            auth,
            games,
            registry,
            locks: GameLocks::new(),
        }
    }

    /// The registry this handler delivers through.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Per-game locks held while a command runs.
    pub fn locks(&self) -> &GameLocks {
        &self.locks
    }

    /// Processes one raw message from `root`.
    ///
    /// Failures are reported privately to `root` as an `ERROR` message and
    /// then returned for the caller to log; they never close the connection.
    #[instrument(skip(self, root, text), fields(root = %root.id()))]
    pub async fn handle_message(
        &self,
        root: &Arc<dyn Transport>,
        text: &str,
    ) -> Result<(), SessionError> {
        let command: UserGameCommand = match serde_json::from_str(text) {
            Ok(command) => command,
            Err(err) => {
                let err = SessionError::from(err);
                warn!(error = %err, "Unparseable command");
                self.report(root, None, &err);
                return Err(err);
            }
        };

        let game_id = command.game_id;
        let result = self.dispatch(root, command).await;
        if let Err(err) = &result {
            warn!(error = %err, file = err.file, line = err.line, "Command rejected");
            self.report(root, game_id, err);
        }
        result
    }

    /// Sends `err` to the originating connection only.
    fn report(&self, root: &Arc<dyn Transport>, game_id: Option<GameId>, err: &SessionError) {
        let message = ServerMessage::from(err);
        let delivered = match game_id {
            Some(game_id) => {
                self.registry
                    .deliver(Addressing::Root, game_id, root.as_ref(), &message)
            }
            None => self.registry.deliver_direct(root.as_ref(), &message),
        };
        if let Err(send_err) = delivered {
            error!(error = %send_err, "Failed to report error to client");
        }
    }

    async fn dispatch(
        &self,
        root: &Arc<dyn Transport>,
        command: UserGameCommand,
    ) -> Result<(), SessionError> {
        let auth = self.authenticate(command.auth_token.as_deref()).await?;
        let game_id = command
            .game_id
            .ok_or_else(|| SessionError::new(SessionErrorKind::GameNotFound))?;

        // Only games that exist get a lock entry; the game is read again
        // under the guard.
        self.load_game(game_id).await?;
        let _guard = self.locks.acquire(game_id).await;
        let session = self.load_game(game_id).await?;

        debug!(command = %command.command_type, username = %auth.username, game_id, "Dispatching command");
        match command.command_type {
            CommandType::Connect => self.connect(root, &auth, session),
            CommandType::MakeMove => {
                let chess_move = command.chess_move.ok_or_else(|| {
                    SessionError::new(SessionErrorKind::ProtocolError(
                        "MAKE_MOVE requires a move".to_string(),
                    ))
                })?;
                self.make_move(root, &auth, session, chess_move).await
            }
            CommandType::Leave => self.leave(root, &auth, session).await,
            CommandType::Resign => self.resign(root, &auth, session).await,
        }
    }

    /// Runs a store call on the blocking pool.
    async fn on_store<T, F>(&self, call: F) -> Result<T, SessionError>
    where
        F: FnOnce() -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let result = tokio::task::spawn_blocking(call).await.map_err(|e| {
            SessionError::new(SessionErrorKind::PersistenceFailure(e.to_string()))
        })?;
        Ok(result?)
    }

    async fn authenticate(&self, token: Option<&str>) -> Result<AuthData, SessionError> {
        let token = token
            .ok_or_else(|| SessionError::new(SessionErrorKind::Unauthorized))?
            .to_string();
        let auth = Arc::clone(&self.auth);
        self.on_store(move || auth.resolve(&token))
            .await?
            .ok_or_else(|| SessionError::new(SessionErrorKind::Unauthorized))
    }

    async fn load_game(&self, game_id: GameId) -> Result<GameSession, SessionError> {
        let games = Arc::clone(&self.games);
        self.on_store(move || games.get(game_id))
            .await?
            .ok_or_else(|| SessionError::new(SessionErrorKind::GameNotFound))
    }

    async fn persist(&self, session: &GameSession) -> Result<(), SessionError> {
        let games = Arc::clone(&self.games);
        let session = session.clone();
        self.on_store(move || games.update(&session)).await
    }

    /// Delivers a message; the only possible failure is encoding, which is
    /// logged rather than surfaced since the command has already taken effect.
    fn broadcast(
        &self,
        addressing: Addressing,
        game_id: GameId,
        root: &Arc<dyn Transport>,
        message: ServerMessage,
    ) {
        if let Err(err) = self.registry.deliver(addressing, game_id, root.as_ref(), &message) {
            error!(error = %err, %addressing, "Broadcast failed");
        }
    }

    #[instrument(skip_all, fields(game_id = session.game_id, username = %auth.username))]
    fn connect(
        &self,
        root: &Arc<dyn Transport>,
        auth: &AuthData,
        session: GameSession,
    ) -> Result<(), SessionError> {
        let game_id = session.game_id;
        self.registry
            .add(game_id, Connection::new(Arc::clone(root), auth.username.clone()));

        let role = match session.seat_of(&auth.username) {
            Some(Color::White) => "the White player",
            Some(Color::Black) => "the Black player",
            None => "an Observer",
        };
        info!(role, "Client connected");

        let notice = format!("{} has joined the game as {}", auth.username, role);
        self.broadcast(Addressing::Root, game_id, root, ServerMessage::LoadGame { game: session });
        self.broadcast(Addressing::NotRoot, game_id, root, ServerMessage::notification(notice));
        Ok(())
    }

    #[instrument(skip_all, fields(game_id = session.game_id, username = %auth.username, mv = %chess_move))]
    async fn make_move(
        &self,
        root: &Arc<dyn Transport>,
        auth: &AuthData,
        mut session: GameSession,
        chess_move: ChessMove,
    ) -> Result<(), SessionError> {
        let color = session.seat_of(&auth.username).ok_or_else(|| {
            SessionError::new(SessionErrorKind::IllegalRole(
                "Observers can't make a move".to_string(),
            ))
        })?;
        if session.game.is_over() {
            return Err(SessionError::new(SessionErrorKind::InvalidMove(
                "the game is over, no more moves can be made".to_string(),
            )));
        }
        if session.game.turn() != color {
            return Err(SessionError::new(SessionErrorKind::InvalidMove(
                "it is not your turn".to_string(),
            )));
        }
        session.game.make_move(chess_move)?;

        let opponent = color.opponent();
        let player = auth.username.as_str();
        let opponent_name = session.display_name(opponent);
        let status = if session.game.is_in_checkmate(opponent) {
            session.game.conclude();
            Some(format!(
                "{player}'s move delivers checkmate to {opponent_name}, winning them the game!"
            ))
        } else if session.game.is_in_stalemate(opponent) {
            session.game.conclude();
            Some(format!(
                "{player}'s move puts {opponent_name} into stalemate, making the game result in a tie."
            ))
        } else if session.game.is_in_check(opponent) {
            Some(format!(
                "{player}'s move puts {opponent_name} into check. What's their next move going to be?"
            ))
        } else {
            None
        };

        self.persist(&session).await?;
        info!(over = session.game.is_over(), "Move committed");

        let game_id = session.game_id;
        let description = describe_move(player, chess_move);
        self.broadcast(Addressing::Everyone, game_id, root, ServerMessage::LoadGame { game: session });
        self.broadcast(Addressing::NotRoot, game_id, root, ServerMessage::notification(description));
        if let Some(status) = status {
            self.broadcast(Addressing::Everyone, game_id, root, ServerMessage::notification(status));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(game_id = session.game_id, username = %auth.username))]
    async fn leave(
        &self,
        root: &Arc<dyn Transport>,
        auth: &AuthData,
        mut session: GameSession,
    ) -> Result<(), SessionError> {
        let game_id = session.game_id;
        if let Some(color) = session.vacate(&auth.username) {
            self.persist(&session).await?;
            info!(%color, "Seat vacated");
        }
        self.registry.remove(game_id, root.id());

        let notice = format!("{} has left the game", auth.username);
        self.broadcast(Addressing::NotRoot, game_id, root, ServerMessage::notification(notice));
        Ok(())
    }

    #[instrument(skip_all, fields(game_id = session.game_id, username = %auth.username))]
    async fn resign(
        &self,
        root: &Arc<dyn Transport>,
        auth: &AuthData,
        mut session: GameSession,
    ) -> Result<(), SessionError> {
        if session.seat_of(&auth.username).is_none() {
            return Err(SessionError::new(SessionErrorKind::IllegalRole(
                "Observers can't resign".to_string(),
            )));
        }
        session.game.resign()?;
        self.persist(&session).await?;
        info!("Player resigned");

        let notice = format!("{} has resigned the game", auth.username);
        self.broadcast(Addressing::Everyone, session.game_id, root, ServerMessage::notification(notice));
        Ok(())
    }
}

/// "alice has made the move e2 to e4", plus the promotion if any.
fn describe_move(player: &str, chess_move: ChessMove) -> String {
    let mut text = format!(
        "{} has made the move {} to {}",
        player, chess_move.start, chess_move.end
    );
    if let Some(kind) = chess_move.promotion {
        text.push_str(&format!(" and promotes to a {}", kind));
    }
    text
}
