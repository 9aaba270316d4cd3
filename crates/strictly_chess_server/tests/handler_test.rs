//! Tests for command dispatch over in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;
use strictly_chess::{Board, ChessMove, Color, Game, Piece, PieceKind, Position};
use strictly_chess_server::{
    AuthLookup, ChannelTransport, CommandType, ConnectionRegistry, DbError, GameId, GameSession,
    GameStore, MemoryStore, ServerMessage, SessionError, SessionErrorKind, SessionHandler,
    Transport, UserGameCommand,
};
use tokio::sync::mpsc;

const GAME: GameId = 1;

struct Client {
    transport: Arc<dyn Transport>,
    inbox: mpsc::Receiver<String>,
}

impl Client {
    fn new() -> Self {
        let (transport, inbox) = ChannelTransport::new(32);
        Self {
            transport: Arc::new(transport),
            inbox,
        }
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(text) = self.inbox.try_recv() {
            messages.push(serde_json::from_str(&text).expect("server sent valid JSON"));
        }
        messages
    }
}

fn mv(from: (u8, u8), to: (u8, u8)) -> ChessMove {
    ChessMove::new(Position::new(from.0, from.1), Position::new(to.0, to.1), None)
}

fn notification(text: &str) -> ServerMessage {
    ServerMessage::notification(text)
}

fn error_text(messages: &[ServerMessage]) -> &str {
    match messages {
        [ServerMessage::Error { message }] => message,
        other => panic!("expected a single ERROR, got {:?}", other),
    }
}

/// alice plays White and bob Black in game 1; carol may only watch.
fn setup() -> (Arc<MemoryStore>, SessionHandler) {
    let store = Arc::new(MemoryStore::new());
    store.insert_auth("alice-token", "alice");
    store.insert_auth("bob-token", "bob");
    store.insert_auth("carol-token", "carol");
    let game = store.create_game("Test game", Some("alice"), Some("bob"));
    assert_eq!(game.game_id, GAME);

    let handler = SessionHandler::new(
        store.clone(),
        store.clone(),
        Arc::new(ConnectionRegistry::new()),
    );
    (store, handler)
}

async fn send(
    handler: &SessionHandler,
    client: &Client,
    command: &UserGameCommand,
) -> Result<(), SessionError> {
    let text = serde_json::to_string(command).expect("command serializes");
    handler.handle_message(&client.transport, &text).await
}

async fn connect(handler: &SessionHandler, client: &Client, token: &str) {
    send(handler, client, &UserGameCommand::new(CommandType::Connect, token, GAME))
        .await
        .expect("connect succeeds");
}

fn stored(store: &MemoryStore) -> GameSession {
    store
        .get(GAME)
        .expect("store readable")
        .expect("game exists")
}

/// Connects alice, bob and carol and clears their inboxes.
async fn seated_table(handler: &SessionHandler) -> (Client, Client, Client) {
    let mut alice = Client::new();
    let mut bob = Client::new();
    let mut carol = Client::new();
    connect(handler, &alice, "alice-token").await;
    connect(handler, &bob, "bob-token").await;
    connect(handler, &carol, "carol-token").await;
    alice.drain();
    bob.drain();
    carol.drain();
    (alice, bob, carol)
}

// Connect

#[tokio::test]
async fn test_connect_loads_game_and_announces_role() {
    let (store, handler) = setup();
    let mut alice = Client::new();
    let mut bob = Client::new();
    let mut carol = Client::new();

    connect(&handler, &alice, "alice-token").await;
    assert_eq!(
        alice.drain(),
        vec![ServerMessage::LoadGame {
            game: stored(&store)
        }]
    );

    connect(&handler, &bob, "bob-token").await;
    assert_eq!(
        alice.drain(),
        vec![notification("bob has joined the game as the Black player")]
    );
    assert!(matches!(bob.drain().as_slice(), [ServerMessage::LoadGame { .. }]));

    connect(&handler, &carol, "carol-token").await;
    let joined = notification("carol has joined the game as an Observer");
    assert_eq!(alice.drain(), vec![joined.clone()]);
    assert_eq!(bob.drain(), vec![joined]);
    assert!(matches!(carol.drain().as_slice(), [ServerMessage::LoadGame { .. }]));

    assert_eq!(handler.registry().connection_count(GAME), 3);
}

// Moves

#[tokio::test]
async fn test_opening_move_is_persisted_and_broadcast() {
    let (store, handler) = setup();
    let (mut alice, mut bob, mut carol) = seated_table(&handler).await;

    send(&handler, &alice, &UserGameCommand::make_move("alice-token", GAME, mv((2, 5), (4, 5))))
        .await
        .expect("e2e4 is legal");

    let session = stored(&store);
    assert_eq!(session.game.turn(), Color::Black);
    assert!(session.game.board().is_empty(Position::new(2, 5)));
    assert!(!session.game.board().is_empty(Position::new(4, 5)));

    let load = ServerMessage::LoadGame { game: session };
    let described = notification("alice has made the move e2 to e4");
    assert_eq!(alice.drain(), vec![load.clone()]);
    assert_eq!(bob.drain(), vec![load.clone(), described.clone()]);
    assert_eq!(carol.drain(), vec![load, described]);
}

#[tokio::test]
async fn test_observer_move_is_rejected_privately() {
    let (store, handler) = setup();
    let (mut alice, mut bob, mut carol) = seated_table(&handler).await;
    let before = stored(&store);

    let err = send(&handler, &carol, &UserGameCommand::make_move("carol-token", GAME, mv((2, 5), (4, 5))))
        .await
        .expect_err("observers cannot move");

    assert!(matches!(err.kind, SessionErrorKind::IllegalRole(_)));
    assert!(error_text(&carol.drain()).contains("Observers can't make a move"));
    assert!(alice.drain().is_empty());
    assert!(bob.drain().is_empty());
    assert_eq!(stored(&store), before);
}

#[tokio::test]
async fn test_move_out_of_turn_is_rejected() {
    let (store, handler) = setup();
    let (mut alice, mut bob, _carol) = seated_table(&handler).await;

    let err = send(&handler, &bob, &UserGameCommand::make_move("bob-token", GAME, mv((7, 5), (5, 5))))
        .await
        .expect_err("black cannot open");

    assert!(matches!(err.kind, SessionErrorKind::InvalidMove(_)));
    assert!(error_text(&bob.drain()).contains("not your turn"));
    assert!(alice.drain().is_empty());
    assert_eq!(stored(&store).game.turn(), Color::White);
}

#[tokio::test]
async fn test_illegal_move_is_rejected() {
    let (store, handler) = setup();
    let (mut alice, mut bob, _carol) = seated_table(&handler).await;

    let err = send(&handler, &alice, &UserGameCommand::make_move("alice-token", GAME, mv((2, 5), (5, 5))))
        .await
        .expect_err("pawns do not move three squares");

    assert!(matches!(err.kind, SessionErrorKind::InvalidMove(_)));
    assert!(error_text(&alice.drain()).starts_with("Error: invalid move"));
    assert!(bob.drain().is_empty());
    assert_eq!(stored(&store).game.turn(), Color::White);
}

#[tokio::test]
async fn test_fools_mate_ends_the_game() {
    let (store, handler) = setup();
    let (mut alice, mut bob, mut carol) = seated_table(&handler).await;

    let sequence = [
        ("alice-token", &alice, mv((2, 6), (3, 6))),
        ("bob-token", &bob, mv((7, 5), (5, 5))),
        ("alice-token", &alice, mv((2, 7), (4, 7))),
        ("bob-token", &bob, mv((8, 4), (4, 8))),
    ];
    for (token, client, chess_move) in sequence {
        send(&handler, client, &UserGameCommand::make_move(token, GAME, chess_move))
            .await
            .expect("scripted move is legal");
    }

    assert!(stored(&store).game.is_over());
    let mate = notification("bob's move delivers checkmate to alice, winning them the game!");
    for client in [&mut alice, &mut bob, &mut carol] {
        assert_eq!(client.drain().last(), Some(&mate));
    }

    let err = send(&handler, &alice, &UserGameCommand::make_move("alice-token", GAME, mv((2, 1), (3, 1))))
        .await
        .expect_err("no moves after mate");
    assert!(matches!(err.kind, SessionErrorKind::InvalidMove(_)));
}

#[tokio::test]
async fn test_check_is_announced_to_everyone() {
    let (_store, handler) = setup();
    let (mut alice, mut bob, _carol) = seated_table(&handler).await;

    // 1. e4 f6 2. Qh5+
    let sequence = [
        ("alice-token", &alice, mv((2, 5), (4, 5))),
        ("bob-token", &bob, mv((7, 6), (6, 6))),
        ("alice-token", &alice, mv((1, 4), (5, 8))),
    ];
    for (token, client, chess_move) in sequence {
        send(&handler, client, &UserGameCommand::make_move(token, GAME, chess_move))
            .await
            .expect("scripted move is legal");
    }

    let check = notification("alice's move puts bob into check. What's their next move going to be?");
    assert_eq!(alice.drain().last(), Some(&check));
    assert_eq!(bob.drain().last(), Some(&check));
}

/// Holds every write for a while so that overlapping commands would
/// interleave without the game lock.
struct SlowStore(Arc<MemoryStore>);

impl GameStore for SlowStore {
    fn get(&self, game_id: GameId) -> Result<Option<GameSession>, DbError> {
        self.0.get(game_id)
    }

    fn update(&self, session: &GameSession) -> Result<(), DbError> {
        std::thread::sleep(Duration::from_millis(150));
        self.0.update(session)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_apply_one_at_a_time() {
    let store = Arc::new(MemoryStore::new());
    store.insert_auth("alice-token", "alice");
    store.create_game("Test game", Some("alice"), Some("bob"));
    let handler = Arc::new(SessionHandler::new(
        store.clone(),
        Arc::new(SlowStore(store.clone())),
        Arc::new(ConnectionRegistry::new()),
    ));
    let alice = Client::new();
    connect(&handler, &alice, "alice-token").await;

    let tasks: Vec<_> = [mv((2, 5), (4, 5)), mv((2, 4), (4, 4))]
        .into_iter()
        .map(|chess_move| {
            let handler = Arc::clone(&handler);
            let root = Arc::clone(&alice.transport);
            let text = serde_json::to_string(&UserGameCommand::make_move("alice-token", GAME, chess_move))
                .expect("command serializes");
            tokio::spawn(async move { handler.handle_message(&root, &text).await })
        })
        .collect();

    let mut landed = 0;
    let mut rejected = Vec::new();
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(()) => landed += 1,
            Err(err) => rejected.push(err.kind),
        }
    }

    assert_eq!(landed, 1, "exactly one white move may land");
    assert!(matches!(rejected.as_slice(), [SessionErrorKind::InvalidMove(_)]));
    let session = stored(&store);
    assert_eq!(session.game.turn(), Color::Black);
    let advanced = [Position::new(4, 5), Position::new(4, 4)]
        .into_iter()
        .filter(|pos| !session.game.board().is_empty(*pos))
        .count();
    assert_eq!(advanced, 1);
}

#[tokio::test]
async fn test_unknown_games_do_not_grow_lock_table() {
    let (_store, handler) = setup();
    let (_alice, _bob, _carol) = seated_table(&handler).await;
    let mut mallory = Client::new();
    let before = handler.locks().len();

    for game_id in 1000..1500 {
        let err = send(&handler, &mallory, &UserGameCommand::new(CommandType::Connect, "carol-token", game_id))
            .await
            .expect_err("no such game");
        assert_eq!(err.kind, SessionErrorKind::GameNotFound);
        assert_eq!(error_text(&mallory.drain()), "Error: game not found");
    }

    assert_eq!(handler.locks().len(), before);
}

// Endings and promotion

/// Replaces game 1 with alice (White) to move in the given position.
fn seed_position(store: &MemoryStore, pieces: &[(u8, u8, Color, PieceKind)]) {
    let mut board = Board::empty();
    for &(row, col, color, kind) in pieces {
        board.set(Position::new(row, col), Some(Piece::new(color, kind)));
    }
    store.insert_game(GameSession::new(
        GAME,
        Some("alice".to_string()),
        Some("bob".to_string()),
        "Endgame".to_string(),
        Game::from_board(board, Color::White),
    ));
}

#[tokio::test]
async fn test_stalemate_ends_the_game() {
    let (store, handler) = setup();
    // White Kf7 and Qg5 against a lone Kh8; Qg6 leaves Black without a move.
    seed_position(
        &store,
        &[
            (7, 6, Color::White, PieceKind::King),
            (5, 7, Color::White, PieceKind::Queen),
            (8, 8, Color::Black, PieceKind::King),
        ],
    );
    let (mut alice, mut bob, mut carol) = seated_table(&handler).await;

    send(&handler, &alice, &UserGameCommand::make_move("alice-token", GAME, mv((5, 7), (6, 7))))
        .await
        .expect("Qg6 is legal");

    assert!(stored(&store).game.is_over());
    let stalemate = notification(
        "alice's move puts bob into stalemate, making the game result in a tie.",
    );
    assert_eq!(alice.drain().last(), Some(&stalemate));
    assert_eq!(bob.drain().last(), Some(&stalemate));
    assert_eq!(carol.drain().last(), Some(&stalemate));

    let err = send(&handler, &bob, &UserGameCommand::make_move("bob-token", GAME, mv((8, 8), (8, 7))))
        .await
        .expect_err("no moves after stalemate");
    assert!(matches!(err.kind, SessionErrorKind::InvalidMove(_)));
    assert!(error_text(&bob.drain()).contains("game is over"));
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn test_promotion_is_described() {
    let (store, handler) = setup();
    seed_position(
        &store,
        &[
            (7, 1, Color::White, PieceKind::Pawn),
            (1, 5, Color::White, PieceKind::King),
            (6, 8, Color::Black, PieceKind::King),
        ],
    );
    let (alice, mut bob, _carol) = seated_table(&handler).await;

    let promote = ChessMove::new(Position::new(7, 1), Position::new(8, 1), Some(PieceKind::Queen));
    send(&handler, &alice, &UserGameCommand::make_move("alice-token", GAME, promote))
        .await
        .expect("a7a8=Q is legal");

    let session = stored(&store);
    assert_eq!(
        session.game.board().get(Position::new(8, 1)),
        Some(Piece::new(Color::White, PieceKind::Queen))
    );
    assert_eq!(
        bob.drain(),
        vec![
            ServerMessage::LoadGame { game: session },
            notification("alice has made the move a7 to a8 and promotes to a queen"),
        ]
    );
}

// Leave and resign

#[tokio::test]
async fn test_leave_vacates_seat_and_detaches() {
    let (store, handler) = setup();
    let (mut alice, mut bob, _carol) = seated_table(&handler).await;

    send(&handler, &bob, &UserGameCommand::new(CommandType::Leave, "bob-token", GAME))
        .await
        .expect("leave succeeds");

    assert_eq!(stored(&store).black_username, None);
    assert_eq!(alice.drain(), vec![notification("bob has left the game")]);
    assert!(bob.drain().is_empty());
    assert_eq!(handler.registry().connection_count(GAME), 2);
}

#[tokio::test]
async fn test_observer_leave_keeps_seats() {
    let (store, handler) = setup();
    let (mut alice, _bob, carol) = seated_table(&handler).await;
    let before = stored(&store);

    send(&handler, &carol, &UserGameCommand::new(CommandType::Leave, "carol-token", GAME))
        .await
        .expect("leave succeeds");

    assert_eq!(stored(&store), before);
    assert_eq!(alice.drain(), vec![notification("carol has left the game")]);
}

#[tokio::test]
async fn test_resign_twice_is_rejected() {
    let (store, handler) = setup();
    let (mut alice, mut bob, mut carol) = seated_table(&handler).await;

    send(&handler, &alice, &UserGameCommand::new(CommandType::Resign, "alice-token", GAME))
        .await
        .expect("first resignation succeeds");

    assert!(stored(&store).game.is_over());
    let resigned = notification("alice has resigned the game");
    assert_eq!(alice.drain(), vec![resigned.clone()]);
    assert_eq!(bob.drain(), vec![resigned.clone()]);
    assert_eq!(carol.drain(), vec![resigned]);

    let err = send(&handler, &bob, &UserGameCommand::new(CommandType::Resign, "bob-token", GAME))
        .await
        .expect_err("game already over");
    assert!(matches!(err.kind, SessionErrorKind::InvalidMove(_)));
    error_text(&bob.drain());
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn test_observer_cannot_resign() {
    let (store, handler) = setup();
    let (_alice, _bob, mut carol) = seated_table(&handler).await;

    let err = send(&handler, &carol, &UserGameCommand::new(CommandType::Resign, "carol-token", GAME))
        .await
        .expect_err("observers cannot resign");

    assert!(matches!(err.kind, SessionErrorKind::IllegalRole(_)));
    assert!(error_text(&carol.drain()).contains("Observers can't resign"));
    assert!(!stored(&store).game.is_over());
}

// Rejected commands

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let (_store, handler) = setup();
    let mut mallory = Client::new();

    let err = send(&handler, &mallory, &UserGameCommand::new(CommandType::Connect, "forged", GAME))
        .await
        .expect_err("unknown token");

    assert_eq!(err.kind, SessionErrorKind::Unauthorized);
    assert_eq!(error_text(&mallory.drain()), "Error: unauthorized");
    assert_eq!(handler.registry().connection_count(GAME), 0);
}

#[tokio::test]
async fn test_unknown_game_is_reported() {
    let (_store, handler) = setup();
    let mut alice = Client::new();

    let err = send(&handler, &alice, &UserGameCommand::new(CommandType::Connect, "alice-token", 99))
        .await
        .expect_err("no such game");

    assert_eq!(err.kind, SessionErrorKind::GameNotFound);
    assert_eq!(error_text(&alice.drain()), "Error: game not found");
}

#[tokio::test]
async fn test_malformed_payloads_are_reported() {
    let (_store, handler) = setup();
    let mut alice = Client::new();

    let err = handler
        .handle_message(&alice.transport, "definitely not json")
        .await
        .expect_err("not JSON");
    assert!(matches!(err.kind, SessionErrorKind::ProtocolError(_)));
    error_text(&alice.drain());

    let missing_move = r#"{"commandType":"MAKE_MOVE","authToken":"alice-token","gameID":1}"#;
    let err = handler
        .handle_message(&alice.transport, missing_move)
        .await
        .expect_err("move is required");
    assert!(matches!(err.kind, SessionErrorKind::ProtocolError(_)));
    error_text(&alice.drain());
}

#[tokio::test]
async fn test_errors_go_only_to_sender_in_other_game() {
    let (store, handler) = setup();
    let other = store.create_game("Second game", Some("carol"), None);
    let mut alice = Client::new();
    let mut carol = Client::new();
    send(&handler, &carol, &UserGameCommand::new(CommandType::Connect, "carol-token", other.game_id))
        .await
        .expect("carol joins her own game");
    carol.drain();

    // alice is only an observer of the second game and has never connected to it.
    let err = send(
        &handler,
        &alice,
        &UserGameCommand::make_move("alice-token", other.game_id, mv((2, 5), (4, 5))),
    )
    .await
    .expect_err("alice has no seat there");

    assert!(matches!(err.kind, SessionErrorKind::IllegalRole(_)));
    error_text(&alice.drain());
    assert!(carol.drain().is_empty());
}

// Persistence failure

/// Reads from a real store but refuses every write.
struct ReadOnlyStore(Arc<MemoryStore>);

impl GameStore for ReadOnlyStore {
    fn get(&self, game_id: GameId) -> Result<Option<GameSession>, DbError> {
        self.0.get(game_id)
    }

    fn update(&self, _session: &GameSession) -> Result<(), DbError> {
        Err(DbError::new("disk full"))
    }
}

#[tokio::test]
async fn test_failed_save_suppresses_broadcast() {
    let store = Arc::new(MemoryStore::new());
    store.insert_auth("alice-token", "alice");
    store.insert_auth("bob-token", "bob");
    store.create_game("Test game", Some("alice"), Some("bob"));
    let auth: Arc<dyn AuthLookup> = store.clone();
    let handler = SessionHandler::new(
        auth,
        Arc::new(ReadOnlyStore(store.clone())),
        Arc::new(ConnectionRegistry::new()),
    );

    let mut alice = Client::new();
    let mut bob = Client::new();
    connect(&handler, &alice, "alice-token").await;
    connect(&handler, &bob, "bob-token").await;
    alice.drain();
    bob.drain();

    let err = send(&handler, &alice, &UserGameCommand::make_move("alice-token", GAME, mv((2, 5), (4, 5))))
        .await
        .expect_err("write fails");

    assert!(matches!(err.kind, SessionErrorKind::PersistenceFailure(_)));
    assert!(error_text(&alice.drain()).contains("disk full"));
    assert!(bob.drain().is_empty());
    assert_eq!(stored(&store).game.turn(), Color::White);
}

#[tokio::test]
async fn test_failed_leave_keeps_connection() {
    let store = Arc::new(MemoryStore::new());
    store.insert_auth("alice-token", "alice");
    store.insert_auth("bob-token", "bob");
    store.create_game("Test game", Some("alice"), Some("bob"));
    let handler = SessionHandler::new(
        store.clone(),
        Arc::new(ReadOnlyStore(store.clone())),
        Arc::new(ConnectionRegistry::new()),
    );

    let mut alice = Client::new();
    let mut bob = Client::new();
    connect(&handler, &alice, "alice-token").await;
    connect(&handler, &bob, "bob-token").await;
    alice.drain();
    bob.drain();

    let err = send(&handler, &bob, &UserGameCommand::new(CommandType::Leave, "bob-token", GAME))
        .await
        .expect_err("write fails");

    assert!(matches!(err.kind, SessionErrorKind::PersistenceFailure(_)));
    error_text(&bob.drain());
    assert!(alice.drain().is_empty());
    assert_eq!(handler.registry().connection_count(GAME), 2);
    assert_eq!(stored(&store).black_username.as_deref(), Some("bob"));
}

/// Each write waits for a signal sent from a task on the async runtime.
struct GatedStore {
    inner: Arc<MemoryStore>,
    gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
}

impl GameStore for GatedStore {
    fn get(&self, game_id: GameId) -> Result<Option<GameSession>, DbError> {
        self.inner.get(game_id)
    }

    fn update(&self, session: &GameSession) -> Result<(), DbError> {
        let gate = self.gate.lock().expect("gate lock");
        gate.recv_timeout(Duration::from_secs(2))
            .map_err(|_| DbError::new("write ran on the runtime thread"))?;
        self.inner.update(session)
    }
}

#[tokio::test]
async fn test_store_writes_leave_runtime_free() {
    let store = Arc::new(MemoryStore::new());
    store.insert_auth("alice-token", "alice");
    store.create_game("Test game", Some("alice"), Some("bob"));
    let (open_gate, gate) = std::sync::mpsc::channel();
    let handler = SessionHandler::new(
        store.clone(),
        Arc::new(GatedStore {
            inner: store.clone(),
            gate: std::sync::Mutex::new(gate),
        }),
        Arc::new(ConnectionRegistry::new()),
    );
    let alice = Client::new();
    connect(&handler, &alice, "alice-token").await;

    // Single-threaded runtime: this task only runs if the write is off-thread.
    tokio::spawn(async move {
        open_gate.send(()).expect("gate open");
    });
    send(&handler, &alice, &UserGameCommand::make_move("alice-token", GAME, mv((2, 5), (4, 5))))
        .await
        .expect("write completes once the gate opens");

    assert_eq!(stored(&store).game.turn(), Color::Black);
}
