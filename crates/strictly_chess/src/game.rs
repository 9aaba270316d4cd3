//! Game state machine: turn order, legality and terminal detection.

use crate::board::Board;
use crate::calculators::candidate_moves;
use crate::moves::ChessMove;
use crate::types::{Color, Piece, Position};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Whether a game still accepts moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    /// Moves are accepted.
    InProgress,
    /// Checkmate, stalemate or resignation ended the game.
    Terminal,
}

/// Reasons a move or resignation is rejected.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The game has already ended.
    #[display("The game is over, no more moves can be made")]
    GameOver,

    /// The start square is empty.
    #[display("There is no piece at {}", _0)]
    NoPiece(Position),

    /// The piece on the start square belongs to the side not on move.
    #[display("It is {}'s turn", _0)]
    WrongTurn(Color),

    /// The move is not among the piece's legal moves.
    #[display("{} is not a legal move", _0)]
    IllegalMove(ChessMove),
}

impl std::error::Error for MoveError {}

/// One chess match: the board, the side to move and the terminal flag.
///
/// The game validates and applies moves but never decides on its own that it
/// is over; callers check [`Game::is_in_checkmate`] and
/// [`Game::is_in_stalemate`] after a move and call [`Game::conclude`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    board: Board,
    turn: Color,
    game_over: bool,
}

impl Game {
    /// Creates a game at the standard opening with White to move.
    #[instrument]
    pub fn new() -> Self {
        Self::from_board(Board::standard(), Color::White)
    }

    /// Creates an in-progress game from an arbitrary position.
    pub fn from_board(board: Board, turn: Color) -> Self {
        Self {
            board,
            turn,
            game_over: false,
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns the side to move.
    pub fn turn(&self) -> Color {
        self.turn
    }

    /// Returns true once the game has ended.
    pub fn is_over(&self) -> bool {
        self.game_over
    }

    /// Returns the state machine's current state.
    pub fn status(&self) -> GameStatus {
        if self.game_over {
            GameStatus::Terminal
        } else {
            GameStatus::InProgress
        }
    }

    /// Legal moves of the piece on `pos`.
    ///
    /// A candidate move survives only if playing it on a copy of the board
    /// leaves the mover's king unattacked. Empty when the game is over or
    /// the square is empty.
    #[instrument(level = "debug", skip(self, pos), fields(pos = %pos))]
    pub fn legal_moves(&self, pos: Position) -> HashSet<ChessMove> {
        if self.game_over {
            return HashSet::new();
        }
        let Some(piece) = self.board.get(pos) else {
            return HashSet::new();
        };

        candidate_moves(&self.board, pos)
            .into_iter()
            .filter(|mv| {
                let mut scratch = self.board.clone();
                apply(&mut scratch, *mv);
                !is_attacked(&scratch, piece.color)
            })
            .collect()
    }

    /// Every legal move available to `color`.
    pub fn all_legal_moves(&self, color: Color) -> HashSet<ChessMove> {
        self.board
            .pieces()
            .filter(|(_, piece)| piece.color == color)
            .flat_map(|(pos, _)| self.legal_moves(pos))
            .collect()
    }

    /// Returns true if an enemy piece attacks `color`'s king.
    #[instrument(level = "debug", skip(self))]
    pub fn is_in_check(&self, color: Color) -> bool {
        is_attacked(&self.board, color)
    }

    /// Returns true if `color` is in check with no legal reply.
    #[instrument(level = "debug", skip(self))]
    pub fn is_in_checkmate(&self, color: Color) -> bool {
        self.is_in_check(color) && !self.has_legal_move(color)
    }

    /// Returns true if `color` is not in check but has no legal move.
    #[instrument(level = "debug", skip(self))]
    pub fn is_in_stalemate(&self, color: Color) -> bool {
        !self.is_in_check(color) && !self.has_legal_move(color)
    }

    /// Validates and applies `mv`, then passes the turn.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError`] if the game is over, the start square is empty,
    /// the piece is not on move or the move is not legal. A rejected move
    /// leaves the game untouched.
    #[instrument(skip(self, mv), fields(mv = %mv, turn = %self.turn))]
    pub fn make_move(&mut self, mv: ChessMove) -> Result<(), MoveError> {
        if self.game_over {
            warn!("Move submitted after the game ended");
            return Err(MoveError::GameOver);
        }
        let piece = self.board.get(mv.start).ok_or(MoveError::NoPiece(mv.start))?;
        if piece.color != self.turn {
            warn!(piece_color = %piece.color, "Piece moved out of turn");
            return Err(MoveError::WrongTurn(self.turn));
        }
        if !self.legal_moves(mv.start).contains(&mv) {
            warn!("Illegal move rejected");
            return Err(MoveError::IllegalMove(mv));
        }

        apply(&mut self.board, mv);
        self.turn = self.turn.opponent();
        debug!(next = %self.turn, "Move applied");
        Ok(())
    }

    /// Ends the game by resignation.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError::GameOver`] if the game had already ended.
    #[instrument(skip(self))]
    pub fn resign(&mut self) -> Result<(), MoveError> {
        if self.game_over {
            return Err(MoveError::GameOver);
        }
        self.conclude();
        Ok(())
    }

    /// Marks the game as over. Calling it again has no effect.
    #[instrument(skip(self))]
    pub fn conclude(&mut self) {
        if !self.game_over {
            info!("Game concluded");
        }
        self.game_over = true;
    }

    fn has_legal_move(&self, color: Color) -> bool {
        self.board
            .pieces()
            .filter(|(_, piece)| piece.color == color)
            .any(|(pos, _)| !self.legal_moves(pos).is_empty())
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves the piece, replacing it with the promotion piece if one is named.
fn apply(board: &mut Board, mv: ChessMove) {
    let moving = board.get(mv.start);
    let landed = match (moving, mv.promotion) {
        (Some(piece), Some(kind)) => Some(Piece::new(piece.color, kind)),
        (piece, None) => piece,
        (None, Some(_)) => None,
    };
    board.set(mv.start, None);
    board.set(mv.end, landed);
}

/// True if any piece of `color`'s opponent can reach `color`'s king.
fn is_attacked(board: &Board, color: Color) -> bool {
    let Some(king) = board.king_position(color) else {
        return false;
    };
    board
        .pieces()
        .filter(|(_, piece)| piece.color != color)
        .any(|(pos, _)| candidate_moves(board, pos).iter().any(|mv| mv.end == king))
}
