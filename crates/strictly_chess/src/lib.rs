//! Strictly Chess - pure chess rules.
//!
//! This crate holds the correctness-critical half of a live chess server:
//! the board, per-piece move calculators and the game state machine that
//! validates moves and detects check, checkmate and stalemate.
//!
//! # Architecture
//!
//! - **Board**: fixed 8x8 grid of optional pieces
//! - **Calculators**: candidate (pseudo-legal) moves per piece kind
//! - **Game**: side to move, terminal flag, legality filtering
//!
//! # Example
//!
//! ```
//! use strictly_chess::{ChessMove, Color, Game, Position};
//!
//! let mut game = Game::new();
//! let e2e4 = ChessMove::new(Position::new(2, 5), Position::new(4, 5), None);
//! game.make_move(e2e4).expect("opening move is legal");
//! assert_eq!(game.turn(), Color::Black);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod board;
mod calculators;
mod game;
mod moves;
mod types;

// Crate-level exports - Board model
pub use board::Board;

// Crate-level exports - Move generation
pub use calculators::candidate_moves;
pub use moves::{ChessMove, PROMOTION_KINDS};

// Crate-level exports - Game state machine
pub use game::{Game, GameStatus, MoveError};

// Crate-level exports - Value types
pub use types::{Color, Piece, PieceKind, Position};
