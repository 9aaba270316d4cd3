//! The 8x8 board.

use crate::types::{Color, Piece, PieceKind, Position};
use serde::{Deserialize, Serialize};
use tracing::instrument;

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

/// Fixed 8x8 grid of optional pieces.
///
/// Squares are addressed by [`Position`], so a board can never hold a piece
/// outside its 64 squares. Equality is structural and `clone()` is a full
/// copy, which is what legality testing relies on when it plays a move out
/// on a scratch board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    /// Squares indexed `[row - 1][col - 1]`.
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    /// Creates a board with no pieces on it.
    pub fn empty() -> Self {
        Self {
            squares: [[None; 8]; 8],
        }
    }

    /// Creates a board in the standard opening arrangement.
    #[instrument]
    pub fn standard() -> Self {
        let mut board = Self::empty();
        board.reset();
        board
    }

    /// Returns the piece on `pos`, if any.
    pub fn get(&self, pos: Position) -> Option<Piece> {
        let (row, col) = pos.index();
        self.squares[row][col]
    }

    /// Places `piece` on `pos`, or clears the square when `None`.
    pub fn set(&mut self, pos: Position, piece: Option<Piece>) {
        let (row, col) = pos.index();
        self.squares[row][col] = piece;
    }

    /// Returns true if nothing stands on `pos`.
    pub fn is_empty(&self, pos: Position) -> bool {
        self.get(pos).is_none()
    }

    /// Clears the board and sets up the standard opening position.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        *self = Self::empty();
        for (idx, kind) in BACK_RANK.iter().enumerate() {
            let col = idx as u8 + 1;
            self.set(Position::new(1, col), Some(Piece::new(Color::White, *kind)));
            self.set(Position::new(8, col), Some(Piece::new(Color::Black, *kind)));
            self.set(
                Position::new(Color::White.pawn_rank(), col),
                Some(Piece::new(Color::White, PieceKind::Pawn)),
            );
            self.set(
                Position::new(Color::Black.pawn_rank(), col),
                Some(Piece::new(Color::Black, PieceKind::Pawn)),
            );
        }
    }

    /// Iterates over every occupied square.
    pub fn pieces(&self) -> impl Iterator<Item = (Position, Piece)> + '_ {
        Position::all().filter_map(|pos| self.get(pos).map(|piece| (pos, piece)))
    }

    /// Locates the king of `color`. `None` on hand-built boards without one.
    pub fn king_position(&self, color: Color) -> Option<Position> {
        self.pieces()
            .find(|(_, piece)| piece.color == color && piece.kind == PieceKind::King)
            .map(|(pos, _)| pos)
    }
}

/// Renders the board from White's side, rank 8 at the top.
impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in (1..=8).rev() {
            write!(f, "{row} ")?;
            for col in 1..=8 {
                let symbol = self
                    .get(Position::new(row, col))
                    .map(Piece::symbol)
                    .unwrap_or('.');
                write!(f, "{symbol}")?;
            }
            writeln!(f)?;
        }
        write!(f, "  abcdefgh")
    }
}
