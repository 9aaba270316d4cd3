//! Move values.

use crate::types::{PieceKind, Position};
use serde::{Deserialize, Serialize};

/// Kinds a pawn may promote to.
pub const PROMOTION_KINDS: [PieceKind; 4] = [
    PieceKind::Queen,
    PieceKind::Rook,
    PieceKind::Bishop,
    PieceKind::Knight,
];

/// A move from one square to another, with an optional promotion.
///
/// Moves are plain values; whether one is legal depends on the game it is
/// applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChessMove {
    /// Square the piece leaves.
    pub start: Position,
    /// Square the piece lands on.
    pub end: Position,
    /// Piece a pawn turns into on the last rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceKind>,
}

impl ChessMove {
    /// Creates a move.
    pub fn new(start: Position, end: Position, promotion: Option<PieceKind>) -> Self {
        Self {
            start,
            end,
            promotion,
        }
    }
}

impl std::fmt::Display for ChessMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.start, self.end)?;
        if let Some(kind) = self.promotion {
            write!(f, "={}", kind.symbol().to_ascii_uppercase())?;
        }
        Ok(())
    }
}
