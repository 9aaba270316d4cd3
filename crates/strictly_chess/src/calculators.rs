//! Candidate move generation per piece kind.
//!
//! Calculators answer one question: given a board and the square a piece
//! stands on, where could that piece go? They ignore whose turn it is and
//! whether the mover's own king ends up attacked; [`crate::Game`] filters
//! for that.

use crate::board::Board;
use crate::moves::{ChessMove, PROMOTION_KINDS};
use crate::types::{Color, PieceKind, Position};
use std::collections::HashSet;
use tracing::instrument;

const DIAGONALS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];
const ORTHOGONALS: [(i8, i8); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
const KNIGHT_JUMPS: [(i8, i8); 8] = [
    (2, 1),
    (1, 2),
    (-1, 2),
    (-2, 1),
    (-2, -1),
    (-1, -2),
    (1, -2),
    (2, -1),
];
const KING_STEPS: [(i8, i8); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Computes the pseudo-legal moves of the piece standing on `from`.
///
/// Returns an empty set when `from` is empty. Iteration order of the result
/// carries no meaning.
#[instrument(level = "trace", skip(board))]
pub fn candidate_moves(board: &Board, from: Position) -> HashSet<ChessMove> {
    let Some(piece) = board.get(from) else {
        return HashSet::new();
    };

    match piece.kind {
        PieceKind::Bishop => slide(board, from, piece.color, &DIAGONALS),
        PieceKind::Rook => slide(board, from, piece.color, &ORTHOGONALS),
        PieceKind::Queen => {
            let mut moves = slide(board, from, piece.color, &DIAGONALS);
            moves.extend(slide(board, from, piece.color, &ORTHOGONALS));
            moves
        }
        PieceKind::Knight => leap(board, from, piece.color, &KNIGHT_JUMPS),
        PieceKind::King => leap(board, from, piece.color, &KING_STEPS),
        PieceKind::Pawn => pawn(board, from, piece.color),
    }
}

/// Rays outward until the edge, a friendly piece (excluded) or a capture
/// (included).
fn slide(board: &Board, from: Position, color: Color, directions: &[(i8, i8)]) -> HashSet<ChessMove> {
    let mut moves = HashSet::new();
    for &(dr, dc) in directions {
        let mut cursor = from;
        while let Some(next) = cursor.offset(dr, dc) {
            match board.get(next) {
                None => {
                    moves.insert(ChessMove::new(from, next, None));
                }
                Some(other) => {
                    if other.color != color {
                        moves.insert(ChessMove::new(from, next, None));
                    }
                    break;
                }
            }
            cursor = next;
        }
    }
    moves
}

fn leap(board: &Board, from: Position, color: Color, offsets: &[(i8, i8)]) -> HashSet<ChessMove> {
    offsets
        .iter()
        .filter_map(|&(dr, dc)| from.offset(dr, dc))
        .filter(|target| board.get(*target).is_none_or(|other| other.color != color))
        .map(|target| ChessMove::new(from, target, None))
        .collect()
}

fn pawn(board: &Board, from: Position, color: Color) -> HashSet<ChessMove> {
    let mut moves = HashSet::new();
    let forward = color.forward();

    if let Some(one) = from.offset(forward, 0)
        && board.is_empty(one)
    {
        push_pawn_move(&mut moves, from, one, color);

        if from.row() == color.pawn_rank()
            && let Some(two) = one.offset(forward, 0)
            && board.is_empty(two)
        {
            push_pawn_move(&mut moves, from, two, color);
        }
    }

    for dc in [-1, 1] {
        if let Some(target) = from.offset(forward, dc)
            && board.get(target).is_some_and(|other| other.color != color)
        {
            push_pawn_move(&mut moves, from, target, color);
        }
    }

    moves
}

/// Adds a pawn move, expanding it into one move per promotion kind on the
/// far rank.
fn push_pawn_move(moves: &mut HashSet<ChessMove>, from: Position, to: Position, color: Color) {
    if to.row() == color.promotion_rank() {
        moves.extend(
            PROMOTION_KINDS
                .iter()
                .map(|kind| ChessMove::new(from, to, Some(*kind))),
        );
    } else {
        moves.insert(ChessMove::new(from, to, None));
    }
}
