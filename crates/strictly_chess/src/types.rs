//! Core value types: colors, pieces and board coordinates.

use serde::{Deserialize, Serialize};

/// Side of the board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Color {
    /// White moves first.
    #[strum(to_string = "white")]
    White,
    /// Black moves second.
    #[strum(to_string = "black")]
    Black,
}

impl Color {
    /// Returns the other side.
    pub fn opponent(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Row the pawns of this color start on.
    pub(crate) fn pawn_rank(self) -> u8 {
        match self {
            Color::White => 2,
            Color::Black => 7,
        }
    }

    /// Row a pawn of this color promotes on.
    pub(crate) fn promotion_rank(self) -> u8 {
        match self {
            Color::White => 8,
            Color::Black => 1,
        }
    }

    /// Row delta of a forward pawn step.
    pub(crate) fn forward(self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }
}

/// Kind of chess piece.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "lowercase")]
pub enum PieceKind {
    /// Pawn.
    Pawn,
    /// Knight.
    Knight,
    /// Bishop.
    Bishop,
    /// Rook.
    Rook,
    /// Queen.
    Queen,
    /// King.
    King,
}

impl PieceKind {
    /// Single-letter symbol used in board diagrams.
    pub fn symbol(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }
}

/// A colored piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    /// Owner of the piece.
    pub color: Color,
    /// What the piece is.
    pub kind: PieceKind,
}

impl Piece {
    /// Creates a piece.
    pub fn new(color: Color, kind: PieceKind) -> Self {
        Self { color, kind }
    }

    /// Symbol for board diagrams; uppercase for white.
    pub fn symbol(self) -> char {
        match self.color {
            Color::White => self.kind.symbol().to_ascii_uppercase(),
            Color::Black => self.kind.symbol(),
        }
    }
}

/// A square on the board, rows and columns both numbered 1 through 8.
///
/// Row 1 is White's back rank and column 1 is the a-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    row: u8,
    col: u8,
}

/// Unvalidated wire form of a [`Position`].
#[derive(Deserialize)]
struct RawPosition {
    row: u8,
    col: u8,
}

impl TryFrom<RawPosition> for Position {
    type Error = String;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        Position::try_new(raw.row, raw.col)
            .ok_or_else(|| format!("position ({}, {}) is off the board", raw.row, raw.col))
    }
}

impl Position {
    /// Creates a position.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` lies outside `1..=8`. Out-of-range squares
    /// are a caller bug; use [`Position::try_new`] for untrusted input.
    pub fn new(row: u8, col: u8) -> Self {
        match Self::try_new(row, col) {
            Some(pos) => pos,
            None => panic!("position ({row}, {col}) is off the board"),
        }
    }

    /// Creates a position, returning `None` when it would be off the board.
    pub fn try_new(row: u8, col: u8) -> Option<Self> {
        ((1..=8).contains(&row) && (1..=8).contains(&col)).then_some(Self { row, col })
    }

    /// Row, 1 through 8.
    pub fn row(self) -> u8 {
        self.row
    }

    /// Column, 1 through 8.
    pub fn col(self) -> u8 {
        self.col
    }

    /// The square `(dr, dc)` away, if it is still on the board.
    pub fn offset(self, dr: i8, dc: i8) -> Option<Self> {
        let row = self.row as i8 + dr;
        let col = self.col as i8 + dc;
        if row < 1 || col < 1 {
            return None;
        }
        Self::try_new(row as u8, col as u8)
    }

    /// All 64 squares, row by row starting at a1.
    pub fn all() -> impl Iterator<Item = Position> {
        (1..=8).flat_map(|row| (1..=8).map(move |col| Position { row, col }))
    }

    pub(crate) fn index(self) -> (usize, usize) {
        (self.row as usize - 1, self.col as usize - 1)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = (b'a' + self.col - 1) as char;
        write!(f, "{}{}", file, self.row)
    }
}
