//! Positions as the client sends them, and the validation seam guarding them.
//!
//! Full legality checking belongs to a chess-rules library. The client only
//! needs to refuse strings that would corrupt the `position` command, so the
//! default [`NotationValidator`] checks shape, not legality.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error type for FEN validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    /// FEN string has too few parts (needs at least 4)
    TooFewParts { found: usize },
    /// FEN string has more than the 6 standard parts
    TooManyParts { found: usize },
    /// FEN string contains a line break
    LineBreak,
    /// Piece placement does not have exactly 8 ranks
    WrongRankCount { found: usize },
    /// Invalid piece character in position string
    InvalidPiece { char: char },
    /// A rank does not add up to 8 files
    WrongFileCount { rank: usize, files: usize },
    /// Invalid side to move (must be 'w' or 'b')
    InvalidSideToMove { found: String },
    /// Invalid castling field
    InvalidCastling { found: String },
    /// Invalid en passant square
    InvalidEnPassant { found: String },
    /// Halfmove clock or fullmove number is not a number
    InvalidCounter { found: String },
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenError::TooFewParts { found } => {
                write!(f, "FEN must have at least 4 parts, found {found}")
            }
            FenError::TooManyParts { found } => {
                write!(f, "FEN must have at most 6 parts, found {found}")
            }
            FenError::LineBreak => write!(f, "FEN must be a single line"),
            FenError::WrongRankCount { found } => {
                write!(f, "FEN must describe 8 ranks, found {found}")
            }
            FenError::InvalidPiece { char } => {
                write!(f, "Invalid piece character '{char}' in FEN")
            }
            FenError::WrongFileCount { rank, files } => {
                write!(f, "Rank {rank} describes {files} files, expected 8")
            }
            FenError::InvalidSideToMove { found } => {
                write!(f, "Invalid side to move '{found}', expected 'w' or 'b'")
            }
            FenError::InvalidCastling { found } => {
                write!(f, "Invalid castling field '{found}', expected '-' or a subset of KQkq")
            }
            FenError::InvalidEnPassant { found } => {
                write!(f, "Invalid en passant square '{found}'")
            }
            FenError::InvalidCounter { found } => {
                write!(f, "Invalid move counter '{found}', expected a non-negative integer")
            }
        }
    }
}

impl std::error::Error for FenError {}

/// Error type for move validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveParseError {
    /// Move string has invalid length (must be 4-5 characters)
    InvalidLength { notation: String },
    /// Invalid square notation in move
    InvalidSquare { notation: String },
    /// Invalid promotion piece
    InvalidPromotion { notation: String },
    /// Move is not legal in the current position
    IllegalMove { notation: String },
}

impl fmt::Display for MoveParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveParseError::InvalidLength { notation } => write!(
                f,
                "Move '{notation}' must be 4-5 characters in long algebraic notation"
            ),
            MoveParseError::InvalidSquare { notation } => {
                write!(f, "Invalid square notation in '{notation}', expected a1..h8")
            }
            MoveParseError::InvalidPromotion { notation } => {
                write!(f, "Invalid promotion piece in '{notation}', expected one of q, r, b, n")
            }
            MoveParseError::IllegalMove { notation } => write!(f, "Illegal move '{notation}'"),
        }
    }
}

impl std::error::Error for MoveParseError {}

/// Where a position starts before the move list is applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PositionOrigin {
    #[default]
    StartPos,
    Fen(String),
}

impl fmt::Display for PositionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionOrigin::StartPos => f.write_str("startpos"),
            PositionOrigin::Fen(fen) => write!(f, "fen {fen}"),
        }
    }
}

/// An origin plus the full list of moves played from it.
///
/// Displays as the complete `position` command. UCI is stateless per
/// command, so the whole history is always sent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub origin: PositionOrigin,
    pub moves: Vec<String>,
}

impl Position {
    #[must_use]
    pub fn startpos() -> Self {
        Position::default()
    }

    #[must_use]
    pub fn fen(fen: impl Into<String>) -> Self {
        Position {
            origin: PositionOrigin::Fen(fen.into()),
            moves: Vec::new(),
        }
    }

    /// Return a copy with `mv` appended to the move list.
    #[must_use]
    pub fn with_move(&self, mv: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.moves.push(mv.into());
        next
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position {}", self.origin)?;
        if !self.moves.is_empty() {
            write!(f, " moves {}", self.moves.join(" "))?;
        }
        Ok(())
    }
}

/// Validation hook consulted before a position or move list reaches the wire.
///
/// Plug a rules library in here to get legality checking; the default only
/// checks notation.
pub trait MoveValidator: Send + Sync {
    fn validate_fen(&self, fen: &str) -> Result<(), FenError>;

    fn validate_moves(&self, origin: &PositionOrigin, moves: &[String])
        -> Result<(), MoveParseError>;
}

/// Syntactic FEN and long-algebraic move checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotationValidator;

impl MoveValidator for NotationValidator {
    fn validate_fen(&self, fen: &str) -> Result<(), FenError> {
        validate_fen(fen)
    }

    fn validate_moves(
        &self,
        _origin: &PositionOrigin,
        moves: &[String],
    ) -> Result<(), MoveParseError> {
        moves.iter().try_for_each(|mv| validate_move(mv))
    }
}

fn is_square(file: u8, rank: u8) -> bool {
    (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank)
}

/// Check that `notation` looks like a UCI move: `e2e4`, `e7e8q`, or the null move `0000`.
pub fn validate_move(notation: &str) -> Result<(), MoveParseError> {
    if notation == "0000" {
        return Ok(());
    }

    let bytes = notation.as_bytes();
    if !(4..=5).contains(&bytes.len()) {
        return Err(MoveParseError::InvalidLength {
            notation: notation.to_string(),
        });
    }
    if !is_square(bytes[0], bytes[1]) || !is_square(bytes[2], bytes[3]) {
        return Err(MoveParseError::InvalidSquare {
            notation: notation.to_string(),
        });
    }
    if let Some(promo) = bytes.get(4) {
        // Promotion only onto the last rank of either side.
        let last_rank = bytes[3] == b'8' || bytes[3] == b'1';
        if !matches!(promo, b'q' | b'r' | b'b' | b'n') || !last_rank {
            return Err(MoveParseError::InvalidPromotion {
                notation: notation.to_string(),
            });
        }
    }
    Ok(())
}

/// Check the shape of a FEN string without interpreting the position.
pub fn validate_fen(fen: &str) -> Result<(), FenError> {
    if fen.contains(['\r', '\n']) {
        return Err(FenError::LineBreak);
    }

    let parts: Vec<&str> = fen.split_whitespace().collect();

    if parts.len() < 4 {
        return Err(FenError::TooFewParts { found: parts.len() });
    }
    if parts.len() > 6 {
        return Err(FenError::TooManyParts { found: parts.len() });
    }

    let ranks: Vec<&str> = parts[0].split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::WrongRankCount { found: ranks.len() });
    }
    for (rank_idx, rank_str) in ranks.iter().enumerate() {
        let mut files = 0;
        for c in rank_str.chars() {
            match c {
                '1'..='8' => files += c as usize - '0' as usize,
                'p' | 'n' | 'b' | 'r' | 'q' | 'k' | 'P' | 'N' | 'B' | 'R' | 'Q' | 'K' => {
                    files += 1;
                }
                _ => return Err(FenError::InvalidPiece { char: c }),
            }
        }
        if files != 8 {
            return Err(FenError::WrongFileCount {
                rank: rank_idx,
                files,
            });
        }
    }

    if !matches!(parts[1], "w" | "b") {
        return Err(FenError::InvalidSideToMove {
            found: parts[1].to_string(),
        });
    }

    let castling = parts[2];
    if castling != "-" && (castling.is_empty() || !castling.chars().all(|c| "KQkq".contains(c))) {
        return Err(FenError::InvalidCastling {
            found: castling.to_string(),
        });
    }

    let ep = parts[3].as_bytes();
    if parts[3] != "-" && !(ep.len() == 2 && is_square(ep[0], ep[1])) {
        return Err(FenError::InvalidEnPassant {
            found: parts[3].to_string(),
        });
    }

    for counter in parts.iter().skip(4).take(2) {
        if counter.parse::<u32>().is_err() {
            return Err(FenError::InvalidCounter {
                found: (*counter).to_string(),
            });
        }
    }

    Ok(())
}
