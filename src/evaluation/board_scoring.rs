//! Board scoring heuristics.
//!
//! Scores are absolute centipawns from White's point of view: positive means
//! White is better regardless of who is to move. Scorers are pure functions
//! of the board, so identical boards always score identically; the cache
//! relies on that.

use chess::{Board, BoardStatus, Color, Piece};

/// Score for delivering checkmate; mate found at ply `p` scores
/// `MATE_SCORE - p` so faster mates win comparisons.
pub const MATE_SCORE: i32 = 30_000;

/// Scores at or beyond this magnitude are mate scores, not heuristics.
pub const MATE_THRESHOLD: i32 = MATE_SCORE - 1_000;

/// True when `score` encodes a forced mate for either side.
#[inline]
pub fn is_mate_score(score: i32) -> bool {
    score.abs() >= MATE_THRESHOLD
}

/// Conventional piece values in centipawns. The king value only matters for
/// exchange evaluation, where capturing with the king must rank last.
pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 20_000,
    }
}

/// A position scorer the search can query at its horizon.
///
/// Implementations must be deterministic and safe to call from several
/// search threads at once.
pub trait BoardScorer: Send + Sync {
    /// Stable identifier recorded alongside persisted cache entries; cached
    /// scores from one scorer must never be replayed under another.
    fn identifier(&self) -> &'static str;

    /// Absolute score of `board` from White's point of view. Terminal boards
    /// score `MATE_SCORE` against the mated side and zero for stalemate.
    fn score_board(&self, board: &Board) -> i32;
}

fn terminal_score(board: &Board) -> Option<i32> {
    match board.status() {
        BoardStatus::Checkmate => Some(match board.side_to_move() {
            Color::White => -MATE_SCORE,
            Color::Black => MATE_SCORE,
        }),
        BoardStatus::Stalemate => Some(0),
        BoardStatus::Ongoing => None,
    }
}

/// Bare material count. Mostly useful as a predictable baseline when a test
/// needs hand-checkable numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaterialScorer;

impl BoardScorer for MaterialScorer {
    fn identifier(&self) -> &'static str {
        "material-v1"
    }

    fn score_board(&self, board: &Board) -> i32 {
        if let Some(score) = terminal_score(board) {
            return score;
        }
        let mut score = 0;
        for color in [Color::White, Color::Black] {
            let sign = if color == Color::White { 1 } else { -1 };
            for sq in *board.color_combined(color) {
                if let Some(piece) = board.piece_on(sq) {
                    if piece != Piece::King {
                        score += sign * piece_value(piece);
                    }
                }
            }
        }
        score
    }
}

/// Material plus piece-square tables, the crate's default scorer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PieceSquareScorer;

// Tables are written visually, first row = rank 8. White squares index with
// `to_index() ^ 56`, Black squares index directly, so one table serves both
// colors mirrored.
#[rustfmt::skip]
const PAWN_TABLE: [i32; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
    50, 50, 50, 50, 50, 50, 50, 50,
    10, 10, 20, 30, 30, 20, 10, 10,
     5,  5, 10, 25, 25, 10,  5,  5,
     0,  0,  0, 20, 20,  0,  0,  0,
     5, -5,-10,  0,  0,-10, -5,  5,
     5, 10, 10,-20,-20, 10, 10,  5,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const KNIGHT_TABLE: [i32; 64] = [
    -50,-40,-30,-30,-30,-30,-40,-50,
    -40,-20,  0,  0,  0,  0,-20,-40,
    -30,  0, 10, 15, 15, 10,  0,-30,
    -30,  5, 15, 20, 20, 15,  5,-30,
    -30,  0, 15, 20, 20, 15,  0,-30,
    -30,  5, 10, 15, 15, 10,  5,-30,
    -40,-20,  0,  5,  5,  0,-20,-40,
    -50,-40,-30,-30,-30,-30,-40,-50,
];

#[rustfmt::skip]
const BISHOP_TABLE: [i32; 64] = [
    -20,-10,-10,-10,-10,-10,-10,-20,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -10,  0,  5, 10, 10,  5,  0,-10,
    -10,  5,  5, 10, 10,  5,  5,-10,
    -10,  0, 10, 10, 10, 10,  0,-10,
    -10, 10, 10, 10, 10, 10, 10,-10,
    -10,  5,  0,  0,  0,  0,  5,-10,
    -20,-10,-10,-10,-10,-10,-10,-20,
];

#[rustfmt::skip]
const ROOK_TABLE: [i32; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
     5, 10, 10, 10, 10, 10, 10,  5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
     0,  0,  0,  5,  5,  0,  0,  0,
];

#[rustfmt::skip]
const QUEEN_TABLE: [i32; 64] = [
    -20,-10,-10, -5, -5,-10,-10,-20,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -10,  0,  5,  5,  5,  5,  0,-10,
     -5,  0,  5,  5,  5,  5,  0, -5,
      0,  0,  5,  5,  5,  5,  0, -5,
    -10,  5,  5,  5,  5,  5,  0,-10,
    -10,  0,  5,  0,  0,  0,  0,-10,
    -20,-10,-10, -5, -5,-10,-10,-20,
];

#[rustfmt::skip]
const KING_TABLE: [i32; 64] = [
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -20,-30,-30,-40,-40,-30,-30,-20,
    -10,-20,-20,-20,-20,-20,-20,-10,
     20, 20,  0,  0,  0,  0, 20, 20,
     20, 30, 10,  0,  0, 10, 30, 20,
];

fn square_bonus(piece: Piece, index: usize) -> i32 {
    match piece {
        Piece::Pawn => PAWN_TABLE[index],
        Piece::Knight => KNIGHT_TABLE[index],
        Piece::Bishop => BISHOP_TABLE[index],
        Piece::Rook => ROOK_TABLE[index],
        Piece::Queen => QUEEN_TABLE[index],
        Piece::King => KING_TABLE[index],
    }
}

impl BoardScorer for PieceSquareScorer {
    fn identifier(&self) -> &'static str {
        "pst-material-v1"
    }

    fn score_board(&self, board: &Board) -> i32 {
        if let Some(score) = terminal_score(board) {
            return score;
        }
        let mut score = 0;
        for color in [Color::White, Color::Black] {
            let sign = if color == Color::White { 1 } else { -1 };
            for sq in *board.color_combined(color) {
                if let Some(piece) = board.piece_on(sq) {
                    let index = match color {
                        Color::White => sq.to_index() ^ 56,
                        Color::Black => sq.to_index(),
                    };
                    let material = if piece == Piece::King {
                        0
                    } else {
                        piece_value(piece)
                    };
                    score += sign * (material + square_bonus(piece, index));
                }
            }
        }
        score
    }
}
