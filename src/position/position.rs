//! Mutable position adapter with strict push/pop stack discipline.
//!
//! Rules, legality, and board layout come from the `chess` crate; this module
//! adds what the search needs on top: an incrementally maintained Zobrist
//! fingerprint that mirrors the board 1:1, a frame stack giving bit-identical
//! restoration on revert, halfmove-clock and repetition tracking for draw
//! detection, and scoped guards so a move applied on any code path is
//! reverted on every exit path, including early returns after a cancellation
//! signal.

use std::fmt;
use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Color, File, MoveGen, Piece, Rank, Square};

use crate::errors::EngineError;
use crate::position::zobrist;

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Checkmate { winner: Color },
    Stalemate,
    RepetitionDraw,
    FiftyMoveDraw,
}

impl GameOutcome {
    /// True for any drawn classification.
    pub fn is_draw(&self) -> bool {
        !matches!(self, GameOutcome::Checkmate { .. })
    }
}

#[derive(Clone)]
struct Frame {
    board: Board,
    fingerprint: u64,
    halfmove_clock: u16,
    mv: Option<ChessMove>,
}

/// Game state owned by the caller for the whole game.
///
/// The search borrows it exclusively and mutably; every `push` pairs with a
/// `pop` and the position is bit-identical before and after any search call.
#[derive(Clone)]
pub struct Position {
    board: Board,
    fingerprint: u64,
    halfmove_clock: u16,
    frames: Vec<Frame>,
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl Position {
    /// Standard starting position.
    pub fn new() -> Self {
        Self::from_board(Board::default(), 0)
    }

    /// Parse a FEN string. The halfmove clock (fifth field) is tracked here
    /// because the underlying board does not carry it.
    pub fn from_fen(fen: &str) -> Result<Self, EngineError> {
        let board = Board::from_str(fen).map_err(|_| EngineError::InvalidFen(fen.to_string()))?;
        let halfmove_clock = fen
            .split_whitespace()
            .nth(4)
            .and_then(|field| field.parse::<u16>().ok())
            .unwrap_or(0);
        Ok(Self::from_board(board, halfmove_clock))
    }

    fn from_board(board: Board, halfmove_clock: u16) -> Self {
        let fingerprint = zobrist::full_hash(&board);
        Position {
            board,
            fingerprint,
            halfmove_clock,
            frames: Vec::new(),
        }
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current Zobrist fingerprint, maintained incrementally.
    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    /// Number of plies applied since this position was created.
    #[inline]
    pub fn ply(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn halfmove_clock(&self) -> u16 {
        self.halfmove_clock
    }

    /// Moves applied since creation, oldest first (null moves excluded).
    pub fn move_history(&self) -> Vec<ChessMove> {
        self.frames.iter().filter_map(|frame| frame.mv).collect()
    }

    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board).collect()
    }

    #[inline]
    pub fn in_check(&self) -> bool {
        self.board.checkers().popcnt() > 0
    }

    /// True when `mv` captures, including en passant (a pawn moving
    /// diagonally onto an empty square).
    #[inline]
    pub fn is_capture(&self, mv: ChessMove) -> bool {
        self.board.piece_on(mv.get_dest()).is_some() || self.is_en_passant(mv)
    }

    #[inline]
    pub fn is_en_passant(&self, mv: ChessMove) -> bool {
        self.board.piece_on(mv.get_source()) == Some(Piece::Pawn)
            && mv.get_source().get_file() != mv.get_dest().get_file()
            && self.board.piece_on(mv.get_dest()).is_none()
    }

    /// True when playing `mv` leaves the opponent in check.
    #[inline]
    pub fn gives_check(&self, mv: ChessMove) -> bool {
        self.board.make_move_new(mv).checkers().popcnt() > 0
    }

    #[inline]
    pub fn piece_at(&self, sq: Square) -> Option<(Piece, Color)> {
        match (self.board.piece_on(sq), self.board.color_on(sq)) {
            (Some(piece), Some(color)) => Some((piece, color)),
            _ => None,
        }
    }

    /// Total men on the board, both sides.
    #[inline]
    pub fn piece_count(&self) -> u32 {
        self.board.combined().popcnt()
    }

    /// True when the side to move has material besides king and pawns.
    pub fn has_non_pawn_material(&self) -> bool {
        let us = *self.board.color_combined(self.side_to_move());
        let pawns_and_kings = *self.board.pieces(Piece::Pawn) | *self.board.pieces(Piece::King);
        (us & !pawns_and_kings).popcnt() > 0
    }

    /// Destination of the most recent push when it was a capture, `None`
    /// otherwise.
    pub fn last_capture_square(&self) -> Option<Square> {
        let frame = self.frames.last()?;
        let mv = frame.mv?;
        let dest = mv.get_dest();
        let was_capture = frame.board.piece_on(dest).is_some()
            || (frame.board.piece_on(mv.get_source()) == Some(Piece::Pawn)
                && mv.get_source().get_file() != dest.get_file());
        was_capture.then_some(dest)
    }

    /// Decisive or drawn classification, or `None` while the game is ongoing.
    pub fn outcome(&self) -> Option<GameOutcome> {
        match self.board.status() {
            BoardStatus::Checkmate => Some(GameOutcome::Checkmate {
                winner: !self.side_to_move(),
            }),
            BoardStatus::Stalemate => Some(GameOutcome::Stalemate),
            BoardStatus::Ongoing => {
                if self.repetition_count() >= 3 {
                    Some(GameOutcome::RepetitionDraw)
                } else if self.halfmove_clock >= 100 {
                    Some(GameOutcome::FiftyMoveDraw)
                } else {
                    None
                }
            }
        }
    }

    /// Times the current fingerprint has occurred, this occurrence included.
    pub fn repetition_count(&self) -> usize {
        1 + self
            .frames
            .iter()
            .filter(|frame| frame.fingerprint == self.fingerprint)
            .count()
    }

    /// Apply a legal move, updating the fingerprint incrementally.
    pub fn push(&mut self, mv: ChessMove) {
        debug_assert!(self.board.legal(mv), "push requires a legal move");
        let resets_clock =
            self.is_capture(mv) || self.board.piece_on(mv.get_source()) == Some(Piece::Pawn);
        let next = self.board.make_move_new(mv);
        let delta = zobrist::move_delta(mv, &self.board, &next);
        self.frames.push(Frame {
            board: self.board,
            fingerprint: self.fingerprint,
            halfmove_clock: self.halfmove_clock,
            mv: Some(mv),
        });
        self.fingerprint ^= delta;
        self.halfmove_clock = if resets_clock {
            0
        } else {
            self.halfmove_clock + 1
        };
        self.board = next;
    }

    /// Pass the turn. Returns false (and changes nothing) when in check.
    pub fn push_null(&mut self) -> bool {
        match self.board.null_move() {
            Some(next) => {
                let delta = zobrist::null_move_delta(&self.board, &next);
                self.frames.push(Frame {
                    board: self.board,
                    fingerprint: self.fingerprint,
                    halfmove_clock: self.halfmove_clock,
                    mv: None,
                });
                self.fingerprint ^= delta;
                self.halfmove_clock += 1;
                self.board = next;
                true
            }
            None => false,
        }
    }

    /// Revert the most recent push. The fingerprint is reverted by the same
    /// XOR delta that applied it; the saved frame guarantees bit-identical
    /// board restoration.
    pub fn pop(&mut self) {
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => {
                debug_assert!(false, "pop without matching push");
                return;
            }
        };
        let delta = match frame.mv {
            Some(mv) => zobrist::move_delta(mv, &frame.board, &self.board),
            None => zobrist::null_move_delta(&frame.board, &self.board),
        };
        self.fingerprint ^= delta;
        debug_assert_eq!(
            self.fingerprint, frame.fingerprint,
            "incremental revert drifted from the saved fingerprint",
        );
        self.board = frame.board;
        self.halfmove_clock = frame.halfmove_clock;
    }

    /// Apply `mv` under a guard that reverts it when dropped.
    pub fn push_guard(&mut self, mv: ChessMove) -> MoveGuard<'_> {
        self.push(mv);
        MoveGuard { pos: self }
    }

    /// Pass the turn under a guard; `None` when in check.
    pub fn push_null_guard(&mut self) -> Option<MoveGuard<'_>> {
        if self.push_null() {
            Some(MoveGuard { pos: self })
        } else {
            None
        }
    }

    /// Position in FEN (clock fields are nominal; the board does not carry
    /// them).
    pub fn fen(&self) -> String {
        self.board.to_string()
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Position")
            .field("fen", &self.fen())
            .field("fingerprint", &self.fingerprint)
            .field("ply", &self.ply())
            .finish()
    }
}

/// Scope guard pairing one push (move or null) with exactly one pop.
pub struct MoveGuard<'a> {
    pos: &'a mut Position,
}

impl std::ops::Deref for MoveGuard<'_> {
    type Target = Position;

    fn deref(&self) -> &Position {
        self.pos
    }
}

impl std::ops::DerefMut for MoveGuard<'_> {
    fn deref_mut(&mut self) -> &mut Position {
        self.pos
    }
}

impl Drop for MoveGuard<'_> {
    fn drop(&mut self) {
        self.pos.pop();
    }
}

/// Print a move in coordinate text (`e2e4`, `a7a8q`).
pub fn move_to_text(mv: ChessMove) -> String {
    mv.to_string()
}

/// Parse coordinate move text. Purely syntactic; legality is the caller's
/// concern.
pub fn move_from_text(text: &str) -> Result<ChessMove, EngineError> {
    let bad = || EngineError::InvalidMoveText(text.to_string());
    let bytes = text.as_bytes();
    if bytes.len() < 4 || bytes.len() > 5 {
        return Err(bad());
    }
    let file = |b: u8| -> Result<File, EngineError> {
        if (b'a'..=b'h').contains(&b) {
            Ok(File::from_index((b - b'a') as usize))
        } else {
            Err(bad())
        }
    };
    let rank = |b: u8| -> Result<Rank, EngineError> {
        if (b'1'..=b'8').contains(&b) {
            Ok(Rank::from_index((b - b'1') as usize))
        } else {
            Err(bad())
        }
    };
    let source = Square::make_square(rank(bytes[1])?, file(bytes[0])?);
    let dest = Square::make_square(rank(bytes[3])?, file(bytes[2])?);
    let promotion = if bytes.len() == 5 {
        Some(match bytes[4] {
            b'n' => Piece::Knight,
            b'b' => Piece::Bishop,
            b'r' => Piece::Rook,
            b'q' => Piece::Queen,
            _ => return Err(bad()),
        })
    } else {
        None
    };
    Ok(ChessMove::new(source, dest, promotion))
}
