//! Move ordering for the alpha-beta core.
//!
//! Moves are sorted into fixed bands: the preferred move first, then
//! captures ranked most-valuable-victim first and refined by static
//! exchange evaluation, then the two killer moves for the side and
//! remaining depth, then quiet moves ranked by cached child scores with
//! unscored quiets last. Band constants are spaced so no refinement can
//! push a move out of its band.

use chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves,
    BitBoard, Board, ChessMove, Color, Piece, Square, EMPTY,
};
use std::cmp::Reverse;

use crate::evaluation::board_scoring::piece_value;
use crate::position::position::Position;
use crate::position::zobrist;
use crate::search::transposition::TranspositionCache;

/// Ply ceiling for the search stack, and the killer table's depth range.
pub const MAX_PLY: usize = 128;

const PREFERRED_SCORE: i32 = 1_000_000;
const CAPTURE_BASE: i32 = 100_000;
const KILLER_FIRST: i32 = 80_000;
const KILLER_SECOND: i32 = 70_000;
const QUIET_CACHE_CLAMP: i32 = 30_000;
const UNCACHED_QUIET: i32 = -31_000;

/// Two quiet moves per side and remaining depth that most recently improved
/// a bound. Indexing by remaining depth keeps the entries aligned across
/// deepening rounds, where the same horizon distance sits at a deeper ply.
///
/// Thread-local by construction: each search thread keeps its own table.
#[derive(Clone)]
pub struct KillerTable {
    slots: [[[Option<ChessMove>; 2]; MAX_PLY]; 2],
}

impl Default for KillerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl KillerTable {
    pub fn new() -> Self {
        KillerTable {
            slots: [[[None; 2]; MAX_PLY]; 2],
        }
    }

    /// Remember a quiet bound-improving move, shifting the previous first
    /// killer to the second slot. Re-recording the current first killer is
    /// a no-op.
    pub fn record(&mut self, side: Color, depth: u8, mv: ChessMove) {
        let slot = &mut self.slots[side.to_index()][depth as usize % MAX_PLY];
        if slot[0] == Some(mv) {
            return;
        }
        slot[1] = slot[0];
        slot[0] = Some(mv);
    }

    /// 0 for the first killer recorded for `side` at `depth`, 1 for the
    /// second, `None` otherwise.
    pub fn rank(&self, side: Color, depth: u8, mv: ChessMove) -> Option<usize> {
        let slot = &self.slots[side.to_index()][depth as usize % MAX_PLY];
        slot.iter().position(|&killer| killer == Some(mv))
    }

    pub fn clear(&mut self) {
        self.slots = [[[None; 2]; MAX_PLY]; 2];
    }
}

/// Value of the piece `mv` captures (100 for en passant).
pub fn capture_victim_value(pos: &Position, mv: ChessMove) -> i32 {
    match pos.board().piece_on(mv.get_dest()) {
        Some(piece) => piece_value(piece),
        None => piece_value(Piece::Pawn),
    }
}

/// Every piece of either color that attacks `target` given `occupied`,
/// sliding attacks computed against `occupied` so vacated squares expose
/// x-ray attackers.
fn attackers_to(board: &Board, target: Square, occupied: BitBoard) -> BitBoard {
    let pawns = *board.pieces(Piece::Pawn);
    let diagonal = *board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen);
    let orthogonal = *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);

    let white_pawns = pawns & *board.color_combined(Color::White);
    let black_pawns = pawns & *board.color_combined(Color::Black);

    let mut attackers = EMPTY;
    attackers |= get_pawn_attacks(target, Color::Black, white_pawns);
    attackers |= get_pawn_attacks(target, Color::White, black_pawns);
    attackers |= get_knight_moves(target) & *board.pieces(Piece::Knight);
    attackers |= get_king_moves(target) & *board.pieces(Piece::King);
    attackers |= get_bishop_moves(target, occupied) & diagonal;
    attackers |= get_rook_moves(target, occupied) & orthogonal;
    attackers & occupied
}

fn least_valuable_attacker(
    board: &Board,
    candidates: BitBoard,
) -> Option<(Square, Piece)> {
    for piece in [
        Piece::Pawn,
        Piece::Knight,
        Piece::Bishop,
        Piece::Rook,
        Piece::Queen,
        Piece::King,
    ] {
        let subset = candidates & *board.pieces(piece);
        if subset != EMPTY {
            return Some((subset.to_square(), piece));
        }
    }
    None
}

/// Static exchange evaluation of the capture `mv`: the material swing on
/// the destination square assuming both sides keep recapturing with their
/// least valuable attacker while it pays to do so.
pub fn see(board: &Board, mv: ChessMove) -> i32 {
    let source = mv.get_source();
    let target = mv.get_dest();
    let mover = match board.piece_on(source) {
        Some(piece) => piece,
        None => return 0,
    };

    let mut gain = [0i32; 32];
    let mut occupied = *board.combined() ^ BitBoard::from_square(source);
    gain[0] = match board.piece_on(target) {
        Some(victim) => piece_value(victim),
        None if mover == Piece::Pawn && source.get_file() != target.get_file() => {
            // En passant: the captured pawn sits beside the destination.
            let victim_sq = Square::make_square(source.get_rank(), target.get_file());
            occupied ^= BitBoard::from_square(victim_sq);
            piece_value(Piece::Pawn)
        }
        None => 0,
    };

    let mut depth = 0usize;
    let mut occupant_value = piece_value(mover);
    let mut side = !board.side_to_move();
    loop {
        let candidates =
            attackers_to(board, target, occupied) & *board.color_combined(side);
        let (sq, piece) = match least_valuable_attacker(board, candidates) {
            Some(found) => found,
            None => break,
        };
        depth += 1;
        if depth >= gain.len() {
            break;
        }
        gain[depth] = occupant_value - gain[depth - 1];
        // Neither continuing nor stopping can help this side: settled.
        if gain[depth].max(-gain[depth - 1]) < 0 {
            break;
        }
        occupant_value = piece_value(piece);
        occupied ^= BitBoard::from_square(sq);
        side = !side;
    }

    while depth > 0 {
        gain[depth - 1] = -gain[depth].max(-gain[depth - 1]);
        depth -= 1;
    }
    gain[0]
}

fn score_move(
    pos: &Position,
    mv: ChessMove,
    preferred: Option<ChessMove>,
    killers: &KillerTable,
    depth: u8,
    cache: &TranspositionCache,
) -> i32 {
    if preferred == Some(mv) {
        return PREFERRED_SCORE;
    }
    if pos.is_capture(mv) {
        let victim = capture_victim_value(pos, mv);
        let aggressor = match pos.board().piece_on(mv.get_source()) {
            // Clamped so even a king capture with a poor exchange stays
            // inside the capture band.
            Some(piece) => piece_value(piece).min(1_000),
            None => 0,
        };
        return CAPTURE_BASE + victim * 16 - aggressor + 4 * see(pos.board(), mv);
    }
    match killers.rank(pos.side_to_move(), depth, mv) {
        Some(0) => return KILLER_FIRST,
        Some(1) => return KILLER_SECOND,
        _ => {}
    }
    let after = pos.board().make_move_new(mv);
    let child = pos.fingerprint() ^ zobrist::move_delta(mv, pos.board(), &after);
    match cache.probe(child) {
        Some(entry) => {
            let perspective = match pos.side_to_move() {
                Color::White => entry.score,
                Color::Black => -entry.score,
            };
            perspective.clamp(-QUIET_CACHE_CLAMP, QUIET_CACHE_CLAMP)
        }
        None => UNCACHED_QUIET,
    }
}

/// Sort `moves` best-first for a node with `depth` plies remaining. The
/// sort is stable, so ties keep generation order and ordering is
/// deterministic.
pub fn order_moves(
    pos: &Position,
    moves: &mut [ChessMove],
    preferred: Option<ChessMove>,
    killers: &KillerTable,
    depth: u8,
    cache: &TranspositionCache,
) {
    moves.sort_by_cached_key(|&mv| Reverse(score_move(pos, mv, preferred, killers, depth, cache)));
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chess::{Board, ChessMove, Square};

    use super::*;
    use crate::search::transposition::{Bound, CacheEntry};

    fn board(fen: &str) -> Board {
        Board::from_str(fen).expect("test FEN should parse")
    }

    #[test]
    fn see_scores_hanging_and_defended_targets() {
        let hanging = board("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1");
        assert_eq!(see(&hanging, ChessMove::new(Square::E4, Square::D5, None)), 100);

        let defended = board("4k3/8/4p3/3p4/4P3/8/8/4K3 w - - 0 1");
        assert_eq!(see(&defended, ChessMove::new(Square::E4, Square::D5, None)), 0);

        let rook_grabs_pawn = board("4k3/8/4p3/3p4/8/8/8/3RK3 w - - 0 1");
        assert_eq!(
            see(&rook_grabs_pawn, ChessMove::new(Square::D1, Square::D5, None)),
            -400,
        );
    }

    #[test]
    fn see_counts_xray_recaptures() {
        let stacked = board("3r1k2/3r4/8/3p4/8/8/3R4/3R1K2 w - - 0 1");
        // RxP, rxR, RxR (through the vacated d2), rxR: down a rook for
        // rook and pawn.
        assert_eq!(
            see(&stacked, ChessMove::new(Square::D2, Square::D5, None)),
            -400,
        );
    }

    #[test]
    fn see_handles_en_passant() {
        let ep = board("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3");
        let capture = ChessMove::new(Square::D4, Square::E3, None);
        // dxe3 wins the pawn; fxe3 recaptures.
        assert_eq!(see(&ep, capture), 0);
    }

    #[test]
    fn killer_table_shifts_and_ranks_per_side() {
        let mut killers = KillerTable::new();
        let a = ChessMove::new(Square::B1, Square::C3, None);
        let b = ChessMove::new(Square::G1, Square::F3, None);

        killers.record(Color::White, 4, a);
        killers.record(Color::White, 4, b);
        assert_eq!(killers.rank(Color::White, 4, b), Some(0));
        assert_eq!(killers.rank(Color::White, 4, a), Some(1));
        assert_eq!(killers.rank(Color::White, 5, a), None);
        assert_eq!(killers.rank(Color::Black, 4, b), None);

        killers.record(Color::White, 4, b);
        assert_eq!(killers.rank(Color::White, 4, b), Some(0));
        assert_eq!(killers.rank(Color::White, 4, a), Some(1));

        killers.clear();
        assert_eq!(killers.rank(Color::White, 4, b), None);
    }

    #[test]
    fn bands_order_preferred_captures_killers_quiets() {
        let pos = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
        )
        .expect("FEN");
        let cache = TranspositionCache::new(16);
        let mut killers = KillerTable::new();

        let preferred = ChessMove::new(Square::G1, Square::F3, None);
        let capture = ChessMove::new(Square::E4, Square::D5, None);
        let killer = ChessMove::new(Square::B1, Square::C3, None);
        killers.record(Color::White, 2, killer);

        let mut moves = pos.legal_moves();
        order_moves(&pos, &mut moves, Some(preferred), &killers, 2, &cache);

        assert_eq!(moves[0], preferred);
        assert_eq!(moves[1], capture);
        assert_eq!(moves[2], killer);
    }

    #[test]
    fn cached_child_scores_rank_quiets_by_side_to_move() {
        let killers = KillerTable::new();
        let cache = TranspositionCache::new(256);

        let pos = Position::new();
        let good = ChessMove::new(Square::H2, Square::H4, None);
        let bad = ChessMove::new(Square::A2, Square::A3, None);
        for (mv, score) in [(good, 500), (bad, -500)] {
            let mut child = pos.clone();
            child.push(mv);
            cache.store(CacheEntry {
                fingerprint: child.fingerprint(),
                depth: 1,
                score,
                bound: Bound::Exact,
                best_move: None,
            });
        }
        let mut moves = pos.legal_moves();
        order_moves(&pos, &mut moves, None, &killers, 0, &cache);
        assert_eq!(moves[0], good);
        assert_eq!(moves[1], bad);

        // Black to move: signs flip, so a White-negative child comes first.
        let mut pos = Position::new();
        pos.push(ChessMove::new(Square::E2, Square::E4, None));
        let good_for_black = ChessMove::new(Square::B8, Square::C6, None);
        let bad_for_black = ChessMove::new(Square::G8, Square::F6, None);
        for (mv, score) in [(good_for_black, -400), (bad_for_black, 300)] {
            let mut child = pos.clone();
            child.push(mv);
            cache.store(CacheEntry {
                fingerprint: child.fingerprint(),
                depth: 1,
                score,
                bound: Bound::Exact,
                best_move: None,
            });
        }
        let mut moves = pos.legal_moves();
        order_moves(&pos, &mut moves, None, &killers, 0, &cache);
        assert_eq!(moves[0], good_for_black);
        assert_eq!(moves[1], bad_for_black);
    }
}
