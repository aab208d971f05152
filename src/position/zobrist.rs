//! Zobrist hashing support for fast position identity and repetition tracking.
//!
//! The keys are generated from a fixed seed so fingerprints are deterministic
//! across runs and processes, which is what lets a persisted transposition
//! cache from one session be reused in another. The key set covers piece
//! placement, the en-passant file, and the side to move; transpositions
//! reached by different move orders hash identically because the fingerprint
//! is a pure function of those fields, never of move history.

use std::sync::OnceLock;

use chess::{Board, ChessMove, Color, File, Piece, Square};

#[derive(Debug)]
struct ZobristTables {
    piece_square: [[[u64; 64]; 6]; 2],
    side_to_move: u64,
    en_passant_file: [u64; 8],
}

static TABLES: OnceLock<ZobristTables> = OnceLock::new();

#[inline]
fn tables() -> &'static ZobristTables {
    TABLES.get_or_init(build_tables)
}

fn build_tables() -> ZobristTables {
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;

    let mut piece_square = [[[0u64; 64]; 6]; 2];
    for color in &mut piece_square {
        for piece in color {
            for sq in piece {
                *sq = next_random_u64(&mut seed);
            }
        }
    }

    let side_to_move = next_random_u64(&mut seed);

    let mut en_passant_file = [0u64; 8];
    for key in &mut en_passant_file {
        *key = next_random_u64(&mut seed);
    }

    ZobristTables {
        piece_square,
        side_to_move,
        en_passant_file,
    }
}

#[inline]
fn next_random_u64(state: &mut u64) -> u64 {
    // splitmix64
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Return the Zobrist key for a `(color, piece, square)` occupancy term.
#[inline]
pub fn piece_square_key(color: Color, piece: Piece, square: Square) -> u64 {
    tables().piece_square[color.to_index()][piece.to_index()][square.to_index()]
}

/// Return the Zobrist key contribution for an en-passant-eligible file.
#[inline]
pub fn en_passant_file_key(file: File) -> u64 {
    tables().en_passant_file[file.to_index()]
}

/// Return the side-to-move toggle key (xor in when black is to move).
#[inline]
pub fn side_to_move_key() -> u64 {
    tables().side_to_move
}

/// Compute the full position fingerprint from scratch.
pub fn full_hash(board: &Board) -> u64 {
    let mut key = 0u64;

    for color in [Color::White, Color::Black] {
        for sq in *board.color_combined(color) {
            if let Some(piece) = board.piece_on(sq) {
                key ^= piece_square_key(color, piece, sq);
            }
        }
    }

    if board.side_to_move() == Color::Black {
        key ^= side_to_move_key();
    }

    key ^= en_passant_component(board);

    key
}

#[inline]
fn en_passant_component(board: &Board) -> u64 {
    match board.en_passant() {
        Some(sq) => en_passant_file_key(sq.get_file()),
        None => 0,
    }
}

/// XOR delta transforming the fingerprint of `before` into the fingerprint of
/// the position reached by playing `mv` (which `after` must be).
///
/// XOR is self-inverse, so applying the same delta again reverts the
/// fingerprint exactly; push and pop therefore share this one function.
pub fn move_delta(mv: ChessMove, before: &Board, after: &Board) -> u64 {
    let src = mv.get_source();
    let dst = mv.get_dest();
    let us = before.side_to_move();
    // Legal-move precondition: the origin square is always occupied. A bare
    // zero delta on violation shows up immediately in the hash-equivalence
    // tests rather than corrupting memory.
    let mover = match before.piece_on(src) {
        Some(piece) => piece,
        None => return 0,
    };

    let mut delta = piece_square_key(us, mover, src);

    let placed = mv.get_promotion().unwrap_or(mover);
    delta ^= piece_square_key(us, placed, dst);

    if let Some(victim) = before.piece_on(dst) {
        delta ^= piece_square_key(!us, victim, dst);
    } else if mover == Piece::Pawn && src.get_file() != dst.get_file() {
        // En passant: the captured pawn sits beside the origin, not on the
        // destination square.
        let victim_sq = Square::make_square(src.get_rank(), dst.get_file());
        delta ^= piece_square_key(!us, Piece::Pawn, victim_sq);
    }

    if mover == Piece::King {
        let file_span =
            (src.get_file().to_index() as i32 - dst.get_file().to_index() as i32).abs();
        if file_span == 2 {
            let (rook_from, rook_to) = if dst.get_file() == File::G {
                (File::H, File::F)
            } else {
                (File::A, File::D)
            };
            delta ^= piece_square_key(us, Piece::Rook, Square::make_square(src.get_rank(), rook_from));
            delta ^= piece_square_key(us, Piece::Rook, Square::make_square(src.get_rank(), rook_to));
        }
    }

    delta ^= en_passant_component(before);
    delta ^= en_passant_component(after);
    delta ^= side_to_move_key();

    delta
}

/// XOR delta for passing the turn (null move): side toggle plus the loss of
/// any en-passant right.
pub fn null_move_delta(before: &Board, after: &Board) -> u64 {
    side_to_move_key() ^ en_passant_component(before) ^ en_passant_component(after)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chess::{Board, ChessMove, Piece, Square};

    use super::{full_hash, move_delta, null_move_delta};

    #[test]
    fn starting_position_hash_is_deterministic() {
        let a = Board::default();
        let b = Board::default();
        assert_eq!(full_hash(&a), full_hash(&b));
    }

    #[test]
    fn side_to_move_changes_hash() {
        let w = Board::from_str("4k3/8/8/8/8/8/8/4K3 w - - 0 1").expect("FEN should parse");
        let b = Board::from_str("4k3/8/8/8/8/8/8/4K3 b - - 0 1").expect("FEN should parse");
        assert_ne!(full_hash(&w), full_hash(&b));
    }

    #[test]
    fn en_passant_file_changes_hash() {
        let ep = Board::from_str("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3")
            .expect("FEN should parse");
        let no_ep = Board::from_str("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 3")
            .expect("FEN should parse");
        assert_ne!(full_hash(&ep), full_hash(&no_ep));
    }

    #[test]
    fn transpositions_hash_identically() {
        let order_a = [
            ChessMove::new(Square::G1, Square::F3, None),
            ChessMove::new(Square::B8, Square::C6, None),
            ChessMove::new(Square::B1, Square::C3, None),
            ChessMove::new(Square::G8, Square::F6, None),
        ];
        let order_b = [
            ChessMove::new(Square::B1, Square::C3, None),
            ChessMove::new(Square::G8, Square::F6, None),
            ChessMove::new(Square::G1, Square::F3, None),
            ChessMove::new(Square::B8, Square::C6, None),
        ];

        let mut board_a = Board::default();
        for mv in order_a {
            board_a = board_a.make_move_new(mv);
        }
        let mut board_b = Board::default();
        for mv in order_b {
            board_b = board_b.make_move_new(mv);
        }

        assert_eq!(full_hash(&board_a), full_hash(&board_b));
    }

    #[test]
    fn move_delta_matches_full_recompute() {
        let cases: &[(&str, ChessMove)] = &[
            // Quiet development move.
            (
                "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
                ChessMove::new(Square::G1, Square::F3, None),
            ),
            // Double pawn push creating an en-passant file.
            (
                "rnbqkbnr/ppp1pppp/8/8/3p4/8/PPPPPPPP/RNBQKBNR w KQkq - 0 3",
                ChessMove::new(Square::E2, Square::E4, None),
            ),
            // En-passant capture removing the displaced pawn.
            (
                "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3",
                ChessMove::new(Square::D4, Square::E3, None),
            ),
            // Kingside castle moving the rook as well.
            (
                "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1",
                ChessMove::new(Square::E1, Square::G1, None),
            ),
            // Queenside castle.
            (
                "r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1",
                ChessMove::new(Square::E8, Square::C8, None),
            ),
            // Promotion with a capture on the eighth rank.
            (
                "1n2k3/P7/8/8/8/8/7K/8 w - - 0 1",
                ChessMove::new(Square::A7, Square::B8, Some(Piece::Queen)),
            ),
            // Plain capture.
            (
                "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
                ChessMove::new(Square::E4, Square::D5, None),
            ),
        ];

        for (fen, mv) in cases {
            let before = Board::from_str(fen).expect("FEN should parse");
            assert!(before.legal(*mv), "test move must be legal in {fen}");
            let after = before.make_move_new(*mv);
            assert_eq!(
                full_hash(&before) ^ move_delta(*mv, &before, &after),
                full_hash(&after),
                "delta drifted for {fen}",
            );
        }
    }

    #[test]
    fn null_move_delta_matches_full_recompute() {
        let before =
            Board::from_str("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3")
                .expect("FEN should parse");
        let after = before.null_move().expect("not in check");
        assert_eq!(
            full_hash(&before) ^ null_move_delta(&before, &after),
            full_hash(&after),
        );
    }
}
