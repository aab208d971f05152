//! Depth-limited alpha-beta core.
//!
//! Scores are absolute: positive always favors White, and each node
//! explicitly maximizes or minimizes according to the side to move. A node
//! runs through a fixed sequence: stop poll, draw detection, cache probe,
//! terminal detection, horizon hand-off to quiescence, null-move probe,
//! then the ordered move loop with extensions, futility narrowing and late
//! move reductions, and finally bound classification and a cache store.
//! Every search function returns `None` the moment a stop signal is seen;
//! partial results are discarded all the way up.

use chess::{ChessMove, Color, Piece, Rank};

use crate::evaluation::board_scoring::{BoardScorer, MATE_SCORE};
use crate::position::position::Position;
use crate::search::context::SearchContext;
use crate::search::move_ordering::{order_moves, KillerTable, MAX_PLY};
use crate::search::options::SearchOptions;
use crate::search::transposition::{
    score_for_storage, score_from_storage, Bound, CacheEntry, TranspositionCache,
};

/// `absolute` reinterpreted from `color`'s point of view.
#[inline]
pub(crate) fn perspective(color: Color, absolute: i32) -> i32 {
    match color {
        Color::White => absolute,
        Color::Black => -absolute,
    }
}

/// One search thread's working state: borrowed collaborators plus the
/// thread-private killer table.
pub struct SearchWorker<'a> {
    pub(crate) scorer: &'a dyn BoardScorer,
    pub(crate) cache: &'a TranspositionCache,
    pub(crate) ctx: SearchContext,
    pub(crate) opts: &'a SearchOptions,
    pub(crate) killers: KillerTable,
}

impl<'a> SearchWorker<'a> {
    pub fn new(
        scorer: &'a dyn BoardScorer,
        cache: &'a TranspositionCache,
        ctx: SearchContext,
        opts: &'a SearchOptions,
    ) -> Self {
        SearchWorker {
            scorer,
            cache,
            ctx,
            opts,
            killers: KillerTable::new(),
        }
    }

    /// Search every root move to `depth` and return the best with its
    /// score. `None` means a stop signal fired before the last root move
    /// finished, or the position has no legal moves.
    pub fn search_root(
        &mut self,
        pos: &mut Position,
        depth: u8,
        preferred: Option<ChessMove>,
    ) -> Option<(ChessMove, i32)> {
        debug_assert!(depth >= 1);
        let mut moves = pos.legal_moves();
        if moves.is_empty() {
            return None;
        }
        let fingerprint = pos.fingerprint();
        let preferred = preferred.or_else(|| {
            self.cache
                .probe(fingerprint)
                .and_then(|entry| entry.best_move)
        });
        order_moves(pos, &mut moves, preferred, &self.killers, depth, self.cache);

        let maximizing = pos.side_to_move() == Color::White;
        let mut alpha = -(MATE_SCORE + 1);
        let mut beta = MATE_SCORE + 1;
        let mut best_move = moves[0];
        let mut best_score = if maximizing { i32::MIN + 1 } else { i32::MAX - 1 };

        for &mv in &moves {
            let mut child = pos.push_guard(mv);
            let score = self.alpha_beta(&mut *child, depth - 1, 1, alpha, beta, !maximizing, true)?;
            drop(child);
            if maximizing {
                if score > best_score {
                    best_score = score;
                    best_move = mv;
                }
                alpha = alpha.max(best_score);
            } else {
                if score < best_score {
                    best_score = score;
                    best_move = mv;
                }
                beta = beta.min(best_score);
            }
        }

        self.cache.store(CacheEntry {
            fingerprint,
            depth,
            score: score_for_storage(best_score, 0),
            bound: Bound::Exact,
            best_move: Some(best_move),
        });
        Some((best_move, best_score))
    }

    pub(crate) fn alpha_beta(
        &mut self,
        pos: &mut Position,
        depth: u8,
        ply: u8,
        mut alpha: i32,
        mut beta: i32,
        maximizing: bool,
        allow_null: bool,
    ) -> Option<i32> {
        self.ctx.bump_node();
        if self.ctx.should_stop() {
            return None;
        }

        // Draw detection runs before the cache probe: the fingerprint knows
        // nothing about move history, so a cached score must never shadow a
        // repetition or fifty-move draw.
        if pos.repetition_count() >= 3 || pos.halfmove_clock() >= 100 {
            return Some(0);
        }

        let fingerprint = pos.fingerprint();
        let mut cached_move = None;
        if let Some(entry) = self.cache.probe(fingerprint) {
            cached_move = entry.best_move;
            if entry.depth >= depth {
                let score = score_from_storage(entry.score, ply);
                match entry.bound {
                    Bound::Exact => return Some(score),
                    Bound::Lower => alpha = alpha.max(score),
                    Bound::Upper => beta = beta.min(score),
                }
                if alpha >= beta {
                    return Some(score);
                }
            }
        }
        // Bounds as seen on entry, after cache tightening; the final score
        // is classified against these.
        let entry_alpha = alpha;
        let entry_beta = beta;

        let mut moves = pos.legal_moves();
        if moves.is_empty() {
            return Some(if pos.in_check() {
                let mate = MATE_SCORE - i32::from(ply);
                if maximizing {
                    -mate
                } else {
                    mate
                }
            } else {
                0
            });
        }

        if depth == 0 {
            let score = if maximizing {
                self.quiescence(pos, alpha, beta, 0)?
            } else {
                -self.quiescence(pos, -beta, -alpha, 0)?
            };
            let bound = if score <= entry_alpha {
                Bound::Upper
            } else if score >= entry_beta {
                Bound::Lower
            } else {
                Bound::Exact
            };
            self.cache.store(CacheEntry {
                fingerprint,
                depth: 0,
                score: score_for_storage(score, ply),
                bound,
                best_move: None,
            });
            return Some(score);
        }

        let in_check = pos.in_check();

        let null_reduction = self.opts.null_move.reduction(depth);
        if self.opts.null_move.enabled
            && allow_null
            && depth >= self.opts.null_move.min_depth
            && depth > null_reduction + 1
            && !in_check
            && pos.has_non_pawn_material()
        {
            let reduced = depth - 1 - null_reduction;
            if let Some(mut child) = pos.push_null_guard() {
                let score = if maximizing {
                    self.alpha_beta(&mut *child, reduced, ply + 1, beta - 1, beta, false, false)?
                } else {
                    self.alpha_beta(&mut *child, reduced, ply + 1, alpha, alpha + 1, true, false)?
                };
                if maximizing && score >= beta {
                    return Some(beta);
                }
                if !maximizing && score <= alpha {
                    return Some(alpha);
                }
            }
        }

        // When the static score is hopelessly outside the window near the
        // frontier, only captures and checks are worth examining.
        let futility_static = match self.opts.futility.margin(depth) {
            Some(margin) if !in_check => {
                let static_score = self.scorer.score_board(pos.board());
                let hopeless = if maximizing {
                    static_score + margin <= alpha
                } else {
                    static_score - margin >= beta
                };
                hopeless.then_some(static_score)
            }
            _ => None,
        };

        order_moves(pos, &mut moves, cached_move, &self.killers, depth, self.cache);

        let mut best_score = if maximizing { i32::MIN + 1 } else { i32::MAX - 1 };
        let mut best_move = None;
        let mut examined = 0usize;

        for (index, &mv) in moves.iter().enumerate() {
            let is_capture = pos.is_capture(mv);
            let gives_check = pos.gives_check(mv);
            if futility_static.is_some() && !is_capture && !gives_check {
                continue;
            }

            let extension = self.extension_for(pos, mv, is_capture, gives_check, ply);
            let child_depth = depth - 1 + extension;
            let reduce = self.opts.lmr.enabled
                && extension == 0
                && !in_check
                && !is_capture
                && !gives_check
                && depth >= self.opts.lmr.min_depth
                && index >= self.opts.lmr.min_move_index;

            let mut child = pos.push_guard(mv);
            let mut score = if reduce {
                let reduced = child_depth.saturating_sub(self.opts.lmr.reduction);
                self.alpha_beta(&mut *child, reduced, ply + 1, alpha, beta, !maximizing, true)?
            } else {
                self.alpha_beta(&mut *child, child_depth, ply + 1, alpha, beta, !maximizing, true)?
            };
            if reduce {
                let promising = if maximizing { score > alpha } else { score < beta };
                if promising {
                    // Re-search at full depth before trusting a reduced win.
                    score =
                        self.alpha_beta(&mut *child, child_depth, ply + 1, alpha, beta, !maximizing, true)?;
                }
            }
            drop(child);
            examined += 1;

            if maximizing {
                if score > best_score {
                    best_score = score;
                    best_move = Some(mv);
                }
                if best_score > alpha {
                    alpha = best_score;
                    if !is_capture {
                        self.killers.record(pos.side_to_move(), depth, mv);
                    }
                }
            } else {
                if score < best_score {
                    best_score = score;
                    best_move = Some(mv);
                }
                if best_score < beta {
                    beta = best_score;
                    if !is_capture {
                        self.killers.record(pos.side_to_move(), depth, mv);
                    }
                }
            }
            if alpha >= beta {
                break;
            }
        }

        if examined == 0 {
            // Futility narrowed the move list to nothing; fall back to the
            // static score it was judged against.
            if let Some(static_score) = futility_static {
                best_score = static_score;
            }
        }

        let bound = if best_score <= entry_alpha {
            Bound::Upper
        } else if best_score >= entry_beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        self.cache.store(CacheEntry {
            fingerprint,
            depth,
            score: score_for_storage(best_score, ply),
            bound,
            best_move,
        });
        Some(best_score)
    }

    /// One extra ply for checking moves, immediate recaptures, and pawns
    /// reaching the rank before promotion. At most one per move.
    fn extension_for(
        &self,
        pos: &Position,
        mv: ChessMove,
        is_capture: bool,
        gives_check: bool,
        ply: u8,
    ) -> u8 {
        if !self.opts.extensions.enabled || ply as usize + 1 >= MAX_PLY {
            return 0;
        }
        if gives_check {
            return 1;
        }
        if is_capture && pos.last_capture_square() == Some(mv.get_dest()) {
            return 1;
        }
        if let Some((Piece::Pawn, color)) = pos.piece_at(mv.get_source()) {
            let near_promotion = match color {
                Color::White => Rank::Seventh,
                Color::Black => Rank::Second,
            };
            if mv.get_dest().get_rank() == near_promotion {
                return 1;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use chess::{ChessMove, Square};

    use super::*;
    use crate::evaluation::board_scoring::MaterialScorer;
    use crate::position::position::GameOutcome;

    fn worker<'a>(
        scorer: &'a dyn BoardScorer,
        cache: &'a TranspositionCache,
        opts: &'a SearchOptions,
    ) -> SearchWorker<'a> {
        SearchWorker::new(
            scorer,
            cache,
            SearchContext::new(Arc::new(AtomicBool::new(false))),
            opts,
        )
    }

    #[test]
    fn finds_mate_in_one_for_both_sides() {
        let scorer = MaterialScorer;
        let opts = SearchOptions::default();

        let cache = TranspositionCache::new(1 << 10);
        let mut w = worker(&scorer, &cache, &opts);
        let mut pos = Position::from_fen("6k1/8/5QK1/8/8/8/8/8 w - - 0 1").expect("FEN");
        let (mv, score) = w.search_root(&mut pos, 3, None).expect("search completes");
        assert_eq!(score, MATE_SCORE - 1);
        pos.push(mv);
        assert!(matches!(pos.outcome(), Some(GameOutcome::Checkmate { .. })));

        let cache = TranspositionCache::new(1 << 10);
        let mut w = worker(&scorer, &cache, &opts);
        let mut pos = Position::from_fen("8/8/8/8/8/5qk1/8/6K1 b - - 0 1").expect("FEN");
        let (mv, score) = w.search_root(&mut pos, 3, None).expect("search completes");
        assert_eq!(score, -(MATE_SCORE - 1));
        pos.push(mv);
        assert!(matches!(pos.outcome(), Some(GameOutcome::Checkmate { .. })));
    }

    #[test]
    fn forced_recapture_balances_material() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(1 << 10);
        let opts = SearchOptions::default();
        let mut w = worker(&scorer, &cache, &opts);

        // The queen check leaves exactly one legal reply.
        let mut pos = Position::from_fen("4k3/8/8/8/8/8/4q3/4K3 w - - 0 1").expect("FEN");
        let (mv, score) = w.search_root(&mut pos, 2, None).expect("search completes");
        assert_eq!(mv, ChessMove::new(Square::E1, Square::E2, None));
        assert_eq!(score, 0);
    }

    #[test]
    fn matches_plain_minimax_when_heuristics_are_off() {
        fn minimax(pos: &mut Position, depth: u8, ply: u8, scorer: &dyn BoardScorer) -> i32 {
            let moves = pos.legal_moves();
            if moves.is_empty() {
                return if pos.in_check() {
                    let mate = MATE_SCORE - i32::from(ply);
                    if pos.side_to_move() == Color::White {
                        -mate
                    } else {
                        mate
                    }
                } else {
                    0
                };
            }
            if depth == 0 {
                return scorer.score_board(pos.board());
            }
            let maximizing = pos.side_to_move() == Color::White;
            let mut best = if maximizing { i32::MIN } else { i32::MAX };
            for mv in moves {
                pos.push(mv);
                let score = minimax(pos, depth - 1, ply + 1, scorer);
                pos.pop();
                best = if maximizing {
                    best.max(score)
                } else {
                    best.min(score)
                };
            }
            best
        }

        let scorer = MaterialScorer;
        let mut opts = SearchOptions::default();
        opts.null_move.enabled = false;
        opts.futility.enabled = false;
        opts.lmr.enabled = false;
        opts.extensions.enabled = false;
        opts.quiescence.max_ply = 0;

        let fens = [
            "4k3/8/8/3p4/8/8/3P4/4K3 w - - 0 1",
            "4k3/8/8/3q4/8/8/8/3QK3 w - - 0 1",
            "8/8/8/8/8/5qk1/8/6K1 b - - 0 1",
            "7k/8/8/8/8/8/1R6/R6K w - - 0 1",
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        ];

        let mut decisive_scores = 0;
        for fen in fens {
            let cache = TranspositionCache::new(1 << 12);
            let mut w = worker(&scorer, &cache, &opts);

            let mut pos = Position::from_fen(fen).expect("FEN");
            let (_, score) = w.search_root(&mut pos, 3, None).expect("search completes");

            let mut reference = Position::from_fen(fen).expect("FEN");
            assert_eq!(score, minimax(&mut reference, 3, 0, &scorer), "{fen}");
            if score != 0 {
                decisive_scores += 1;
            }
        }
        assert!(decisive_scores >= 3, "battery must not be score-degenerate");
    }

    #[test]
    fn pruning_stack_keeps_tactical_sight() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(1 << 10);
        let opts = SearchOptions::default();
        let mut w = worker(&scorer, &cache, &opts);

        let mut pos = Position::from_fen("4k3/8/8/3q4/8/8/8/3QK3 w - - 0 1").expect("FEN");
        let (mv, score) = w.search_root(&mut pos, 2, None).expect("search completes");
        assert_eq!(mv, ChessMove::new(Square::D1, Square::D5, None));
        assert_eq!(score, 900);
    }

    #[test]
    fn futility_narrowing_examines_fewer_moves() {
        let scorer = MaterialScorer;
        let fen = "k7/8/8/8/8/1p5q/P7/K7 w - - 0 1";

        let cache = TranspositionCache::new(1 << 10);
        let opts = SearchOptions::default();
        let mut narrow = worker(&scorer, &cache, &opts);
        let mut pos = Position::from_fen(fen).expect("FEN");
        let score = narrow
            .alpha_beta(&mut pos, 1, 1, -50, 50, true, false)
            .expect("not stopped");
        assert!(score <= -50);
        let narrowed_nodes = narrow.ctx.nodes();

        let cache = TranspositionCache::new(1 << 10);
        let mut opts = SearchOptions::default();
        opts.futility.enabled = false;
        let mut full = worker(&scorer, &cache, &opts);
        let mut pos = Position::from_fen(fen).expect("FEN");
        full.alpha_beta(&mut pos, 1, 1, -50, 50, true, false)
            .expect("not stopped");
        assert!(narrowed_nodes < full.ctx.nodes());
    }

    #[test]
    fn fifty_move_draws_steer_the_root_choice() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(1 << 10);
        let opts = SearchOptions::default();
        let mut w = worker(&scorer, &cache, &opts);

        // Every king move hits the fifty-move draw at once; only the pawn
        // pushes keep the extra material alive.
        let mut pos = Position::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 99 80").expect("FEN");
        let (mv, score) = w.search_root(&mut pos, 1, None).expect("search completes");
        assert_eq!(score, 100);
        assert_eq!(mv.get_source(), Square::E2);
    }

    #[test]
    fn node_budget_discards_the_round() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(1 << 10);
        let opts = SearchOptions::default();
        let ctx = SearchContext::new(Arc::new(AtomicBool::new(false))).with_node_budget(Some(5));
        let mut w = SearchWorker::new(&scorer, &cache, ctx, &opts);

        let mut pos = Position::new();
        assert_eq!(w.search_root(&mut pos, 4, None), None);
    }

    #[test]
    fn shared_cache_preserves_results_and_saves_work() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(1 << 14);
        let opts = SearchOptions::default();
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK1NR w KQkq - 4 4";

        let mut first = worker(&scorer, &cache, &opts);
        let mut pos = Position::from_fen(fen).expect("FEN");
        let (mv_first, score_first) = first.search_root(&mut pos, 3, None).expect("search");
        let cold_nodes = first.ctx.nodes();

        let mut second = worker(&scorer, &cache, &opts);
        let mut pos = Position::from_fen(fen).expect("FEN");
        let (mv_second, score_second) = second.search_root(&mut pos, 3, None).expect("search");

        assert_eq!(mv_first, mv_second);
        assert_eq!(score_first, score_second);
        assert!(second.ctx.nodes() < cold_nodes);
    }
}
