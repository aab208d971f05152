//! Capture resolution past the horizon.
//!
//! Runs as a negamax over side-to-move scores: standing pat is always an
//! option, only captures that static exchange evaluation does not condemn
//! are tried, and obviously insufficient captures are delta-pruned. The
//! alpha-beta core converts between its absolute scores and this module's
//! side-to-move scores at the horizon.

use std::cmp::Reverse;

use chess::ChessMove;

use crate::evaluation::board_scoring::piece_value;
use crate::position::position::Position;
use crate::search::alpha_beta::{perspective, SearchWorker};
use crate::search::move_ordering::{capture_victim_value, see};

impl SearchWorker<'_> {
    /// Resolve captures from `pos` until the position is quiet or the ply
    /// ceiling is reached. `None` means a stop signal interrupted the
    /// search and the value must be discarded.
    pub(crate) fn quiescence(
        &mut self,
        pos: &mut Position,
        mut alpha: i32,
        beta: i32,
        qply: u8,
    ) -> Option<i32> {
        self.ctx.bump_node();
        if self.ctx.should_stop() {
            return None;
        }

        let stand_pat = perspective(pos.side_to_move(), self.scorer.score_board(pos.board()));
        if stand_pat >= beta {
            return Some(beta);
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }
        if qply >= self.opts.quiescence.max_ply {
            return Some(alpha);
        }

        // Same capture ranking the move orderer uses, minus the band offset.
        let mut captures: Vec<(ChessMove, i32, i32)> = Vec::new();
        for mv in pos.legal_moves() {
            if !pos.is_capture(mv) {
                continue;
            }
            let exchange = see(pos.board(), mv);
            if exchange < 0 {
                continue;
            }
            let victim = capture_victim_value(pos, mv);
            let aggressor = match pos.board().piece_on(mv.get_source()) {
                Some(piece) => piece_value(piece).min(1_000),
                None => 0,
            };
            captures.push((mv, victim, victim * 16 - aggressor + 4 * exchange));
        }
        captures.sort_by_key(|&(_, _, rank)| Reverse(rank));

        for (mv, victim, _) in captures {
            let mut upside = victim;
            if mv.get_promotion().is_some() {
                upside += self.opts.quiescence.promotion_bonus;
            }
            if stand_pat + upside < alpha - self.opts.quiescence.delta_margin {
                continue;
            }

            let mut child = pos.push_guard(mv);
            let score = -self.quiescence(&mut *child, -beta, -alpha, qply + 1)?;

            if score >= beta {
                return Some(score);
            }
            if score > alpha {
                alpha = score;
            }
        }
        Some(alpha)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::evaluation::board_scoring::{BoardScorer, MaterialScorer};
    use crate::position::position::Position;
    use crate::search::alpha_beta::SearchWorker;
    use crate::search::context::SearchContext;
    use crate::search::options::SearchOptions;
    use crate::search::transposition::TranspositionCache;

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
    fn stand_pat_cuts_off_when_already_ahead() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(16);
        let opts = SearchOptions::default();
        let mut w = worker(&scorer, &cache, &opts);

        let mut pos = Position::from_fen("k7/8/8/8/8/8/4QQ2/4K3 w - - 0 1").expect("FEN");
        let score = w.quiescence(&mut pos, -100, 100, 0).expect("not stopped");
        assert_eq!(score, 100);
        assert_eq!(w.ctx.nodes(), 1);
    }

    #[test]
    fn winning_capture_is_cashed_in() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(16);
        let opts = SearchOptions::default();
        let mut w = worker(&scorer, &cache, &opts);

        let mut pos = Position::from_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1").expect("FEN");
        let score = w.quiescence(&mut pos, -1_000, 1_000, 0).expect("not stopped");
        assert_eq!(score, 100);
    }

    #[test]
    fn losing_captures_are_never_examined() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(16);
        let opts = SearchOptions::default();
        let mut w = worker(&scorer, &cache, &opts);

        // Rxd5 loses rook for pawn; the exchange filter refuses it, so the
        // node stands pat without recursing.
        let mut pos = Position::from_fen("4k3/8/4p3/3p4/8/8/8/3RK3 w - - 0 1").expect("FEN");
        let score = w.quiescence(&mut pos, -1_000, 1_000, 0).expect("not stopped");
        assert_eq!(score, 300);
        assert_eq!(w.ctx.nodes(), 1);
    }

    #[test]
    fn delta_pruning_skips_hopeless_small_captures() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(16);
        let opts = SearchOptions::default();
        let mut w = worker(&scorer, &cache, &opts);

        // White is a queen down; winning a pawn cannot bring the score
        // anywhere near the window.
        let mut pos = Position::from_fen("k7/8/8/8/8/1p5q/P7/K7 w - - 0 1").expect("FEN");
        let score = w.quiescence(&mut pos, -50, 50, 0).expect("not stopped");
        assert_eq!(score, -50);
        assert_eq!(w.ctx.nodes(), 1);

        // With the margin slackened the same capture is examined.
        let mut slack = SearchOptions::default();
        slack.quiescence.delta_margin = 10_000;
        let mut w = worker(&scorer, &cache, &slack);
        let mut pos = Position::from_fen("k7/8/8/8/8/1p5q/P7/K7 w - - 0 1").expect("FEN");
        w.quiescence(&mut pos, -50, 50, 0).expect("not stopped");
        assert!(w.ctx.nodes() > 1);
    }

    #[test]
    fn ply_ceiling_forces_a_stand_pat() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(16);
        let mut opts = SearchOptions::default();
        opts.quiescence.max_ply = 0;
        let mut w = worker(&scorer, &cache, &opts);

        let mut pos = Position::from_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1").expect("FEN");
        let score = w.quiescence(&mut pos, -1_000, 1_000, 0).expect("not stopped");
        assert_eq!(score, 0);
        assert_eq!(w.ctx.nodes(), 1);
    }

    #[test]
    fn stop_signal_discards_the_node() {
        let scorer = MaterialScorer;
        let cache = TranspositionCache::new(16);
        let opts = SearchOptions::default();
        let stop = Arc::new(AtomicBool::new(false));
        let mut w = SearchWorker::new(
            &scorer,
            &cache,
            SearchContext::new(Arc::clone(&stop)),
            &opts,
        );

        stop.store(true, Ordering::Relaxed);
        let mut pos = Position::new();
        assert_eq!(w.quiescence(&mut pos, -1_000, 1_000, 0), None);
    }
}
