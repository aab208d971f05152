//! Lazy SMP round coordinator.
//!
//! One deepening round runs the main worker on the caller's thread while
//! helper workers search the same root from their own position copies.
//! Helpers share the transposition cache and the round's stop conditions but
//! keep private killer tables and node counters. Their answers are thrown
//! away; they exist to warm the cache for the main worker. The main worker's
//! result is the round's result, so a round is as deterministic as the cache
//! contents allow, and forced lines are unaffected by helper count.

use std::thread;

use chess::ChessMove;

use crate::position::position::Position;
use crate::search::alpha_beta::SearchWorker;
use crate::search::options::MAX_SEARCH_DEPTH;

/// Staggered helper depth: odd-numbered helpers search the round's depth,
/// even-numbered ones go one deeper so the cache fills ahead of the main
/// worker.
fn helper_depth(round_depth: u8, helper_index: usize) -> u8 {
    if helper_index % 2 == 0 {
        (round_depth + 1).min(MAX_SEARCH_DEPTH)
    } else {
        round_depth
    }
}

/// Run one deepening round at `depth` with `helpers` extra workers.
///
/// The main worker's context must already be configured for the round; its
/// cancel flag is raised once the main worker finishes so helpers never
/// outlive the round.
pub fn run_depth(
    pos: &mut Position,
    main: &mut SearchWorker<'_>,
    depth: u8,
    preferred: Option<ChessMove>,
    helpers: usize,
) -> Option<(ChessMove, i32)> {
    if helpers == 0 {
        return main.search_root(pos, depth, preferred);
    }

    let scorer = main.scorer;
    let cache = main.cache;
    let opts = main.opts;
    let round = main.ctx.clone();

    thread::scope(|scope| {
        for helper_index in 0..helpers {
            let mut helper_pos = pos.clone();
            let helper_ctx = round.helper_clone();
            let target = helper_depth(depth, helper_index);
            scope.spawn(move || {
                let mut helper = SearchWorker::new(scorer, cache, helper_ctx, opts);
                let _ = helper.search_root(&mut helper_pos, target, preferred);
            });
        }

        let result = main.search_root(pos, depth, preferred);
        round.cancel_round();
        result
    })
}
