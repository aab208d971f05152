//! Iterative deepening driver.
//!
//! Depth rounds run back to back, each through the Lazy SMP coordinator,
//! with the previous round's best move searched first in the next. Budgets
//! are enforced between and during rounds: a round that overruns its time or
//! node budget is discarded and the last completed round's answer stands.
//! The first round runs without a deadline so a selection with any budget at
//! all still produces a legal move; only an operator stop before depth one
//! completes leaves the driver empty-handed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chess::ChessMove;

use crate::errors::EngineError;
use crate::evaluation::board_scoring::{is_mate_score, BoardScorer};
use crate::position::position::Position;
use crate::search::alpha_beta::SearchWorker;
use crate::search::context::SearchContext;
use crate::search::lazy_smp;
use crate::search::options::{SearchLimits, SearchOptions, MAX_SEARCH_DEPTH};
use crate::search::transposition::{CacheStats, TranspositionCache};

/// Why deepening ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Every requested depth completed.
    Completed,
    /// A completed round proved a forced mate; deeper rounds cannot improve
    /// on it.
    MateFound,
    /// The round in flight ran out of time.
    Deadline,
    /// The node budget ran out.
    NodeBudget,
    /// The operator stop flag was raised.
    OperatorStop,
}

/// Outcome of one move selection.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub best_move: ChessMove,
    pub score: i32,
    /// Deepest fully completed round.
    pub depth: u8,
    pub nodes: u64,
    pub elapsed: Duration,
    pub nodes_per_second: f64,
    pub stop_cause: StopCause,
    pub cache: CacheStats,
}

/// Deepen from depth one until the limits run out.
///
/// Fails with [`EngineError::Cancelled`] only when no round completed,
/// which takes an operator stop during the first round.
pub fn run(
    pos: &mut Position,
    scorer: &dyn BoardScorer,
    cache: &TranspositionCache,
    opts: &SearchOptions,
    limits: &SearchLimits,
    stop: Arc<AtomicBool>,
) -> Result<SearchReport, EngineError> {
    let max_depth = limits.max_depth.clamp(1, MAX_SEARCH_DEPTH);
    let started = Instant::now();

    // One worker for the whole selection: killer tables carry over between
    // rounds, only the round context is replaced.
    let mut worker = SearchWorker::new(
        scorer,
        cache,
        SearchContext::new(Arc::clone(&stop)),
        opts,
    );

    let mut completed: Option<(ChessMove, i32, u8)> = None;
    let mut preferred: Option<ChessMove> = None;
    let mut total_nodes = 0u64;
    let mut stop_cause = StopCause::Completed;

    for depth in 1..=max_depth {
        if stop.load(Ordering::Relaxed) {
            stop_cause = StopCause::OperatorStop;
            break;
        }

        let node_budget = match limits.max_nodes {
            Some(cap) => {
                if total_nodes >= cap {
                    stop_cause = StopCause::NodeBudget;
                    break;
                }
                Some(cap - total_nodes)
            }
            None => None,
        };
        // Depth one runs without a deadline: whatever the budget, the caller
        // gets a legal move.
        let deadline = if depth == 1 {
            None
        } else {
            limits.move_time.map(|budget| Instant::now() + budget)
        };

        worker.ctx = SearchContext::new(Arc::clone(&stop))
            .with_deadline(deadline)
            .with_node_budget(node_budget);

        let result = lazy_smp::run_depth(pos, &mut worker, depth, preferred, opts.helper_threads);
        total_nodes += worker.ctx.nodes();

        match result {
            Some((best_move, score)) => {
                log::debug!(
                    "depth {depth}: {best_move} scoring {score} after {} nodes",
                    total_nodes,
                );
                completed = Some((best_move, score, depth));
                preferred = Some(best_move);
                if is_mate_score(score) {
                    stop_cause = StopCause::MateFound;
                    break;
                }
            }
            None => {
                stop_cause = if worker.ctx.operator_stopped() {
                    StopCause::OperatorStop
                } else if node_budget.is_some_and(|budget| worker.ctx.nodes() >= budget) {
                    StopCause::NodeBudget
                } else {
                    StopCause::Deadline
                };
                break;
            }
        }
    }

    let (best_move, score, depth) = completed.ok_or(EngineError::Cancelled)?;
    let elapsed = started.elapsed();
    let seconds = elapsed.as_secs_f64();
    let nodes_per_second = if seconds > 0.0 {
        total_nodes as f64 / seconds
    } else {
        0.0
    };

    Ok(SearchReport {
        best_move,
        score,
        depth,
        nodes: total_nodes,
        elapsed,
        nodes_per_second,
        stop_cause,
        cache: cache.stats(),
    })
}
