//! Shared stop signals and node accounting for one deepening round.
//!
//! A fresh context is built per round so each round gets its own cancel
//! flag; the operator stop handle and the external stop flag outlive rounds.
//! All flag traffic is relaxed atomics: stop signals are advisory and a few
//! extra nodes after a signal are harmless.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SearchContext {
    /// Operator stop for the whole selection call.
    stop: Arc<AtomicBool>,
    /// Round-local cancel, tripped once the authoritative result is in.
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
    node_budget: Option<u64>,
    nodes: Arc<AtomicU64>,
}

impl SearchContext {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        SearchContext {
            stop,
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
            node_budget: None,
            nodes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_node_budget(mut self, node_budget: Option<u64>) -> Self {
        self.node_budget = node_budget;
        self
    }

    /// Context for a helper thread in the same round: shares the stop and
    /// cancel flags but counts its own nodes, which are discarded with the
    /// rest of the helper's output.
    pub fn helper_clone(&self) -> Self {
        SearchContext {
            stop: Arc::clone(&self.stop),
            cancel: Arc::clone(&self.cancel),
            deadline: self.deadline,
            node_budget: None,
            nodes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Trip the round-local cancel flag. Set once per round, never cleared.
    pub fn cancel_round(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// True when the operator asked the whole selection call to stop.
    pub fn operator_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// True when any stop source has tripped: operator stop, round cancel,
    /// a passed deadline, or an exhausted node budget.
    pub fn should_stop(&self) -> bool {
        if self.stop.load(Ordering::Relaxed) || self.cancel.load(Ordering::Relaxed) {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        if let Some(budget) = self.node_budget {
            if self.nodes.load(Ordering::Relaxed) >= budget {
                return true;
            }
        }
        false
    }

    #[inline]
    pub fn bump_node(&self) {
        self.nodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn operator_stop_trips_should_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = SearchContext::new(Arc::clone(&stop));
        assert!(!ctx.should_stop());
        stop.store(true, Ordering::Relaxed);
        assert!(ctx.should_stop());
        assert!(ctx.operator_stopped());
    }

    #[test]
    fn passed_deadline_trips_should_stop() {
        let ctx = SearchContext::new(Arc::new(AtomicBool::new(false)))
            .with_deadline(Some(Instant::now() - Duration::from_millis(1)));
        assert!(ctx.should_stop());
    }

    #[test]
    fn node_budget_trips_after_enough_bumps() {
        let ctx =
            SearchContext::new(Arc::new(AtomicBool::new(false))).with_node_budget(Some(3));
        assert!(!ctx.should_stop());
        for _ in 0..3 {
            ctx.bump_node();
        }
        assert!(ctx.should_stop());
    }

    #[test]
    fn helper_shares_cancel_but_not_node_count() {
        let ctx = SearchContext::new(Arc::new(AtomicBool::new(false)));
        ctx.bump_node();
        let helper = ctx.helper_clone();
        assert_eq!(helper.nodes(), 0);
        assert!(!helper.should_stop());
        ctx.cancel_round();
        assert!(helper.should_stop());
    }
}
