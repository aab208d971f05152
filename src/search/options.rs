//! Tunable search parameters and per-call limits.
//!
//! Everything here is heuristic tuning, not correctness: any combination of
//! settings must still return the same move for the same position and
//! limits. Defaults follow conventional centipawn margins.

use std::time::Duration;

/// Hard ceiling on deepening rounds; killer tables and ply counters are
/// sized for it.
pub const MAX_SEARCH_DEPTH: u8 = 64;

/// Null-move pruning gates.
#[derive(Debug, Clone)]
pub struct NullMoveOptions {
    pub enabled: bool,
    /// Minimum remaining depth before a null-move probe is considered.
    pub min_depth: u8,
    pub base_reduction: u8,
    pub deep_reduction: u8,
    /// Remaining depth at which the deeper reduction kicks in.
    pub deep_depth: u8,
}

impl NullMoveOptions {
    pub fn reduction(&self, depth: u8) -> u8 {
        if depth >= self.deep_depth {
            self.deep_reduction
        } else {
            self.base_reduction
        }
    }
}

impl Default for NullMoveOptions {
    fn default() -> Self {
        NullMoveOptions {
            enabled: true,
            min_depth: 3,
            base_reduction: 2,
            deep_reduction: 3,
            deep_depth: 6,
        }
    }
}

/// Frontier futility margins, indexed by remaining depth.
#[derive(Debug, Clone)]
pub struct FutilityOptions {
    pub enabled: bool,
    pub margins: [i32; 3],
}

impl FutilityOptions {
    /// Margin for `depth`, or `None` when futility does not apply there.
    pub fn margin(&self, depth: u8) -> Option<i32> {
        if !self.enabled || depth == 0 {
            return None;
        }
        self.margins.get(depth as usize).copied()
    }
}

impl Default for FutilityOptions {
    fn default() -> Self {
        FutilityOptions {
            enabled: true,
            margins: [0, 300, 500],
        }
    }
}

/// Late move reduction gates.
#[derive(Debug, Clone)]
pub struct LmrOptions {
    pub enabled: bool,
    pub min_depth: u8,
    /// Index in the ordered move list from which reductions start.
    pub min_move_index: usize,
    pub reduction: u8,
}

impl Default for LmrOptions {
    fn default() -> Self {
        LmrOptions {
            enabled: true,
            min_depth: 3,
            min_move_index: 4,
            reduction: 1,
        }
    }
}

/// Quiescence bounds.
#[derive(Debug, Clone)]
pub struct QuiescenceOptions {
    /// Extra plies past the horizon before standing pat unconditionally.
    pub max_ply: u8,
    /// Slack added to the best-case material swing in delta pruning.
    pub delta_margin: i32,
    /// Material upside credited to a promotion when delta pruning.
    pub promotion_bonus: i32,
}

impl Default for QuiescenceOptions {
    fn default() -> Self {
        QuiescenceOptions {
            max_ply: 10,
            delta_margin: 200,
            promotion_bonus: 775,
        }
    }
}

/// Check, recapture, and seventh-rank-pawn extensions (at most one ply per
/// node).
#[derive(Debug, Clone)]
pub struct ExtensionOptions {
    pub enabled: bool,
}

impl Default for ExtensionOptions {
    fn default() -> Self {
        ExtensionOptions { enabled: true }
    }
}

/// Everything the search consults while running.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub null_move: NullMoveOptions,
    pub futility: FutilityOptions,
    pub lmr: LmrOptions,
    pub quiescence: QuiescenceOptions,
    pub extensions: ExtensionOptions,
    /// Extra threads searching the same position alongside the main one.
    pub helper_threads: usize,
}

/// Caller-facing budget for one move selection.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    pub max_depth: u8,
    /// Budget granted to each deepening round. A round that starts may run
    /// this long before the cooperative stop trips mid-round.
    pub move_time: Option<Duration>,
    pub max_nodes: Option<u64>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            max_depth: 8,
            move_time: None,
            max_nodes: None,
        }
    }
}

impl SearchLimits {
    pub fn depth(max_depth: u8) -> Self {
        SearchLimits {
            max_depth,
            ..Default::default()
        }
    }

    pub fn timed(move_time: Duration) -> Self {
        SearchLimits {
            max_depth: MAX_SEARCH_DEPTH,
            move_time: Some(move_time),
            max_nodes: None,
        }
    }

    pub fn nodes(max_nodes: u64) -> Self {
        SearchLimits {
            max_depth: MAX_SEARCH_DEPTH,
            move_time: None,
            max_nodes: Some(max_nodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_move_reduction_deepens_with_depth() {
        let opts = NullMoveOptions::default();
        assert_eq!(opts.reduction(3), 2);
        assert_eq!(opts.reduction(5), 2);
        assert_eq!(opts.reduction(6), 3);
    }

    #[test]
    fn futility_margin_only_near_the_frontier() {
        let opts = FutilityOptions::default();
        assert_eq!(opts.margin(0), None);
        assert_eq!(opts.margin(1), Some(300));
        assert_eq!(opts.margin(2), Some(500));
        assert_eq!(opts.margin(3), None);

        let disabled = FutilityOptions {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(disabled.margin(1), None);
    }

    #[test]
    fn limit_constructors_fill_the_rest() {
        let timed = SearchLimits::timed(Duration::from_millis(50));
        assert_eq!(timed.max_depth, MAX_SEARCH_DEPTH);
        assert!(timed.max_nodes.is_none());

        let by_depth = SearchLimits::depth(5);
        assert_eq!(by_depth.max_depth, 5);
        assert!(by_depth.move_time.is_none());
    }
}
