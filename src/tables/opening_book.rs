//! Opening-book support with TSV import compatible with public opening datasets.
//!
//! Book lines load from a tab-separated file and are indexed by position
//! fingerprint, so every position along a line answers and transposing move
//! orders share their entries. Selection is uniform over the distinct
//! continuations recorded for the current position.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chess::ChessMove;
use rand::Rng;

use crate::errors::EngineError;
use crate::position::position::{move_from_text, Position};

/// Plies from the game start after which the book stops answering.
pub const DEFAULT_BOOK_PLY_LIMIT: usize = 20;

#[derive(Debug, Clone)]
pub struct OpeningBook {
    by_fingerprint: HashMap<u64, Vec<ChessMove>>,
    max_ply: usize,
}

impl Default for OpeningBook {
    fn default() -> Self {
        Self {
            by_fingerprint: HashMap::new(),
            max_ply: DEFAULT_BOOK_PLY_LIMIT,
        }
    }
}

impl OpeningBook {
    /// Load the book from `tables/openings.tsv` when present, otherwise fall
    /// back to the embedded default table. A candidate file that exists but
    /// does not parse is logged and skipped rather than aborting startup.
    pub fn load_default() -> Self {
        for candidate in ["tables/openings.tsv", "tables/chess-openings.tsv"] {
            if let Some(book) = Self::load_candidate(Path::new(candidate)) {
                return book;
            }
        }

        Self::from_tsv_str(include_str!("data/openings.tsv")).unwrap_or_default()
    }

    fn load_candidate(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::from_tsv_path(path) {
            Ok(book) => Some(book),
            Err(err) => {
                log::warn!(
                    "opening book at {} failed to load: {err}; using the embedded book",
                    path.display(),
                );
                None
            }
        }
    }

    pub fn from_tsv_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let data = fs::read_to_string(path)?;
        Self::from_tsv_str(&data)
    }

    /// Parse a TSV table whose header names a `uci` (or `moves`) column of
    /// space-separated coordinate moves. Every row replays from the standard
    /// start, so each position along a line is indexed, and an unparsable or
    /// illegal move fails with the offending line number.
    pub fn from_tsv_str(tsv: &str) -> Result<Self, EngineError> {
        let mut rows = tsv
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = rows
            .next()
            .ok_or_else(|| EngineError::BookFormat(0, "opening TSV is empty".to_owned()))?;
        let sequence_idx = header
            .split('\t')
            .position(|name| {
                let lc = name.trim().to_ascii_lowercase();
                lc == "uci" || lc == "moves"
            })
            .ok_or_else(|| {
                EngineError::BookFormat(
                    1,
                    "opening TSV must contain a 'uci' or 'moves' column".to_owned(),
                )
            })?;

        let mut by_fingerprint: HashMap<u64, Vec<ChessMove>> = HashMap::new();

        for (index, line) in rows {
            let line_number = index + 1;
            let fields: Vec<&str> = line.split('\t').collect();
            let sequence = fields
                .get(sequence_idx)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    EngineError::BookFormat(line_number, "missing move sequence".to_owned())
                })?;

            let mut pos = Position::new();
            for token in sequence.split_whitespace() {
                let mv = move_from_text(token).map_err(|err| {
                    EngineError::BookFormat(line_number, format!("move '{token}': {err}"))
                })?;
                if !pos.board().legal(mv) {
                    return Err(EngineError::BookFormat(
                        line_number,
                        format!("move '{token}' is not legal at ply {}", pos.ply()),
                    ));
                }

                let continuations = by_fingerprint.entry(pos.fingerprint()).or_default();
                if !continuations.contains(&mv) {
                    continuations.push(mv);
                }

                pos.push(mv);
            }
        }

        Ok(Self {
            by_fingerprint,
            max_ply: DEFAULT_BOOK_PLY_LIMIT,
        })
    }

    pub fn with_max_ply(mut self, max_ply: usize) -> Self {
        self.max_ply = max_ply;
        self
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }

    /// Distinct continuations recorded for `pos`, in first-seen order.
    pub fn moves_for(&self, pos: &Position) -> Option<&[ChessMove]> {
        self.by_fingerprint
            .get(&pos.fingerprint())
            .map(|v| v.as_slice())
    }

    /// Pick uniformly among the distinct book continuations for `pos`.
    ///
    /// Candidates are filtered for legality in the live position, which
    /// guards against fingerprint collisions between distinct positions.
    pub fn choose_move<R: Rng + ?Sized>(&self, pos: &Position, rng: &mut R) -> Option<ChessMove> {
        if pos.ply() >= self.max_ply {
            return None;
        }
        let moves: Vec<ChessMove> = self
            .moves_for(pos)?
            .iter()
            .copied()
            .filter(|&mv| pos.board().legal(mv))
            .collect();
        if moves.is_empty() {
            return None;
        }
        Some(moves[rng.random_range(0..moves.len())])
    }
}
