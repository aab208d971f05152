//! Engine facade tying the selection pipeline together.
//!
//! A selection consults the opening book first, then the endgame tablebase
//! for small positions, and falls back to the iterative-deepening search.
//! The facade owns the transposition cache, so consecutive selections in the
//! same game reuse earlier work, and exposes a stop handle another thread
//! can raise to interrupt a running search.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chess::ChessMove;
use rand::rng;

use crate::errors::EngineError;
use crate::evaluation::board_scoring::{BoardScorer, PieceSquareScorer};
use crate::position::position::Position;
use crate::search::iterative_deepening::{self, SearchReport};
use crate::search::options::{SearchLimits, SearchOptions};
use crate::search::transposition::{TranspositionCache, DEFAULT_CACHE_CAPACITY};
use crate::tables::endgame_tablebase::TablebaseClient;
use crate::tables::opening_book::OpeningBook;

/// Where a chosen move came from.
#[derive(Debug, Clone)]
pub enum MoveOrigin {
    Book,
    Tablebase { verdict: String },
    Search(SearchReport),
}

#[derive(Debug, Clone)]
pub struct MoveChoice {
    pub best_move: ChessMove,
    pub origin: MoveOrigin,
}

pub struct Engine {
    scorer: Box<dyn BoardScorer>,
    cache: TranspositionCache,
    book: Option<OpeningBook>,
    tablebase: Option<TablebaseClient>,
    options: SearchOptions,
    stop: Arc<AtomicBool>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Box::new(PieceSquareScorer))
    }
}

impl Engine {
    pub fn new(scorer: Box<dyn BoardScorer>) -> Self {
        Self {
            scorer,
            cache: TranspositionCache::new(DEFAULT_CACHE_CAPACITY),
            book: None,
            tablebase: None,
            options: SearchOptions::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = TranspositionCache::new(capacity);
        self
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_book(mut self, book: OpeningBook) -> Self {
        self.book = Some(book);
        self
    }

    pub fn with_tablebase(mut self, tablebase: TablebaseClient) -> Self {
        self.tablebase = Some(tablebase);
        self
    }

    /// Flag another thread can raise to stop a running selection.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn cache(&self) -> &TranspositionCache {
        &self.cache
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Forget state carried over from the previous game.
    pub fn new_game(&self) {
        self.cache.clear();
    }

    /// Pick a move for `pos` within `limits`.
    ///
    /// Fails with [`EngineError::NoLegalMoves`] when the game is over, and
    /// with [`EngineError::Cancelled`] when a stop interrupted the selection
    /// before any answer was found.
    pub fn select_move(
        &self,
        pos: &mut Position,
        limits: &SearchLimits,
    ) -> Result<MoveChoice, EngineError> {
        if pos.legal_moves().is_empty() {
            return Err(EngineError::NoLegalMoves);
        }
        self.stop.store(false, Ordering::Relaxed);

        if let Some(book) = &self.book {
            let mut rng = rng();
            if let Some(best_move) = book.choose_move(pos, &mut rng) {
                log::info!("book answers with {best_move}");
                return Ok(MoveChoice {
                    best_move,
                    origin: MoveOrigin::Book,
                });
            }
        }

        if let Some(tablebase) = &self.tablebase {
            if tablebase.applies_to(pos) {
                match tablebase.probe(pos) {
                    Ok(advice) => {
                        log::info!(
                            "tablebase answers with {} ({})",
                            advice.best_move,
                            advice.verdict,
                        );
                        return Ok(MoveChoice {
                            best_move: advice.best_move,
                            origin: MoveOrigin::Tablebase {
                                verdict: advice.verdict,
                            },
                        });
                    }
                    Err(err) => {
                        log::warn!("tablebase probe failed: {err}; searching instead");
                    }
                }
            }
        }

        let report = iterative_deepening::run(
            pos,
            self.scorer.as_ref(),
            &self.cache,
            &self.options,
            limits,
            Arc::clone(&self.stop),
        )?;
        Ok(MoveChoice {
            best_move: report.best_move,
            origin: MoveOrigin::Search(report),
        })
    }

    /// Persist the transposition cache, tagged with the scorer it was built
    /// under.
    pub fn save_cache(&self, path: &Path) -> Result<(), EngineError> {
        self.cache.save_to_path(path, self.scorer.identifier())
    }

    /// Restore a previously saved cache; entries built under a different
    /// scorer are discarded.
    pub fn load_cache(&self, path: &Path) -> Result<usize, EngineError> {
        self.cache.load_from_path(path, self.scorer.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::position::move_from_text;

    fn book_of(tsv: &str) -> OpeningBook {
        OpeningBook::from_tsv_str(tsv).expect("book parses")
    }

    #[test]
    fn book_move_wins_over_search() {
        let engine = Engine::default().with_book(book_of("uci\ne2e4\n"));
        let mut pos = Position::new();
        let choice = engine
            .select_move(&mut pos, &SearchLimits::depth(2))
            .expect("selection succeeds");

        assert!(matches!(choice.origin, MoveOrigin::Book));
        assert_eq!(choice.best_move, move_from_text("e2e4").expect("parses"));
    }

    #[test]
    fn search_answers_when_the_book_is_silent() {
        let engine = Engine::default().with_book(book_of("uci\ne2e4\n"));
        let mut pos = Position::new();
        pos.push(move_from_text("d2d4").expect("parses"));

        let choice = engine
            .select_move(&mut pos, &SearchLimits::depth(2))
            .expect("selection succeeds");
        match choice.origin {
            MoveOrigin::Search(report) => assert!(report.depth >= 1),
            other => panic!("expected a search answer, got {other:?}"),
        }
        assert!(pos.legal_moves().contains(&choice.best_move));
    }

    #[test]
    fn finished_games_are_rejected() {
        let mut pos = Position::new();
        for text in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            pos.push(move_from_text(text).expect("parses"));
        }
        let engine = Engine::default();
        let result = engine.select_move(&mut pos, &SearchLimits::depth(2));
        assert!(matches!(result, Err(EngineError::NoLegalMoves)));
    }

    #[test]
    fn new_game_clears_cached_search_state() {
        let engine = Engine::default();
        let mut pos = Position::new();
        engine
            .select_move(&mut pos, &SearchLimits::depth(3))
            .expect("selection succeeds");
        assert!(engine.cache().occupied() > 0);

        engine.new_game();
        assert_eq!(engine.cache().occupied(), 0);
    }

    #[test]
    fn consecutive_selections_share_the_cache() {
        let engine = Engine::default();
        let mut pos = Position::new();
        let first = engine
            .select_move(&mut pos, &SearchLimits::depth(3))
            .expect("selection succeeds");
        let second = engine
            .select_move(&mut pos, &SearchLimits::depth(3))
            .expect("selection succeeds");

        let (MoveOrigin::Search(first), MoveOrigin::Search(second)) =
            (first.origin, second.origin)
        else {
            panic!("expected search answers");
        };
        assert_eq!(first.best_move, second.best_move);
        assert_eq!(first.score, second.score);
        assert!(second.nodes <= first.nodes);
    }
}
