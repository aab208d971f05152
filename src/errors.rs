//! Errors surfaced by the engine's fallible edges.
//!
//! The recursive search itself does not fail: cancellation travels through the
//! call stack as an `Option` and every position mutation is reverted by a
//! scoped guard before the unwind reaches the caller. What can fail are the
//! boundaries: parsing FEN or coordinate move text, loading or saving the
//! persisted cache document, reading an opening book, and querying the
//! endgame tablebase service. All of those return `Result<_, EngineError>`.
//!
//! Callers should match on `EngineError` to decide between user-facing
//! messages (parse variants), retry/degrade handling (tablebase variants),
//! and propagation (IO and document variants, which keep their underlying
//! error as `source`).

use std::error::Error;
use std::fmt;

/// Unified error type for the engine crate.
#[derive(Debug)]
pub enum EngineError {
    /// The provided FEN string could not be parsed into a position.
    InvalidFen(String),
    /// A coordinate move string (for example `e2e4` or `e7e8q`) could not be
    /// parsed.
    InvalidMoveText(String),
    /// The search was cancelled by the operator before any depth completed,
    /// so there is no move to report.
    Cancelled,
    /// A move was requested for a position with no legal moves.
    NoLegalMoves,
    /// An opening-book document was malformed. Payload: line number and
    /// reason.
    BookFormat(usize, String),
    /// The persisted cache document was structurally valid JSON but not a
    /// usable document (wrong format version, for example).
    CacheDocument(String),
    /// JSON (de)serialization of the persisted cache document failed.
    CacheSerde(serde_json::Error),
    /// Reading or writing a file failed.
    Io(std::io::Error),
    /// The tablebase HTTP request failed (transport error or non-success
    /// status).
    TablebaseHttp(reqwest::Error),
    /// The tablebase answered with a payload the client could not use
    /// (missing fields, empty move list).
    TablebasePayload(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidFen(fen) => write!(f, "invalid FEN string: {fen}"),
            EngineError::InvalidMoveText(text) => {
                write!(f, "invalid coordinate move text: {text}")
            }
            EngineError::Cancelled => write!(f, "search cancelled before any depth completed"),
            EngineError::NoLegalMoves => write!(f, "position has no legal moves"),
            EngineError::BookFormat(line, reason) => {
                write!(f, "opening book line {line}: {reason}")
            }
            EngineError::CacheDocument(reason) => {
                write!(f, "unusable cache document: {reason}")
            }
            EngineError::CacheSerde(err) => write!(f, "cache document JSON error: {err}"),
            EngineError::Io(err) => write!(f, "io error: {err}"),
            EngineError::TablebaseHttp(err) => write!(f, "tablebase request failed: {err}"),
            EngineError::TablebasePayload(reason) => {
                write!(f, "tablebase payload unusable: {reason}")
            }
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::CacheSerde(err) => Some(err),
            EngineError::Io(err) => Some(err),
            EngineError::TablebaseHttp(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::CacheSerde(err)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::TablebaseHttp(err)
    }
}
