//! Endgame tablebase probing over the public Lichess HTTP endpoint.
//!
//! A blocking client queries the standard-chess tablebase for positions with
//! few enough pieces and maps the payload to a recommended move plus a short
//! verdict. Probing is best-effort: the caller is expected to fall back to
//! its own search when the request fails.

use std::time::Duration;

use chess::ChessMove;
use serde::Deserialize;

use crate::errors::EngineError;
use crate::position::position::{move_from_text, Position};

const DEFAULT_BASE_URL: &str = "https://tablebase.lichess.ovh/standard";
const DEFAULT_PIECE_LIMIT: u32 = 7;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Tablebase answer for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablebaseAdvice {
    pub best_move: ChessMove,
    /// Outcome for the side to move, such as `win M12` or `draw`.
    pub verdict: String,
}

#[derive(Debug)]
pub struct TablebaseClient {
    base_url: String,
    piece_limit: u32,
    client: reqwest::blocking::Client,
}

impl TablebaseClient {
    pub fn new() -> Result<Self, EngineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            piece_limit: DEFAULT_PIECE_LIMIT,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Whether `pos` is small enough for the configured tablebase.
    pub fn applies_to(&self, pos: &Position) -> bool {
        pos.piece_count() <= self.piece_limit
    }

    /// Query the tablebase for `pos` and return its recommended move.
    pub fn probe(&self, pos: &Position) -> Result<TablebaseAdvice, EngineError> {
        let response: TablebaseResponse = self
            .client
            .get(&self.base_url)
            .query(&[("fen", pos.fen())])
            .send()?
            .error_for_status()?
            .json()?;
        advice_from_response(&response, pos)
    }
}

/// Payload shape of the Lichess tablebase endpoint. Moves arrive ordered
/// best-first for the side to move.
#[derive(Debug, Deserialize)]
struct TablebaseResponse {
    category: String,
    #[serde(default)]
    dtm: Option<i32>,
    #[serde(default)]
    moves: Vec<TablebaseMoveRow>,
}

#[derive(Debug, Deserialize)]
struct TablebaseMoveRow {
    uci: String,
}

fn advice_from_response(
    response: &TablebaseResponse,
    pos: &Position,
) -> Result<TablebaseAdvice, EngineError> {
    let first = response.moves.first().ok_or_else(|| {
        EngineError::TablebasePayload("tablebase answered with no moves".to_owned())
    })?;
    let best_move = move_from_text(&first.uci)
        .map_err(|err| EngineError::TablebasePayload(format!("move '{}': {err}", first.uci)))?;
    if !pos.board().legal(best_move) {
        return Err(EngineError::TablebasePayload(format!(
            "tablebase move '{}' is not legal here",
            first.uci,
        )));
    }

    let verdict = match response.dtm {
        Some(dtm) if dtm != 0 => {
            let mate_in = (dtm.abs() + 1) / 2;
            format!("{} M{mate_in}", response.category)
        }
        _ => response.category.clone(),
    };

    Ok(TablebaseAdvice { best_move, verdict })
}
