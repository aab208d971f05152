//! Shared transposition cache.
//!
//! Entries live in a fixed power-of-two table of atomic slot pairs. Each
//! slot holds a packed payload word and a verification word equal to the
//! position fingerprint XORed with that payload. A probe recomputes the XOR
//! and accepts the slot only when it matches, so an index collision between
//! different fingerprints, or a payload and verification word written by two
//! different threads, reads back as a miss rather than as wrong data. All
//! slot traffic uses relaxed atomics; the verification word is what makes
//! torn pairs harmless.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chess::{ChessMove, Piece, ALL_SQUARES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::evaluation::board_scoring::MATE_THRESHOLD;
use crate::position::position::{move_from_text, move_to_text};

/// How a cached score relates to the true value of its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Score is the exact search value.
    Exact,
    /// Search failed high; the true value is at least this score.
    Lower,
    /// Search failed low; the true value is at most this score.
    Upper,
}

/// One cached search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub fingerprint: u64,
    pub depth: u8,
    /// Node-relative score; mate scores are distance-adjusted before storage
    /// with [`score_for_storage`].
    pub score: i32,
    pub bound: Bound,
    pub best_move: Option<ChessMove>,
}

/// Probe and store counters since creation or the last [`TranspositionCache::clear`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

/// An existing entry survives a store only when it is more than this much
/// deeper than the incoming one.
pub const DEPTH_REPLACE_MARGIN: u8 = 2;

pub const DEFAULT_CACHE_CAPACITY: usize = 1 << 20;

/// Entry bound applied by [`TranspositionCache::save_to_writer`] before
/// serializing, keeping saved documents a manageable size.
pub const DEFAULT_SAVE_BOUND: usize = 1 << 16;

// Payload layout: bits 0..16 move (source, dest, promotion), 16..32 score as
// i16, 32..40 depth, 40..42 bound (nonzero, so an all-zero slot is empty),
// bit 42 move-present.
const SCORE_SHIFT: u32 = 16;
const DEPTH_SHIFT: u32 = 32;
const BOUND_SHIFT: u32 = 40;
const MOVE_PRESENT: u64 = 1 << 42;

/// Translate a node score into its stored form: mate scores become mate
/// distances relative to the entry's own node instead of the search root.
pub fn score_for_storage(score: i32, ply: u8) -> i32 {
    if score >= MATE_THRESHOLD {
        score + ply as i32
    } else if score <= -MATE_THRESHOLD {
        score - ply as i32
    } else {
        score
    }
}

/// Inverse of [`score_for_storage`] for the probing node's ply.
pub fn score_from_storage(score: i32, ply: u8) -> i32 {
    if score >= MATE_THRESHOLD {
        score - ply as i32
    } else if score <= -MATE_THRESHOLD {
        score + ply as i32
    } else {
        score
    }
}

fn bound_bits(bound: Bound) -> u64 {
    match bound {
        Bound::Exact => 1,
        Bound::Lower => 2,
        Bound::Upper => 3,
    }
}

fn move_bits(mv: ChessMove) -> u64 {
    let promo = match mv.get_promotion() {
        None => 0u64,
        Some(Piece::Knight) => 1,
        Some(Piece::Bishop) => 2,
        Some(Piece::Rook) => 3,
        _ => 4,
    };
    mv.get_source().to_index() as u64 | (mv.get_dest().to_index() as u64) << 6 | promo << 12
}

fn pack(entry: &CacheEntry) -> u64 {
    debug_assert!(
        i32::from(entry.score as i16) == entry.score,
        "cache scores must fit in 16 bits",
    );
    let mut data = u64::from(entry.score as i16 as u16) << SCORE_SHIFT
        | u64::from(entry.depth) << DEPTH_SHIFT
        | bound_bits(entry.bound) << BOUND_SHIFT;
    if let Some(mv) = entry.best_move {
        data |= MOVE_PRESENT | move_bits(mv);
    }
    data
}

fn unpack(fingerprint: u64, data: u64) -> Option<CacheEntry> {
    let bound = match (data >> BOUND_SHIFT) & 0b11 {
        1 => Bound::Exact,
        2 => Bound::Lower,
        3 => Bound::Upper,
        _ => return None,
    };
    let best_move = if data & MOVE_PRESENT != 0 {
        let source = ALL_SQUARES[(data & 0x3F) as usize];
        let dest = ALL_SQUARES[((data >> 6) & 0x3F) as usize];
        let promotion = match (data >> 12) & 0b111 {
            1 => Some(Piece::Knight),
            2 => Some(Piece::Bishop),
            3 => Some(Piece::Rook),
            4 => Some(Piece::Queen),
            _ => None,
        };
        Some(ChessMove::new(source, dest, promotion))
    } else {
        None
    };
    Some(CacheEntry {
        fingerprint,
        depth: ((data >> DEPTH_SHIFT) & 0xFF) as u8,
        score: i32::from(((data >> SCORE_SHIFT) & 0xFFFF) as u16 as i16),
        bound,
        best_move,
    })
}

struct Slot {
    check: AtomicU64,
    data: AtomicU64,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            check: AtomicU64::new(0),
            data: AtomicU64::new(0),
        }
    }
}

/// Fixed-size shared cache of search results, safe to probe and store from
/// any number of threads without locks.
pub struct TranspositionCache {
    slots: Vec<Slot>,
    mask: usize,
    save_bound: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl TranspositionCache {
    /// Build a cache with at least `capacity` slots, rounded up to a power
    /// of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::empty);
        TranspositionCache {
            slots,
            mask: capacity - 1,
            save_bound: DEFAULT_SAVE_BOUND,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        }
    }

    /// Cap the number of entries kept when saving.
    pub fn with_save_bound(mut self, bound: usize) -> Self {
        self.save_bound = bound.max(1);
        self
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot_for(&self, fingerprint: u64) -> &Slot {
        &self.slots[fingerprint as usize & self.mask]
    }

    /// Look up `fingerprint`. Misses on empty slots, on slots holding a
    /// different fingerprint, and on torn slot pairs.
    pub fn probe(&self, fingerprint: u64) -> Option<CacheEntry> {
        let slot = self.slot_for(fingerprint);
        let check = slot.check.load(Ordering::Relaxed);
        let data = slot.data.load(Ordering::Relaxed);
        let entry = if check ^ data == fingerprint {
            unpack(fingerprint, data)
        } else {
            None
        };
        match entry {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `entry`. The incumbent survives only when it holds the same
    /// position more than [`DEPTH_REPLACE_MARGIN`] deeper than the newcomer;
    /// an entry for a different position is always overwritten.
    pub fn store(&self, entry: CacheEntry) {
        let slot = self.slot_for(entry.fingerprint);
        let check = slot.check.load(Ordering::Relaxed);
        let existing = slot.data.load(Ordering::Relaxed);
        if (existing >> BOUND_SHIFT) & 0b11 != 0 && check ^ existing == entry.fingerprint {
            let existing_depth = ((existing >> DEPTH_SHIFT) & 0xFF) as i32;
            if existing_depth > i32::from(entry.depth) + i32::from(DEPTH_REPLACE_MARGIN) {
                return;
            }
        }
        self.write_slot(&entry);
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    fn write_slot(&self, entry: &CacheEntry) {
        let slot = self.slot_for(entry.fingerprint);
        let data = pack(entry);
        slot.data.store(data, Ordering::Relaxed);
        slot.check.store(entry.fingerprint ^ data, Ordering::Relaxed);
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        for slot in &self.slots {
            slot.data.store(0, Ordering::Relaxed);
            slot.check.store(0, Ordering::Relaxed);
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stores.store(0, Ordering::Relaxed);
    }

    /// Keep only the `keep` deepest entries, dropping the rest.
    pub fn skim(&self, keep: usize) {
        let mut entries = self.snapshot();
        if entries.len() <= keep {
            return;
        }
        entries.sort_by(|a, b| b.depth.cmp(&a.depth));
        entries.truncate(keep);
        for slot in &self.slots {
            slot.data.store(0, Ordering::Relaxed);
            slot.check.store(0, Ordering::Relaxed);
        }
        for entry in &entries {
            self.write_slot(entry);
        }
    }

    /// Number of occupied slots. Walks the whole table.
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| (slot.data.load(Ordering::Relaxed) >> BOUND_SHIFT) & 0b11 != 0)
            .count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
        }
    }

    /// Decode every occupied slot; fingerprints are recovered from the
    /// verification words.
    fn snapshot(&self) -> Vec<CacheEntry> {
        let mut entries = Vec::new();
        for slot in &self.slots {
            let check = slot.check.load(Ordering::Relaxed);
            let data = slot.data.load(Ordering::Relaxed);
            if let Some(entry) = unpack(check ^ data, data) {
                entries.push(entry);
            }
        }
        entries
    }

    /// Serialize the current contents as a JSON document tagged with the
    /// scorer that produced the scores. The table is first skimmed to the
    /// configured save bound so the document stays small enough to reload
    /// quickly.
    pub fn save_to_writer<W: Write>(&self, writer: W, evaluator: &str) -> Result<(), EngineError> {
        self.skim(self.save_bound);
        let document = CacheDocument {
            format_version: FORMAT_VERSION,
            evaluator: evaluator.to_string(),
            saved_at: Utc::now(),
            entries: self
                .snapshot()
                .into_iter()
                .map(PersistedEntry::from)
                .collect(),
        };
        serde_json::to_writer(writer, &document)?;
        Ok(())
    }

    /// Load a document produced by [`TranspositionCache::save_to_writer`].
    ///
    /// Returns the number of entries absorbed. A document written by a
    /// different scorer is discarded with a warning rather than poisoning
    /// lookups with incompatible scores; a structurally invalid document is
    /// an error.
    pub fn load_from_reader<R: Read>(
        &self,
        reader: R,
        evaluator: &str,
    ) -> Result<usize, EngineError> {
        let document: CacheDocument = serde_json::from_reader(reader)?;
        if document.format_version != FORMAT_VERSION {
            return Err(EngineError::CacheDocument(format!(
                "unsupported cache format version {}",
                document.format_version,
            )));
        }
        if document.evaluator != evaluator {
            log::warn!(
                "discarding cache document scored by {:?} (current scorer {:?})",
                document.evaluator,
                evaluator,
            );
            return Ok(0);
        }
        let mut loaded = 0;
        for persisted in document.entries {
            let entry = persisted.into_entry()?;
            self.store(entry);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn save_to_path(&self, path: &Path, evaluator: &str) -> Result<(), EngineError> {
        let file = File::create(path)?;
        self.save_to_writer(BufWriter::new(file), evaluator)
    }

    pub fn load_from_path(&self, path: &Path, evaluator: &str) -> Result<usize, EngineError> {
        let file = File::open(path)?;
        self.load_from_reader(BufReader::new(file), evaluator)
    }
}

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    format_version: u32,
    evaluator: String,
    saved_at: DateTime<Utc>,
    entries: Vec<PersistedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    fingerprint: u64,
    depth: u8,
    score: i32,
    bound: PersistedBound,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    best_move: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PersistedBound {
    Exact,
    Lowerbound,
    Upperbound,
}

impl From<CacheEntry> for PersistedEntry {
    fn from(entry: CacheEntry) -> Self {
        PersistedEntry {
            fingerprint: entry.fingerprint,
            depth: entry.depth,
            score: entry.score,
            bound: match entry.bound {
                Bound::Exact => PersistedBound::Exact,
                Bound::Lower => PersistedBound::Lowerbound,
                Bound::Upper => PersistedBound::Upperbound,
            },
            best_move: entry.best_move.map(move_to_text),
        }
    }
}

impl PersistedEntry {
    fn into_entry(self) -> Result<CacheEntry, EngineError> {
        if i32::from(self.score as i16) != self.score {
            return Err(EngineError::CacheDocument(format!(
                "score {} out of range for fingerprint {:#018x}",
                self.score, self.fingerprint,
            )));
        }
        let best_move = match self.best_move {
            Some(text) => Some(move_from_text(&text)?),
            None => None,
        };
        Ok(CacheEntry {
            fingerprint: self.fingerprint,
            depth: self.depth,
            score: self.score,
            bound: match self.bound {
                PersistedBound::Exact => Bound::Exact,
                PersistedBound::Lowerbound => Bound::Lower,
                PersistedBound::Upperbound => Bound::Upper,
            },
            best_move,
        })
    }
}
