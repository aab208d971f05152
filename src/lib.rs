//! Crate root module declarations for the Rowan Chess engine project.
//!
//! This file exposes all top-level subsystems (position adapter, evaluation,
//! search, opening/endgame tables, and the engine facade) so binaries, tests,
//! and external tooling can import stable module paths.

pub mod errors;

pub mod position {
    pub mod position;
    pub mod zobrist;
}

pub mod evaluation {
    pub mod board_scoring;
}

pub mod search {
    pub mod alpha_beta;
    pub mod context;
    pub mod iterative_deepening;
    pub mod lazy_smp;
    pub mod move_ordering;
    pub mod options;
    pub mod quiescence;
    pub mod transposition;
}

pub mod tables {
    pub mod endgame_tablebase;
    pub mod opening_book;
}

pub mod engine;
