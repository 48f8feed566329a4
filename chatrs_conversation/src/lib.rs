#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Multi-turn conversation pipeline.
//!
//! One turn runs load → trim → assemble → invoke → append → save against a
//! keyed session, in either blocking or streaming mode.
//!
//! # Key Features
//! - Token-budgeted history trimming that never splits a message
//! - Language-parameterised system directive
//! - Streaming turns that persist only once the stream is exhausted
//! - Per-session serialisation of concurrent turns

mod history;
mod lock;
mod manager;
mod prompt;

pub use history::HistoryTrimmer;
pub use lock::{SessionGuard, SessionLocks};
pub use manager::{
    ConversationConfig, TurnController, TurnError, TurnRequest, TurnState, TurnStream,
};
pub use prompt::{DEFAULT_DIRECTIVE_TEMPLATE, PromptAssembler};
