//! Shared helpers for clausewise integration tests.
//!
//! - `TestHarness` owns a temp directory with an input folder and a SQLite
//!   database, and wires up the orchestrator and job queue on top of it
//! - `builders` produces PDF and DOCX fixtures in memory

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
