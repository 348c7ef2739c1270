//! Deterministic, pure logic shared by the conductor core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod dedup;
pub mod enrich;
pub mod report;
pub mod result;
pub mod selector;
pub mod snapshot;
pub mod summary;
pub mod types;
