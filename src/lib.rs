//! # Book Collection Merger
//!
//! Consolidates overlapping archive snapshots of a digital-book collection
//! into a single deduplicated set.
//!
//! ## Core Philosophy
//! - **Resolve identity, not similarity** - a book is a duplicate only when its
//!   image-hash set proves it (equal to, or a strict subset of, a kept copy)
//! - **Keep the most complete copy** - a candidate carrying strictly more
//!   illustrations supersedes the copy it overlaps
//! - **All or nothing** - any I/O failure aborts the run; a partial merge is
//!   never left behind as authoritative
//!
//! ## Architecture
//! The library is split into a core engine (UI-agnostic) and presentation layers:
//! - `core` - the dedup store, comparator, codecs and merge orchestrator
//! - `events` - event-driven duplicate and progress reporting
//! - `error` - error types, one sub-enum per concern
//! - `cli` - command-line interface (binary crate)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{MergerError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
