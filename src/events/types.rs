//! Event type definitions for duplicate and progress reporting.

use crate::core::book::BookUid;
use serde::{Deserialize, Serialize};

/// All events emitted by the merge pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Ingestion phase events (hash-index streaming into the store)
    Ingest(IngestEvent),
    /// A book record was classified as a duplicate of a kept original.
    ///
    /// This is the duplicate-observer notification: `original` is the entry
    /// that stays, `duplicate` the entry whose payload gets stripped.
    Duplicate { original: BookUid, duplicate: BookUid },
    /// Second-pass rewrite events
    Rewrite(RewriteEvent),
    /// Run-level events
    Merge(MergeEvent),
}

/// Events during the ingestion phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestEvent {
    /// Started streaming one archive's hash index
    Started { archive: String },
    /// Progress update within one archive
    Progress(IngestProgress),
    /// Finished streaming one archive's hash index
    Completed { archive: String, records: usize },
}

/// Progress information during ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestProgress {
    /// Archive currently being ingested
    pub archive: String,
    /// Records streamed so far for this archive
    pub records: usize,
    /// Duplicates detected so far across the whole run
    pub duplicates: usize,
}

/// Events during the second-pass archive rewriting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RewriteEvent {
    /// Started rewriting one archive and its hash index
    Started { archive: String },
    /// Finished rewriting one archive
    Completed { archive: String, removed: usize },
}

/// Run-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MergeEvent {
    /// The merge run has started
    Started { archives: usize },
    /// The merge run completed successfully
    Completed { summary: MergeSummary },
    /// The merge run encountered a fatal error
    Error { message: String },
}

/// Summary of a completed merge run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Number of archives processed
    pub archives: usize,
    /// Total book records streamed
    pub records: usize,
    /// Records kept as unique works
    pub kept: usize,
    /// Records rejected or superseded as duplicates
    pub duplicates: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}
