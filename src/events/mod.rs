//! # Events Module
//!
//! Event-driven duplicate and progress reporting.
//!
//! The dedup store is constructed with an [`EventSender`]; every duplicate
//! resolution is published as an [`Event::Duplicate`] notification, which is
//! how the orchestrator's replacement map and the CLI's reporting both stay
//! out of the store itself.

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::{
    Event, IngestEvent, IngestProgress, MergeEvent, MergeSummary, RewriteEvent,
};
