//! Core merge engine, UI-agnostic.
//!
//! - `image`, `book` - the identity model (content hashes, uids)
//! - `compare` - the four-outcome image-set comparator
//! - `store` - the hash-bucketed dedup store
//! - `index` - hash-index codec (JSON Lines)
//! - `taxonomy` - depth-encoded classification codec
//! - `volume` - the archive collaborator
//! - `merge` - the run orchestrator

pub mod book;
pub mod compare;
pub mod image;
pub mod index;
pub mod merge;
pub mod store;
pub mod taxonomy;
pub mod volume;
