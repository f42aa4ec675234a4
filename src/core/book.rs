//! # Book Identity
//!
//! The unique-book value type: the unit the dedup store accepts, rejects
//! or supersedes.

use crate::core::image::ImageItem;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// `(folder, file)` pair identifying a book's physical location in the
/// destination archive set. Two entries with an equal uid are the same
/// physical file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookUid {
    /// Archive volume name the payload lives in
    pub folder: String,
    /// Payload file name inside that volume
    pub file: String,
}

impl BookUid {
    pub fn new(folder: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file: file.into(),
        }
    }
}

impl fmt::Display for BookUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.file)
    }
}

/// One book record as the store sees it.
#[derive(Debug, Clone, Default)]
pub struct UniqueBook {
    /// Stable identity in the destination archive set
    pub uid: BookUid,
    /// Title tokens; display only, never part of the duplicate decision
    pub title: BTreeSet<String>,
    /// Bucket key the store indexes this entry under. Collisions across
    /// unrelated books are expected; the comparator resolves them.
    pub hash_text: String,
    /// Flattened classification tree, in the depth-encoded wire form
    pub hash_sections: Vec<String>,
    /// Cover image
    pub cover: ImageItem,
    /// Interior illustrations, ordered by the image identity key
    pub images: BTreeSet<ImageItem>,
    /// Bucket-local tie-break counter, assigned only when this entry is
    /// accepted as a new non-duplicate sibling in its bucket
    pub order: u32,
}

impl UniqueBook {
    /// Display title: the sorted token set joined with spaces.
    pub fn title_string(&self) -> String {
        self.title.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

/// The store bucket key ordering: by `hash_text`, ties broken by the
/// bucket-local `order` counter, then by uid for full determinism.
pub fn compare_by_bucket(lhs: &UniqueBook, rhs: &UniqueBook) -> Ordering {
    lhs.hash_text
        .cmp(&rhs.hash_text)
        .then_with(|| lhs.order.cmp(&rhs.order))
        .then_with(|| lhs.uid.folder.cmp(&rhs.uid.folder))
        .then_with(|| lhs.uid.file.cmp(&rhs.uid.file))
}
