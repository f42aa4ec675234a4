//! # Comparator
//!
//! The four-outcome image-set relationship that resolves hash-bucket
//! collisions.
//!
//! The comparison runs over the union `{cover} ∪ images` of each side's
//! content hashes: re-exported scans sometimes relabel which image is "the
//! cover", so the cover participates as an ordinary member of the set.
//! Title tokens are never consulted.

use crate::core::book::UniqueBook;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Relationship between two books' image-hash sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetRelation {
    /// Identical hash sets: an exact duplicate
    Equal,
    /// The right side is a non-empty proper subset of the left: the left
    /// is the more complete copy, the right is redundant
    Inner,
    /// The left side is a non-empty proper subset of the right: the right
    /// supersedes the left
    Outer,
    /// Neither set contains the other: genuinely distinct works that
    /// happen to share a hash bucket
    Varied,
}

impl SetRelation {
    /// The relation seen from the other side.
    pub fn inverted(self) -> Self {
        match self {
            SetRelation::Inner => SetRelation::Outer,
            SetRelation::Outer => SetRelation::Inner,
            other => other,
        }
    }
}

impl std::fmt::Display for SetRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetRelation::Equal => write!(f, "equal"),
            SetRelation::Inner => write!(f, "inner"),
            SetRelation::Outer => write!(f, "outer"),
            SetRelation::Varied => write!(f, "varied"),
        }
    }
}

/// Compare the image-hash sets of two books.
///
/// Two books with no images at all are treated as distinct works, not
/// duplicates: an empty set proves nothing about identity.
pub fn compare_images(lhs: &UniqueBook, rhs: &UniqueBook) -> SetRelation {
    let a = hash_set(lhs);
    let b = hash_set(rhs);

    if a.is_empty() && b.is_empty() {
        return SetRelation::Varied;
    }
    if a == b {
        return SetRelation::Equal;
    }
    if !b.is_empty() && b.is_subset(&a) {
        return SetRelation::Inner;
    }
    if !a.is_empty() && a.is_subset(&b) {
        return SetRelation::Outer;
    }
    SetRelation::Varied
}

fn hash_set(book: &UniqueBook) -> BTreeSet<&str> {
    let mut set: BTreeSet<&str> = book
        .images
        .iter()
        .map(|image| image.hash.as_str())
        .collect();
    if !book.cover.hash.is_empty() {
        set.insert(book.cover.hash.as_str());
    }
    set
}
