//! # Image Model
//!
//! Value types for a single image carried by a book record.
//!
//! Two images are "the same image" iff content hash *and* file name match:
//! identical pixel content distributed under different names is treated as
//! distinct assets for export purposes, even though book-level duplicate
//! classification compares hash sets only.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use xxhash_rust::xxh3::xxh3_64;

/// A single image: the cover or one interior illustration.
///
/// During ingestion only `hash` (and possibly `file_name`) is populated;
/// `body` is resolved on demand from the source archive.
#[derive(Debug, Clone, Default)]
pub struct ImageItem {
    /// File name of the image inside its archive volume
    pub file_name: String,
    /// Raw image bytes; empty until resolved
    pub body: Vec<u8>,
    /// Timestamp of the source entry, when known
    pub timestamp: Option<DateTime<Utc>>,
    /// Content hash, the identity half that matters for classification
    pub hash: String,
    /// Perceptual hash. Carried but not consulted by the comparator;
    /// reserved for a future near-duplicate extension.
    pub phash: u64,
}

impl ImageItem {
    /// An image known only by its content hash (the ingestion-phase form).
    pub fn from_hash(hash: impl AsRef<str>) -> Self {
        Self {
            hash: hash.as_ref().to_string(),
            ..Self::default()
        }
    }

    /// An image with resolved bytes, hashed from its content.
    pub fn with_body(file_name: impl Into<String>, body: Vec<u8>) -> Self {
        let hash = content_hash(&body);
        Self {
            file_name: file_name.into(),
            body,
            hash,
            ..Self::default()
        }
    }
}

/// The image identity key: `(content hash, file name)`.
///
/// Kept as an explicit named comparison so the ordering invariant of the
/// per-book image set stays self-documenting.
pub fn compare_by_identity(lhs: &ImageItem, rhs: &ImageItem) -> Ordering {
    lhs.hash
        .cmp(&rhs.hash)
        .then_with(|| lhs.file_name.cmp(&rhs.file_name))
}

impl PartialEq for ImageItem {
    fn eq(&self, other: &Self) -> bool {
        compare_by_identity(self, other) == Ordering::Equal
    }
}

impl Eq for ImageItem {}

impl PartialOrd for ImageItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageItem {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_by_identity(self, other)
    }
}

/// Content hash of raw bytes, formatted the way the hash indexes carry it.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn identity_is_hash_then_file_name() {
        let a = ImageItem {
            file_name: "a.jpg".into(),
            hash: "01".into(),
            ..ImageItem::default()
        };
        let b = ImageItem {
            file_name: "b.jpg".into(),
            hash: "01".into(),
            ..ImageItem::default()
        };
        let c = ImageItem {
            file_name: "a.jpg".into(),
            hash: "02".into(),
            ..ImageItem::default()
        };

        assert!(a < b, "same hash orders by file name");
        assert!(b < c, "hash dominates file name");
        assert_ne!(a, b, "same content under a different name is a distinct asset");
    }

    #[test]
    fn body_does_not_affect_identity() {
        let bare = ImageItem::from_hash("0a0b");
        let mut resolved = bare.clone();
        resolved.body = vec![1, 2, 3];
        assert_eq!(bare, resolved);
    }

    #[test]
    fn set_deduplicates_by_identity_key() {
        let mut images = BTreeSet::new();
        images.insert(ImageItem::from_hash("01"));
        images.insert(ImageItem::from_hash("01"));
        images.insert(ImageItem::from_hash("02"));
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash(b"cover"), content_hash(b"cover"));
        assert_ne!(content_hash(b"cover"), content_hash(b"page"));
        assert_eq!(content_hash(b"cover").len(), 16);
    }
}
