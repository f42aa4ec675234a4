//! # Dedup Store
//!
//! Hash-bucketed bookkeeping for one merge run: `old` entries loaded from
//! the destination's previous merge, `new` entries accepted during this run,
//! the `dup` audit list, and the `skip` redirect map.
//!
//! One store instance lives per run. It is mutated only through [`BookStore::add`],
//! which is serialized by a single mutex so any number of ingestion threads
//! may feed it; no I/O ever happens inside that critical section. The store
//! is finalized exactly once by [`BookStore::save`], which consumes it.

use crate::core::book::{compare_by_bucket, BookUid, UniqueBook};
use crate::core::compare::{compare_images, SetRelation};
use crate::core::image::ImageItem;
use crate::core::index::{self, MERGED_INDEX_FILE};
use crate::error::{ArchiveError, Result};
use crate::events::{Event, EventSender};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// File name of the duplicate/skip audit trail written next to the index.
pub const AUDIT_FILE: &str = "merge-audit.json";

/// Outcome of one [`BookStore::add`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Candidate accepted as a new unique entry; `order` is its bucket-local
    /// sibling index
    Accepted { order: u32 },
    /// Candidate superseded a previously kept entry (it carried a strict
    /// superset of the evicted entry's images)
    Replaced { evicted: BookUid },
    /// Candidate rejected: a kept entry already carries an equal or
    /// strictly larger image set
    Duplicate { original: BookUid },
}

impl AddOutcome {
    /// Whether the candidate itself is now stored.
    pub fn is_kept(&self) -> bool {
        !matches!(self, AddOutcome::Duplicate { .. })
    }
}

/// One audit pair: the rejected entry and the original kept in its place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DupRecord {
    pub rejected: BookUid,
    pub kept: BookUid,
}

/// An Outer winner whose payload must move to the stable path of the entry
/// it replaced when `save(move_duplicates = true)` runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relocation {
    pub winner: BookUid,
    pub target: BookUid,
}

/// Resolves the authoritative image bytes for a stored entry on demand.
pub trait PayloadSource: Send + Sync {
    fn images_for(&self, uid: &BookUid) -> Result<(ImageItem, BTreeSet<ImageItem>)>;
}

#[derive(Default)]
struct StoreInner {
    /// Pre-existing kept entries, bucketed by hash key
    old: HashMap<String, Vec<UniqueBook>>,
    /// Entries accepted this run; a bucket's vec is its sibling list
    new: HashMap<String, Vec<UniqueBook>>,
    /// Audit list of (rejected, kept) pairs
    dup: Vec<DupRecord>,
    /// Explicit uid redirects applied before any bucket lookup
    skip: HashMap<BookUid, BookUid>,
    /// Outer winners, consumed by `save`
    relocations: Vec<Relocation>,
}

/// The per-run dedup store.
pub struct BookStore {
    dst_dir: PathBuf,
    events: EventSender,
    inner: Mutex<StoreInner>,
}

impl BookStore {
    /// Construct the store for a destination folder, loading previously
    /// kept entries from its merged index when one exists.
    pub fn open(dst_dir: impl AsRef<Path>, events: EventSender) -> Result<Self> {
        let dst_dir = dst_dir.as_ref().to_path_buf();
        let mut inner = StoreInner::default();

        let index_path = dst_dir.join(MERGED_INDEX_FILE);
        if index_path.is_file() {
            index::read_index_file(&index_path, |record| {
                let book = index::book_from_record(&record);
                inner.old.entry(record.id).or_default().push(book);
                Ok(())
            })?;
            let kept: usize = inner.old.values().map(Vec::len).sum();
            tracing::info!(entries = kept, "loaded previously kept entries");
        }

        Ok(Self {
            dst_dir,
            events,
            inner: Mutex::new(inner),
        })
    }

    /// Classify a candidate against the bucket `hash_key`.
    ///
    /// Resolution order: the skip redirect, then previously kept entries,
    /// then this run's siblings, then a fresh insert. Every duplicate
    /// resolution publishes an [`Event::Duplicate`] with the kept original
    /// first.
    pub fn add(&self, hash_key: &str, mut candidate: UniqueBook) -> AddOutcome {
        let mut inner = self.lock();

        if let Some(target) = inner.skip.get(&candidate.uid) {
            tracing::debug!(from = %candidate.uid, to = %target, "skip redirect applied");
            candidate.uid = target.clone();
        }

        for generation in [Generation::Old, Generation::New] {
            let bucket = match generation.bucket_mut(&mut inner, hash_key) {
                Some(bucket) => bucket,
                None => continue,
            };
            let position = bucket
                .iter()
                .position(|entry| compare_images(entry, &candidate) != SetRelation::Varied);
            let Some(position) = position else { continue };

            match compare_images(&bucket[position], &candidate) {
                SetRelation::Equal | SetRelation::Inner => {
                    let original = bucket[position].uid.clone();
                    let duplicate = candidate.uid;
                    inner.dup.push(DupRecord {
                        rejected: duplicate.clone(),
                        kept: original.clone(),
                    });
                    self.events.send(Event::Duplicate {
                        original: original.clone(),
                        duplicate,
                    });
                    return AddOutcome::Duplicate { original };
                }
                SetRelation::Outer => {
                    // Candidate is the more complete copy: take the slot
                    // (and its tie-break order) of the entry it supersedes.
                    candidate.order = bucket[position].order;
                    let winner = candidate.uid.clone();
                    let evicted = std::mem::replace(&mut bucket[position], candidate).uid;
                    inner.dup.push(DupRecord {
                        rejected: evicted.clone(),
                        kept: winner.clone(),
                    });
                    inner.relocations.push(Relocation {
                        winner: winner.clone(),
                        target: evicted.clone(),
                    });
                    self.events.send(Event::Duplicate {
                        original: winner,
                        duplicate: evicted.clone(),
                    });
                    return AddOutcome::Replaced { evicted };
                }
                SetRelation::Varied => unreachable!("position() only matched non-Varied"),
            }
        }

        let bucket = inner.new.entry(hash_key.to_string()).or_default();
        candidate.order = bucket.len() as u32;
        let order = candidate.order;
        bucket.push(candidate);
        AddOutcome::Accepted { order }
    }

    /// Insert a uid redirect for subsequent `add` calls: `from` is treated
    /// as an alias of `to` without consulting the comparator.
    pub fn skip(&self, from: BookUid, to: BookUid) {
        self.lock().skip.insert(from, to);
    }

    /// Authoritative image bytes for a stored entry, resolved through
    /// `source` on first access and cached on the entry afterwards.
    ///
    /// Returns `Ok(None)` when no entry `(hash_key, file_name)` is stored.
    pub fn get_images(
        &self,
        hash_key: &str,
        file_name: &str,
        source: &dyn PayloadSource,
    ) -> Result<Option<(ImageItem, BTreeSet<ImageItem>)>> {
        let uid = {
            let inner = self.lock();
            let Some(entry) = find_entry(&inner, hash_key, file_name) else {
                return Ok(None);
            };
            if is_resolved(entry) {
                return Ok(Some((entry.cover.clone(), entry.images.clone())));
            }
            entry.uid.clone()
        };

        // Payload resolution stays outside the critical section.
        let (cover, images) = source.images_for(&uid)?;

        // Cache into whichever generation holds the entry, so repeat calls
        // on previously kept entries also hit the cache.
        let mut inner = self.lock();
        if let Some(entry) = find_entry_mut(&mut inner, hash_key, file_name) {
            entry.cover = cover.clone();
            entry.images = images.clone();
        }
        Ok(Some((cover, images)))
    }

    /// Attach resolved bytes to the matching `new` entry.
    ///
    /// Silent no-op when no such entry exists; it may have been evicted as
    /// a duplicate by a later `add`.
    pub fn set_images(
        &self,
        hash_key: &str,
        file_name: &str,
        cover: ImageItem,
        images: BTreeSet<ImageItem>,
    ) {
        let mut inner = self.lock();
        if let Some(bucket) = inner.new.get_mut(hash_key) {
            if let Some(entry) = bucket.iter_mut().find(|entry| entry.uid.file == file_name) {
                entry.cover = cover;
                entry.images = images;
            }
        }
    }

    /// Flatten all currently accepted `new` entries' images into two ordered
    /// sequences: covers and body illustrations go to different export
    /// destinations.
    pub fn get_new_images(&self) -> (Vec<ImageItem>, Vec<ImageItem>) {
        let inner = self.lock();
        let mut books: Vec<&UniqueBook> = inner.new.values().flatten().collect();
        books.sort_by(|a, b| compare_by_bucket(a, b));

        let mut covers = Vec::new();
        let mut bodies = Vec::new();
        for book in books {
            if !book.cover.hash.is_empty() {
                covers.push(book.cover.clone());
            }
            bodies.extend(book.images.iter().cloned());
        }
        (covers, bodies)
    }

    /// Counts of (previously kept, accepted this run, duplicates) entries.
    pub fn stats(&self) -> (usize, usize, usize) {
        let inner = self.lock();
        (
            inner.old.values().map(Vec::len).sum(),
            inner.new.values().map(Vec::len).sum(),
            inner.dup.len(),
        )
    }

    /// Finalize the run: write the merged index (`old` ∪ `new`) and the
    /// audit trail into `dest`, and - when `move_duplicates` is set -
    /// physically relocate every Outer winner's payload to the stable path
    /// of the entry it replaced.
    ///
    /// Consumes the store; no further mutation is permitted.
    pub fn save(self, dest: &Path, move_duplicates: bool) -> Result<()> {
        let inner = self
            .inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let mut kept: Vec<&UniqueBook> = inner
            .old
            .values()
            .chain(inner.new.values())
            .flatten()
            .collect();
        kept.sort_by(|a, b| compare_by_bucket(a, b));

        let index_path = dest.join(MERGED_INDEX_FILE);
        let mut writer = index::create_index_file(&index_path)?;
        for book in &kept {
            writer.write_record(&index::record_from_book(book))?;
        }
        writer.finish()?;
        tracing::info!(entries = kept.len(), path = %index_path.display(), "merged index written");

        let audit_path = dest.join(AUDIT_FILE);
        let audit = serde_json::json!({
            "duplicates": inner.dup,
            "skipped": inner
                .skip
                .iter()
                .map(|(from, to)| serde_json::json!({ "from": from, "to": to }))
                .collect::<Vec<_>>(),
            "relocations": inner.relocations,
        });
        let rendered =
            serde_json::to_string_pretty(&audit).map_err(|error| ArchiveError::Write {
                path: audit_path.clone(),
                source: std::io::Error::other(error),
            })?;
        fs::write(&audit_path, rendered).map_err(|source| ArchiveError::Write {
            path: audit_path,
            source,
        })?;

        if move_duplicates {
            for relocation in &inner.relocations {
                relocate_payload(dest, relocation)?;
            }
        }

        Ok(())
    }

    /// The destination folder this store was constructed for.
    pub fn dst_dir(&self) -> &Path {
        &self.dst_dir
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Generation {
    Old,
    New,
}

impl Generation {
    fn bucket_mut<'a>(
        &self,
        inner: &'a mut StoreInner,
        hash_key: &str,
    ) -> Option<&'a mut Vec<UniqueBook>> {
        match self {
            Generation::Old => inner.old.get_mut(hash_key),
            Generation::New => inner.new.get_mut(hash_key),
        }
    }
}

fn find_entry<'a>(
    inner: &'a StoreInner,
    hash_key: &str,
    file_name: &str,
) -> Option<&'a UniqueBook> {
    let in_new = inner
        .new
        .get(hash_key)
        .and_then(|bucket| bucket.iter().find(|entry| entry.uid.file == file_name));
    in_new.or_else(|| {
        inner
            .old
            .get(hash_key)
            .and_then(|bucket| bucket.iter().find(|entry| entry.uid.file == file_name))
    })
}

fn find_entry_mut<'a>(
    inner: &'a mut StoreInner,
    hash_key: &str,
    file_name: &str,
) -> Option<&'a mut UniqueBook> {
    let StoreInner { old, new, .. } = inner;
    if let Some(entry) = new
        .get_mut(hash_key)
        .and_then(|bucket| bucket.iter_mut().find(|entry| entry.uid.file == file_name))
    {
        return Some(entry);
    }
    old.get_mut(hash_key)
        .and_then(|bucket| bucket.iter_mut().find(|entry| entry.uid.file == file_name))
}

fn is_resolved(entry: &UniqueBook) -> bool {
    !entry.cover.body.is_empty() || entry.images.iter().any(|image| !image.body.is_empty())
}

/// Move a winner's payload file so its bytes live at the stable destination
/// path of the entry it replaced.
fn relocate_payload(dest: &Path, relocation: &Relocation) -> Result<()> {
    let from = dest
        .join(&relocation.winner.folder)
        .join(&relocation.winner.file);
    let to = dest
        .join(&relocation.target.folder)
        .join(&relocation.target.file);
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|source| ArchiveError::Relocate {
            from: from.clone(),
            to: to.clone(),
            source,
        })?;
    }
    fs::rename(&from, &to).map_err(|source| ArchiveError::Relocate { from, to, source })?;
    Ok(())
}
