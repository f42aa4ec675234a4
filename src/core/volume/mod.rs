//! # Archive Volumes
//!
//! The archive collaborator: a flat container of named byte payloads. The
//! merger never performs compression itself; a volume backend only has to
//! list entries, read one, and add one.
//!
//! Two backends are provided: [`DirVolume`] stores entries as plain files
//! in one directory, [`MemoryVolume`] keeps them in memory for tests.

use crate::error::{ArchiveError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A flat archive of named payloads.
pub trait Volume: Send + Sync {
    /// Entry names, sorted.
    fn entries(&self) -> Result<Vec<String>>;

    /// Read one entry's bytes.
    fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Add (or replace) one entry.
    fn add_file(
        &mut self,
        name: &str,
        bytes: &[u8],
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Directory-backed archive volume: one file per entry, no subdirectories.
pub struct DirVolume {
    root: PathBuf,
}

impl DirVolume {
    /// Open an existing volume directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ArchiveError::VolumeNotFound { path: root }.into());
        }
        Ok(Self { root })
    }

    /// Create (or reuse) a volume directory.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| ArchiveError::Write {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// The directory this volume lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry names must be plain file names; anything path-like would
    /// escape the volume.
    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && !name.contains('/')
            && !name.contains('\\')
            && name != "."
            && name != "..";
        if !plain {
            return Err(ArchiveError::InvalidEntryName {
                name: name.to_string(),
            }
            .into());
        }
        Ok(self.root.join(name))
    }
}

impl Volume for DirVolume {
    fn entries(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|error| ArchiveError::Read {
                path: self.root.clone(),
                source: error.into(),
            })?;
            if entry.file_type().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.entry_path(name)?;
        if !path.is_file() {
            return Err(ArchiveError::EntryNotFound {
                name: name.to_string(),
            }
            .into());
        }
        fs::read(&path)
            .map_err(|source| ArchiveError::Read { path, source }.into())
    }

    fn add_file(
        &mut self,
        name: &str,
        bytes: &[u8],
        _timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // The filesystem mtime of the written file stands in for the entry
        // timestamp on this backend.
        let path = self.entry_path(name)?;
        fs::write(&path, bytes)
            .map_err(|source| ArchiveError::Write { path, source }.into())
    }
}

/// In-memory archive volume for tests.
#[derive(Default)]
pub struct MemoryVolume {
    files: BTreeMap<String, (Vec<u8>, Option<DateTime<Utc>>)>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp recorded for an entry, if any.
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.files.get(name).and_then(|(_, timestamp)| *timestamp)
    }
}

impl Volume for MemoryVolume {
    fn entries(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .get(name)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| {
                ArchiveError::EntryNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn add_file(
        &mut self,
        name: &str,
        bytes: &[u8],
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.files
            .insert(name.to_string(), (bytes.to_vec(), timestamp));
        Ok(())
    }
}

/// Copy every entry of `src` into `dst` except the named exclusions.
///
/// Returns how many entries were skipped. This is the second-pass primitive:
/// the exclusion set is the replacement map's key set for one archive.
pub fn copy_excluding(
    src: &dyn Volume,
    dst: &mut dyn Volume,
    excluded: &HashSet<String>,
) -> Result<usize> {
    let mut skipped = 0;
    for name in src.entries()? {
        if excluded.contains(&name) {
            skipped += 1;
            continue;
        }
        let bytes = src.read(&name)?;
        dst.add_file(&name, &bytes, None)?;
    }
    Ok(skipped)
}
