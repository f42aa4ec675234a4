//! # Merge Orchestrator
//!
//! Drives one merge run end to end: collect `(archive, hash-index)` pairs
//! from the configured wildcard sources, stream every record into the dedup
//! store, then rewrite each archive and its index using the replacement map
//! the store produced.
//!
//! Processing order is newest-first by the numeric suffix of the archive
//! name: the store keeps whichever candidate it saw first for a given
//! relationship, so this order decides which physical copy becomes canonical
//! whenever Equal/Inner ties occur.
//!
//! The run is transactional at the process level: the first I/O failure
//! aborts it, and the caller re-runs after fixing the cause.

use crate::core::book::BookUid;
use crate::core::image::ImageItem;
use crate::core::index;
use crate::core::store::{AddOutcome, BookStore, PayloadSource};
use crate::core::taxonomy;
use crate::core::volume::{copy_excluding, DirVolume};
use crate::core::volume::Volume;
use crate::error::{ArchiveError, ConfigError, Result};
use crate::events::{
    Event, EventSender, IngestEvent, IngestProgress, MergeEvent, MergeSummary, RewriteEvent,
};
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Companion image volumes expected next to each archive.
const IMAGE_KINDS: [&str; 2] = ["covers", "images"];

/// File name of the nested classification tree written to the destination.
pub const COLLECTION_INFO_FILE: &str = "collection-info.json";

/// Run configuration, as handed over by the CLI.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// `archive_wildcard;hash_folder` source pairs
    pub sources: Vec<String>,
    /// Destination folder for the merged collection
    pub output: PathBuf,
    /// Optional classification template (flat taxonomy lines)
    pub collection_template: Option<PathBuf>,
    /// Relocate superseded payloads to their stable destination paths
    pub move_duplicates: bool,
}

/// One input archive and its accompanying hash index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePair {
    pub archive: PathBuf,
    pub index: PathBuf,
}

impl ArchivePair {
    /// The archive volume name, the `folder` half of every uid inside it.
    pub fn name(&self) -> String {
        self.archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of a completed merge run.
#[derive(Debug)]
pub struct MergeOutcome {
    /// Archives processed
    pub archives: usize,
    /// Book records streamed
    pub records: usize,
    /// Unique works in the merged output
    pub kept: usize,
    /// Records rejected or superseded as duplicates
    pub duplicates: usize,
    /// `duplicate → kept original` replacement map
    pub replacement: HashMap<BookUid, BookUid>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Collect, deduplicate and order the input archives.
///
/// Each source is `wildcard;hash_folder`. Archives are deduplicated by
/// file name (case-insensitive, first source wins), only archives with an
/// existing hash index are kept, and the result is ordered newest-first by
/// the numeric suffix of the archive name (0 when absent).
pub fn collect_archives(sources: &[String]) -> Result<Vec<ArchivePair>> {
    let suffix = Regex::new(r"([0-9]+)[^0-9]*$").expect("static regex");
    let mut seen: HashSet<String> = HashSet::new();
    let mut sorted: Vec<(u64, ArchivePair)> = Vec::new();

    for argument in sources {
        let parts: Vec<&str> = argument.split(';').collect();
        let &[wildcard, hash_folder] = parts.as_slice() else {
            return Err(ConfigError::InvalidSourcePair {
                argument: argument.clone(),
            }
            .into());
        };
        let hash_folder = Path::new(hash_folder);
        if !hash_folder.is_dir() {
            return Err(ConfigError::HashFolderNotFound {
                path: hash_folder.to_path_buf(),
            }
            .into());
        }

        for archive in resolve_wildcard(wildcard)? {
            let name = archive
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let index = hash_folder.join(format!("{name}.jsonl"));
            if !index.is_file() {
                tracing::debug!(archive = %archive.display(), "no hash index, skipped");
                continue;
            }
            let number = suffix
                .captures(&name)
                .and_then(|captures| captures[1].parse::<u64>().ok())
                .unwrap_or(0);
            sorted.push((number, ArchivePair { archive, index }));
        }
    }

    sorted.sort_by_key(|(number, _)| *number);
    Ok(sorted
        .into_iter()
        .rev()
        .map(|(_, pair)| pair)
        .collect())
}

/// Resolve a `dir/name-pattern` wildcard against the filesystem.
///
/// `*` and `?` match within one name component; matching is
/// case-insensitive; only directories qualify as archive volumes.
fn resolve_wildcard(wildcard: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(wildcard);
    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => Path::new("."),
    };
    let pattern = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let matcher = wildcard_regex(&pattern)?;

    let mut matched = Vec::new();
    for entry in WalkDir::new(parent).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| ArchiveError::Read {
            path: parent.to_path_buf(),
            source: error.into(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if matcher.is_match(&entry.file_name().to_string_lossy()) {
            matched.push(entry.into_path());
        }
    }
    matched.sort();
    Ok(matched)
}

fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expression = String::from("(?i)^");
    for character in pattern.chars() {
        match character {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).map_err(|_| {
        ConfigError::InvalidSourcePair {
            argument: pattern.to_string(),
        }
        .into()
    })
}

/// Run a whole merge.
pub fn run(config: &MergeConfig, events: &EventSender) -> Result<MergeOutcome> {
    let started = Instant::now();

    fs::create_dir_all(&config.output).map_err(|source| ConfigError::OutputFolder {
        path: config.output.clone(),
        source,
    })?;

    let archives = collect_archives(&config.sources)?;
    if archives.is_empty() {
        return Err(ConfigError::NoArchives.into());
    }
    events.send(Event::Merge(MergeEvent::Started {
        archives: archives.len(),
    }));
    tracing::info!(archives = archives.len(), "merge started");

    let store = BookStore::open(&config.output, events.clone())?;
    let mut replacement: HashMap<BookUid, BookUid> = HashMap::new();
    let mut records = 0usize;
    let mut duplicates = 0usize;

    // Pass one: stream every hash index into the store, newest archives
    // first so the freshest physical copy wins classification ties.
    for pair in &archives {
        let name = pair.name();
        events.send(Event::Ingest(IngestEvent::Started {
            archive: name.clone(),
        }));
        tracing::info!(archive = %name, index = %pair.index.display(), "ingesting");

        let volume = DirVolume::open(&pair.archive)?;
        let present: HashSet<String> = volume.entries()?.into_iter().collect();
        let mut archive_records = 0usize;

        index::read_index_file(&pair.index, |record| {
            archive_records += 1;
            records += 1;

            // Records whose payload is absent from the volume describe
            // nothing mergeable.
            if !present.contains(&record.file) {
                return Ok(());
            }

            let mut book = index::book_from_record(&record);
            book.uid.folder = name.clone();
            match store.add(&record.id, book) {
                AddOutcome::Accepted { .. } => {}
                AddOutcome::Duplicate { original } => {
                    duplicates += 1;
                    replacement
                        .entry(BookUid::new(name.clone(), record.file.clone()))
                        .or_insert(original);
                }
                AddOutcome::Replaced { evicted } => {
                    duplicates += 1;
                    replacement
                        .entry(evicted)
                        .or_insert(BookUid::new(name.clone(), record.file.clone()));
                }
            }

            if archive_records % 1000 == 0 {
                events.send(Event::Ingest(IngestEvent::Progress(IngestProgress {
                    archive: name.clone(),
                    records: archive_records,
                    duplicates,
                })));
            }
            Ok(())
        })?;

        events.send(Event::Ingest(IngestEvent::Completed {
            archive: name.clone(),
            records: archive_records,
        }));
    }

    // Pass two: rewrite archives and indexes, stripping replaced payloads.
    // Each archive is independent, so this fans out across the pool.
    archives
        .par_iter()
        .map(|pair| rewrite_archive(&config.output, pair, &replacement, events))
        .collect::<Result<Vec<_>>>()?;

    let (old_count, new_count, _) = store.stats();
    store.save(&config.output, config.move_duplicates)?;

    if let Some(template) = &config.collection_template {
        write_collection_info(template, &config.output)?;
    }

    let outcome = MergeOutcome {
        archives: archives.len(),
        records,
        kept: old_count + new_count,
        duplicates,
        replacement,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    events.send(Event::Merge(MergeEvent::Completed {
        summary: MergeSummary {
            archives: outcome.archives,
            records: outcome.records,
            kept: outcome.kept,
            duplicates: outcome.duplicates,
            duration_ms: outcome.duration_ms,
        },
    }));
    tracing::info!(
        kept = outcome.kept,
        duplicates = outcome.duplicates,
        "merge completed"
    );
    Ok(outcome)
}

/// Copy one archive (and its companion image volumes) to the destination
/// minus every replaced payload, and rewrite its hash index with
/// `duplicate_of` pointers to the kept originals.
fn rewrite_archive(
    output: &Path,
    pair: &ArchivePair,
    replacement: &HashMap<BookUid, BookUid>,
    events: &EventSender,
) -> Result<usize> {
    let name = pair.name();
    events.send(Event::Rewrite(RewriteEvent::Started {
        archive: name.clone(),
    }));

    let excluded: HashSet<String> = replacement
        .keys()
        .filter(|uid| uid.folder == name)
        .map(|uid| uid.file.clone())
        .collect();

    let source = DirVolume::open(&pair.archive)?;
    let mut destination = DirVolume::create(output.join(&name))?;
    let removed = copy_excluding(&source, &mut destination, &excluded)?;

    for kind in IMAGE_KINDS {
        let companion = pair
            .archive
            .parent()
            .map(|parent| parent.join(kind).join(&name));
        let Some(companion) = companion.filter(|path| path.is_dir()) else {
            continue;
        };
        let source = DirVolume::open(&companion)?;
        let mut destination = DirVolume::create(output.join(kind).join(&name))?;
        copy_excluding(&source, &mut destination, &excluded)?;
    }

    let hash_dir = output.join("hash");
    fs::create_dir_all(&hash_dir).map_err(|source| ArchiveError::Write {
        path: hash_dir.clone(),
        source,
    })?;
    let mut writer = index::create_index_file(&hash_dir.join(format!("{name}.jsonl")))?;
    index::read_index_file(&pair.index, |mut record| {
        let uid = BookUid::new(name.clone(), record.file.clone());
        if let Some(original) = replacement.get(&uid) {
            record.duplicate_of = Some(original.clone());
        }
        writer.write_record(&record)
    })?;
    writer.finish()?;

    events.send(Event::Rewrite(RewriteEvent::Completed {
        archive: name.clone(),
        removed,
    }));
    tracing::info!(archive = %name, removed, "archive rewritten");
    Ok(removed)
}

/// Encode the flat classification template through the taxonomy codec and
/// write the nested tree to the destination.
fn write_collection_info(template: &Path, output: &Path) -> Result<()> {
    let text = fs::read_to_string(template).map_err(|source| ArchiveError::Read {
        path: template.to_path_buf(),
        source,
    })?;
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let sections = taxonomy::encode(&lines)?;
    let tree = taxonomy::to_json(&sections)?;

    let path = output.join(COLLECTION_INFO_FILE);
    let rendered = serde_json::to_string_pretty(&tree)
        .map_err(|error| ArchiveError::Write {
            path: path.clone(),
            source: std::io::Error::other(error),
        })?;
    fs::write(&path, rendered).map_err(|source| ArchiveError::Write { path, source })?;
    Ok(())
}

/// Resolves a stored entry's images from the destination's companion
/// volumes: the cover at `covers/<folder>/<file>`, interior illustrations
/// under `images/<folder>/<file>/`.
pub struct ArchivePayloadSource {
    root: PathBuf,
}

impl ArchivePayloadSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl PayloadSource for ArchivePayloadSource {
    fn images_for(&self, uid: &BookUid) -> Result<(ImageItem, BTreeSet<ImageItem>)> {
        let cover_path = self.root.join("covers").join(&uid.folder).join(&uid.file);
        let cover = if cover_path.is_file() {
            let body = fs::read(&cover_path).map_err(|source| ArchiveError::Read {
                path: cover_path,
                source,
            })?;
            ImageItem::with_body(uid.file.clone(), body)
        } else {
            ImageItem::default()
        };

        let mut images = BTreeSet::new();
        let body_dir = self.root.join("images").join(&uid.folder).join(&uid.file);
        if body_dir.is_dir() {
            for entry in WalkDir::new(&body_dir).min_depth(1).max_depth(1) {
                let entry = entry.map_err(|error| ArchiveError::Read {
                    path: body_dir.clone(),
                    source: error.into(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let body = fs::read(entry.path()).map_err(|source| ArchiveError::Read {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
                images.insert(ImageItem::with_body(
                    entry.file_name().to_string_lossy().into_owned(),
                    body,
                ));
            }
        }

        Ok((cover, images))
    }
}
