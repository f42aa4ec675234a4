//! Integration tests for the merge orchestrator.
//!
//! These tests verify end-to-end behavior on real directories:
//! - duplicate stripping across snapshot generations
//! - supersession by the more complete copy
//! - index rewriting with duplicate pointers
//! - bootstrap from a previously merged destination

use book_collection_merger::core::index::{self, BookRecord, MERGED_INDEX_FILE};
use book_collection_merger::core::merge::{self, MergeConfig, COLLECTION_INFO_FILE};
use book_collection_merger::core::store::AUDIT_FILE;
use book_collection_merger::events::{null_sender, Event, EventChannel};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn record(id: &str, folder: &str, file: &str, images: &[&str]) -> BookRecord {
    BookRecord {
        id: id.to_string(),
        folder: folder.to_string(),
        file: file.to_string(),
        title: format!("title of {file}"),
        cover_hash: String::new(),
        image_hashes: images.iter().map(|hash| hash.to_string()).collect(),
        sections: Vec::new(),
        duplicate_of: None,
    }
}

/// Lay down one archive directory and its hash index.
fn write_archive(root: &Path, name: &str, records: &[BookRecord], ghosts: &[&str]) {
    let archive = root.join(name);
    fs::create_dir_all(&archive).unwrap();
    for entry in records {
        fs::write(archive.join(&entry.file), format!("payload of {}", entry.file)).unwrap();
    }

    let hash = root.join("hash");
    fs::create_dir_all(&hash).unwrap();
    let mut lines = String::new();
    for entry in records {
        lines.push_str(&serde_json::to_string(entry).unwrap());
        lines.push('\n');
    }
    // Ghost records reference payloads absent from the archive.
    for ghost in ghosts {
        lines.push_str(&serde_json::to_string(&record("HG", name, ghost, &["g1"])).unwrap());
        lines.push('\n');
    }
    fs::write(hash.join(format!("{name}.jsonl")), lines).unwrap();
}

fn read_index(path: &Path) -> Vec<BookRecord> {
    let mut records = Vec::new();
    index::read_index_file(path, |entry| {
        records.push(entry);
        Ok(())
    })
    .unwrap();
    records
}

fn two_snapshot_fixture() -> (TempDir, MergeConfig) {
    let temp = TempDir::new().unwrap();
    let snapshots = temp.path().join("snapshots");

    // Older snapshot: the equal copy of book-a, the only copy of book-b,
    // and the more complete copy of book-c.
    write_archive(
        &snapshots,
        "fb2-001",
        &[
            record("HA", "fb2-001", "book-a.fb2", &["a1", "a2"]),
            record("HB", "fb2-001", "book-b.fb2", &["b1"]),
            record("HC", "fb2-001", "book-c.fb2", &["c1", "c2"]),
        ],
        &[],
    );
    // Newer snapshot: ingested first, so its book-a wins and its partial
    // book-c gets superseded.
    write_archive(
        &snapshots,
        "fb2-002",
        &[
            record("HA", "fb2-002", "book-a.fb2", &["a1", "a2"]),
            record("HC", "fb2-002", "book-c.fb2", &["c1"]),
        ],
        &["ghost.fb2"],
    );

    let config = MergeConfig {
        sources: vec![format!(
            "{};{}",
            snapshots.join("fb2-*").display(),
            snapshots.join("hash").display()
        )],
        output: temp.path().join("merged"),
        collection_template: None,
        move_duplicates: false,
    };
    (temp, config)
}

#[test]
fn merge_strips_duplicates_and_keeps_the_most_complete_copies() {
    let (_temp, config) = two_snapshot_fixture();

    let outcome = merge::run(&config, &null_sender()).unwrap();

    assert_eq!(outcome.archives, 2);
    assert_eq!(outcome.records, 6, "ghost record is still streamed");
    assert_eq!(outcome.kept, 3);
    assert_eq!(outcome.duplicates, 2);

    // The newer archive keeps book-a but loses its partial book-c.
    let newer = config.output.join("fb2-002");
    assert!(newer.join("book-a.fb2").is_file());
    assert!(!newer.join("book-c.fb2").exists());
    assert!(!newer.join("ghost.fb2").exists());

    // The older archive keeps book-b and the complete book-c; its book-a
    // was stripped as an equal duplicate.
    let older = config.output.join("fb2-001");
    assert!(!older.join("book-a.fb2").exists());
    assert!(older.join("book-b.fb2").is_file());
    assert!(older.join("book-c.fb2").is_file());
}

#[test]
fn rewritten_indexes_point_duplicates_at_the_kept_originals() {
    let (_temp, config) = two_snapshot_fixture();
    merge::run(&config, &null_sender()).unwrap();

    let older: HashMap<String, BookRecord> =
        read_index(&config.output.join("hash").join("fb2-001.jsonl"))
            .into_iter()
            .map(|entry| (entry.file.clone(), entry))
            .collect();
    assert_eq!(
        older["book-a.fb2"]
            .duplicate_of
            .as_ref()
            .map(ToString::to_string),
        Some("fb2-002/book-a.fb2".to_string())
    );
    assert!(older["book-b.fb2"].duplicate_of.is_none());
    assert!(older["book-c.fb2"].duplicate_of.is_none());

    let newer: HashMap<String, BookRecord> =
        read_index(&config.output.join("hash").join("fb2-002.jsonl"))
            .into_iter()
            .map(|entry| (entry.file.clone(), entry))
            .collect();
    assert_eq!(
        newer["book-c.fb2"]
            .duplicate_of
            .as_ref()
            .map(ToString::to_string),
        Some("fb2-001/book-c.fb2".to_string())
    );
    assert!(newer["book-a.fb2"].duplicate_of.is_none());
}

#[test]
fn merge_writes_the_merged_index_and_the_audit_trail() {
    let (_temp, config) = two_snapshot_fixture();
    merge::run(&config, &null_sender()).unwrap();

    let kept = read_index(&config.output.join(MERGED_INDEX_FILE));
    let mut uids: Vec<String> = kept
        .iter()
        .map(|entry| format!("{}/{}", entry.folder, entry.file))
        .collect();
    uids.sort();
    assert_eq!(
        uids,
        vec![
            "fb2-001/book-b.fb2",
            "fb2-001/book-c.fb2",
            "fb2-002/book-a.fb2",
        ]
    );

    let audit: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(config.output.join(AUDIT_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(audit["duplicates"].as_array().unwrap().len(), 2);
    assert_eq!(audit["relocations"].as_array().unwrap().len(), 1);
}

#[test]
fn duplicate_events_name_the_kept_original_first() {
    let (_temp, config) = two_snapshot_fixture();
    let (sender, receiver) = EventChannel::new();

    merge::run(&config, &sender).unwrap();
    drop(sender);

    let pairs: Vec<(String, String)> = receiver
        .iter()
        .filter_map(|event| match event {
            Event::Duplicate {
                original,
                duplicate,
            } => Some((original.to_string(), duplicate.to_string())),
            _ => None,
        })
        .collect();

    assert!(pairs.contains(&(
        "fb2-002/book-a.fb2".to_string(),
        "fb2-001/book-a.fb2".to_string()
    )));
    assert!(pairs.contains(&(
        "fb2-001/book-c.fb2".to_string(),
        "fb2-002/book-c.fb2".to_string()
    )));
}

#[test]
fn second_run_bootstraps_from_the_previous_merge() {
    let (_temp, config) = two_snapshot_fixture();
    merge::run(&config, &null_sender()).unwrap();

    // A fresh snapshot generation carrying an equal copy of book-b.
    let temp2 = TempDir::new().unwrap();
    let snapshots = temp2.path().join("snapshots");
    write_archive(
        &snapshots,
        "fb2-003",
        &[
            record("HB", "fb2-003", "book-b.fb2", &["b1"]),
            record("HD", "fb2-003", "book-d.fb2", &["d1"]),
        ],
        &[],
    );

    let second = MergeConfig {
        sources: vec![format!(
            "{};{}",
            snapshots.join("fb2-*").display(),
            snapshots.join("hash").display()
        )],
        output: config.output.clone(),
        collection_template: None,
        move_duplicates: false,
    };
    let outcome = merge::run(&second, &null_sender()).unwrap();

    // 3 previously kept + 1 new; book-b rejected against the loaded set.
    assert_eq!(outcome.kept, 4);
    assert_eq!(outcome.duplicates, 1);
    assert!(!second.output.join("fb2-003").join("book-b.fb2").exists());
    assert!(second.output.join("fb2-003").join("book-d.fb2").is_file());

    let index = read_index(&second.output.join("hash").join("fb2-003.jsonl"));
    let book_b = index.iter().find(|entry| entry.file == "book-b.fb2").unwrap();
    assert_eq!(
        book_b.duplicate_of.as_ref().map(ToString::to_string),
        Some("fb2-001/book-b.fb2".to_string())
    );
}

#[test]
fn collection_template_is_rendered_as_a_nested_tree() {
    let (temp, mut config) = two_snapshot_fixture();
    let template = temp.path().join("sections.tsv");
    fs::write(&template, "Tales\t1\t5\nTales\tFolk\t2\t3\nNovels\t3\t9\n").unwrap();
    config.collection_template = Some(template);

    merge::run(&config, &null_sender()).unwrap();

    let tree: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(config.output.join(COLLECTION_INFO_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(tree[0]["id"], "1");
    assert_eq!(tree[0]["children"][0]["id"], "2");
    assert_eq!(tree[1]["id"], "3");
    assert!(tree[1].get("children").is_none());
}

#[test]
fn move_duplicates_relocates_the_superseding_payload() {
    let (_temp, mut config) = two_snapshot_fixture();
    config.move_duplicates = true;

    merge::run(&config, &null_sender()).unwrap();

    // The complete book-c payload now sits at the stable path of the copy
    // it replaced.
    assert!(!config
        .output
        .join("fb2-001")
        .join("book-c.fb2")
        .exists());
    assert_eq!(
        fs::read(config.output.join("fb2-002").join("book-c.fb2")).unwrap(),
        b"payload of book-c.fb2"
    );
}

#[test]
fn a_run_with_no_matching_archives_fails() {
    let temp = TempDir::new().unwrap();
    let hash = temp.path().join("hash");
    fs::create_dir_all(&hash).unwrap();

    let config = MergeConfig {
        sources: vec![format!(
            "{};{}",
            temp.path().join("fb2-*").display(),
            hash.display()
        )],
        output: temp.path().join("merged"),
        collection_template: None,
        move_duplicates: false,
    };
    assert!(merge::run(&config, &null_sender()).is_err());
}
