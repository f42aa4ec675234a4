//! # Hash-Index Codec
//!
//! The content contract of the per-archive hash index: one record per book
//! carrying `(id, folder, file, title, cover hash, image hashes)` plus the
//! flattened classification sections. The wire form is JSON Lines; the core
//! only ever sees the record callback, so the literal markup stays an
//! implementation detail of this module.
//!
//! A record in the *merged* output index may additionally carry a
//! `duplicate_of` pointer to the kept original it was superseded by.

use crate::core::book::{BookUid, UniqueBook};
use crate::core::image::ImageItem;
use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// File name of the merged index the store persists into the destination.
pub const MERGED_INDEX_FILE: &str = "collection-index.jsonl";

/// One book record on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Content identity of the book text; doubles as the store bucket key
    pub id: String,
    /// Archive volume the payload lives in
    pub folder: String,
    /// Payload file name inside the volume
    pub file: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Cover image content hash; empty when the book has no cover
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cover_hash: String,
    /// Interior illustration content hashes, in archive order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_hashes: Vec<String>,
    /// Depth-encoded classification records (see the taxonomy codec)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
    /// Kept original this entry was superseded by, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<BookUid>,
}

/// Stream a hash index, invoking `callback` once per record.
///
/// Malformed records are fatal; the engine does not tolerate or skip them.
pub fn read_records<R, F>(reader: R, path: &Path, mut callback: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(BookRecord) -> Result<()>,
{
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: BookRecord =
            serde_json::from_str(&line).map_err(|error| IndexError::MalformedRecord {
                path: path.to_path_buf(),
                line: number + 1,
                reason: error.to_string(),
            })?;
        callback(record)?;
    }
    Ok(())
}

/// Open and stream a hash-index file.
pub fn read_index_file<F>(path: &Path, callback: F) -> Result<()>
where
    F: FnMut(BookRecord) -> Result<()>,
{
    let file = File::open(path).map_err(|source| IndexError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_records(BufReader::new(file), path, callback)
}

/// Writes an index stream, one record per line.
pub struct IndexWriter<W: Write> {
    writer: W,
    path: std::path::PathBuf,
}

impl<W: Write> IndexWriter<W> {
    pub fn new(writer: W, path: &Path) -> Self {
        Self {
            writer,
            path: path.to_path_buf(),
        }
    }

    pub fn write_record(&mut self, record: &BookRecord) -> Result<()> {
        let json = serde_json::to_string(record).map_err(|error| IndexError::Write {
            path: self.path.clone(),
            source: std::io::Error::other(error),
        })?;
        writeln!(self.writer, "{json}").map_err(|source| IndexError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().map_err(|source| IndexError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Create an index file and return a writer over it.
pub fn create_index_file(path: &Path) -> Result<IndexWriter<BufWriter<File>>> {
    let file = File::create(path).map_err(|source| IndexError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(IndexWriter::new(BufWriter::new(file), path))
}

/// Build the in-memory book identity from a wire record.
pub fn book_from_record(record: &BookRecord) -> UniqueBook {
    UniqueBook {
        uid: BookUid::new(record.folder.clone(), record.file.clone()),
        title: record
            .title
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        hash_text: record.id.clone(),
        hash_sections: record.sections.clone(),
        cover: if record.cover_hash.is_empty() {
            ImageItem::default()
        } else {
            ImageItem::from_hash(record.cover_hash.clone())
        },
        images: record
            .image_hashes
            .iter()
            .map(ImageItem::from_hash)
            .collect::<BTreeSet<_>>(),
        order: 0,
    }
}

/// Project a stored book back onto the wire schema.
pub fn record_from_book(book: &UniqueBook) -> BookRecord {
    BookRecord {
        id: book.hash_text.clone(),
        folder: book.uid.folder.clone(),
        file: book.uid.file.clone(),
        title: book.title_string(),
        cover_hash: book.cover.hash.clone(),
        image_hashes: book.images.iter().map(|image| image.hash.clone()).collect(),
        sections: book.hash_sections.clone(),
        duplicate_of: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn sample_record() -> BookRecord {
        BookRecord {
            id: "H1".into(),
            folder: "vol-1".into(),
            file: "book.fb2".into(),
            title: "the brave tailor".into(),
            cover_hash: "c0".into(),
            image_hashes: vec!["h1".into(), "h2".into()],
            sections: vec!["Tales\t7\t12".into()],
            duplicate_of: None,
        }
    }

    #[test]
    fn reader_invokes_callback_per_record() {
        let mut lines = String::new();
        for _ in 0..3 {
            lines.push_str(&serde_json::to_string(&sample_record()).unwrap());
            lines.push('\n');
        }
        lines.push('\n'); // trailing blank line is fine

        let mut seen = 0;
        read_records(Cursor::new(lines), &PathBuf::from("test.jsonl"), |record| {
            assert_eq!(record.id, "H1");
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 3);
    }

    #[test]
    fn malformed_record_is_fatal_with_location() {
        let lines = "{\"id\":\"H1\"\n";
        let result = read_records(Cursor::new(lines), &PathBuf::from("bad.jsonl"), |_| Ok(()));
        match result {
            Err(crate::MergerError::Index(IndexError::MalformedRecord { line, .. })) => {
                assert_eq!(line, 1);
            }
            other => panic!("expected malformed-record error, got {other:?}"),
        }
    }

    #[test]
    fn writer_round_trips_records() {
        let mut buffer = Vec::new();
        let path = PathBuf::from("out.jsonl");
        {
            let mut writer = IndexWriter::new(&mut buffer, &path);
            let mut annotated = sample_record();
            annotated.duplicate_of = Some(BookUid::new("vol-2", "book.fb2"));
            writer.write_record(&sample_record()).unwrap();
            writer.write_record(&annotated).unwrap();
            writer.finish().unwrap();
        }

        let mut records = Vec::new();
        read_records(Cursor::new(buffer), &path, |record| {
            records.push(record);
            Ok(())
        })
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], sample_record());
        assert_eq!(
            records[1].duplicate_of,
            Some(BookUid::new("vol-2", "book.fb2"))
        );
    }

    #[test]
    fn book_and_record_projections_agree() {
        let record = sample_record();
        let book = book_from_record(&record);

        assert_eq!(book.uid, BookUid::new("vol-1", "book.fb2"));
        assert_eq!(book.hash_text, "H1");
        assert_eq!(book.images.len(), 2);
        assert!(book.title.contains("brave"));

        let back = record_from_book(&book);
        assert_eq!(back.id, record.id);
        assert_eq!(back.cover_hash, record.cover_hash);
        // image hashes come back sorted by the identity key
        let mut expected = record.image_hashes.clone();
        expected.sort();
        assert_eq!(back.image_hashes, expected);
    }
}
