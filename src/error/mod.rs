//! # Error Module
//!
//! Error types for the book collection merger.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, record numbers, what went wrong
//! - **Fail the whole run** - this is a batch tool; every error here is fatal
//!   and the caller re-runs after fixing the cause

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum MergerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Hash-index error: {0}")]
    Index(#[from] IndexError),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),
}

/// Errors in the run configuration, detected before any mutation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Source argument `{argument}` must be archive_wildcard;hash_folder")]
    InvalidSourcePair { argument: String },

    #[error("Hash folder not found: {path}")]
    HashFolderNotFound { path: PathBuf },

    #[error("No archives matched the configured sources")]
    NoArchives,

    #[error("Cannot create output folder {path}: {source}")]
    OutputFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the archive volume collaborator
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive volume not found: {path}")]
    VolumeNotFound { path: PathBuf },

    #[error("Invalid entry name `{name}` (must be a plain file name)")]
    InvalidEntryName { name: String },

    #[error("Entry not found in archive volume: {name}")]
    EntryNotFound { name: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to relocate {from} to {to}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors in the hash-index stream
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Cannot open hash index {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record at {path}:{line}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Failed to write hash index {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors in the depth-encoded taxonomy wire form
#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Malformed section record {line}: expected `path..., id, count` tab-separated fields")]
    TooFewFields { line: usize },

    #[error("Malformed section record {line}: leaf count `{value}` is not a number")]
    BadLeafCount { line: usize, value: String },

    #[error("Unbalanced section events: close without a matching open")]
    UnbalancedClose,
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, MergerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_argument() {
        let error = ConfigError::InvalidSourcePair {
            argument: "just-a-wildcard".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("just-a-wildcard"));
        assert!(message.contains("hash_folder"));
    }

    #[test]
    fn index_error_includes_location() {
        let error = IndexError::MalformedRecord {
            path: PathBuf::from("/hash/vol-1.jsonl"),
            line: 42,
            reason: "missing field `file`".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/hash/vol-1.jsonl"));
        assert!(message.contains("42"));
    }

    #[test]
    fn archive_error_includes_path() {
        let error = ArchiveError::VolumeNotFound {
            path: PathBuf::from("/snapshots/vol-7"),
        };
        assert!(error.to_string().contains("/snapshots/vol-7"));
    }
}
