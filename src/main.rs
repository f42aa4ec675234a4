//! # book-merge CLI
//!
//! Command-line interface for the book collection merger.
//!
//! ## Usage
//! ```bash
//! book-merge merge "snapshots/fb2-*;snapshots/hash" -o merged
//! book-merge merge "a/fb2-*;a/hash" "b/fb2-*;b/hash" -o merged --move-duplicates
//! ```

mod cli;

fn main() {
    book_collection_merger::init_tracing();

    if let Err(error) = cli::run() {
        tracing::error!(%error, "merge failed");
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}
