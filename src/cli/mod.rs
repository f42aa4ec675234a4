//! # CLI Module
//!
//! Command-line interface for the book collection merger.
//!
//! ## Usage
//! ```bash
//! # Merge two snapshot generations into one collection
//! book-merge merge "snapshots/fb2-*;snapshots/hash" -o merged
//!
//! # Several source pairs, newest archives win
//! book-merge merge "a/fb2-*;a/hash" "b/fb2-*;b/hash" -o merged
//!
//! # With a classification template and physical relocation
//! book-merge merge "snapshots/fb2-*;snapshots/hash" -o merged \
//!     --collection-info-template sections.tsv --move-duplicates
//!
//! # JSON output for scripting
//! book-merge merge "snapshots/fb2-*;snapshots/hash" -o merged --format json
//! ```

use book_collection_merger::core::merge::{self, MergeConfig, MergeOutcome};
use book_collection_merger::error::Result;
use book_collection_merger::events::{Event, EventChannel, IngestEvent, MergeEvent, RewriteEvent};
use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::thread;

/// Book Collection Merger - consolidate overlapping archive snapshots
#[derive(Parser, Debug)]
#[command(name = "book-merge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge archive snapshots into one deduplicated collection
    Merge {
        /// Source pairs, each `archive_wildcard;hash_folder`
        #[arg(required = true)]
        sources: Vec<String>,

        /// Destination folder for the merged collection
        #[arg(short, long)]
        output: PathBuf,

        /// Flat classification template to encode into collection-info.json
        #[arg(long)]
        collection_info_template: Option<PathBuf>,

        /// Physically relocate superseded payloads to their stable paths
        #[arg(long)]
        move_duplicates: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        format: OutputFormat,

        /// Verbose output (list every replacement pair)
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (replacement pairs only)
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            sources,
            output,
            collection_info_template,
            move_duplicates,
            format,
            verbose,
        } => run_merge(
            MergeConfig {
                sources,
                output,
                collection_template: collection_info_template,
                move_duplicates,
            },
            format,
            verbose,
        ),
    }
}

fn run_merge(config: MergeConfig, format: OutputFormat, verbose: bool) -> Result<()> {
    let term = Term::stderr();

    if matches!(format, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Book Collection Merger").bold().cyan(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let (sender, receiver) = EventChannel::new();

    // Totals are unknown until the indexes have streamed, so the bar runs
    // as a spinner with a live message.
    let progress = if matches!(format, OutputFormat::Pretty) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos} records {msg}")
                .unwrap(),
        );
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let verbose_clone = verbose;

    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Merge(MergeEvent::Started { archives }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message(format!("merging {archives} archives"));
                    }
                }
                Event::Ingest(IngestEvent::Started { archive }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message(format!("ingesting {archive}"));
                    }
                }
                Event::Ingest(IngestEvent::Progress(p)) => {
                    if let Some(ref pb) = progress_clone {
                        pb.inc(1000);
                        if verbose_clone {
                            pb.set_message(format!(
                                "{} ({} duplicates so far)",
                                p.archive, p.duplicates
                            ));
                        }
                    }
                }
                Event::Rewrite(RewriteEvent::Completed { archive, removed }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message(format!("rewrote {archive} (-{removed})"));
                    }
                }
                Event::Merge(MergeEvent::Completed { .. }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
    });

    let result = merge::run(&config, &sender);

    drop(sender);
    event_thread.join().ok();

    let outcome = result?;
    match format {
        OutputFormat::Pretty => print_pretty_results(&term, &outcome, verbose),
        OutputFormat::Json => print_json_results(&outcome),
        OutputFormat::Minimal => print_minimal_results(&outcome),
    }

    Ok(())
}

fn print_pretty_results(term: &Term, outcome: &MergeOutcome, verbose: bool) {
    term.write_line("").ok();
    term.write_line(&format!("{} Merge Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} records from {} archives in {:.1}s",
        style(outcome.records).cyan(),
        style(outcome.archives).cyan(),
        outcome.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} unique works kept",
        style(outcome.kept).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} duplicates stripped",
        style(outcome.duplicates).yellow()
    ))
    .ok();
    term.write_line("").ok();

    if verbose && !outcome.replacement.is_empty() {
        term.write_line(&format!("{}", style("Replacements:").bold().underlined()))
            .ok();
        for (duplicate, kept) in sorted_replacements(outcome) {
            term.write_line(&format!(
                "  {} {} {}",
                style(duplicate).dim(),
                style("→").dim(),
                kept
            ))
            .ok();
        }
        term.write_line("").ok();
    }

    term.write_line(&format!(
        "{}",
        style("The sources were not modified; the merged collection lives in the output folder.")
            .dim()
    ))
    .ok();
}

fn print_json_results(outcome: &MergeOutcome) {
    let output = serde_json::json!({
        "archives": outcome.archives,
        "records": outcome.records,
        "kept": outcome.kept,
        "duplicates": outcome.duplicates,
        "duration_ms": outcome.duration_ms,
        "replacements": sorted_replacements(outcome)
            .into_iter()
            .map(|(duplicate, kept)| serde_json::json!({
                "duplicate": duplicate,
                "kept": kept,
            }))
            .collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}

fn print_minimal_results(outcome: &MergeOutcome) {
    for (duplicate, kept) in sorted_replacements(outcome) {
        println!("{duplicate}\t{kept}");
    }
}

fn sorted_replacements(
    outcome: &MergeOutcome,
) -> Vec<(
    &book_collection_merger::core::book::BookUid,
    &book_collection_merger::core::book::BookUid,
)> {
    let mut pairs: Vec<_> = outcome.replacement.iter().collect();
    pairs.sort_by_key(|(duplicate, _)| (duplicate.folder.clone(), duplicate.file.clone()));
    pairs
}
