use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsearch_core::filename::{encode_filename, scan_folder, unescape};
use docsearch_core::persist::{load_from_path, save_to_path};
use docsearch_core::timestamp::format_timestamp;
use docsearch_core::InvertedIndex;
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use std::fs;
use std::path::Path;
use time::{Duration, OffsetDateTime};

const SAMPLES: &[(&str, &str, &str)] = &[
    ("Space Exploration", "Jane Smith", "Exploring the vast universe has always been a human fascination. The mysteries of space continue to intrigue scientists and explorers alike."),
    ("Ocean Depths", "John Doe", "The ocean's depths hide some of the world's most astonishing creatures. Exploring these depths has revealed surprising secrets."),
    ("Mountain Climbing", "Alice Johnson", "Mountain climbing is not just a sport, but a journey towards self-discovery. Each peak offers a new challenge and a new adventure."),
    ("Desert Survival", "Mohamed Ali", "Surviving in the desert requires knowledge and resilience. The harsh environment tests the limits of human endurance."),
    ("Artificial Intelligence", "Emma Clark", "Artificial Intelligence is revolutionizing our world, from automating mundane tasks to solving complex problems."),
    ("Quantum Computing", "Liu Wei", "Quantum computing represents a significant leap forward in computational capability, with potential to solve previously intractable problems."),
    ("Renewable Energy", "Ahmed Khan", "The future of our planet hinges on renewable energy. Harnessing the power of nature could be the key to sustainable living."),
    ("Ancient Civilizations", "Sarah Johnson", "Studying ancient civilizations reveals the roots of human culture and knowledge. These civilizations laid the foundations of the modern world."),
    ("Modern Architecture", "Carlos Garcia", "Modern architecture combines aesthetics with functionality, using innovative designs and materials to create unique spaces."),
    ("Deep Sea Mysteries", "Anna Ivanova", "The deep sea is one of the least explored areas on Earth. Its mysteries and inhabitants are a subject of ongoing research."),
];

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query document index snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write sample documents with metadata encoded in their file names
    Generate {
        /// Target folder, created if missing
        #[arg(long, default_value = "documents")]
        folder: String,
        /// Number of sample documents to write
        #[arg(long, default_value_t = SAMPLES.len())]
        count: usize,
    },
    /// Index every file of a documents folder and save a snapshot
    Build {
        /// Folder of `title_author_timestamp` files
        #[arg(long, default_value = "documents")]
        documents: String,
        /// Snapshot file to write
        #[arg(long, default_value = "index.bin")]
        output: String,
    },
    /// Run a query against a saved snapshot
    Search {
        #[arg(long, default_value = "index.bin")]
        snapshot: String,
        #[arg(long)]
        query: String,
        /// Print results as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct ResultRow {
    doc_id: u32,
    title: String,
    author: String,
    timestamp: String,
    locator: String,
    matched_terms: u32,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { folder, count } => {
            let written = generate_samples(Path::new(&folder), count, OffsetDateTime::now_utc())?;
            tracing::info!(folder, written, "sample documents written");
            Ok(())
        }
        Commands::Build { documents, output } => build_index(&documents, &output).map(|_| ()),
        Commands::Search { snapshot, query, json } => {
            let index = load_from_path(&snapshot).with_context(|| format!("loading snapshot {snapshot}"))?;
            let rows = run_query(&index, &query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("no documents match {query:?}");
            } else {
                for row in rows {
                    println!("{} - {}", row.doc_id, display_locator(&row.locator));
                }
            }
            Ok(())
        }
    }
}

/// One file per sample, timestamps one second apart so ordering by recency is stable.
fn generate_samples(folder: &Path, count: usize, start: OffsetDateTime) -> Result<usize> {
    fs::create_dir_all(folder)?;
    let mut written = 0;
    for (i, (title, author, content)) in SAMPLES.iter().take(count).enumerate() {
        let ts = start + Duration::seconds(i as i64);
        let path = folder.join(encode_filename(title, author, ts));
        fs::write(&path, format!("{content}\n")).with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

fn build_index(documents: &str, output: &str) -> Result<InvertedIndex> {
    let mut index = InvertedIndex::new();
    let ids = scan_folder(&mut index, documents).with_context(|| format!("scanning {documents}"))?;
    tracing::info!(num_docs = ids.len(), num_terms = index.num_terms(), "ingested documents");
    save_to_path(&index, output)?;
    tracing::info!(output, "index build complete");
    Ok(index)
}

fn run_query(index: &InvertedIndex, query: &str) -> Result<Vec<ResultRow>> {
    let mut rows = Vec::new();
    for hit in index.search_scored(query) {
        let meta = index.metadata(hit.doc_id)?;
        rows.push(ResultRow {
            doc_id: hit.doc_id,
            title: meta.title.clone(),
            author: meta.author.clone(),
            timestamp: format_timestamp(meta.timestamp),
            locator: meta.locator.clone(),
            matched_terms: hit.matched_terms,
        });
    }
    Ok(rows)
}

fn display_locator(locator: &str) -> String {
    unescape(&locator.replace('_', " - "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn generate_build_search() {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("documents");
        let out = dir.path().join("index.bin");
        assert_eq!(generate_samples(&docs, 4, datetime!(2024-01-01 0:00 UTC)).unwrap(), 4);

        let built = build_index(docs.to_str().unwrap(), out.to_str().unwrap()).unwrap();
        assert_eq!(built.len(), 4);

        let index = load_from_path(&out).unwrap();
        // "exploring" occurs in Space Exploration and Ocean Depths; the later one wins
        let rows = run_query(&index, "exploring").unwrap();
        assert_eq!(rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(), vec!["Ocean Depths", "Space Exploration"]);
        assert!(rows[0].locator.ends_with("Ocean%20Depths_John%20Doe_1704067201"));

        let rows = run_query(&index, "alice").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].author, "alice johnson");
    }

    #[test]
    fn locators_display_readably() {
        assert_eq!(display_locator("documents/Ocean%20Depths_John%20Doe_17.5"), "documents/Ocean Depths - John Doe - 17.5");
        assert_eq!(display_locator("documents/snake%5Fcase%2Fv2_A%20B_-1.5"), "documents/snake_case/v2 - A B - -1.5");
    }
}
