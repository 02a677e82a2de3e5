//! quill: command-line front end for the palette search pipeline.
//!
//! Usage:
//!   quill --db notes.sqlite seed               # Insert a small demo dataset
//!   quill --db notes.sqlite search java        # Exact search across all sources
//!   quill --db notes.sqlite search jaav --fuzzy
//!   quill --db notes.sqlite highlight "text"   # Highlight vocabulary keywords
//!   quill --db notes.sqlite backfill           # Fill in missing plain text

use clap::{Parser, Subcommand};
use quill::adapters::load_highlight_items;
use quill::highlight::{highlight, highlight_fuzzy};
use quill::ranking::MatchOptions;
use quill::snippet::clean_clipboard_text;
use quill::{Database, MatchMode, QueryOrchestrator, SearchConfig};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Multi-source search for notes, tags and vocabulary")]
#[command(version)]
struct Cli {
    /// SQLite database path
    #[arg(long)]
    db: PathBuf,

    /// JSON search configuration (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query through every source
    Search {
        query: String,

        /// Approximate matching instead of substring containment
        #[arg(short, long)]
        fuzzy: bool,
    },

    /// Highlight vocabulary keywords in a piece of text
    Highlight {
        text: String,

        #[arg(short, long)]
        fuzzy: bool,
    },

    /// Generate plain text for notes that lack it
    Backfill,

    /// Insert a small demo dataset
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("quill=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => SearchConfig::from_file(path)?,
        None => SearchConfig::default(),
    };
    let db = Database::open(&cli.db)?;

    match cli.command {
        Commands::Search { query, fuzzy } => {
            let mode = if fuzzy { MatchMode::Fuzzy } else { MatchMode::Exact };
            // One-shot queries have no keystrokes to debounce
            let config = SearchConfig { debounce_ms: 0, ..config };
            let orchestrator = QueryOrchestrator::new(Arc::new(db), config);
            let results = orchestrator.search(&query, mode).await;

            if results.is_empty() {
                println!("No results for {:?}", query);
            }
            for group in results.groups() {
                println!("{} ({})", group.source_type.label(), group.results.len());
                for result in &group.results {
                    match (&result.category, &result.content) {
                        (Some(category), _) => println!("  [{}] {}  ({})", result.id, result.title, category),
                        (None, Some(content)) if !content.is_empty() => {
                            println!("  [{}] {}\n      {}", result.id, result.title, content)
                        }
                        _ => println!("  [{}] {}", result.id, result.title),
                    }
                }
            }
        }
        Commands::Highlight { text, fuzzy } => {
            let items = load_highlight_items(&db, config.vocabulary_category_id).await;
            let text = clean_clipboard_text(&text);
            let outcome = if fuzzy {
                highlight_fuzzy(&text, &items, &MatchOptions::highlight(&config.fuzzy))
            } else {
                highlight(&text, &items)
            };
            println!("{}", outcome.highlighted_text);
            if !outcome.found_keywords.is_empty() {
                println!("Found: {}", outcome.found_keywords.join(", "));
            }
        }
        Commands::Backfill => {
            let updated = db.generate_plain_text_for_existing_notes()?;
            println!("Updated {} notes", updated);
        }
        Commands::Seed => {
            seed(&db, config.vocabulary_category_id)?;
            println!("Seeded demo data into {}", cli.db.display());
        }
    }

    Ok(())
}

fn paragraph_doc(paragraphs: &[&str]) -> serde_json::Value {
    let content: Vec<serde_json::Value> = paragraphs
        .iter()
        .map(|p| json!({"type": "paragraph", "content": [{"type": "text", "text": p}]}))
        .collect();
    json!({"type": "doc", "content": content})
}

fn seed(db: &Database, category_id: i64) -> anyhow::Result<()> {
    let languages = db.insert_tag("Languages", Some("programming languages"), Some(category_id))?;
    let fruit = db.insert_tag("Fruit", Some("vocabulary: fruit"), Some(category_id))?;
    db.insert_tag("Journal", Some("daily notes"), None)?;

    for (order, title) in ["Java", "JavaScript", "Rust；rustlang", "Haskell"].iter().enumerate() {
        db.insert_vocabulary_entry(languages, title, order as i64)?;
    }
    for (order, title) in ["苹果；apple；pomme", "香蕉；banana"].iter().enumerate() {
        db.insert_vocabulary_entry(fruit, title, order as i64)?;
    }

    let notes: [(&str, &[&str]); 3] = [
        ("Why Rust", &["Ownership and borrowing replace a garbage collector.", "Java and Rust differ in memory models."]),
        ("Shopping", &["Buy an apple, two bananas and some pomme de terre."]),
        ("Scratch", &["JavaScript closures capture variables by reference."]),
    ];
    for (title, paragraphs) in notes {
        let id = db.insert_note(Some(title), "", "")?;
        db.upsert_note_json(id, &paragraph_doc(paragraphs))?;
    }
    Ok(())
}
