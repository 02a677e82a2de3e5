//! Full pipeline over an on-disk SQLite database.

use quill::adapters::{load_highlight_items, load_note_content, NOTE_UNAVAILABLE};
use quill::highlight::{highlight, highlight_exact, highlight_fuzzy, highlight_fuzzy_match};
use quill::ranking::MatchOptions;
use quill::snippet::clean_clipboard_text;
use quill::{Database, Destination, Key, MatchMode, PaletteEvent, QueryOrchestrator, SearchConfig, SourceType};
use quill::CommandPalette;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn doc(text: &str) -> serde_json::Value {
    json!({"type": "doc", "content": [{"type": "paragraph", "content": [{"type": "text", "text": text}]}]})
}

/// Create a populated database in a temp dir
fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path().join("notes.sqlite")).unwrap();

    let languages = db.insert_tag("Languages", Some("programming languages"), Some(1)).unwrap();
    let fruit = db.insert_tag("Fruit", None, Some(1)).unwrap();
    db.insert_tag("Catalog", Some("library index"), None).unwrap();

    db.insert_vocabulary_entry(languages, "Java", 0).unwrap();
    db.insert_vocabulary_entry(languages, "JavaScript", 1).unwrap();
    db.insert_vocabulary_entry(fruit, "苹果；apple；pomme", 0).unwrap();
    db.insert_vocabulary_entry(fruit, "log;catalog", 1).unwrap();

    let rust = db.insert_note(Some("Rust notes"), "", "").unwrap();
    db.upsert_note_json(rust, &doc("Java and Rust compared")).unwrap();
    let long = db.insert_note(None, "", "").unwrap();
    let body = format!("{} JavaScript closures {}", "padding ".repeat(30), "trailing ".repeat(30));
    db.upsert_note_json(long, &doc(&body)).unwrap();

    (db, temp_dir)
}

fn config() -> SearchConfig {
    SearchConfig { debounce_ms: 0, ..SearchConfig::default() }
}

#[tokio::test]
async fn exact_search_across_sources() {
    let (db, _temp) = create_test_db();
    let orchestrator = QueryOrchestrator::new(Arc::new(db), config());

    let results = orchestrator.search("java", MatchMode::Exact).await;
    let vocabulary: Vec<&str> = results.group(SourceType::Vocabulary).unwrap().iter().map(|r| r.title.as_str()).collect();
    assert_eq!(vocabulary, vec!["Java", "JavaScript"]);
    assert!(results.group(SourceType::Tag).is_none());

    let articles = results.group(SourceType::Article).unwrap();
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].title, "Rust notes");
    assert_eq!(articles[1].title, format!("Note {}", articles[1].id));
    let preview = articles[1].content.as_deref().unwrap();
    assert!(preview.starts_with("...") && preview.ends_with("..."));
    assert!(preview.contains("JavaScript closures"));
}

#[tokio::test]
async fn split_titles_search_individually() {
    let (db, _temp) = create_test_db();
    let orchestrator = QueryOrchestrator::new(Arc::new(db), config());

    let results = orchestrator.search("catalog", MatchMode::Exact).await;
    let vocabulary = results.group(SourceType::Vocabulary).unwrap();
    assert_eq!(vocabulary.len(), 1);
    assert_eq!(vocabulary[0].title, "catalog");
    assert_eq!(vocabulary[0].category.as_deref(), Some("Fruit"));
    let tags = results.group(SourceType::Tag).unwrap();
    assert_eq!(tags[0].tags_id, Some(tags[0].id));
}

#[tokio::test]
async fn fuzzy_search_ranks_closest_first() {
    let (db, _temp) = create_test_db();
    let orchestrator = QueryOrchestrator::new(Arc::new(db), config());

    let results = orchestrator.search("javascrpt", MatchMode::Fuzzy).await;
    let vocabulary = results.group(SourceType::Vocabulary).unwrap();
    assert_eq!(vocabulary[0].title, "JavaScript");
}

#[tokio::test]
async fn committed_tag_routes_to_tag_tree() {
    let (db, _temp) = create_test_db();
    let palette = CommandPalette::new(QueryOrchestrator::new(Arc::new(db), config()));
    palette.open();
    palette.orchestrator().submit("Catalog", MatchMode::Exact).unwrap().await.unwrap();

    // vocabulary "catalog" first, then the tag
    assert_eq!(palette.handle_key(Key::ArrowDown), PaletteEvent::Moved(1));
    let PaletteEvent::Committed(selected) = palette.handle_key(Key::Enter) else {
        panic!("expected a commit");
    };
    assert_eq!(selected.result.source_type(), SourceType::Tag);
    assert_eq!(selected.destination(), Destination::OpenTag { tag_id: selected.result.id });
}

#[tokio::test]
async fn overlay_highlights_vocabulary() {
    let (db, _temp) = create_test_db();
    let items = load_highlight_items(&db, 1).await;
    assert_eq!(items.len(), 7);

    let text = clean_clipboard_text("\n\nI ate an apple\u{200B} and read the catalog.\n\n\n");
    assert_eq!(text, "I ate an apple and read the catalog.");
    let outcome = highlight(&text, &items);
    assert_eq!(outcome.found_keywords, vec!["苹果；apple；pomme", "log;catalog"]);
    assert!(outcome.highlighted_text.contains(">catalog</mark>"));
    assert!(!outcome.highlighted_text.contains(">log</mark>"));

    let fruit: Vec<_> = items.iter().filter(|i| i.original_title.contains("apple")).cloned().collect();
    let fuzzy = highlight_fuzzy("I ate an aple", &fruit, &MatchOptions::new(0.6, 100, 0));
    assert!(fuzzy.found_keywords.contains(&"苹果；apple；pomme".to_string()));
}

#[tokio::test]
async fn note_content_loads_sanitized() {
    let (db, _temp) = create_test_db();
    db.upsert_note_content(99, r#"<p onclick="x()">Hello</p><script>alert(1)</script>"#, "Hello").unwrap();
    assert_eq!(load_note_content(&db, 99).await, "<p>Hello</p>");
    assert_eq!(load_note_content(&db, 12345).await, NOTE_UNAVAILABLE);
}

#[test]
fn palette_row_highlighting() {
    assert_eq!(
        highlight_exact("Java & JavaScript", "java"),
        r#"<mark class="query-highlight">Java</mark> &amp; <mark class="query-highlight">Java</mark>Script"#
    );
    let row = highlight_fuzzy_match("JavaScript", "javscript", &MatchOptions::new(0.6, 100, 0));
    assert!(row.starts_with(r#"<span class="fuzzy-highlight">Ja"#));
    assert!(row.ends_with("</span>"));
}

#[test]
fn backfill_on_reopened_database() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.sqlite");
    {
        let db = Database::open(&path).unwrap();
        db.upsert_note_content(1, &doc("persisted text").to_string(), "").unwrap();
    }
    let db = Database::open(&path).unwrap();
    assert_eq!(db.generate_plain_text_for_existing_notes().unwrap(), 1);
    assert_eq!(db.article_bodies_matching("persisted", 10).unwrap().len(), 1);
}
