//! SQLite storage for tags, vocabulary entries and note bodies
//!
//! Uses r2d2 connection pooling so palette fetches from the three sources can
//! read concurrently. The async `NoteStorage` impl moves each query onto a
//! blocking thread with a cloned pool handle.

use crate::interface::NoteStorage;
use crate::models::{ArticleBody, ArticleMatchRow, Tag, VocabularyEntry};
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Note {0} not found")]
    NotFound(i64),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Block-level node types followed by a line break in extracted text
const BLOCK_NODES: [&str; 3] = ["paragraph", "heading", "listItem"];

fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Escape `LIKE` wildcards so the query matches literally
fn like_pattern(query: &str) -> String {
    let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Recursively collect the text of an editor document.
///
/// Plain strings pass through; `paragraph`, `heading` and `listItem` nodes end
/// with a newline.
pub fn extract_text_from_tiptap_json(node: &Value) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    text
}

fn collect_text(node: &Value, out: &mut String) {
    match node {
        Value::String(s) => out.push_str(s),
        Value::Object(map) => {
            let node_type = map.get("type").and_then(Value::as_str);
            if node_type == Some("text") {
                if let Some(text) = map.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            if let Some(Value::Array(children)) = map.get("content") {
                for child in children {
                    collect_text(child, out);
                }
            }
            if node_type.is_some_and(|t| BLOCK_NODES.contains(&t)) {
                out.push('\n');
            }
        }
        _ => {}
    }
}

/// Plain text for a stored body: editor JSON when it parses, raw text otherwise
fn plain_text_for(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(doc) => extract_text_from_tiptap_json(&doc),
        Err(_) => content.to_string(),
    }
}

/// Thread-safe database wrapper using connection pooling
///
/// Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                    PRAGMA cache_size=-16000;
                ")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(4)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (tests and demos)
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                Ok(())
            });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                category_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS vocabulary_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                tags_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS notes_metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT
            );

            CREATE TABLE IF NOT EXISTS notes_content (
                note_id INTEGER PRIMARY KEY,
                content TEXT NOT NULL,
                plain_text TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tags_category ON tags(category_id);
            CREATE INDEX IF NOT EXISTS idx_vocabulary_tag ON vocabulary_entries(tags_id, sort_order);
        "#)?;
        Ok(())
    }

    // ─── Inserts ────────────────────────────────────────────────────────────

    pub fn insert_tag(&self, name: &str, description: Option<&str>, category_id: Option<i64>) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tags (name, description, category_id) VALUES (?1, ?2, ?3)",
            params![name, description, category_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_vocabulary_entry(&self, tag_id: i64, title: &str, sort_order: i64) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO vocabulary_entries (title, sort_order, tags_id) VALUES (?1, ?2, ?3)",
            params![title, sort_order, tag_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Create a note with metadata and a body. Returns the note id.
    pub fn insert_note(&self, title: Option<&str>, content: &str, plain_text: &str) -> DatabaseResult<i64> {
        let id = {
            let conn = self.get_conn()?;
            conn.execute("INSERT INTO notes_metadata (title) VALUES (?1)", params![title])?;
            conn.last_insert_rowid()
        };
        self.upsert_note_content(id, content, plain_text)?;
        Ok(id)
    }

    /// Insert or replace a note body, bumping `updated_at`
    pub fn upsert_note_content(&self, note_id: i64, content: &str, plain_text: &str) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO notes_content (note_id, content, plain_text, updated_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(note_id) DO UPDATE SET
                 content = excluded.content,
                 plain_text = excluded.plain_text,
                 updated_at = excluded.updated_at"#,
            params![note_id, content, plain_text, now_timestamp()],
        )?;
        Ok(())
    }

    /// Store an editor document, serialized, with its extracted plain text
    pub fn upsert_note_json(&self, note_id: i64, doc: &Value) -> DatabaseResult<()> {
        let plain_text = extract_text_from_tiptap_json(doc);
        self.upsert_note_content(note_id, &doc.to_string(), plain_text.trim())
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn tags_by_category(&self, category_id: i64) -> DatabaseResult<Vec<Tag>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id, name, description FROM tags WHERE category_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![category_id], Self::row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn all_tags(&self) -> DatabaseResult<Vec<Tag>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id, name, description FROM tags ORDER BY id")?;
        let rows = stmt.query_map([], Self::row_to_tag)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn vocabulary_entries_by_tag(&self, tag_id: i64) -> DatabaseResult<Vec<VocabularyEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title FROM vocabulary_entries WHERE tags_id = ?1 ORDER BY sort_order, id",
        )?;
        let rows = stmt
            .query_map(params![tag_id], |row| Ok(VocabularyEntry { id: row.get(0)?, title: row.get(1)? }))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Literal substring search over non-empty plain-text bodies.
    /// Case-insensitive for ASCII only (SQLite `LIKE`).
    pub fn article_bodies_matching(&self, query: &str, limit: usize) -> DatabaseResult<Vec<ArticleMatchRow>> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT nc.note_id, nm.title, nc.plain_text, nc.content
               FROM notes_content nc
               LEFT JOIN notes_metadata nm ON nc.note_id = nm.id
               WHERE nc.plain_text IS NOT NULL
                 AND nc.plain_text != ''
                 AND nc.plain_text LIKE ?1 ESCAPE '\'
               ORDER BY nc.note_id
               LIMIT ?2"#,
        )?;
        let rows = stmt
            .query_map(params![like_pattern(query), limit as i64], |row| {
                Ok(ArticleMatchRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    plain_text: row.get(2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // Whitespace-only bodies pass the SQL filter but have nothing to show
        Ok(rows.into_iter().filter(|r| !r.plain_text.trim().is_empty()).collect())
    }

    pub fn all_article_bodies(&self) -> DatabaseResult<Vec<ArticleBody>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT note_id, content FROM notes_content ORDER BY note_id")?;
        let rows = stmt
            .query_map([], |row| Ok(ArticleBody { id: row.get(0)?, content: row.get(1)? }))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn note_content(&self, note_id: i64) -> DatabaseResult<String> {
        let conn = self.get_conn()?;
        conn.query_row(
            "SELECT content FROM notes_content WHERE note_id = ?1",
            params![note_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .ok_or(DatabaseError::NotFound(note_id))
    }

    // ─── Maintenance ────────────────────────────────────────────────────────

    /// Fill in missing plain text from stored bodies. Returns how many notes
    /// were updated; bodies that yield only whitespace are left alone.
    pub fn generate_plain_text_for_existing_notes(&self) -> DatabaseResult<usize> {
        let mut conn = self.get_conn()?;
        let pending: Vec<(i64, String)> = {
            let mut stmt = conn.prepare(
                "SELECT note_id, content FROM notes_content WHERE plain_text IS NULL OR plain_text = ''",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare("UPDATE notes_content SET plain_text = ?1 WHERE note_id = ?2")?;
            for (note_id, content) in &pending {
                let plain_text = plain_text_for(content);
                let trimmed = plain_text.trim();
                if trimmed.is_empty() {
                    tracing::debug!(note_id, "no text to extract");
                    continue;
                }
                stmt.execute(params![trimmed, note_id])?;
                updated += 1;
            }
        }
        tx.commit()?;

        tracing::info!(updated, scanned = pending.len(), "plain text backfill complete");
        Ok(updated)
    }

    fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    }

    /// Run a query on the blocking pool with a shared handle to this database
    async fn blocking<T, F>(&self, f: F) -> DatabaseResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> DatabaseResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

#[async_trait::async_trait]
impl NoteStorage for Database {
    async fn get_tags_by_category(&self, category_id: i64) -> DatabaseResult<Vec<Tag>> {
        self.blocking(move |db| db.tags_by_category(category_id)).await
    }

    async fn get_vocabulary_entries_by_tag(&self, tag_id: i64) -> DatabaseResult<Vec<VocabularyEntry>> {
        self.blocking(move |db| db.vocabulary_entries_by_tag(tag_id)).await
    }

    async fn get_all_tags(&self) -> DatabaseResult<Vec<Tag>> {
        self.blocking(|db| db.all_tags()).await
    }

    async fn search_article_bodies(&self, query: &str, limit: usize) -> DatabaseResult<Vec<ArticleMatchRow>> {
        let query = query.to_string();
        self.blocking(move |db| db.article_bodies_matching(&query, limit)).await
    }

    async fn get_all_article_bodies(&self) -> DatabaseResult<Vec<ArticleBody>> {
        self.blocking(|db| db.all_article_bodies()).await
    }

    async fn get_note_content_by_id(&self, id: i64) -> DatabaseResult<String> {
        self.blocking(move |db| db.note_content(id)).await
    }
}
