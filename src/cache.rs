//! Durable snapshots of the page index.
//!
//! Indexing a large page tree and pre-rendering every page is the slow part
//! of serving. This module persists the finished record set so a fresh
//! process can answer requests without re-indexing.
//!
//! # Design
//!
//! Both backends implement [`CacheStore`] and are chosen once, when the
//! site is built from config ([`open`]). Nothing downstream branches on
//! which one is in use.
//!
//! ## Flat file ([`FileCache`])
//!
//! The whole record set is one JSON document with a format `version`.
//! `save` writes a sibling temp file and renames it over the old one, so a
//! failed save leaves the previous snapshot intact. `load` returns `None`
//! if the file is missing, unparsable, or from another format version.
//! `lookup` loads the document and scans it, so callers holding the loaded
//! set should search that instead (see [`CacheStore::has_keyed_lookup`]).
//!
//! ## SQLite ([`SqliteCache`])
//!
//! One row per source file. Addressed pages also own their slug path;
//! pages without one are found through their file stem:
//!
//! ```sql
//! pages(source_path PRIMARY KEY, slug_path UNIQUE NULL, stem, properties, ancestors, html)
//! ```
//!
//! `save` upserts every record inside a single transaction, so readers see
//! either the old batch or the new one. Rows for pages that disappeared from
//! the source tree are **not** pruned, unless a newer page claims their slug
//! path. `lookup` is an indexed read.
//!
//! The schema version lives in `PRAGMA user_version`; a database written
//! with another layout is dropped and recreated on open.

use crate::config::{CacheBackend, CacheConfig};
use crate::types::{PageRecord, Properties};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Version of the flat-file snapshot format. Bump this to invalidate all
/// existing snapshots when the record layout changes.
const SNAPSHOT_VERSION: u32 = 1;

/// Layout of the SQLite `pages` table.
const SCHEMA_VERSION: i64 = 2;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Cache connection lock poisoned")]
    Poisoned,
}

/// Persistence for the full page set.
pub trait CacheStore: Send + Sync {
    /// Persist every record. Never leaves a previously valid cache corrupt.
    fn save(&self, pages: &[PageRecord]) -> Result<(), CacheError>;

    /// All cached records, or `None` when there is no valid cache yet.
    fn load(&self) -> Result<Option<Vec<PageRecord>>, CacheError>;

    /// The cached record at `slug_path`.
    fn lookup(&self, slug_path: &str) -> Result<Option<PageRecord>, CacheError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether `lookup` reads one record instead of the whole set.
    fn has_keyed_lookup(&self) -> bool {
        false
    }
}

/// Open the backend named in `config`, or `None` when caching is off.
pub fn open(config: &CacheConfig) -> Result<Option<Box<dyn CacheStore>>, CacheError> {
    if !config.enabled() {
        return Ok(None);
    }
    let path = PathBuf::from(&config.path);
    Ok(match config.backend {
        CacheBackend::None => None,
        CacheBackend::File => Some(Box::new(FileCache::new(path))),
        CacheBackend::Sqlite => Some(Box::new(SqliteCache::open(&path)?)),
    })
}

// =============================================================================
// Flat-file backend
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    pages: Vec<PageRecord>,
}

/// JSON snapshot of the whole record set.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CacheStore for FileCache {
    fn save(&self, pages: &[PageRecord]) -> Result<(), CacheError> {
        let json = serde_json::to_string(&Snapshot {
            version: SNAPSHOT_VERSION,
            pages: pages.to_vec(),
        })?;

        let tmp = self.temp_path();

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| CacheError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(&tmp, json).map_err(|source| CacheError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            CacheError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        debug!("saved {} pages to {}", pages.len(), self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<PageRecord>>, CacheError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                debug!("ignoring unreadable snapshot {}: {e}", self.path.display());
                return Ok(None);
            }
        };
        if snapshot.version != SNAPSHOT_VERSION {
            return Ok(None);
        }
        Ok(Some(snapshot.pages))
    }

    fn lookup(&self, slug_path: &str) -> Result<Option<PageRecord>, CacheError> {
        Ok(self
            .load()?
            .and_then(|pages| pages.into_iter().find(|p| p.address() == slug_path)))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// =============================================================================
// SQLite backend
// =============================================================================

/// One row per source file, upserted inside a transaction.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != SCHEMA_VERSION {
            debug!("sqlite schema version {version}, recreating pages table");
            conn.execute_batch("DROP TABLE IF EXISTS pages;")?;
        }
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS pages (
                source_path TEXT PRIMARY KEY NOT NULL,
                slug_path   TEXT UNIQUE,
                stem        TEXT NOT NULL,
                properties  TEXT NOT NULL,
                ancestors   TEXT NOT NULL,
                html        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS pages_stem ON pages (stem) WHERE slug_path IS NULL;
            PRAGMA user_version = {SCHEMA_VERSION};
            "#
        ))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Number of rows, stale ones included.
    pub fn row_count(&self) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

/// Raw column values of one row.
struct Row {
    source_path: String,
    slug_path: Option<String>,
    properties: String,
    ancestors: String,
    html: String,
}

impl Row {
    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source_path: row.get(0)?,
            slug_path: row.get(1)?,
            properties: row.get(2)?,
            ancestors: row.get(3)?,
            html: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<PageRecord, CacheError> {
        let properties: Properties = serde_json::from_str(&self.properties)?;
        let ancestors: Vec<String> = serde_json::from_str(&self.ancestors)?;
        let mut record = PageRecord::new(self.source_path, properties);
        record.slug_path = self.slug_path;
        record.ancestors = ancestors;
        record.html = (!self.html.is_empty()).then_some(self.html);
        Ok(record)
    }
}

const SELECT_COLUMNS: &str = "SELECT source_path, slug_path, properties, ancestors, html FROM pages";

impl CacheStore for SqliteCache {
    fn save(&self, pages: &[PageRecord]) -> Result<(), CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            // A stale row from another file may still hold the slug path.
            let mut release = tx.prepare(
                "DELETE FROM pages WHERE slug_path = ?1 AND source_path <> ?2",
            )?;
            let mut upsert = tx.prepare(
                r#"
                INSERT INTO pages (source_path, slug_path, stem, properties, ancestors, html)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(source_path) DO UPDATE SET
                    slug_path  = excluded.slug_path,
                    stem       = excluded.stem,
                    properties = excluded.properties,
                    ancestors  = excluded.ancestors,
                    html       = excluded.html
                "#,
            )?;
            for page in pages {
                if let Some(slug_path) = &page.slug_path {
                    release.execute(params![slug_path, page.source_path])?;
                }
                upsert.execute(params![
                    page.source_path,
                    page.slug_path,
                    page.file_stem(),
                    serde_json::to_string(&page.properties)?,
                    serde_json::to_string(&page.ancestors)?,
                    page.html.as_deref().unwrap_or_default(),
                ])?;
            }
        }
        tx.commit()?;
        debug!("upserted {} pages", pages.len());
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<PageRecord>>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY source_path"))?;
        let rows = stmt
            .query_map([], Row::from_sql)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Ok(None);
        }
        rows.into_iter()
            .map(Row::into_record)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn lookup(&self, slug_path: &str) -> Result<Option<PageRecord>, CacheError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE slug_path = ?1 OR (slug_path IS NULL AND stem = ?1) \
                     ORDER BY source_path LIMIT 1"
                ),
                params![slug_path],
                Row::from_sql,
            )
            .optional()?;
        row.map(Row::into_record).transpose()
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn has_keyed_lookup(&self) -> bool {
        true
    }
}
