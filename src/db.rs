//! Catalog store: persistent, path-keyed photo index backed by SQLite

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Statement, TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::categorize::{Categorizer, ImageTraits};
use crate::error::CatalogError;
use crate::models::{
    path_key, CatalogEntry, CatalogStats, DuplicateGroup, EntryUpdate, InsertOutcome,
    LocationStats,
};

type Result<T> = std::result::Result<T, CatalogError>;

/// How long a writer waits for another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest page `list` will return
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Page size when none is given
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const MAX_SEARCH_LEN: usize = 500;
const MAX_CATEGORY_LEN: usize = 100;

/// Rows re-labelled per transaction by `recategorize_all`
const RECATEGORIZE_BATCH: usize = 100;

/// Storage format of `date_taken`; sorts lexically
const DATE_TAKEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ENTRY_COLUMNS: &str = "path, content_hash, size, storage_location, volume_name, \
     width, height, format, date_taken, date_modified, thumbnail, category, hidden, indexed_at";

const INSERT_SQL: &str = "INSERT INTO photos
     (path, content_hash, size, storage_location, volume_name, width, height, format,
      date_taken, date_modified, thumbnail, category, hidden, indexed_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// Whitelisted sort columns for [`Catalog::list`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    DateModified,
    DateTaken,
    Size,
    Width,
    Height,
}

impl SortKey {
    fn column(&self) -> &'static str {
        match self {
            SortKey::DateModified => "date_modified",
            SortKey::DateTaken => "date_taken",
            SortKey::Size => "size",
            SortKey::Width => "width",
            SortKey::Height => "height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter, sort and page for [`Catalog::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Exact decoder format, case-insensitive
    pub format: Option<String>,
    pub category: Option<String>,
    /// Substring of the path
    pub search: Option<String>,
    pub include_hidden: bool,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            format: None,
            category: None,
            search: None,
            include_hidden: false,
            sort: SortKey::default(),
            order: SortOrder::default(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl ListQuery {
    fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(CatalogError::InvalidQuery(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.limit
            )));
        }
        if let Some(search) = &self.search {
            if search.chars().count() > MAX_SEARCH_LEN {
                return Err(CatalogError::InvalidQuery(format!(
                    "search is longer than {MAX_SEARCH_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

/// One page of [`Catalog::list`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub entries: Vec<CatalogEntry>,
    /// Rows matching the filter, ignoring pagination
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// The photo catalog
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let catalog = Self { conn };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Open in-memory catalog (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let catalog = Self { conn };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS photos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                content_hash TEXT NOT NULL,
                size INTEGER NOT NULL,
                storage_location TEXT NOT NULL,
                volume_name TEXT NOT NULL,
                width INTEGER,
                height INTEGER,
                format TEXT,
                date_taken TEXT,
                date_modified INTEGER NOT NULL,
                thumbnail TEXT,
                category TEXT,
                hidden INTEGER NOT NULL DEFAULT 0,
                indexed_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_photos_hash ON photos(content_hash);
            CREATE INDEX IF NOT EXISTS idx_photos_content ON photos(content_hash, size);
            CREATE INDEX IF NOT EXISTS idx_photos_date_taken ON photos(date_taken);
            CREATE INDEX IF NOT EXISTS idx_photos_size ON photos(size);
            ",
        )?;
        Ok(())
    }

    /// Whether `path` is already catalogued
    pub fn exists(&self, path: &Path) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM photos WHERE path = ?1")?;
        Ok(stmt.exists(params![key_of(path)?])?)
    }

    /// Insert one entry; `DuplicatePath` when the path is already catalogued
    pub fn insert(&self, entry: &CatalogEntry) -> Result<()> {
        let key = key_of(&entry.path)?;
        let mut stmt = self.conn.prepare_cached(INSERT_SQL)?;
        execute_insert(&mut stmt, entry, key)
    }

    /// Insert a batch in one transaction
    ///
    /// A path that is already catalogued yields `AlreadyIndexed` and does not
    /// affect the rest of the batch. Any other failure rolls the whole batch back.
    pub fn insert_batch(&mut self, entries: &[CatalogEntry]) -> Result<Vec<InsertOutcome>> {
        let mut outcomes = Vec::with_capacity(entries.len());
        if entries.is_empty() {
            return Ok(outcomes);
        }

        // Take the write lock up front so the busy timeout applies.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut insert = tx.prepare(INSERT_SQL)?;
            let mut same_content = tx.prepare(
                "SELECT path FROM photos
                 WHERE content_hash = ?1 AND size = ?2 AND path <> ?3
                 ORDER BY date_modified LIMIT 1",
            )?;

            for entry in entries {
                let key = key_of(&entry.path)?;
                let existing: Option<String> = same_content
                    .query_row(
                        params![entry.content_hash, entry.size as i64, key],
                        |row| row.get(0),
                    )
                    .optional()?;

                match execute_insert(&mut insert, entry, key) {
                    Ok(()) => outcomes.push(match existing {
                        Some(other) => InsertOutcome::InsertedDuplicate(PathBuf::from(other)),
                        None => InsertOutcome::Inserted,
                    }),
                    Err(CatalogError::DuplicatePath(_)) => {
                        outcomes.push(InsertOutcome::AlreadyIndexed)
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        tx.commit()?;
        Ok(outcomes)
    }

    pub fn get(&self, path: &Path) -> Result<Option<CatalogEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM photos WHERE path = ?1");
        let entry = self
            .conn
            .query_row(&sql, params![key_of(path)?], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    /// All entries with the given content hash, oldest first
    pub fn find_by_hash(&self, hash: &str) -> Result<Vec<CatalogEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM photos WHERE content_hash = ?1 ORDER BY date_modified, path"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![hash], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Groups of two or more entries sharing `(content_hash, size)`
    ///
    /// Largest files first; members ordered by modification time.
    pub fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM photos p
             JOIN (
                 SELECT content_hash AS dup_hash, size AS dup_size FROM photos
                 GROUP BY content_hash, size HAVING COUNT(*) > 1
             ) d ON p.content_hash = d.dup_hash AND p.size = d.dup_size
             ORDER BY p.size DESC, p.content_hash, p.date_modified, p.path"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_entry)?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for row in rows {
            let entry = row?;
            match groups.last_mut() {
                Some(group) if group.content_hash == entry.content_hash && group.size == entry.size => {
                    group.entries.push(entry)
                }
                _ => groups.push(DuplicateGroup {
                    content_hash: entry.content_hash.clone(),
                    size: entry.size,
                    entries: vec![entry],
                }),
            }
        }
        Ok(groups)
    }

    /// Partial update of the mutable fields
    ///
    /// A rename changes the catalogued path only; the file on disk is left alone.
    pub fn update(&self, path: &Path, update: &EntryUpdate) -> Result<()> {
        let key = key_of(path)?;
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = &update.category {
            let category = category.trim();
            if category.is_empty() || category.chars().count() > MAX_CATEGORY_LEN {
                return Err(CatalogError::InvalidQuery(format!(
                    "category must be 1 to {MAX_CATEGORY_LEN} characters"
                )));
            }
            values.push(Value::Text(category.to_string()));
            sets.push(format!("category = ?{}", values.len()));
        }

        if let Some(hidden) = update.hidden {
            values.push(Value::Integer(hidden as i64));
            sets.push(format!("hidden = ?{}", values.len()));
        }

        let new_key = update.path.as_deref().map(key_of).transpose()?;
        if let Some(new_key) = new_key {
            if new_key.trim().is_empty() {
                return Err(CatalogError::InvalidQuery("path must not be empty".into()));
            }
            values.push(Value::Text(new_key.to_string()));
            sets.push(format!("path = ?{}", values.len()));
        }

        if sets.is_empty() {
            return if self.exists(path)? {
                Ok(())
            } else {
                Err(CatalogError::NotFound(key.to_string()))
            };
        }

        values.push(Value::Text(key.to_string()));
        let sql = format!(
            "UPDATE photos SET {} WHERE path = ?{}",
            sets.join(", "),
            values.len()
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| match new_key {
                Some(new_key) => unique_violation(e, new_key),
                None => CatalogError::Sqlite(e),
            })?;

        if changed == 0 {
            return Err(CatalogError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Delete a row; returns whether one existed
    pub fn remove(&self, path: &Path) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM photos WHERE path = ?1", params![key_of(path)?])?;
        Ok(changed > 0)
    }

    /// Filtered, sorted page of entries plus the total match count
    pub fn list(&self, query: &ListQuery) -> Result<Page> {
        query.validate()?;

        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if !query.include_hidden {
            clauses.push("hidden = 0".to_string());
        }
        if let Some(format) = &query.format {
            values.push(Value::Text(format.clone()));
            clauses.push(format!("UPPER(format) = UPPER(?{})", values.len()));
        }
        if let Some(category) = &query.category {
            values.push(Value::Text(category.clone()));
            clauses.push(format!("category = ?{}", values.len()));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            values.push(Value::Text(format!("%{}%", escape_like(search))));
            clauses.push(format!("path LIKE ?{} ESCAPE '\\'", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM photos{where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(query.limit as i64));
        let limit_idx = values.len();
        values.push(Value::Integer(query.offset as i64));
        let offset_idx = values.len();

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM photos{where_sql}
             ORDER BY {} {}, path
             LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
            query.sort.column(),
            query.order.keyword(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        Ok(Page {
            entries,
            total: total as u64,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Get row count
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Aggregates over every row, whether or not the file still exists
    pub fn stats(&self) -> Result<CatalogStats> {
        let (total, total_bytes): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM photos",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let duplicate_groups: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (
                 SELECT 1 FROM photos GROUP BY content_hash, size HAVING COUNT(*) > 1
             )",
            [],
            |row| row.get(0),
        )?;

        let mut formats = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT format, COUNT(*) AS n FROM photos GROUP BY format ORDER BY n DESC, format",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                formats.push(row?);
            }
        }

        let mut locations = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT storage_location, volume_name, COUNT(*) AS n, COALESCE(SUM(size), 0)
                 FROM photos GROUP BY storage_location, volume_name
                 ORDER BY n DESC, storage_location, volume_name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(LocationStats {
                    storage_location: row.get(0)?,
                    volume_name: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                    bytes: row.get::<_, i64>(3)? as u64,
                })
            })?;
            for row in rows {
                locations.push(row?);
            }
        }

        let mut categories = BTreeMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT category, COUNT(*) FROM photos WHERE category IS NOT NULL GROUP BY category",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                let (category, count) = row?;
                categories.insert(category, count);
            }
        }

        Ok(CatalogStats {
            total: total as u64,
            total_bytes: total_bytes as u64,
            duplicate_groups: duplicate_groups as u64,
            formats,
            locations,
            categories,
        })
    }

    /// Distinct category labels, sorted
    pub fn categories(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT category FROM photos
             WHERE category IS NOT NULL AND category <> '' ORDER BY category",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    /// Re-run the categorizer over every row; returns per-label counts
    ///
    /// Manual overrides are replaced.
    pub fn recategorize_all(&mut self, categorizer: &Categorizer) -> Result<BTreeMap<String, u64>> {
        let mut rows: Vec<(String, Option<u32>, Option<u32>, bool)> = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT path, width, height, date_taken IS NOT NULL FROM photos")?;
            let mapped = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }

        let mut counts = BTreeMap::new();
        for chunk in rows.chunks(RECATEGORIZE_BATCH) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare("UPDATE photos SET category = ?1 WHERE path = ?2")?;
                for (path, width, height, dated) in chunk {
                    let traits = ImageTraits::new(Path::new(path), *width, *height, *dated);
                    let category = categorizer.categorize(&traits);
                    stmt.execute(params![category.as_str(), path])?;
                    *counts.entry(category.as_str().to_string()).or_insert(0) += 1;
                }
            }
            tx.commit()?;
        }

        log::info!("Recategorized {} photos", rows.len());
        Ok(counts)
    }
}

/// Catalog key of `path`; a path without an exact text form is rejected
fn key_of(path: &Path) -> Result<&str> {
    path_key(path).ok_or_else(|| CatalogError::NonUtf8Path(path.to_path_buf()))
}

fn execute_insert(stmt: &mut Statement<'_>, entry: &CatalogEntry, key: &str) -> Result<()> {
    let indexed_at = entry.indexed_at.unwrap_or_else(Utc::now);
    stmt.execute(params![
        key,
        entry.content_hash,
        entry.size as i64,
        entry.storage_location,
        entry.volume_name,
        entry.width,
        entry.height,
        entry.format,
        entry
            .date_taken
            .map(|d| d.format(DATE_TAKEN_FORMAT).to_string()),
        entry.date_modified.timestamp(),
        entry.thumbnail,
        entry.category,
        entry.hidden,
        indexed_at.timestamp(),
    ])
    .map(|_| ())
    .map_err(|e| unique_violation(e, key))
}

/// Map a UNIQUE violation on the path column to `DuplicatePath`
fn unique_violation(err: rusqlite::Error, key: &str) -> CatalogError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            CatalogError::DuplicatePath(key.to_string())
        }
        other => CatalogError::Sqlite(other),
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let path: String = row.get(0)?;
    let date_taken: Option<String> = row.get(8)?;
    let indexed_at: Option<i64> = row.get(13)?;
    Ok(CatalogEntry {
        path: PathBuf::from(path),
        content_hash: row.get(1)?,
        size: row.get::<_, i64>(2)? as u64,
        storage_location: row.get(3)?,
        volume_name: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        format: row.get(7)?,
        date_taken: date_taken
            .and_then(|s| NaiveDateTime::parse_from_str(&s, DATE_TAKEN_FORMAT).ok()),
        date_modified: from_unix(row.get(9)?),
        thumbnail: row.get(10)?,
        category: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
        hidden: row.get(12)?,
        indexed_at: indexed_at.map(from_unix),
    })
}
