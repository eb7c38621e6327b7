//! SQLite-backed content store.
//!
//! One `contents` table keyed by record id, with a unique index on
//! `(provider, external_id)` so re-ingesting the same provider item updates
//! it in place. Tags are stored as a JSON array and timestamps as RFC 3339
//! text.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_search::{ContentKind, ContentRecord, ContentStore, SearchError, SearchParams, SortMode};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use uuid::Uuid;

use super::schema::apply_schema;

const COLUMNS: &str = "id, external_id, provider, title, kind, published_at, views, likes, \
     reactions, reading_time, tags, score, raw_data, created_at, updated_at";

/// Errors from the SQLite store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for SearchError {
    fn from(e: StoreError) -> Self {
        SearchError::Persistence(e.to_string())
    }
}

/// SQLite-backed [`ContentStore`].
///
/// The connection sits behind a `Mutex` and every call runs on the blocking
/// thread pool, so async callers never block on SQLite I/O.
#[derive(Clone)]
pub struct SqliteContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        tracing::info!(path = %path.display(), "opened content store");
        Ok(Self::from_connection(conn))
    }

    /// A private, in-process database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `op` against the connection on the blocking pool.
    async fn run<T, F>(&self, op: F) -> hub_search::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let joined = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard)
        })
        .await;
        match joined {
            Ok(result) => result.map_err(SearchError::from),
            Err(e) => Err(StoreError::Task(e.to_string()).into()),
        }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn search(&self, params: &SearchParams) -> hub_search::Result<(Vec<ContentRecord>, u64)> {
        let params = params.clone().normalized();
        self.run(move |conn| search(conn, &params)).await
    }

    async fn search_by_provider(
        &self,
        provider: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> hub_search::Result<Vec<ContentRecord>> {
        let provider = provider.to_owned();
        let query = query.to_owned();
        self.run(move |conn| search_by_provider(conn, &provider, &query, page, per_page))
            .await
    }

    async fn upsert(&self, record: &ContentRecord) -> hub_search::Result<()> {
        let record = record.clone();
        self.run(move |conn| upsert(conn, &record)).await
    }

    async fn get_by_id(&self, id: Uuid) -> hub_search::Result<Option<ContentRecord>> {
        self.run(move |conn| get_by_id(conn, id)).await
    }

    async fn ping(&self) -> hub_search::Result<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn offset(page: u32, per_page: u32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(per_page)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn search(conn: &Connection, params: &SearchParams) -> Result<(Vec<ContentRecord>, u64), StoreError> {
    let mut clauses = vec!["instr(lower(title), lower(?)) > 0".to_owned()];
    let mut args = vec![Value::Text(params.query.clone())];

    if !params.content_kinds.is_empty() {
        clauses.push(format!("kind IN ({})", placeholders(params.content_kinds.len())));
        args.extend(
            params
                .content_kinds
                .iter()
                .map(|k| Value::Text(k.as_str().to_owned())),
        );
    }
    if !params.tags.is_empty() {
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(contents.tags) WHERE lower(json_each.value) IN ({}))",
            placeholders(params.tags.len())
        ));
        args.extend(params.tags.iter().map(|t| Value::Text(t.to_lowercase())));
    }
    let filter = clauses.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM contents WHERE {filter}"),
        params_from_iter(args.iter()),
        |row| row.get(0),
    )?;

    let order = match params.sort {
        SortMode::Relevance => "score DESC, rowid ASC",
        SortMode::Popularity => "(views + reactions) DESC, score DESC, rowid ASC",
    };
    args.push(Value::Integer(i64::from(params.per_page)));
    args.push(Value::Integer(offset(params.page, params.per_page)));

    let sql = format!("SELECT {COLUMNS} FROM contents WHERE {filter} ORDER BY {order} LIMIT ? OFFSET ?");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), row_to_record)?;

    let mut records = Vec::new();
    for r in rows {
        records.push(r?);
    }
    Ok((records, u64::try_from(total).unwrap_or(0)))
}

fn search_by_provider(
    conn: &Connection,
    provider: &str,
    query: &str,
    page: u32,
    per_page: u32,
) -> Result<Vec<ContentRecord>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM contents \
         WHERE provider = ?1 AND instr(lower(title), lower(?2)) > 0 \
         ORDER BY score DESC, rowid ASC LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![provider, query, i64::from(per_page), offset(page, per_page)],
        row_to_record,
    )?;

    let mut records = Vec::new();
    for r in rows {
        records.push(r?);
    }
    Ok(records)
}

fn upsert(conn: &Connection, record: &ContentRecord) -> Result<(), StoreError> {
    let tags = serde_json::to_string(&record.tags).map_err(|e| StoreError::Encode(e.to_string()))?;
    conn.execute(
        "INSERT INTO contents (id, external_id, provider, title, kind, published_at, views, likes, \
         reactions, reading_time, tags, score, raw_data, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
         ON CONFLICT(provider, external_id) DO UPDATE SET \
             title = excluded.title, \
             kind = excluded.kind, \
             published_at = excluded.published_at, \
             views = excluded.views, \
             likes = excluded.likes, \
             reactions = excluded.reactions, \
             reading_time = excluded.reading_time, \
             tags = excluded.tags, \
             score = excluded.score, \
             raw_data = excluded.raw_data, \
             updated_at = excluded.updated_at",
        params![
            record.id.to_string(),
            record.external_id,
            record.provider,
            record.title,
            record.kind.as_str(),
            record.published_at.to_rfc3339(),
            sql_int(record.views),
            sql_int(record.likes),
            sql_int(record.reactions),
            sql_int(record.reading_time),
            tags,
            record.score,
            record.raw_data,
            record.created_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn get_by_id(conn: &Connection, id: Uuid) -> Result<Option<ContentRecord>, StoreError> {
    let record = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM contents WHERE id = ?1"),
            params![id.to_string()],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// Row conversions
// ---------------------------------------------------------------------------

fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn metric(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    Ok(u64::try_from(raw).unwrap_or(0))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentRecord> {
    let id: String = row.get(0)?;
    let kind: String = row.get(4)?;
    let tags_json: String = row.get(10)?;
    let raw_data: Option<Vec<u8>> = row.get(12)?;

    Ok(ContentRecord {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        external_id: row.get(1)?,
        provider: row.get(2)?,
        title: row.get(3)?,
        kind: kind.parse::<ContentKind>().map_err(|e| conversion_error(4, e))?,
        published_at: timestamp(row, 5)?,
        views: metric(row, 6)?,
        likes: metric(row, 7)?,
        reactions: metric(row, 8)?,
        reading_time: metric(row, 9)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        score: row.get(11)?,
        raw_data: raw_data.unwrap_or_default(),
        created_at: timestamp(row, 13)?,
        updated_at: timestamp(row, 14)?,
    })
}
