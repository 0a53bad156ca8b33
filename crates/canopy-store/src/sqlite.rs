//! SQLite engine: the durable, transactional backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_name, BackingStore};

/// Connection plus the tables already created through it.
struct SqliteInner {
    conn: Connection,
    record_tables: HashSet<String>,
    set_tables: HashSet<String>,
}

impl SqliteInner {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            record_tables: HashSet::new(),
            set_tables: HashSet::new(),
        }
    }

    /// Create `rec_<table>` on first use.
    fn records(&mut self, table: &str) -> StoreResult<String> {
        let sql_name = format!("rec_{table}");
        if !self.record_tables.contains(table) {
            validate_name(table)?;
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {sql_name} (
                    id TEXT PRIMARY KEY NOT NULL,
                    body BLOB NOT NULL
                );"
            ))?;
            self.record_tables.insert(table.to_string());
            debug!(table, "created record table");
        }
        Ok(sql_name)
    }

    /// Create `set_<set>` on first use.
    fn set(&mut self, set: &str) -> StoreResult<String> {
        let sql_name = format!("set_{set}");
        if !self.set_tables.contains(set) {
            validate_name(set)?;
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {sql_name} (
                    key TEXT NOT NULL,
                    member TEXT NOT NULL,
                    PRIMARY KEY (key, member)
                ) WITHOUT ROWID;
                CREATE INDEX IF NOT EXISTS idx_{sql_name}_member ON {sql_name}(member);"
            ))?;
            self.set_tables.insert(set.to_string());
            debug!(set, "created set table");
        }
        Ok(sql_name)
    }
}

/// SQLite-backed store.
///
/// Each logical table becomes a `rec_<table>` SQL table and each logical set
/// a `set_<set>` table keyed by `(key, member)`. Every call runs on the
/// blocking thread pool so the async caller is never stalled on disk I/O.
pub struct SqliteStore {
    inner: Arc<Mutex<SqliteInner>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            inner: Arc::new(Mutex::new(SqliteInner::new(conn))),
            path: Some(path.to_path_buf()),
        })
    }

    /// A private in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(SqliteInner::new(conn))),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteInner) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("sqlite worker failed: {e}")))?
    }
}

#[async_trait]
impl BackingStore for SqliteStore {
    async fn get(&self, table: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        let (table, id) = (table.to_string(), id.to_string());
        self.run(move |db| {
            let sql_name = db.records(&table)?;
            let body = db
                .conn
                .query_row(
                    &format!("SELECT body FROM {sql_name} WHERE id = ?1"),
                    params![id],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(body)
        })
        .await
    }

    async fn put(&self, table: &str, id: &str, body: Vec<u8>) -> StoreResult<()> {
        let (table, id) = (table.to_string(), id.to_string());
        self.run(move |db| {
            let sql_name = db.records(&table)?;
            db.conn.execute(
                &format!(
                    "INSERT INTO {sql_name} (id, body) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET body = excluded.body"
                ),
                params![id, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResult<bool> {
        let (table, id) = (table.to_string(), id.to_string());
        self.run(move |db| {
            let sql_name = db.records(&table)?;
            let changed = db
                .conn
                .execute(&format!("DELETE FROM {sql_name} WHERE id = ?1"), params![id])?;
            Ok(changed > 0)
        })
        .await
    }

    async fn exists(&self, table: &str, id: &str) -> StoreResult<bool> {
        let (table, id) = (table.to_string(), id.to_string());
        self.run(move |db| {
            let sql_name = db.records(&table)?;
            let found = db.conn.query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM {sql_name} WHERE id = ?1)"),
                params![id],
                |row| row.get::<_, bool>(0),
            )?;
            Ok(found)
        })
        .await
    }

    async fn add_member(&self, set: &str, key: &str, member: &str) -> StoreResult<()> {
        let (set, key, member) = (set.to_string(), key.to_string(), member.to_string());
        self.run(move |db| {
            let sql_name = db.set(&set)?;
            db.conn.execute(
                &format!("INSERT OR IGNORE INTO {sql_name} (key, member) VALUES (?1, ?2)"),
                params![key, member],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_member(&self, set: &str, key: &str, member: &str) -> StoreResult<bool> {
        let (set, key, member) = (set.to_string(), key.to_string(), member.to_string());
        self.run(move |db| {
            let sql_name = db.set(&set)?;
            let changed = db.conn.execute(
                &format!("DELETE FROM {sql_name} WHERE key = ?1 AND member = ?2"),
                params![key, member],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn members(&self, set: &str, key: &str) -> StoreResult<Vec<String>> {
        let (set, key) = (set.to_string(), key.to_string());
        self.run(move |db| {
            let sql_name = db.set(&set)?;
            let mut stmt = db.conn.prepare(&format!(
                "SELECT member FROM {sql_name} WHERE key = ?1 ORDER BY member"
            ))?;
            let members = stmt
                .query_map(params![key], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(members)
        })
        .await
    }

    async fn clear_members(&self, set: &str, key: &str) -> StoreResult<usize> {
        let (set, key) = (set.to_string(), key.to_string());
        self.run(move |db| {
            let sql_name = db.set(&set)?;
            let changed = db
                .conn
                .execute(&format!("DELETE FROM {sql_name} WHERE key = ?1"), params![key])?;
            Ok(changed)
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish()
    }
}
