use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One successful evaluation, as persisted.
/// Immutable once written; `id` and `created_at` are assigned by the store.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OperationRecord {
    pub id: i64,
    pub expression: String,
    pub result: f64,
    pub created_at: DateTime<Utc>,
}

/// Append-only history sink shared by the single and batch paths
pub trait HistoryStore: Send + Sync {
    /// Persist a result. Returns once the row is committed.
    fn append(&self, expression: &str, result: f64) -> Result<OperationRecord>;

    /// Every record, newest (highest id) first
    fn list_all(&self) -> Result<Vec<OperationRecord>>;

    fn count(&self) -> Result<i64>;
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            expression TEXT NOT NULL,
            result REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_operations_created_at ON operations(created_at)",
        [],
    )?;

    Ok(())
}

pub fn insert_operation(conn: &Connection, expression: &str, result: f64) -> Result<OperationRecord> {
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO operations (expression, result, created_at) VALUES (?1, ?2, ?3)",
        params![expression, result, created_at.to_rfc3339()],
    )
    .context("Failed to insert operation")?;

    Ok(OperationRecord {
        id: conn.last_insert_rowid(),
        expression: expression.to_string(),
        result,
        created_at,
    })
}

pub fn get_all_operations(conn: &Connection) -> Result<Vec<OperationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, expression, result, created_at
         FROM operations
         ORDER BY id DESC",
    )?;

    let operations = stmt
        .query_map([], |row| {
            let created_at_str: String = row.get(3)?;

            Ok(OperationRecord {
                id: row.get(0)?,
                expression: row.get(1)?,
                result: row.get(2)?,
                created_at: DateTime::parse_from_rfc3339(&created_at_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(operations)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;

    Ok(count)
}

/// SQLite-backed history. A single connection serialises every append, which
/// is all the per-append atomicity callers rely on.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, expression: &str, result: f64) -> Result<OperationRecord> {
        insert_operation(&*self.lock()?, expression, result)
    }

    fn list_all(&self) -> Result<Vec<OperationRecord>> {
        get_all_operations(&*self.lock()?)
    }

    fn count(&self) -> Result<i64> {
        verify_count(&*self.lock()?)
    }
}
