//! SQLite connections using `rusqlite`.
//!
//! `rusqlite` is synchronous, so every statement runs inside
//! `tokio::task::spawn_blocking` with the connection behind an async mutex.
//!
//! Features:
//! - Foreign key enforcement on by default (`foreign_keys` option)
//! - WAL journal mode for file databases
//! - In-memory databases via the `:memory:` path
//! - `busy_timeout` and `mode` (`ro`, `rw`, `rwc`) options

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::OpenFlags;
use sqlweave_core::{SqlError, SqlResult};
use sqlweave_db::{
    BindParameterSet, CompiledQuery, Connection, DialectDescriptor, Executor, RawRowSet, Row,
    Value,
};
use tokio::sync::Mutex;

use crate::config::ConnectionConfig;
use crate::errors::from_sqlite;
use crate::pool::Connector;

/// Opens [`SqliteConnection`]s for a pool.
pub struct SqliteConnector {
    config: ConnectionConfig,
}

impl SqliteConnector {
    pub const fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.config.dialect
    }

    async fn connect(&self) -> SqlResult<Box<dyn Connection>> {
        let config = self.config.clone();
        let dialect = self.config.dialect.name().to_string();
        let conn = tokio::task::spawn_blocking(move || SqliteConnection::open(&config))
            .await
            .map_err(|e| SqlError::InvalidConnection {
                dialect,
                message: format!("task join error: {e}"),
            })??;
        Ok(Box::new(conn))
    }
}

/// One SQLite database handle.
pub struct SqliteConnection {
    dialect: Arc<DialectDescriptor>,
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
    broken: AtomicBool,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("dialect", &self.dialect.name())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Opens the database named by `config.database`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConnection` if the file cannot be opened or an option
    /// value is malformed.
    pub fn open(config: &ConnectionConfig) -> SqlResult<Self> {
        let name = config.dialect.name();
        let path = PathBuf::from(&config.database);
        let in_memory = config.database == ":memory:";

        let flags = match config.option_str("mode") {
            None | Some("rwc") => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            Some("rw") => OpenFlags::SQLITE_OPEN_READ_WRITE,
            Some("ro") => OpenFlags::SQLITE_OPEN_READ_ONLY,
            Some(other) => {
                return Err(SqlError::InvalidConnection {
                    dialect: name.to_string(),
                    message: format!("unknown mode '{other}', expected ro, rw or rwc"),
                })
            }
        } | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let read_only = flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY);

        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open_with_flags(&path, flags)
        }
        .map_err(|e| from_sqlite(name, &e))?;

        let foreign_keys = config
            .options
            .get("foreign_keys")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);
        let mut pragmas = format!(
            "PRAGMA foreign_keys = {};",
            if foreign_keys { "ON" } else { "OFF" }
        );
        if let Some(ms) = config.options.get("busy_timeout").and_then(serde_json::Value::as_u64) {
            pragmas.push_str(&format!(" PRAGMA busy_timeout = {ms};"));
        }
        if !in_memory && !read_only {
            pragmas.push_str(" PRAGMA journal_mode = WAL;");
        }
        conn.execute_batch(&pragmas)
            .map_err(|e| from_sqlite(name, &e))?;

        tracing::debug!(dialect = %name, path = %path.display(), "Opened SQLite database");
        Ok(Self {
            dialect: Arc::clone(&config.dialect),
            path,
            conn: Arc::new(Mutex::new(conn)),
            broken: AtomicBool::new(false),
        })
    }

    /// Opens a private in-memory database.
    pub fn memory() -> SqlResult<Self> {
        Self::open(&ConnectionConfig::sqlite_memory()?)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn to_sqlite(value: &Value) -> SqliteValue {
        match value {
            Value::Null => SqliteValue::Null,
            Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
            Value::Int(i) => SqliteValue::Integer(*i),
            Value::Float(f) => SqliteValue::Real(*f),
            Value::Decimal(s) | Value::String(s) => SqliteValue::Text(s.clone()),
            Value::Bytes(b) => SqliteValue::Blob(b.clone()),
            Value::Json(j) => SqliteValue::Text(j.to_string()),
            other => SqliteValue::Text(other.to_string()),
        }
    }

    /// Binds wire values to a prepared statement.
    fn bind_params(
        stmt: &mut rusqlite::Statement<'_>,
        binds: &BindParameterSet,
        dialect: &str,
    ) -> SqlResult<()> {
        match binds {
            BindParameterSet::Positional(values) => {
                for (i, value) in values.iter().enumerate() {
                    stmt.raw_bind_parameter(i + 1, Self::to_sqlite(value))
                        .map_err(|e| from_sqlite(dialect, &e))?;
                }
            }
            BindParameterSet::Named(values) => {
                for (name, value) in values {
                    let index = ["@", ":", "$"]
                        .iter()
                        .find_map(|sigil| {
                            stmt.parameter_index(&format!("{sigil}{name}")).ok().flatten()
                        })
                        .ok_or_else(|| {
                            SqlError::invalid_descriptor(
                                dialect,
                                format!("statement has no parameter named '{name}'"),
                            )
                        })?;
                    stmt.raw_bind_parameter(index, Self::to_sqlite(value))
                        .map_err(|e| from_sqlite(dialect, &e))?;
                }
            }
        }
        Ok(())
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values = (0..column_names.len())
            .map(|i| match sqlite_row.get_ref(i).unwrap_or(ValueRef::Null) {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(v) => Value::Int(v),
                ValueRef::Real(v) => Value::Float(v),
                ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
                ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
            })
            .collect();
        Row::new(column_names.to_vec(), values)
    }

    fn run(
        conn: &rusqlite::Connection,
        query: &CompiledQuery,
        dialect: &str,
    ) -> SqlResult<RawRowSet> {
        let mut stmt = conn.prepare(&query.sql).map_err(|e| from_sqlite(dialect, &e))?;
        Self::bind_params(&mut stmt, &query.binds, dialect)?;

        if stmt.column_count() == 0 {
            let affected = stmt.raw_execute().map_err(|e| from_sqlite(dialect, &e))?;
            return Ok(RawRowSet::affected(affected as u64));
        }

        let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut raw_rows = stmt.raw_query();
        let mut rows = Vec::new();
        while let Some(row) = raw_rows.next().map_err(|e| from_sqlite(dialect, &e))? {
            rows.push(Self::convert_row(row, &column_names));
        }
        Ok(RawRowSet::from_rows(rows))
    }
}

#[async_trait]
impl Executor for SqliteConnection {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.dialect
    }

    async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
        let conn = Arc::clone(&self.conn);
        let query = query.clone();
        let dialect = self.dialect.name().to_string();
        tracing::debug!(dialect = %dialect, sql = %query.sql, binds = query.binds.len(), "Executing statement");

        let outcome = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::run(&conn, &query, &dialect)
        })
        .await;
        outcome.unwrap_or_else(|e| {
            self.broken.store(true, Ordering::SeqCst);
            Err(SqlError::ConnectionLost {
                dialect: self.dialect.name().to_string(),
                message: format!("task join error: {e}"),
                state: None,
            })
        })
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn is_valid(&self) -> bool {
        self.execute_raw("SELECT 1").await.is_ok()
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_core::{DatabaseSettings, ErrorKind};

    #[tokio::test]
    async fn test_sqlite_memory_open() {
        let conn = SqliteConnection::memory().unwrap();
        assert_eq!(conn.dialect().name(), "sqlite");
        assert!(conn.is_valid().await);
        assert!(!conn.is_broken());
    }

    #[tokio::test]
    async fn test_sqlite_insert_and_query() {
        let conn = SqliteConnection::memory().unwrap();
        conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
            .await
            .unwrap();

        let insert = CompiledQuery::new(
            "INSERT INTO users (name, age) VALUES (?, ?)",
            BindParameterSet::Positional(vec![Value::from("Alice"), Value::from(30)]),
        );
        assert_eq!(conn.execute(&insert).await.unwrap().rows_affected, 1);

        let rows = conn.execute_raw("SELECT id, name, age FROM users").await.unwrap();
        assert_eq!(rows.rows.len(), 1);
        let row = rows.first().unwrap();
        assert_eq!(row.get::<String>("name").unwrap(), "Alice");
        assert_eq!(row.get::<i64>("age").unwrap(), 30);
    }

    #[tokio::test]
    async fn test_sqlite_named_binds() {
        let conn = SqliteConnection::memory().unwrap();
        let mut values = std::collections::BTreeMap::new();
        values.insert("sqlweave_1".to_string(), Value::from(7));
        let query = CompiledQuery::new("SELECT @sqlweave_1 AS v", BindParameterSet::Named(values));
        let rows = conn.execute(&query).await.unwrap();
        assert_eq!(rows.first().unwrap().get::<i64>("v").unwrap(), 7);
    }

    #[tokio::test]
    async fn test_sqlite_null_and_bytes() {
        let conn = SqliteConnection::memory().unwrap();
        conn.execute_raw("CREATE TABLE t (a TEXT, b BLOB)").await.unwrap();
        let insert = CompiledQuery::new(
            "INSERT INTO t (a, b) VALUES (?, ?)",
            BindParameterSet::Positional(vec![Value::Null, Value::Bytes(vec![1, 2])]),
        );
        conn.execute(&insert).await.unwrap();
        let rows = conn.execute_raw("SELECT a, b FROM t").await.unwrap();
        let row = rows.first().unwrap();
        assert_eq!(row.get_value("a"), Some(&Value::Null));
        assert_eq!(row.get_value("b"), Some(&Value::Bytes(vec![1, 2])));
    }

    #[tokio::test]
    async fn test_sqlite_foreign_keys_enforced() {
        let conn = SqliteConnection::memory().unwrap();
        conn.execute_raw("CREATE TABLE parent (id INTEGER PRIMARY KEY)").await.unwrap();
        conn.execute_raw("CREATE TABLE child (parent_id INTEGER REFERENCES parent (id))")
            .await
            .unwrap();
        let err = conn
            .execute_raw("INSERT INTO child (parent_id) VALUES (1)")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForeignKeyConstraint);
    }

    #[tokio::test]
    async fn test_sqlite_syntax_error() {
        let conn = SqliteConnection::memory().unwrap();
        let err = conn.execute_raw("SELEC 1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseError);
        assert!(!conn.is_broken());
    }

    #[test]
    fn test_sqlite_bad_mode() {
        let mut settings = DatabaseSettings::default();
        settings.options.insert("mode".into(), serde_json::json!("rx"));
        let config = ConnectionConfig::from_settings(&settings).unwrap();
        let err = SqliteConnection::open(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConnection);
    }

    #[test]
    fn test_sqlite_missing_file_read_only() {
        let mut settings = DatabaseSettings {
            database: "/nonexistent/dir/db.sqlite".into(),
            ..DatabaseSettings::default()
        };
        settings.options.insert("mode".into(), serde_json::json!("ro"));
        let config = ConnectionConfig::from_settings(&settings).unwrap();
        let err = SqliteConnection::open(&config).unwrap_err();
        assert!(err.is_connection_error());
    }
}
