//! Connection pooling on `deadpool::managed`.
//!
//! The [`Pool`] hands out [`PooledConnection`]s, which implement
//! [`Connection`] and can be passed straight to
//! [`Transaction::begin`]. Dropping a pooled connection returns it to the
//! pool. Before an idle connection is handed out again it is checked:
//!
//! - a connection that reported `ConnectionLost` is discarded;
//! - so is one marked with [`Connection::discard`], such as a connection
//!   whose transaction could not be started or closed;
//! - a connection whose last statement was abandoned mid-flight is validated
//!   with a round trip, and discarded if that fails;
//! - with `validate_on_recycle`, every idle connection is validated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool::managed::{self, Metrics, PoolError, RecycleError, RecycleResult};
use sqlweave_core::{PoolSettings, SqlError, SqlResult};
use sqlweave_db::{
    BindParameterSet, CompiledQuery, Connection, DialectDescriptor, Executor, RawRowSet,
    Transaction, TransactionOptions,
};

use crate::config::ConnectionConfig;

pub use managed::Status;

/// Opens physical connections for one database.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    fn dialect(&self) -> &Arc<DialectDescriptor>;

    async fn connect(&self) -> SqlResult<Box<dyn Connection>>;
}

/// Picks the compiled-in driver for the configured dialect family.
///
/// # Errors
///
/// Returns `ConfigurationError` when no driver for the family is compiled in.
pub fn connector_for(config: &ConnectionConfig) -> SqlResult<Box<dyn Connector>> {
    match config.dialect.capabilities.family {
        #[cfg(feature = "sqlite")]
        sqlweave_db::DialectFamily::Sqlite => Ok(Box::new(crate::sqlite::SqliteConnector::new(config.clone()))),
        #[cfg(feature = "postgres")]
        sqlweave_db::DialectFamily::Postgres => Ok(Box::new(crate::postgresql::PostgresConnector::new(
            config.clone(),
        ))),
        #[cfg(feature = "mysql")]
        sqlweave_db::DialectFamily::MySql | sqlweave_db::DialectFamily::MariaDb => {
            Ok(Box::new(crate::mysql::MySqlConnector::new(config.clone())))
        }
        family => Err(SqlError::ConfigurationError(format!(
            "no driver for dialect family '{family}' is compiled in (dialect '{}')",
            config.dialect.name()
        ))),
    }
}

/// A pooled connection plus its in-flight and discard markers.
pub struct ManagedConnection {
    inner: Box<dyn Connection>,
    in_flight: AtomicBool,
    discarded: AtomicBool,
}

/// The `deadpool` manager creating and recycling connections.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    validate_on_recycle: bool,
}

impl managed::Manager for ConnectionManager {
    type Type = ManagedConnection;
    type Error = SqlError;

    async fn create(&self) -> Result<ManagedConnection, SqlError> {
        let inner = self.connector.connect().await?;
        tracing::debug!(dialect = %self.connector.dialect().name(), "Opened connection");
        Ok(ManagedConnection {
            inner,
            in_flight: AtomicBool::new(false),
            discarded: AtomicBool::new(false),
        })
    }

    async fn recycle(&self, conn: &mut ManagedConnection, _: &Metrics) -> RecycleResult<SqlError> {
        if conn.inner.is_broken() {
            return Err(RecycleError::Message("connection was lost".into()));
        }
        if conn.discarded.load(Ordering::Acquire) {
            tracing::debug!(dialect = %self.connector.dialect().name(), "Closing discarded connection");
            return Err(RecycleError::Message("connection was discarded".into()));
        }
        let abandoned = conn.in_flight.swap(false, Ordering::AcqRel);
        if abandoned {
            tracing::debug!(dialect = %self.connector.dialect().name(), "Validating connection with an abandoned statement");
        }
        if (abandoned || self.validate_on_recycle) && !conn.inner.is_valid().await {
            tracing::warn!(dialect = %self.connector.dialect().name(), "Discarding connection that failed validation");
            return Err(RecycleError::Message("connection failed validation".into()));
        }
        Ok(())
    }
}

/// A pool of connections to one database.
#[derive(Clone)]
pub struct Pool {
    inner: managed::Pool<ConnectionManager>,
    dialect: Arc<DialectDescriptor>,
    acquire_timeout: Duration,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("dialect", &self.dialect.name())
            .field("status", &self.inner.status())
            .finish()
    }
}

impl Pool {
    /// Builds a pool around `connector`. No connection is opened until the
    /// first [`acquire`](Self::acquire).
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the pool settings are invalid.
    pub fn new(connector: Box<dyn Connector>, settings: &PoolSettings) -> SqlResult<Self> {
        let dialect = Arc::clone(connector.dialect());
        let acquire_timeout = Duration::from_millis(settings.acquire_timeout_ms);
        let manager = ConnectionManager {
            connector,
            validate_on_recycle: settings.validate_on_recycle,
        };
        let inner = managed::Pool::builder(manager)
            .max_size(settings.max_size)
            .wait_timeout(Some(acquire_timeout))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| SqlError::ConfigurationError(format!("invalid pool settings: {e}")))?;
        tracing::info!(
            dialect = %dialect.name(),
            max_size = settings.max_size,
            acquire_timeout_ms = settings.acquire_timeout_ms,
            "Connection pool created"
        );
        Ok(Self {
            inner,
            dialect,
            acquire_timeout,
        })
    }

    /// Builds a pool using the driver compiled in for `config`'s dialect.
    pub fn from_config(config: &ConnectionConfig) -> SqlResult<Self> {
        Self::new(connector_for(config)?, &config.pool)
    }

    pub const fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.dialect
    }

    pub fn status(&self) -> Status {
        self.inner.status()
    }

    /// Waits for a free connection, opening one if the pool has room.
    ///
    /// # Errors
    ///
    /// Returns `AcquireTimeout` once the configured timeout elapses, and the
    /// driver's connection error when opening a new connection fails.
    pub async fn acquire(&self) -> SqlResult<PooledConnection> {
        let dialect = self.dialect.name();
        match self.inner.get().await {
            Ok(object) => Ok(PooledConnection {
                object,
                dialect: Arc::clone(&self.dialect),
            }),
            Err(PoolError::Timeout(_)) => Err(SqlError::AcquireTimeout {
                dialect: dialect.to_string(),
                waited_ms: u64::try_from(self.acquire_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(PoolError::Backend(e)) => Err(e),
            Err(PoolError::Closed) => Err(SqlError::InvalidConnection {
                dialect: dialect.to_string(),
                message: "the pool is closed".to_string(),
            }),
            Err(e) => Err(SqlError::ConfigurationError(format!("pool error: {e}"))),
        }
    }

    /// Returns `conn` to the pool. Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Checks `conn` with a round trip.
    pub async fn validate(&self, conn: &PooledConnection) -> bool {
        !conn.is_broken() && conn.is_valid().await
    }

    /// Runs `sql` with `binds` on `conn`.
    pub async fn execute(
        &self,
        conn: &PooledConnection,
        sql: &str,
        binds: BindParameterSet,
    ) -> SqlResult<RawRowSet> {
        conn.execute(&CompiledQuery::new(sql, binds)).await
    }

    /// Acquires a connection and starts a transaction on it. The connection
    /// returns to the pool when the transaction finishes.
    pub async fn begin(&self, options: TransactionOptions) -> SqlResult<Transaction> {
        let conn = self.acquire().await?;
        Transaction::begin(Box::new(conn), options).await
    }

    /// Stops handing out connections and drops idle ones.
    pub fn close(&self) {
        self.inner.close();
    }
}

/// A connection checked out of a [`Pool`].
pub struct PooledConnection {
    object: managed::Object<ConnectionManager>,
    dialect: Arc<DialectDescriptor>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("dialect", &self.dialect.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for PooledConnection {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.dialect
    }

    async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
        // Left set if this future is dropped before the driver answers.
        self.object.in_flight.store(true, Ordering::Release);
        let result = self.object.inner.execute(query).await;
        self.object.in_flight.store(false, Ordering::Release);
        result
    }
}

#[async_trait]
impl Connection for PooledConnection {
    async fn is_valid(&self) -> bool {
        self.object.inner.is_valid().await
    }

    fn is_broken(&self) -> bool {
        self.object.inner.is_broken()
    }

    fn discard(&self) {
        self.object.discarded.store(true, Ordering::Release);
        self.object.inner.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_core::ErrorKind;
    use sqlweave_db::{DialectRegistry, IsolationLevel};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        validated: AtomicUsize,
        /// Every statement, tagged with the number of the connection it ran on.
        log: std::sync::Mutex<Vec<(usize, String)>>,
        /// Statements starting with one of these fail.
        failing: std::sync::Mutex<Vec<&'static str>>,
    }

    struct MockConnector {
        dialect: Arc<DialectDescriptor>,
        counters: Arc<Counters>,
    }

    struct MockConnection {
        id: usize,
        dialect: Arc<DialectDescriptor>,
        counters: Arc<Counters>,
        broken: AtomicBool,
    }

    #[async_trait]
    impl Executor for MockConnection {
        fn dialect(&self) -> &Arc<DialectDescriptor> {
            &self.dialect
        }

        async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
            self.counters.log.lock().unwrap().push((self.id, query.sql.clone()));
            let failing = self.counters.failing.lock().unwrap().clone();
            if failing.iter().any(|prefix| query.sql.starts_with(prefix)) {
                return Err(SqlError::database(self.dialect.name(), "boom"));
            }
            match query.sql.as_str() {
                "SLOW" => {
                    std::future::pending::<()>().await;
                    Ok(RawRowSet::default())
                }
                "LOST" => {
                    self.broken.store(true, Ordering::SeqCst);
                    Err(SqlError::ConnectionLost {
                        dialect: self.dialect.name().to_string(),
                        message: "reset by peer".into(),
                        state: None,
                    })
                }
                _ => Ok(RawRowSet::affected(query.binds.len() as u64)),
            }
        }
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn is_valid(&self) -> bool {
            self.counters.validated.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn is_broken(&self) -> bool {
            self.broken.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn dialect(&self) -> &Arc<DialectDescriptor> {
            &self.dialect
        }

        async fn connect(&self) -> SqlResult<Box<dyn Connection>> {
            let id = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Box::new(MockConnection {
                id,
                dialect: Arc::clone(&self.dialect),
                counters: Arc::clone(&self.counters),
                broken: AtomicBool::new(false),
            }))
        }
    }

    fn pool(max_size: usize, acquire_timeout_ms: u64, validate_on_recycle: bool) -> (Pool, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let connector = MockConnector {
            dialect: DialectRegistry::global().resolve("postgres").unwrap(),
            counters: Arc::clone(&counters),
        };
        let settings = PoolSettings {
            max_size,
            acquire_timeout_ms,
            validate_on_recycle,
        };
        (Pool::new(Box::new(connector), &settings).unwrap(), counters)
    }

    #[tokio::test]
    async fn test_released_connections_are_reused() {
        let (pool, counters) = pool(2, 1_000, false);
        let conn = pool.acquire().await.unwrap();
        pool.release(conn);
        let conn = pool.acquire().await.unwrap();
        pool.release(conn);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().size, 1);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let (pool, _) = pool(1, 50, false);
        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AcquireTimeout);
        assert!(err.to_string().contains("50ms"));
    }

    #[tokio::test]
    async fn test_lost_connection_is_discarded() {
        let (pool, counters) = pool(1, 1_000, false);
        let conn = pool.acquire().await.unwrap();
        let err = conn.execute_raw("LOST").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionLost);
        assert!(!pool.validate(&conn).await);
        pool.release(conn);
        let _fresh = pool.acquire().await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_statement_triggers_validation() {
        let (pool, counters) = pool(1, 1_000, false);
        let conn = pool.acquire().await.unwrap();
        let abandoned = tokio::time::timeout(Duration::from_millis(10), conn.execute_raw("SLOW")).await;
        assert!(abandoned.is_err());
        pool.release(conn);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(counters.validated.load(Ordering::SeqCst), 1);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        pool.release(conn);

        // The marker is cleared once validated.
        let _conn = pool.acquire().await.unwrap();
        assert_eq!(counters.validated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validate_on_recycle() {
        let (pool, counters) = pool(1, 1_000, true);
        pool.release(pool.acquire().await.unwrap());
        pool.release(pool.acquire().await.unwrap());
        assert_eq!(counters.validated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_with_binds() {
        let (pool, _) = pool(1, 1_000, false);
        let conn = pool.acquire().await.unwrap();
        let binds = BindParameterSet::Positional(vec![1.into(), 2.into()]);
        let result = pool.execute(&conn, "SELECT $1, $2", binds).await.unwrap();
        assert_eq!(result.rows_affected, 2);
    }

    #[tokio::test]
    async fn test_transaction_returns_connection() {
        let (pool, counters) = pool(1, 100, false);
        let tx = pool.begin(TransactionOptions::default()).await.unwrap();
        tx.execute_raw("UPDATE t SET a = 1").await.unwrap();
        tx.commit().await.unwrap();
        let _conn = pool.acquire().await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    fn statements(counters: &Counters) -> Vec<(usize, String)> {
        counters.log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_failed_transaction_start_does_not_leak_connection() {
        let (pool, counters) = pool(1, 1_000, false);
        counters.failing.lock().unwrap().push("SET TRANSACTION");
        let options = TransactionOptions::default().isolation_level(IsolationLevel::Serializable);
        let err = pool.begin(options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseError);

        let conn = pool.acquire().await.unwrap();
        conn.execute_raw("SELECT next_user").await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(
            statements(&counters),
            vec![
                (1, "BEGIN".to_string()),
                (1, "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE".to_string()),
                (1, "ROLLBACK".to_string()),
                (2, "SELECT next_user".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unfinished_commit_discards_connection() {
        let (pool, counters) = pool(1, 1_000, false);
        let tx = pool.begin(TransactionOptions::default()).await.unwrap();
        counters.failing.lock().unwrap().extend(["COMMIT", "ROLLBACK"]);
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseError);
        counters.failing.lock().unwrap().clear();

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_with_rollback_keeps_connection() {
        let (pool, counters) = pool(1, 1_000, false);
        let tx = pool.begin(TransactionOptions::default()).await.unwrap();
        counters.failing.lock().unwrap().push("COMMIT");
        assert!(tx.commit().await.is_err());

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_driver() {
        let config = ConnectionConfig::from_settings(&sqlweave_core::DatabaseSettings {
            dialect: "oracle".into(),
            ..sqlweave_core::DatabaseSettings::default()
        })
        .unwrap();
        let Err(err) = connector_for(&config) else {
            panic!("oracle has no driver");
        };
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }
}
