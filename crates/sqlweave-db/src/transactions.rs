//! The transaction coordinator.
//!
//! A [`Transaction`] owns one connection for its whole lifetime. The
//! connection lives inside a worker task; handles send requests over a queue
//! and the worker runs them one at a time, so statements from every clone of
//! a handle execute in submission order on the same connection. Nested
//! transactions are savepoints on that connection, never a second one.
//!
//! # State machine
//!
//! ```text
//! Uninitialized -> Started -> Committed | RolledBack
//! Started <-> Nested(depth, savepoint)
//! ```
//!
//! If the connection drops, every pending and later request fails with
//! `ConnectionLost` and the state moves straight to `RolledBack`; no rollback
//! is sent since there is nothing to send it over. Dropping every handle of
//! an active transaction rolls it back.
//!
//! # Examples
//!
//! ```ignore
//! use sqlweave_db::transactions::atomic;
//!
//! let id = atomic(connection, TransactionOptions::default(), |tx| async move {
//!     tx.execute(&insert).await?;
//!     tx.nested(|inner| async move { inner.execute(&audit).await }).await?;
//!     Ok(42)
//! })
//! .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sqlweave_core::{SqlError, SqlResult};
use tokio::sync::{mpsc, oneshot, watch};

use crate::connection::{Connection, Executor};
use crate::dialect::DialectDescriptor;
use crate::query::transaction_sql::{self, ConstraintCheck, TransactionOptions};
use crate::query::{CompiledQuery, Plan};
use crate::row::RawRowSet;

/// Where a transaction is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Uninitialized,
    Started,
    /// Inside `depth` savepoints; the innermost is named.
    Nested(usize, String),
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Statements can still run.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Started | Self::Nested(..))
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Started => write!(f, "Started"),
            Self::Nested(depth, name) => write!(f, "Nested({depth}, {name})"),
            Self::Committed => write!(f, "Committed"),
            Self::RolledBack => write!(f, "RolledBack"),
        }
    }
}

/// A callback run after the outermost transaction commits.
type OnCommit = Box<dyn FnOnce() + Send + 'static>;

type Reply<T> = oneshot::Sender<SqlResult<T>>;

enum Request {
    Execute(CompiledQuery, Reply<RawRowSet>),
    ExecutePlan(Plan, Reply<RawRowSet>),
    CreateSavepoint(Option<String>, Reply<String>),
    ReleaseSavepoint(String, Reply<()>),
    RollbackToSavepoint(String, Reply<()>),
    SetConstraints(Vec<String>, ConstraintCheck, Reply<()>),
    OnCommit(OnCommit, Reply<()>),
    Finish { commit: bool, reply: Reply<()> },
}

/// Owns the connection and applies requests in order.
struct Worker {
    dialect: Arc<DialectDescriptor>,
    connection: Option<Box<dyn Connection>>,
    savepoints: Vec<String>,
    on_commit: Vec<OnCommit>,
    state: watch::Sender<TransactionState>,
    /// The driver message once the connection was lost.
    lost: Option<String>,
}

impl Worker {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        while let Some(request) = requests.recv().await {
            self.handle(request).await;
        }
        if self.state.borrow().is_active() {
            tracing::warn!(dialect = %self.dialect.name(), "Transaction dropped while active; rolling back");
            if let Err(e) = self.finish(false).await {
                tracing::warn!(dialect = %self.dialect.name(), error = %e, "Rollback of dropped transaction failed");
            }
        }
    }

    async fn handle(&mut self, request: Request) {
        // A closed reply channel means the caller gave up waiting; the
        // statement has still run, so there is nothing to undo here.
        match request {
            Request::Execute(query, reply) => {
                let _ = reply.send(self.execute(&query).await);
            }
            Request::ExecutePlan(plan, reply) => {
                let _ = reply.send(self.execute_plan(&plan).await);
            }
            Request::CreateSavepoint(name, reply) => {
                let _ = reply.send(self.create_savepoint(name).await);
            }
            Request::ReleaseSavepoint(name, reply) => {
                let _ = reply.send(self.release_savepoint(&name).await);
            }
            Request::RollbackToSavepoint(name, reply) => {
                let _ = reply.send(self.rollback_to_savepoint(&name).await);
            }
            Request::SetConstraints(names, check, reply) => {
                let _ = reply.send(self.set_constraints(&names, check).await);
            }
            Request::OnCommit(callback, reply) => {
                let result = self.active().map(|_| ());
                if result.is_ok() {
                    self.on_commit.push(callback);
                }
                let _ = reply.send(result);
            }
            Request::Finish { commit, reply } => {
                let _ = reply.send(self.finish(commit).await);
            }
        }
    }

    fn current_state(&self) -> TransactionState {
        self.state.borrow().clone()
    }

    fn publish(&self, state: TransactionState) {
        self.state.send_replace(state);
    }

    fn publish_depth(&self) {
        self.publish(match self.savepoints.last() {
            Some(name) => TransactionState::Nested(self.savepoints.len(), name.clone()),
            None => TransactionState::Started,
        });
    }

    fn lost_error(&self, message: &str, state: &TransactionState) -> SqlError {
        SqlError::ConnectionLost {
            dialect: self.dialect.name().to_string(),
            message: message.to_string(),
            state: Some(state.to_string()),
        }
    }

    fn state_error(&self, message: impl Into<String>) -> SqlError {
        SqlError::TransactionError {
            dialect: self.dialect.name().to_string(),
            state: self.current_state().to_string(),
            message: message.into(),
        }
    }

    /// The connection, if statements may still run on it.
    fn active(&self) -> SqlResult<&dyn Connection> {
        if let Some(message) = &self.lost {
            return Err(self.lost_error(message, &self.current_state()));
        }
        if !self.current_state().is_active() {
            return Err(self.state_error("the transaction is no longer active"));
        }
        self.connection
            .as_deref()
            .ok_or_else(|| self.state_error("the transaction has no connection"))
    }

    /// Moves to `RolledBack` without touching the network when `result`
    /// reports a lost connection.
    fn observe<T>(&mut self, result: SqlResult<T>) -> SqlResult<T> {
        let broken = self.connection.as_ref().is_some_and(|c| c.is_broken());
        match result {
            Err(SqlError::ConnectionLost { message, .. }) => Err(self.mark_lost(message)),
            Err(e) if broken => Err(self.mark_lost(e.to_string())),
            other => other,
        }
    }

    fn mark_lost(&mut self, message: String) -> SqlError {
        let state = self.current_state();
        tracing::warn!(dialect = %self.dialect.name(), state = %state, "Connection lost inside transaction");
        let error = self.lost_error(&message, &state);
        self.lost = Some(message);
        self.connection = None;
        self.savepoints.clear();
        self.on_commit.clear();
        self.publish(TransactionState::RolledBack);
        error
    }

    async fn statement(&mut self, sql: &str) -> SqlResult<RawRowSet> {
        let result = self.active()?.execute_raw(sql).await;
        self.observe(result)
    }

    async fn execute(&mut self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
        let result = self.active()?.execute(query).await;
        self.observe(result)
    }

    async fn execute_plan(&mut self, plan: &Plan) -> SqlResult<RawRowSet> {
        let result = plan.execute(self.active()?).await;
        self.observe(result)
    }

    async fn create_savepoint(&mut self, name: Option<String>) -> SqlResult<String> {
        self.active()?;
        let name = name.unwrap_or_else(|| format!("sp{}", self.savepoints.len() + 1));
        if self.savepoints.contains(&name) {
            return Err(self.state_error(format!("savepoint '{name}' already exists")));
        }
        let sql = transaction_sql::create_savepoint(&self.dialect.capabilities, &name)?;
        self.statement(&sql).await?;
        self.savepoints.push(name.clone());
        self.publish_depth();
        Ok(name)
    }

    fn savepoint_position(&self, name: &str) -> SqlResult<usize> {
        self.savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| self.state_error(format!("no savepoint named '{name}'")))
    }

    async fn release_savepoint(&mut self, name: &str) -> SqlResult<()> {
        self.active()?;
        let position = self.savepoint_position(name)?;
        if let Some(sql) = transaction_sql::release_savepoint(&self.dialect.capabilities, name)? {
            self.statement(&sql).await?;
        }
        self.savepoints.truncate(position);
        self.publish_depth();
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> SqlResult<()> {
        self.active()?;
        let position = self.savepoint_position(name)?;
        let sql = transaction_sql::rollback_to_savepoint(&self.dialect.capabilities, name)?;
        self.statement(&sql).await?;
        self.savepoints.truncate(position);
        self.publish_depth();
        Ok(())
    }

    async fn set_constraints(&mut self, names: &[String], check: ConstraintCheck) -> SqlResult<()> {
        self.active()?;
        let sql = transaction_sql::set_constraints(&self.dialect.capabilities, names, check)?;
        self.statement(&sql).await.map(|_| ())
    }

    /// The transaction may still be open on the server.
    fn discard_connection(&self) {
        if let Some(connection) = &self.connection {
            tracing::warn!(dialect = %self.dialect.name(), "Discarding connection with an unfinished transaction");
            connection.discard();
        }
    }

    async fn finish(&mut self, commit: bool) -> SqlResult<()> {
        self.active()?;
        let caps = &self.dialect.capabilities;
        let (sql, rollback) = (transaction_sql::commit(caps), transaction_sql::rollback(caps));

        let result = if commit {
            match self.statement(sql).await {
                Ok(_) => Ok(()),
                Err(e) if self.lost.is_some() => Err(e),
                Err(e) => {
                    // The engine may keep the transaction open after a failed COMMIT.
                    if let Err(rb) = self.statement(rollback).await {
                        tracing::warn!(dialect = %self.dialect.name(), error = %rb, "Rollback after failed commit failed");
                        self.discard_connection();
                    }
                    Err(e)
                }
            }
        } else {
            let rolled_back = self.statement(rollback).await.map(|_| ());
            if rolled_back.is_err() {
                self.discard_connection();
            }
            rolled_back
        };

        if self.lost.is_some() {
            return result;
        }
        self.savepoints.clear();
        // Releases the connection back to its pool.
        self.connection = None;
        let callbacks = std::mem::take(&mut self.on_commit);
        if commit && result.is_ok() {
            self.publish(TransactionState::Committed);
            tracing::info!(dialect = %self.dialect.name(), callbacks = callbacks.len(), "Transaction committed");
            for callback in callbacks {
                callback();
            }
        } else {
            self.publish(TransactionState::RolledBack);
            tracing::info!(dialect = %self.dialect.name(), "Transaction rolled back");
        }
        result
    }
}

/// A handle to a running transaction.
///
/// Handles are cheap to clone; all clones share the same connection and
/// request queue.
#[derive(Clone)]
pub struct Transaction {
    dialect: Arc<DialectDescriptor>,
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<TransactionState>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("dialect", &self.dialect.name())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Transaction {
    /// Starts a transaction on `connection`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation`, before any statement is sent, when the
    /// dialect cannot honor `options`. Errors from the start statements are
    /// returned as is. Whatever did start is rolled back on a best-effort
    /// basis and the connection is discarded, since its session state is no
    /// longer known.
    pub async fn begin(connection: Box<dyn Connection>, options: TransactionOptions) -> SqlResult<Self> {
        let dialect = Arc::clone(connection.dialect());
        let statements = transaction_sql::start(&dialect.capabilities, &options)?;
        let (state_tx, state_rx) = watch::channel(TransactionState::Uninitialized);

        for sql in &statements {
            if let Err(e) = connection.execute_raw(sql).await {
                tracing::warn!(dialect = %dialect.name(), error = %e, sql = %sql, "Transaction start failed");
                if !connection.is_broken() {
                    let rollback = transaction_sql::rollback(&dialect.capabilities);
                    if let Err(rb) = connection.execute_raw(rollback).await {
                        tracing::debug!(dialect = %dialect.name(), error = %rb, "Rollback after failed start failed");
                    }
                }
                connection.discard();
                return Err(e);
            }
        }
        state_tx.send_replace(TransactionState::Started);
        tracing::debug!(dialect = %dialect.name(), ?options, "Transaction started");

        let (requests, queue) = mpsc::unbounded_channel();
        let worker = Worker {
            dialect: Arc::clone(&dialect),
            connection: Some(connection),
            savepoints: Vec::new(),
            on_commit: Vec::new(),
            state: state_tx,
            lost: None,
        };
        tokio::spawn(worker.run(queue));

        Ok(Self {
            dialect,
            requests,
            state: state_rx,
        })
    }

    /// The current state.
    pub fn state(&self) -> TransactionState {
        self.state.borrow().clone()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> SqlResult<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(make(reply))
            .map_err(|_| self.worker_gone())?;
        response.await.map_err(|_| self.worker_gone())?
    }

    fn worker_gone(&self) -> SqlError {
        SqlError::TransactionError {
            dialect: self.dialect.name().to_string(),
            state: self.state().to_string(),
            message: "the transaction worker has stopped".to_string(),
        }
    }

    /// Runs every statement of `plan` without interleaving other requests.
    pub async fn execute_plan(&self, plan: Plan) -> SqlResult<RawRowSet> {
        self.request(|reply| Request::ExecutePlan(plan, reply)).await
    }

    /// Creates a savepoint named `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on dialects without savepoints.
    pub async fn create_savepoint(&self, name: impl Into<String>) -> SqlResult<String> {
        let name = name.into();
        self.request(|reply| Request::CreateSavepoint(Some(name), reply))
            .await
    }

    /// Creates a savepoint named after the new depth (`sp1`, `sp2`, ...).
    pub async fn savepoint(&self) -> SqlResult<String> {
        self.request(|reply| Request::CreateSavepoint(None, reply)).await
    }

    /// Releases `name` and every savepoint created after it.
    pub async fn release_savepoint(&self, name: &str) -> SqlResult<()> {
        let name = name.to_string();
        self.request(|reply| Request::ReleaseSavepoint(name, reply))
            .await
    }

    /// Rolls back to `name`, leaving the enclosing transaction open.
    pub async fn rollback_to_savepoint(&self, name: &str) -> SqlResult<()> {
        let name = name.to_string();
        self.request(|reply| Request::RollbackToSavepoint(name, reply))
            .await
    }

    /// Switches deferrable constraints, all of them when `names` is empty.
    pub async fn set_constraints(&self, names: &[String], check: ConstraintCheck) -> SqlResult<()> {
        let names = names.to_vec();
        self.request(|reply| Request::SetConstraints(names, check, reply))
            .await
    }

    /// Registers a callback to run once the transaction commits. Callbacks
    /// are discarded if it rolls back.
    pub async fn on_commit<F>(&self, callback: F) -> SqlResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.request(|reply| Request::OnCommit(Box::new(callback), reply))
            .await
    }

    /// Runs `f` inside a savepoint: released when `f` succeeds, rolled back
    /// to when it fails. The enclosing transaction stays open either way.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on dialects without savepoints, and
    /// otherwise the error returned by `f`.
    pub async fn nested<F, Fut, T>(&self, f: F) -> SqlResult<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = SqlResult<T>>,
    {
        let name = self.savepoint().await?;
        match f(self.clone()).await {
            Ok(value) => {
                self.release_savepoint(&name).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback_to_savepoint(&name).await {
                    tracing::warn!(savepoint = %name, error = %rollback, "Rollback to savepoint failed");
                }
                Err(e)
            }
        }
    }

    /// Commits and releases the connection. Registered callbacks run after
    /// the commit succeeds.
    pub async fn commit(self) -> SqlResult<()> {
        self.request(|reply| Request::Finish {
            commit: true,
            reply,
        })
        .await
    }

    /// Rolls back and releases the connection.
    pub async fn rollback(self) -> SqlResult<()> {
        self.request(|reply| Request::Finish {
            commit: false,
            reply,
        })
        .await
    }
}

#[async_trait]
impl Executor for Transaction {
    fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.dialect
    }

    async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
        let query = query.clone();
        self.request(|reply| Request::Execute(query, reply)).await
    }
}

/// Runs `f` in a new transaction on `connection`, committing when it returns
/// `Ok` and rolling back when it returns `Err`.
pub async fn atomic<F, Fut, T>(
    connection: Box<dyn Connection>,
    options: TransactionOptions,
    f: F,
) -> SqlResult<T>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = SqlResult<T>>,
{
    let tx = Transaction::begin(connection, options).await?;
    match f(tx.clone()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if tx.state().is_active() {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback after failed transaction block failed");
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectRegistry, IsolationLevel};
    use crate::query::{Insert, OnConflict, QueryGenerator};
    use crate::row::Row;
    use crate::value::Value;
    use sqlweave_core::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every statement. Statements containing `LOST` drop the
    /// connection, statements containing `FAIL` fail normally, and statements
    /// starting with `SELECT 1` return one row.
    struct MockConnection {
        dialect: Arc<DialectDescriptor>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MockConnection {
        fn new(dialect: &str) -> (Box<dyn Connection>, Arc<Mutex<Vec<String>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let conn = Self {
                dialect: DialectRegistry::global().resolve(dialect).unwrap(),
                log: Arc::clone(&log),
            };
            (Box::new(conn), log)
        }
    }

    #[async_trait]
    impl Executor for MockConnection {
        fn dialect(&self) -> &Arc<DialectDescriptor> {
            &self.dialect
        }

        async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet> {
            self.log.lock().unwrap().push(query.sql.clone());
            if query.sql.contains("LOST") {
                return Err(SqlError::ConnectionLost {
                    dialect: self.dialect.name().to_string(),
                    message: "server closed the connection".into(),
                    state: None,
                });
            }
            if query.sql.contains("FAIL") {
                return Err(SqlError::database(self.dialect.name(), "syntax error"));
            }
            if query.sql.starts_with("SELECT 1") {
                return Ok(RawRowSet::from_rows(vec![Row::new(
                    vec!["1".into()],
                    vec![Value::Int(1)],
                )]));
            }
            Ok(RawRowSet::affected(1))
        }
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn is_valid(&self) -> bool {
            true
        }
    }

    fn log(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_basic_transaction_commit() {
        let (conn, statements) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        assert_eq!(tx.state(), TransactionState::Started);
        tx.execute_raw("INSERT INTO t (a) VALUES (1)").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(log(&statements), vec!["BEGIN", "INSERT INTO t (a) VALUES (1)", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_state_after_commit() {
        let (conn, _) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        let observer = tx.clone();
        tx.commit().await.unwrap();
        assert_eq!(observer.state(), TransactionState::Committed);
        let err = observer.execute_raw("SELECT 2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionError);
        assert!(err.to_string().contains("Committed"));
    }

    #[tokio::test]
    async fn test_isolation_and_read_only_start() {
        let (conn, statements) = MockConnection::new("mysql");
        let options = TransactionOptions::default()
            .isolation_level(IsolationLevel::Serializable)
            .read_only();
        let tx = Transaction::begin(conn, options).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(
            log(&statements),
            vec![
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
                "START TRANSACTION READ ONLY",
                "ROLLBACK"
            ]
        );
    }

    #[tokio::test]
    async fn test_unsupported_options_fail_before_io() {
        let (conn, statements) = MockConnection::new("mssql");
        let err = Transaction::begin(conn, TransactionOptions::default().read_only())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(log(&statements).is_empty());
    }

    #[tokio::test]
    async fn test_nested_rollback_keeps_parent() {
        let (conn, statements) = MockConnection::new("postgres");
        let result = atomic(conn, TransactionOptions::default(), |tx| async move {
            tx.execute_raw("INSERT INTO t VALUES (1)").await?;
            let nested: SqlResult<()> = tx
                .nested(|inner| async move {
                    assert_eq!(inner.state(), TransactionState::Nested(1, "sp1".into()));
                    assert_eq!(inner.state().to_string(), "Nested(1, sp1)");
                    inner.execute_raw("INSERT INTO t VALUES (2)").await?;
                    Err(SqlError::database("postgres", "inner failure"))
                })
                .await;
            assert!(nested.is_err());
            assert_eq!(tx.state(), TransactionState::Started);
            tx.execute_raw("INSERT INTO t VALUES (3)").await?;
            Ok(())
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(
            log(&statements),
            vec![
                "BEGIN",
                "INSERT INTO t VALUES (1)",
                "SAVEPOINT \"sp1\"",
                "INSERT INTO t VALUES (2)",
                "ROLLBACK TO SAVEPOINT \"sp1\"",
                "INSERT INTO t VALUES (3)",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn test_deeply_nested_savepoints_release() {
        let (conn, statements) = MockConnection::new("sqlite");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        tx.nested(|a| async move {
            a.nested(|b| async move {
                assert_eq!(b.state(), TransactionState::Nested(2, "sp2".into()));
                Ok(())
            })
            .await
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            log(&statements),
            vec![
                "BEGIN",
                "SAVEPOINT \"sp1\"",
                "SAVEPOINT \"sp2\"",
                "RELEASE SAVEPOINT \"sp2\"",
                "RELEASE SAVEPOINT \"sp1\"",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn test_mssql_savepoints_have_no_release() {
        let (conn, statements) = MockConnection::new("mssql");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        tx.nested(|_| async { Ok(()) }).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            log(&statements),
            vec!["BEGIN TRANSACTION", "SAVE TRANSACTION [sp1]", "COMMIT TRANSACTION"]
        );
    }

    #[tokio::test]
    async fn test_nested_without_savepoints_fails_fast() {
        let (conn, statements) = MockConnection::new("snowflake");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        let err = tx.nested(|_| async { Ok(()) }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(tx.state(), TransactionState::Started);
        tx.commit().await.unwrap();
        assert_eq!(log(&statements), vec!["START TRANSACTION", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_named_savepoints() {
        let (conn, statements) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        tx.create_savepoint("before_import").await.unwrap();
        tx.create_savepoint("inner").await.unwrap();
        tx.rollback_to_savepoint("before_import").await.unwrap();
        assert_eq!(tx.state(), TransactionState::Started);
        let err = tx.release_savepoint("inner").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionError);
        tx.commit().await.unwrap();
        assert_eq!(
            log(&statements),
            vec![
                "BEGIN",
                "SAVEPOINT \"before_import\"",
                "SAVEPOINT \"inner\"",
                "ROLLBACK TO SAVEPOINT \"before_import\"",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn test_on_commit_callbacks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (conn, _) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        for _ in 0..2 {
            let c = Arc::clone(&counter);
            tx.on_commit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tx.commit().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_on_commit_dropped_on_rollback() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (conn, _) = MockConnection::new("postgres");
        let c = Arc::clone(&counter);
        let result: SqlResult<()> = atomic(conn, TransactionOptions::default(), |tx| async move {
            tx.on_commit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .await?;
            Err(SqlError::database("postgres", "abort"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_lost_moves_to_rolled_back() {
        let (conn, statements) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        tx.savepoint().await.unwrap();
        let err = tx.execute_raw("UPDATE LOST").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionLost);
        assert!(err.to_string().contains("Nested(1, sp1)"));
        assert_eq!(tx.state(), TransactionState::RolledBack);

        let later = tx.execute_raw("SELECT 2").await.unwrap_err();
        assert_eq!(later.kind(), ErrorKind::ConnectionLost);
        assert_eq!(tx.clone().rollback().await.unwrap_err().kind(), ErrorKind::ConnectionLost);
        assert_eq!(log(&statements), vec!["BEGIN", "SAVEPOINT \"sp1\"", "UPDATE LOST"]);
    }

    #[tokio::test]
    async fn test_ordinary_errors_keep_transaction_open() {
        let (conn, _) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        let err = tx.execute_raw("FAIL").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseError);
        assert_eq!(tx.state(), TransactionState::Started);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handles_rolls_back() {
        let (conn, statements) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        tx.execute_raw("INSERT INTO t VALUES (1)").await.unwrap();
        drop(tx);
        for _ in 0..100 {
            if log(&statements).last().map(String::as_str) == Some("ROLLBACK") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(log(&statements), vec!["BEGIN", "INSERT INTO t VALUES (1)", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_concurrent_callers_keep_submission_order() {
        let (conn, statements) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        let (a, b) = (tx.clone(), tx.clone());
        let (ra, rb) = tokio::join!(a.execute_raw("UPDATE a"), b.execute_raw("UPDATE b"));
        ra.unwrap();
        rb.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(log(&statements), vec!["BEGIN", "UPDATE a", "UPDATE b", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_set_constraints() {
        let (conn, statements) = MockConnection::new("postgres");
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        tx.set_constraints(&[], ConstraintCheck::Deferred).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(log(&statements)[1], "SET CONSTRAINTS ALL DEFERRED");
    }

    #[tokio::test]
    async fn test_upsert_fallback_runs_inside_transaction() {
        let (conn, statements) = MockConnection::new("snowflake");
        let plan = QueryGenerator::for_dialect("snowflake")
            .unwrap()
            .plan(
                &Insert::new("users")
                    .value("id", 1)
                    .value("name", "a")
                    .on_conflict(OnConflict::update(["id"]))
                    .into(),
            )
            .unwrap();
        let tx = Transaction::begin(conn, TransactionOptions::default()).await.unwrap();
        tx.execute_plan(plan).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            log(&statements),
            vec![
                "START TRANSACTION",
                "SELECT 1 FROM \"users\" WHERE \"id\" = ?",
                "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ?",
                "COMMIT",
            ]
        );
    }
}
