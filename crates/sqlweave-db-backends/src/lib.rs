//! # sqlweave-db-backends
//!
//! Connection pooling and database drivers for sqlweave. A [`Pool`] hands out
//! [`PooledConnection`]s that run [`CompiledQuery`](sqlweave_db::CompiledQuery)s
//! and [`Plan`](sqlweave_db::Plan)s produced by the generator, and starts
//! [`Transaction`](sqlweave_db::Transaction)s on a dedicated connection.
//!
//! Drivers are behind cargo features:
//! - `postgres` - `PostgreSQL` via `tokio-postgres`
//! - `mysql` - `MySQL` and `MariaDB` via `mysql_async`
//! - `sqlite` - `SQLite` via `rusqlite`
//!
//! Driver errors are translated in [`errors`] so callers only see
//! [`SqlError`](sqlweave_core::SqlError).

// - result_large_err: SqlError is the crate error type and should be used consistently
// - doc_markdown: backtick requirements for driver names in docs are too strict
// - significant_drop_tightening: connection guards are held for the whole statement
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::significant_drop_tightening)]

pub mod config;
pub mod errors;
pub mod pool;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{validate_options, ConnectionConfig};
pub use pool::{connector_for, Connector, Pool, PooledConnection, Status};

#[cfg(feature = "mysql")]
pub use mysql::{MySqlConnection, MySqlConnector};
#[cfg(feature = "postgres")]
pub use postgresql::{PostgresConnection, PostgresConnector};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteConnector};
