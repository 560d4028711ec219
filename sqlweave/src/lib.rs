//! # sqlweave
//!
//! A cross-dialect SQL compilation engine. Structured query descriptors are
//! compiled into dialect-correct SQL with bind parameters, run over pooled
//! connections, and grouped into savepoint-aware transactions.
//!
//! This is the meta-crate that re-exports all sub-crates. Depend on
//! individual crates for finer-grained control.
//!
//! ```rust,no_run
//! use sqlweave::prelude::*;
//!
//! # async fn run() -> SqlResult<()> {
//! let pool = Pool::from_config(&ConnectionConfig::sqlite_memory()?)?;
//! let gen = QueryGenerator::new(pool.dialect().clone());
//! let select = Select::new("users").filter(Q::filter("id", Lookup::Exact(Value::from(42))));
//! let conn = pool.acquire().await?;
//! let rows = gen.plan(&select.into())?.execute(&conn).await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

/// Error taxonomy, settings, and logging.
pub use sqlweave_core as core;

/// Dialects, types, query generation, and transactions.
pub use sqlweave_db as db;

/// Connection pool and database drivers.
pub use sqlweave_db_backends as db_backends;

/// The types most programs need.
pub mod prelude {
    pub use sqlweave_core::{DatabaseSettings, ErrorKind, PoolSettings, Settings, SqlError, SqlResult};
    pub use sqlweave_db::{
        atomic, ColumnDescriptor, CompiledQuery, CreateIndex, CreateTable, DataType, Delete,
        DialectRegistry, Executor, ForeignKey, Insert, Lookup, OnConflict, OrderBy, Plan,
        QueryDescriptor, QueryGenerator, Row, Select, TableName, Transaction, TransactionOptions,
        Update, Value, Q,
    };
    pub use sqlweave_db_backends::{ConnectionConfig, Pool, PooledConnection};
}
