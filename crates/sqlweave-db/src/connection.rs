//! The executor seam between query generation and drivers.
//!
//! [`Executor`] is the minimal async interface needed to run a
//! [`CompiledQuery`]. It lives in this crate so that plans and the
//! transaction coordinator can run statements without depending on any
//! driver; the backends crate implements it for pooled connections.

use std::sync::Arc;

use async_trait::async_trait;
use sqlweave_core::SqlResult;

use crate::dialect::DialectDescriptor;
use crate::query::CompiledQuery;
use crate::row::RawRowSet;

/// Runs compiled statements against one dialect.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The dialect statements must be compiled for.
    fn dialect(&self) -> &Arc<DialectDescriptor>;

    /// Runs one statement with its binds.
    ///
    /// Statements that produce rows return them; others return only the
    /// affected row count.
    async fn execute(&self, query: &CompiledQuery) -> SqlResult<RawRowSet>;

    /// Runs a statement without binds.
    async fn execute_raw(&self, sql: &str) -> SqlResult<RawRowSet> {
        self.execute(&CompiledQuery::raw(sql)).await
    }
}

/// A physical database connection.
///
/// A connection runs one statement at a time. Callers that share it across
/// tasks go through the transaction coordinator or the pool.
#[async_trait]
pub trait Connection: Executor {
    /// Checks that the connection can still run statements.
    async fn is_valid(&self) -> bool;

    /// Returns `true` once the connection reported `ConnectionLost`. Broken
    /// connections are discarded instead of being returned to a pool.
    fn is_broken(&self) -> bool {
        false
    }

    /// Marks the session as unusable, for example when a transaction could
    /// not be closed. A pool closes such a connection instead of reusing it.
    fn discard(&self) {}
}
