//! # sqlweave-db
//!
//! Cross-dialect SQL generation. Provides the [`DialectRegistry`] of dialect
//! capability descriptors, the [`DataType`] system that validates and binds
//! values per dialect, the [`QueryGenerator`] that compiles structured
//! descriptors into SQL with binds, and the [`Transaction`] coordinator that
//! runs compiled statements on a single connection.
//!
//! ## Architecture
//!
//! Generation is pure. A [`QueryDescriptor`] describes a statement without
//! naming any dialect; the generator consults the dialect's capabilities and
//! either emits SQL or fails with `UnsupportedOperation`. Statements that need
//! more than one round trip (an upsert fallback, an SQLite table rebuild)
//! compile to a [`Plan`], which runs through any [`Executor`].
//!
//! ## Module Overview
//!
//! - [`dialect`] - Capability descriptors, built-in dialects, and the registry
//! - [`types`] - Abstract data types and per-dialect type overrides
//! - [`value`] - The backend-agnostic [`Value`] enum
//! - [`bind`] - Placeholder allocation and bind parameter sets
//! - [`query`] - Descriptors, filters, the generator, and plans
//! - [`row`] - Result rows
//! - [`connection`] - The executor and connection traits drivers implement
//! - [`transactions`] - Transactions, savepoints, and on-commit callbacks

// These clippy lints are intentionally allowed for the generation crate:
// - too_many_lines: the dialect builders and generator dispatch are large match tables
// - result_large_err: SqlError is the crate error type and should be used consistently
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for SQL keywords in docs are too strict
// - needless_pass_by_value: descriptor builders take owned values
// - return_self_not_must_use: builder pattern methods are self-documenting
// - struct_excessive_bools: capability descriptors are mostly feature flags
#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
// cast_possible_truncation, cast_sign_loss: widths are checked before integer casts
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// significant_drop_tightening: false positives on watch channel borrows
#![allow(clippy::significant_drop_tightening)]

pub mod bind;
pub mod connection;
pub mod dialect;
pub mod query;
pub mod row;
pub mod transactions;
pub mod types;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use bind::{BindCollector, BindParameterSet, RESERVED_PREFIX};
pub use connection::{Connection, Executor};
pub use dialect::{
    DialectCapabilities, DialectDescriptor, DialectFamily, DialectRegistry, Feature,
    IsolationLevel, TransactionType,
};
pub use query::{
    ColumnDescriptor, CompiledQuery, ConflictAction, ConstraintCheck, CreateIndex, CreateTable,
    Delete, ForeignKey, GeneratorOptions, Insert, Lookup, OnConflict, OrderBy, Plan,
    QueryDescriptor, QueryGenerator, Select, TableName, TransactionOptions, Truncate, Update, Q,
};
pub use row::{FromValue, RawRowSet, Row};
pub use transactions::{atomic, Transaction, TransactionState};
pub use types::{BindContext, DataType, TypeKey, TypeOverride, TypeOverrides};
pub use value::{RangeValue, Value};
