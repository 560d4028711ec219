//! Query description, compilation, and execution plans.
//!
//! This module contains the complete generation pipeline:
//!
//! - [`descriptor`] - Structured DML and DDL descriptors
//! - [`where_clause`] - Lookups and Q filter trees
//! - [`generator`] - The dialect-driven query generator
//! - [`plan`] - Compiled statements and multi-statement execution plans
//! - [`transaction_sql`] - Transaction control statements

mod ddl;
pub mod descriptor;
pub mod generator;
pub mod plan;
pub mod transaction_sql;
pub mod where_clause;

pub use descriptor::{
    ColumnDescriptor, ConflictAction, CreateIndex, CreateTable, DefaultValue, Deferrable, Delete,
    ForeignKey, Insert, OnConflict, OrderBy, QueryDescriptor, ReferentialAction, RowLock, Select,
    SelectColumn, TableName, Truncate, Update,
};
pub use generator::{GeneratorOptions, QueryGenerator};
pub use plan::{CompiledQuery, Plan, TableRebuild};
pub use transaction_sql::{ConstraintCheck, TransactionOptions};
pub use where_clause::{Lookup, Q};
