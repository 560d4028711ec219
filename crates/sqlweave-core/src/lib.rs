//! # sqlweave-core
//!
//! Error taxonomy, settings, and logging for sqlweave.
//! This crate has no database dependencies and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - The closed [`SqlError`] set and result alias
//! - [`settings`] - Database, pool, and logging settings
//! - [`settings_loader`] - TOML/JSON loading with `SQLWEAVE_*` environment overrides
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorKind, SqlError, SqlResult};
pub use settings::{DatabaseSettings, PoolSettings, Settings};
