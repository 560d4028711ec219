//! Connection parameters resolved against a dialect.
//!
//! A [`ConnectionConfig`] is built from [`DatabaseSettings`]: the dialect name
//! is resolved through the registry, the port falls back to the dialect
//! default, and extension options are checked against the dialect's
//! whitelist before any connection is attempted.

use std::collections::BTreeMap;
use std::sync::Arc;

use sqlweave_core::{DatabaseSettings, PoolSettings, SqlError, SqlResult};
use sqlweave_db::{DialectDescriptor, DialectRegistry};

/// Everything a driver needs to open a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The resolved dialect.
    pub dialect: Arc<DialectDescriptor>,
    /// The database name or file path.
    pub database: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Whitelisted extension options.
    pub options: BTreeMap<String, serde_json::Value>,
    pub pool: PoolSettings,
}

impl ConnectionConfig {
    /// Resolves `settings` against the global dialect registry.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDialect` for an unregistered dialect and
    /// `ConfigurationError` for an option the dialect does not accept.
    pub fn from_settings(settings: &DatabaseSettings) -> SqlResult<Self> {
        Self::from_settings_in(DialectRegistry::global(), settings)
    }

    /// Like [`from_settings`](Self::from_settings), resolving the dialect in
    /// `registry`.
    pub fn from_settings_in(
        registry: &DialectRegistry,
        settings: &DatabaseSettings,
    ) -> SqlResult<Self> {
        let dialect = registry.resolve(&settings.dialect)?;
        validate_options(&dialect, &settings.options)?;
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Ok(Self {
            port: settings.port.or(dialect.capabilities.default_port),
            host: non_empty(&settings.host),
            user: non_empty(&settings.user),
            password: non_empty(&settings.password),
            database: settings.database.clone(),
            options: settings.options.clone(),
            pool: settings.pool.clone(),
            dialect,
        })
    }

    /// An in-memory SQLite database.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDialect` if `sqlite` is not registered.
    pub fn sqlite_memory() -> SqlResult<Self> {
        Self::sqlite_file(":memory:")
    }

    /// A SQLite database file.
    pub fn sqlite_file(path: impl Into<String>) -> SqlResult<Self> {
        Self::from_settings(&DatabaseSettings {
            dialect: "sqlite".to_string(),
            database: path.into(),
            ..DatabaseSettings::default()
        })
    }

    /// Replaces the dialect, keeping every other parameter. Used to run a
    /// driver under a dialect registered from a built-in one.
    #[must_use]
    pub fn with_dialect(mut self, dialect: Arc<DialectDescriptor>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Looks up a string-valued extension option.
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(serde_json::Value::as_str)
    }

    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }
}

/// Rejects options that the dialect does not list.
///
/// # Errors
///
/// Returns `ConfigurationError` naming the dialect and the first unknown
/// option.
pub fn validate_options(
    dialect: &DialectDescriptor,
    options: &BTreeMap<String, serde_json::Value>,
) -> SqlResult<()> {
    let allowed = &dialect.capabilities.connection_options;
    match options.keys().find(|name| !allowed.contains(name)) {
        Some(name) => Err(SqlError::ConfigurationError(format!(
            "dialect '{}' does not accept connection option '{name}'",
            dialect.name()
        ))),
        None => Ok(()),
    }
}
