//! Settings for sqlweave.
//!
//! [`Settings`] holds the logging configuration, the default timezone, and a set
//! of named database connections. There is no global settings instance: callers
//! load a `Settings` value (see [`settings_loader`](crate::settings_loader)) and
//! pass the relevant pieces into pools and generators explicitly.

use std::collections::{BTreeMap, HashMap};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{SqlError, SqlResult};

/// Pool sizing and validation knobs for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of open connections.
    pub max_size: usize,
    /// How long `acquire` waits for a free connection, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Whether idle connections are validated before being handed out again.
    pub validate_on_recycle: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout_ms: 30_000,
            validate_on_recycle: true,
        }
    }
}

/// Connection configuration for a single database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// The registered dialect name (e.g. "postgres", "sqlite").
    pub dialect: String,
    /// The database host. Ignored by file-based engines.
    pub host: String,
    /// The database port. `None` means the dialect's default port.
    pub port: Option<u16>,
    /// The database name, or file path for `SQLite`.
    pub database: String,
    /// The database user.
    pub user: String,
    /// The database password.
    pub password: String,
    /// Default schema used when a descriptor does not name one.
    pub schema: Option<String>,
    /// Timezone offset override for this connection (e.g. "+02:00").
    pub timezone: Option<String>,
    /// Pool sizing.
    pub pool: PoolSettings,
    /// Dialect-specific extension options, validated against the dialect's
    /// whitelist when a pool is built.
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            dialect: "sqlite".to_string(),
            host: String::new(),
            port: None,
            database: ":memory:".to_string(),
            user: String::new(),
            password: String::new(),
            schema: None,
            timezone: None,
            pool: PoolSettings::default(),
            options: BTreeMap::new(),
        }
    }
}

/// The complete set of sqlweave settings.
///
/// # Examples
///
/// ```
/// use sqlweave_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.default_database, "default");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log filter (e.g. "info", "sqlweave_db=debug").
    pub log_level: String,

    // ── Time ─────────────────────────────────────────────────────────

    /// Default timezone offset applied to dates at bind/escape time.
    pub timezone: String,

    // ── Databases ────────────────────────────────────────────────────

    /// The alias used when callers do not name a database.
    pub default_database: String,
    /// Database configurations, keyed by alias (e.g. "default").
    pub databases: HashMap<String, DatabaseSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = HashMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());

        Self {
            debug: true,
            log_level: "info".to_string(),
            timezone: "+00:00".to_string(),
            default_database: "default".to_string(),
            databases,
        }
    }
}

impl Settings {
    /// Returns the database configuration registered under `alias`.
    pub fn database(&self, alias: &str) -> SqlResult<&DatabaseSettings> {
        self.databases.get(alias).ok_or_else(|| {
            SqlError::ConfigurationError(format!("no database configured under alias '{alias}'"))
        })
    }

    /// Returns the default database configuration.
    pub fn default_db(&self) -> SqlResult<&DatabaseSettings> {
        self.database(&self.default_database)
    }

    /// Resolves the timezone offset for a database, falling back to the
    /// global default when the database does not override it.
    pub fn timezone_for(&self, db: &DatabaseSettings) -> SqlResult<FixedOffset> {
        parse_timezone(db.timezone.as_deref().unwrap_or(&self.timezone))
    }
}

/// Parses a timezone offset of the form `+HH:MM`, `-HH:MM`, `Z`, or `UTC`.
///
/// # Examples
///
/// ```
/// use sqlweave_core::settings::parse_timezone;
///
/// let tz = parse_timezone("+05:30").unwrap();
/// assert_eq!(tz.local_minus_utc(), 5 * 3600 + 30 * 60);
/// ```
pub fn parse_timezone(raw: &str) -> SqlResult<FixedOffset> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| SqlError::ConfigurationError("invalid UTC offset".into()));
    }

    let invalid = || SqlError::ConfigurationError(format!("invalid timezone offset '{raw}'"));
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.timezone, "+00:00");
        assert_eq!(s.default_database, "default");
    }

    #[test]
    fn test_default_database() {
        let s = Settings::default();
        let db = s.default_db().expect("default db should exist");
        assert_eq!(db.dialect, "sqlite");
        assert_eq!(db.database, ":memory:");
        assert_eq!(db.pool.max_size, 10);
        assert!(db.options.is_empty());
    }

    #[test]
    fn test_missing_alias_is_configuration_error() {
        let s = Settings::default();
        let err = s.database("replica").unwrap_err();
        assert!(err.to_string().contains("replica"));
    }

    #[test]
    fn test_parse_timezone_variants() {
        assert_eq!(parse_timezone("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("utc").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_timezone("-03:30").unwrap().local_minus_utc(), -12_600);
    }

    #[test]
    fn test_parse_timezone_rejects_garbage() {
        assert!(parse_timezone("Europe/Paris").is_err());
        assert!(parse_timezone("+2").is_err());
        assert!(parse_timezone("+25:00").is_err());
    }

    #[test]
    fn test_timezone_for_prefers_database_override() {
        let mut s = Settings::default();
        s.timezone = "+01:00".into();
        let mut db = DatabaseSettings::default();
        assert_eq!(s.timezone_for(&db).unwrap().local_minus_utc(), 3600);
        db.timezone = Some("-05:00".into());
        assert_eq!(s.timezone_for(&db).unwrap().local_minus_utc(), -18_000);
    }
}
