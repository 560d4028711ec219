//! Settings loading from configuration files.
//!
//! This module provides functions to load [`Settings`] from TOML files, JSON
//! files, and to apply environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `SQLWEAVE_DEBUG` | `debug` |
//! | `SQLWEAVE_LOG_LEVEL` | `log_level` |
//! | `SQLWEAVE_TIMEZONE` | `timezone` |
//! | `SQLWEAVE_DEFAULT_DATABASE` | `default_database` |
//! | `SQLWEAVE_DB_DIALECT` | `databases[default].dialect` |
//! | `SQLWEAVE_DB_HOST` | `databases[default].host` |
//! | `SQLWEAVE_DB_PORT` | `databases[default].port` |
//! | `SQLWEAVE_DB_NAME` | `databases[default].database` |
//! | `SQLWEAVE_DB_USER` | `databases[default].user` |
//! | `SQLWEAVE_DB_PASSWORD` | `databases[default].password` |
//!
//! The `SQLWEAVE_DB_*` variables apply to whichever alias `default_database`
//! names after the other overrides have been applied.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use sqlweave_core::settings_loader;
//!
//! // Load from TOML
//! let settings = settings_loader::from_toml_file("config/sqlweave.toml").unwrap();
//!
//! // Load from JSON
//! let settings = settings_loader::from_json_file("config/sqlweave.json").unwrap();
//!
//! // Load from TOML with environment overrides
//! let settings = settings_loader::from_toml_file_with_env("config/sqlweave.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::SqlError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, SqlError> {
    // Deserialize into a generic value first and merge it over the defaults,
    // so partial files keep every unspecified setting.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| SqlError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    from_partial_json(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, SqlError> {
    let content = read_config(path.as_ref(), "TOML")?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, SqlError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, SqlError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| SqlError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    from_partial_json(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, SqlError> {
    let content = read_config(path.as_ref(), "JSON")?;
    from_json_str(&content)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, SqlError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `SQLWEAVE_*` environment variable overrides to a settings struct.
///
/// `SQLWEAVE_DEBUG` accepts "true"/"1"/"yes" as true and anything else as false.
/// An unparseable `SQLWEAVE_DB_PORT` is ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("SQLWEAVE_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("SQLWEAVE_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_TIMEZONE") {
        settings.timezone = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_DEFAULT_DATABASE") {
        settings.default_database = val;
    }

    let alias = settings.default_database.clone();
    let db = settings.databases.entry(alias).or_default();

    if let Ok(val) = std::env::var("SQLWEAVE_DB_DIALECT") {
        db.dialect = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_DB_HOST") {
        db.host = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_DB_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            db.port = Some(port);
        }
    }

    if let Ok(val) = std::env::var("SQLWEAVE_DB_NAME") {
        db.database = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_DB_USER") {
        db.user = val;
    }

    if let Ok(val) = std::env::var("SQLWEAVE_DB_PASSWORD") {
        db.password = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, SqlError> {
    std::fs::read_to_string(path).map_err(|e| {
        SqlError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn from_partial_json(value: serde_json::Value, format: &str) -> Result<Settings, SqlError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        SqlError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        SqlError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = false
            log_level = "sqlweave_db=debug"
            timezone = "+02:00"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "sqlweave_db=debug");
        assert_eq!(settings.timezone, "+02:00");
        // Defaults preserved
        assert_eq!(settings.default_database, "default");
    }

    #[test]
    fn test_from_toml_str_databases() {
        let toml = r#"
            [databases.default]
            dialect = "postgres"
            host = "localhost"
            port = 5432
            database = "app"
            user = "app"
            password = "secret"
            schema = "public"

            [databases.default.pool]
            max_size = 4

            [databases.default.options]
            application_name = "worker"
        "#;

        let settings = from_toml_str(toml).unwrap();
        let db = settings.databases.get("default").unwrap();
        assert_eq!(db.dialect, "postgres");
        assert_eq!(db.port, Some(5432));
        assert_eq!(db.schema.as_deref(), Some("public"));
        assert_eq!(db.pool.max_size, 4);
        // Unspecified pool knobs keep defaults
        assert_eq!(db.pool.acquire_timeout_ms, 30_000);
        assert_eq!(db.options["application_name"], "worker");
    }

    #[test]
    fn test_from_toml_str_partial_new_alias() {
        let toml = r#"
            [databases.analytics]
            dialect = "mysql"
        "#;

        let settings = from_toml_str(toml).unwrap();
        let db = settings.databases.get("analytics").unwrap();
        assert_eq!(db.dialect, "mysql");
        assert_eq!(db.port, None);
        assert!(settings.databases.contains_key("default"));
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(result.is_err());
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{
            "debug": false,
            "log_level": "debug"
        }"#;

        let settings = from_json_str(json).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.timezone, "+00:00");
    }

    #[test]
    fn test_from_json_str_databases() {
        let json = r#"{
            "databases": {
                "default": {
                    "dialect": "mssql",
                    "host": "db.example.com",
                    "options": {"encrypt": true}
                }
            }
        }"#;

        let settings = from_json_str(json).unwrap();
        let db = settings.databases.get("default").unwrap();
        assert_eq!(db.dialect, "mssql");
        assert_eq!(db.host, "db.example.com");
        assert_eq!(db.options["encrypt"], true);
    }

    #[test]
    fn test_from_json_str_invalid() {
        let result = from_json_str("{invalid json");
        assert!(result.is_err());
    }

    // ── File loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_file() {
        let dir = std::env::temp_dir().join("sqlweave_test_toml");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test_settings.toml");

        std::fs::write(&path, "debug = false\ntimezone = \"-04:00\"\n").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.timezone, "-04:00");

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_from_json_file() {
        let dir = std::env::temp_dir().join("sqlweave_test_json");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test_settings.json");

        std::fs::write(&path, r#"{"log_level": "warn", "debug": false}"#).unwrap();

        let settings = from_json_file(&path).unwrap();
        assert_eq!(settings.log_level, "warn");
        assert!(!settings.debug);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_from_toml_file_missing() {
        let err = from_toml_file("/nonexistent/path/settings.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read TOML file"));
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = from_json_file("/nonexistent/path/settings.json");
        assert!(result.is_err());
    }

    // ── Environment variable overrides ──────────────────────────────

    #[test]
    fn test_apply_env_overrides_debug() {
        let mut settings = Settings::default();
        settings.debug = false;
        std::env::set_var("SQLWEAVE_DEBUG", "1");
        apply_env_overrides(&mut settings);
        assert!(settings.debug);
        std::env::set_var("SQLWEAVE_DEBUG", "off");
        apply_env_overrides(&mut settings);
        assert!(!settings.debug);
        std::env::remove_var("SQLWEAVE_DEBUG");
    }

    #[test]
    fn test_apply_env_overrides_log_level() {
        let mut settings = Settings::default();
        std::env::set_var("SQLWEAVE_LOG_LEVEL", "trace");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.log_level, "trace");
        std::env::remove_var("SQLWEAVE_LOG_LEVEL");
    }

    #[test]
    fn test_apply_env_overrides_db_port() {
        let mut settings = Settings::default();
        std::env::set_var("SQLWEAVE_DB_PORT", "6543");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.databases["default"].port, Some(6543));

        // Not a number: keeps the previous value
        std::env::set_var("SQLWEAVE_DB_PORT", "not-a-number");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.databases["default"].port, Some(6543));
        std::env::remove_var("SQLWEAVE_DB_PORT");
    }

    #[test]
    fn test_apply_env_overrides_db_password() {
        let mut settings = Settings::default();
        std::env::set_var("SQLWEAVE_DB_PASSWORD", "hunter2");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.databases["default"].password, "hunter2");
        std::env::remove_var("SQLWEAVE_DB_PASSWORD");
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("SQLWEAVE_TIMEZONE", "+09:00");
        let settings = from_env();
        assert_eq!(settings.timezone, "+09:00");
        std::env::remove_var("SQLWEAVE_TIMEZONE");
    }

    // ── merge_json helper ───────────────────────────────────────────

    #[test]
    fn test_merge_json_basic() {
        let base = serde_json::json!({"a": 1, "b": 2});
        let over = serde_json::json!({"b": 3, "c": 4});
        let merged = merge_json(base, over);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 3);
        assert_eq!(merged["c"], 4);
    }

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"outer": {"a": 1, "b": 2}});
        let over = serde_json::json!({"outer": {"b": 3}});
        let merged = merge_json(base, over);
        assert_eq!(merged["outer"]["a"], 1);
        assert_eq!(merged["outer"]["b"], 3);
    }

    #[test]
    fn test_merge_json_array_override() {
        let base = serde_json::json!({"list": [1, 2, 3]});
        let over = serde_json::json!({"list": [4, 5]});
        let merged = merge_json(base, over);
        // Arrays are replaced, not merged
        assert_eq!(merged["list"], serde_json::json!([4, 5]));
    }

    #[test]
    fn test_toml_to_json() {
        let toml_val: toml::Value = toml::from_str(
            r#"
            name = "test"
            count = 42
            flag = true
            items = [1, 2, 3]
            [nested]
            key = "value"
        "#,
        )
        .unwrap();

        let json = toml_to_json(toml_val);
        assert_eq!(json["name"], "test");
        assert_eq!(json["count"], 42);
        assert_eq!(json["flag"], true);
        assert_eq!(json["items"], serde_json::json!([1, 2, 3]));
        assert_eq!(json["nested"]["key"], "value");
    }

    // ── Full flow with env ──────────────────────────────────────────

    #[test]
    fn test_toml_with_env_override() {
        let dir = std::env::temp_dir().join("sqlweave_test_toml_env");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings_env.toml");

        let toml_content = r#"
            default_database = "primary"
            [databases.primary]
            dialect = "postgres"
            user = "toml-user"
        "#;
        std::fs::write(&path, toml_content).unwrap();

        std::env::set_var("SQLWEAVE_DB_USER", "env-user");

        let settings = from_toml_file_with_env(&path).unwrap();
        let db = settings.default_db().unwrap();
        assert_eq!(db.dialect, "postgres");
        assert_eq!(db.user, "env-user");

        std::env::remove_var("SQLWEAVE_DB_USER");
        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }
}
