//! Core error types for sqlweave.
//!
//! Every failure surfaced to callers is a variant of [`SqlError`]. Driver-specific
//! error codes never cross the connection boundary: backends translate them into
//! the connection-layer variants below, so upper layers only ever match on this
//! closed set. Each variant carries the dialect name where one applies.

use std::fmt;

use thiserror::Error;

/// The primary error type for sqlweave.
///
/// Generation-time errors (`InvalidValue`, `UnsupportedOperation`,
/// `ReservedBindName`, `InvalidDescriptor`) are raised before any SQL text is
/// produced and indicate a programming error; they are never retried.
/// Connection-layer errors are surfaced to the caller, who decides on retry.
#[derive(Error, Debug, Clone)]
pub enum SqlError {
    // ── Values and types ─────────────────────────────────────────────

    /// A value failed data type validation (wrong shape, out of range,
    /// disallowed enum member).
    #[error("[{dialect}] invalid value: {message}")]
    InvalidValue { dialect: String, message: String },

    /// A value read back from the wire could not be parsed.
    #[error("[{dialect}] data corruption: {message}")]
    DataCorruption { dialect: String, message: String },

    // ── Generation ───────────────────────────────────────────────────

    /// A descriptor requires a feature the dialect does not have.
    #[error("[{dialect}] unsupported operation: {feature}")]
    UnsupportedOperation { dialect: String, feature: String },

    /// A caller-supplied bind name collides with the internal namespace.
    #[error("bind parameter '{name}' uses the reserved prefix '{prefix}'")]
    ReservedBindName { name: String, prefix: String },

    /// A query descriptor is structurally malformed.
    #[error("[{dialect}] invalid query descriptor: {message}")]
    InvalidDescriptor { dialect: String, message: String },

    /// No dialect is registered under the requested name.
    #[error("unknown dialect: {0}")]
    UnknownDialect(String),

    // ── Connection ───────────────────────────────────────────────────

    /// The server actively refused the connection.
    #[error("[{dialect}] connection refused: {message}")]
    ConnectionRefused { dialect: String, message: String },

    /// Credentials were rejected.
    #[error("[{dialect}] access denied: {message}")]
    AccessDenied { dialect: String, message: String },

    /// The host name could not be resolved.
    #[error("[{dialect}] host not found: {message}")]
    HostNotFound { dialect: String, message: String },

    /// The host resolved but could not be reached.
    #[error("[{dialect}] host not reachable: {message}")]
    HostNotReachable { dialect: String, message: String },

    /// The connection parameters are invalid, or the connection is unusable.
    #[error("[{dialect}] invalid connection: {message}")]
    InvalidConnection { dialect: String, message: String },

    /// The connection dropped. `state` is the transaction state at the time
    /// of failure, when the connection was inside a transaction.
    #[error("[{dialect}] connection lost{}: {message}", state_suffix(.state.as_deref()))]
    ConnectionLost {
        dialect: String,
        message: String,
        state: Option<String>,
    },

    /// The pool had no free connection within the configured timeout.
    #[error("[{dialect}] timed out after {waited_ms}ms waiting for a pooled connection")]
    AcquireTimeout { dialect: String, waited_ms: u64 },

    // ── Constraints ──────────────────────────────────────────────────

    /// Referential integrity was violated, typically detected after a
    /// table rebuild.
    #[error("[{dialect}] foreign key constraint violated on {table}: {message}")]
    ForeignKeyConstraint {
        dialect: String,
        table: String,
        message: String,
    },

    // ── Transactions ─────────────────────────────────────────────────

    /// An operation is not legal in the current transaction state.
    #[error("[{dialect}] transaction error in state {state}: {message}")]
    TransactionError {
        dialect: String,
        state: String,
        message: String,
    },

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Driver ───────────────────────────────────────────────────────

    /// Any other error reported by the database.
    #[error("[{dialect}] database error: {message}")]
    DatabaseError { dialect: String, message: String },
}

fn state_suffix(state: Option<&str>) -> String {
    state.map_or_else(String::new, |s| format!(" (transaction state: {s})"))
}

/// A fieldless mirror of [`SqlError`] variants, convenient for assertions and
/// for branching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidValue,
    DataCorruption,
    UnsupportedOperation,
    ReservedBindName,
    InvalidDescriptor,
    UnknownDialect,
    ConnectionRefused,
    AccessDenied,
    HostNotFound,
    HostNotReachable,
    InvalidConnection,
    ConnectionLost,
    AcquireTimeout,
    ForeignKeyConstraint,
    TransactionError,
    ConfigurationError,
    DatabaseError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SqlError {
    /// Shorthand for [`SqlError::InvalidValue`].
    pub fn invalid_value(dialect: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            dialect: dialect.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`SqlError::UnsupportedOperation`].
    pub fn unsupported(dialect: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            dialect: dialect.into(),
            feature: feature.into(),
        }
    }

    /// Shorthand for [`SqlError::InvalidDescriptor`].
    pub fn invalid_descriptor(dialect: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            dialect: dialect.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`SqlError::DataCorruption`].
    pub fn corruption(dialect: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataCorruption {
            dialect: dialect.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`SqlError::DatabaseError`].
    pub fn database(dialect: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseError {
            dialect: dialect.into(),
            message: message.into(),
        }
    }

    /// Returns the variant of this error without its payload.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
            Self::DataCorruption { .. } => ErrorKind::DataCorruption,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::ReservedBindName { .. } => ErrorKind::ReservedBindName,
            Self::InvalidDescriptor { .. } => ErrorKind::InvalidDescriptor,
            Self::UnknownDialect(_) => ErrorKind::UnknownDialect,
            Self::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::HostNotFound { .. } => ErrorKind::HostNotFound,
            Self::HostNotReachable { .. } => ErrorKind::HostNotReachable,
            Self::InvalidConnection { .. } => ErrorKind::InvalidConnection,
            Self::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            Self::AcquireTimeout { .. } => ErrorKind::AcquireTimeout,
            Self::ForeignKeyConstraint { .. } => ErrorKind::ForeignKeyConstraint,
            Self::TransactionError { .. } => ErrorKind::TransactionError,
            Self::ConfigurationError(_) => ErrorKind::ConfigurationError,
            Self::DatabaseError { .. } => ErrorKind::DatabaseError,
        }
    }

    /// Returns `true` for the translated connection-layer errors.
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::AccessDenied { .. }
                | Self::HostNotFound { .. }
                | Self::HostNotReachable { .. }
                | Self::InvalidConnection { .. }
                | Self::ConnectionLost { .. }
        )
    }

    /// Returns the dialect this error was raised for, if any.
    pub fn dialect(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { dialect, .. }
            | Self::DataCorruption { dialect, .. }
            | Self::UnsupportedOperation { dialect, .. }
            | Self::InvalidDescriptor { dialect, .. }
            | Self::ConnectionRefused { dialect, .. }
            | Self::AccessDenied { dialect, .. }
            | Self::HostNotFound { dialect, .. }
            | Self::HostNotReachable { dialect, .. }
            | Self::InvalidConnection { dialect, .. }
            | Self::ConnectionLost { dialect, .. }
            | Self::AcquireTimeout { dialect, .. }
            | Self::ForeignKeyConstraint { dialect, .. }
            | Self::TransactionError { dialect, .. }
            | Self::DatabaseError { dialect, .. } => Some(dialect),
            Self::UnknownDialect(name) => Some(name),
            Self::ReservedBindName { .. } | Self::ConfigurationError(_) => None,
        }
    }
}

/// A convenience type alias for `Result<T, SqlError>`.
pub type SqlResult<T> = Result<T, SqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display_names_dialect_and_feature() {
        let err = SqlError::unsupported("sqlite", "TRUNCATE ... CASCADE");
        assert_eq!(
            err.to_string(),
            "[sqlite] unsupported operation: TRUNCATE ... CASCADE"
        );
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(err.dialect(), Some("sqlite"));
    }

    #[test]
    fn test_connection_lost_display_with_state() {
        let err = SqlError::ConnectionLost {
            dialect: "postgres".into(),
            message: "broken pipe".into(),
            state: Some("Nested(1, sp1)".into()),
        };
        assert_eq!(
            err.to_string(),
            "[postgres] connection lost (transaction state: Nested(1, sp1)): broken pipe"
        );
    }

    #[test]
    fn test_connection_lost_display_without_state() {
        let err = SqlError::ConnectionLost {
            dialect: "mysql".into(),
            message: "eof".into(),
            state: None,
        };
        assert_eq!(err.to_string(), "[mysql] connection lost: eof");
    }

    #[test]
    fn test_is_connection_error() {
        let lost = SqlError::ConnectionLost {
            dialect: "x".into(),
            message: "y".into(),
            state: None,
        };
        assert!(lost.is_connection_error());
        assert!(SqlError::AccessDenied {
            dialect: "x".into(),
            message: "y".into()
        }
        .is_connection_error());
        assert!(!SqlError::invalid_value("x", "y").is_connection_error());
        assert!(!SqlError::ConfigurationError("x".into()).is_connection_error());
    }

    #[test]
    fn test_reserved_bind_name_has_no_dialect() {
        let err = SqlError::ReservedBindName {
            name: "sqlweave_1".into(),
            prefix: "sqlweave_".into(),
        };
        assert_eq!(err.dialect(), None);
        assert!(err.to_string().contains("sqlweave_1"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ForeignKeyConstraint.to_string(), "ForeignKeyConstraint");
    }
}
