//! Translation of driver errors into [`SqlError`].
//!
//! Driver error types and codes stop here. Every backend maps its failures
//! onto the connection-layer variants so callers only match on one closed
//! set.

use std::io;

use sqlweave_core::SqlError;

/// Classifies a socket-level failure.
pub fn from_io(dialect: &str, error: &io::Error) -> SqlError {
    let dialect = dialect.to_string();
    let message = error.to_string();
    match error.kind() {
        io::ErrorKind::ConnectionRefused => SqlError::ConnectionRefused { dialect, message },
        io::ErrorKind::PermissionDenied => SqlError::AccessDenied { dialect, message },
        io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable => {
            SqlError::HostNotFound { dialect, message }
        }
        io::ErrorKind::TimedOut => SqlError::HostNotReachable { dialect, message },
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected => SqlError::ConnectionLost {
            dialect,
            message,
            state: None,
        },
        _ => SqlError::InvalidConnection { dialect, message },
    }
}

/// Maps a failure to open a connection. Socket errors keep their
/// classification; anything else means the parameters were unusable.
pub fn connect_failure(dialect: &str, error: SqlError) -> SqlError {
    match error {
        SqlError::DatabaseError { message, .. } => SqlError::InvalidConnection {
            dialect: dialect.to_string(),
            message,
        },
        other => other,
    }
}

/// Maps a `rusqlite` error.
#[cfg(feature = "sqlite")]
pub fn from_sqlite(dialect: &str, error: &rusqlite::Error) -> SqlError {
    use rusqlite::ffi::ErrorCode;

    let message = error.to_string();
    let dialect = dialect.to_string();
    match error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::CannotOpen | ErrorCode::NotADatabase => {
                SqlError::InvalidConnection { dialect, message }
            }
            ErrorCode::PermissionDenied | ErrorCode::ReadOnly | ErrorCode::AuthorizationForStatementDenied => {
                SqlError::AccessDenied { dialect, message }
            }
            ErrorCode::ConstraintViolation
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                SqlError::ForeignKeyConstraint {
                    dialect,
                    table: String::new(),
                    message,
                }
            }
            _ => SqlError::DatabaseError { dialect, message },
        },
        rusqlite::Error::InvalidPath(_) => SqlError::InvalidConnection { dialect, message },
        _ => SqlError::DatabaseError { dialect, message },
    }
}

/// Maps a `tokio-postgres` error.
#[cfg(feature = "postgres")]
pub fn from_postgres(dialect: &str, error: &tokio_postgres::Error) -> SqlError {
    use std::error::Error as _;
    use tokio_postgres::error::SqlState;

    if let Some(code) = error.code() {
        let dialect = dialect.to_string();
        let message = error
            .as_db_error()
            .map_or_else(|| error.to_string(), |db| db.message().to_string());
        return if *code == SqlState::FOREIGN_KEY_VIOLATION {
            let table = error
                .as_db_error()
                .and_then(|db| db.table())
                .unwrap_or_default()
                .to_string();
            SqlError::ForeignKeyConstraint {
                dialect,
                table,
                message,
            }
        } else if *code == SqlState::INVALID_PASSWORD
            || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
            || *code == SqlState::INSUFFICIENT_PRIVILEGE
        {
            SqlError::AccessDenied { dialect, message }
        } else if *code == SqlState::INVALID_CATALOG_NAME {
            SqlError::InvalidConnection { dialect, message }
        } else if *code == SqlState::ADMIN_SHUTDOWN || *code == SqlState::CRASH_SHUTDOWN {
            SqlError::ConnectionLost {
                dialect,
                message,
                state: None,
            }
        } else {
            SqlError::DatabaseError { dialect, message }
        };
    }
    if let Some(io) = error.source().and_then(|s| s.downcast_ref::<io::Error>()) {
        return from_io(dialect, io);
    }
    if error.is_closed() {
        return SqlError::ConnectionLost {
            dialect: dialect.to_string(),
            message: error.to_string(),
            state: None,
        };
    }
    SqlError::database(dialect, error.to_string())
}

/// Maps a `mysql_async` error.
#[cfg(feature = "mysql")]
pub fn from_mysql(dialect: &str, error: &mysql_async::Error) -> SqlError {
    let message = error.to_string();
    match error {
        mysql_async::Error::Server(server) => {
            let dialect = dialect.to_string();
            match server.code {
                // ER_NO_REFERENCED_ROW_2, ER_ROW_IS_REFERENCED_2
                1451 | 1452 => SqlError::ForeignKeyConstraint {
                    dialect,
                    table: String::new(),
                    message,
                },
                // ER_DBACCESS_DENIED_ERROR, ER_ACCESS_DENIED_ERROR
                1044 | 1045 => SqlError::AccessDenied { dialect, message },
                // ER_BAD_DB_ERROR
                1049 => SqlError::InvalidConnection { dialect, message },
                _ => SqlError::DatabaseError { dialect, message },
            }
        }
        mysql_async::Error::Io(mysql_async::IoError::Io(io)) => from_io(dialect, io),
        mysql_async::Error::Io(_) => SqlError::ConnectionLost {
            dialect: dialect.to_string(),
            message,
            state: None,
        },
        mysql_async::Error::Url(_) => SqlError::InvalidConnection {
            dialect: dialect.to_string(),
            message,
        },
        _ => SqlError::database(dialect, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_core::ErrorKind;

    #[test]
    fn test_io_classification() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, ErrorKind::ConnectionRefused),
            (io::ErrorKind::PermissionDenied, ErrorKind::AccessDenied),
            (io::ErrorKind::NotFound, ErrorKind::HostNotFound),
            (io::ErrorKind::TimedOut, ErrorKind::HostNotReachable),
            (io::ErrorKind::BrokenPipe, ErrorKind::ConnectionLost),
            (io::ErrorKind::ConnectionReset, ErrorKind::ConnectionLost),
            (io::ErrorKind::InvalidInput, ErrorKind::InvalidConnection),
        ];
        for (kind, expected) in cases {
            let err = from_io("postgres", &io::Error::new(kind, "boom"));
            assert_eq!(err.kind(), expected, "{kind:?}");
            assert_eq!(err.dialect(), Some("postgres"));
        }
    }

    #[test]
    fn test_connect_failure_keeps_classified_errors() {
        let refused = SqlError::ConnectionRefused {
            dialect: "mysql".into(),
            message: "refused".into(),
        };
        assert_eq!(connect_failure("mysql", refused).kind(), ErrorKind::ConnectionRefused);
        let generic = SqlError::database("mysql", "bad handshake");
        assert_eq!(connect_failure("mysql", generic).kind(), ErrorKind::InvalidConnection);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_foreign_key_violation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (parent_id INTEGER REFERENCES parent (id));",
        )
        .unwrap();
        let err = conn
            .execute("INSERT INTO child (parent_id) VALUES (1)", [])
            .unwrap_err();
        assert_eq!(from_sqlite("sqlite", &err).kind(), ErrorKind::ForeignKeyConstraint);
    }
}
