//! Transaction control statements.
//!
//! These are pure functions of the dialect's [`TransactionSupport`]; the
//! coordinator in [`crate::transactions`] decides when to send them.
//!
//! [`TransactionSupport`]: crate::dialect::TransactionSupport

use serde::{Deserialize, Serialize};
use sqlweave_core::{SqlError, SqlResult};

use crate::dialect::{
    DialectCapabilities, Feature, IsolationLevel, IsolationPlacement, SavepointStyle, StartStyle,
    TransactionType,
};

/// Options for starting a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation_level: Option<IsolationLevel>,
    pub read_only: bool,
    /// SQLite locking mode.
    pub transaction_type: Option<TransactionType>,
}

impl TransactionOptions {
    #[must_use]
    pub const fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub const fn transaction_type(mut self, kind: TransactionType) -> Self {
        self.transaction_type = Some(kind);
        self
    }
}

/// When deferrable constraints are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintCheck {
    Deferred,
    Immediate,
}

/// The statements that open a transaction, in order.
///
/// Implicit-start dialects may return no statement at all.
///
/// # Errors
///
/// Returns `UnsupportedOperation` when the dialect cannot honor the isolation
/// level, read-only mode, or transaction type.
pub fn start(caps: &DialectCapabilities, options: &TransactionOptions) -> SqlResult<Vec<String>> {
    let tx = &caps.transactions;
    if let Some(level) = options.isolation_level {
        if !tx.isolation_levels.contains(&level) {
            return Err(SqlError::unsupported(
                &caps.name,
                format!("isolation level {level}"),
            ));
        }
    }
    if options.read_only {
        caps.require(Feature::ReadOnlyTransactions, "read-only transactions")?;
    }
    if options.transaction_type.is_some() {
        caps.require(Feature::TransactionTypes, "transaction types")?;
    }

    let mut begin = match (tx.start, options.transaction_type) {
        (_, Some(kind)) => Some(format!("BEGIN {} TRANSACTION", kind.as_sql())),
        (StartStyle::Begin, None) => Some("BEGIN".to_string()),
        (StartStyle::StartTransaction, None) => Some("START TRANSACTION".to_string()),
        (StartStyle::BeginTransaction, None) => Some("BEGIN TRANSACTION".to_string()),
        (StartStyle::Implicit, None) => None,
    };

    let mut statements = Vec::new();
    let isolation = options.isolation_level.map(|level| match tx.isolation_placement {
        IsolationPlacement::ReadUncommittedPragma => {
            let flag = u8::from(level == IsolationLevel::ReadUncommitted);
            format!("PRAGMA read_uncommitted = {flag}")
        }
        _ => format!("SET TRANSACTION ISOLATION LEVEL {level}"),
    });
    let isolation_first = tx.isolation_placement != IsolationPlacement::AfterStart;
    if isolation_first {
        statements.extend(isolation.clone());
    }

    if options.read_only {
        match begin.as_mut() {
            Some(sql) => sql.push_str(" READ ONLY"),
            // Only one SET TRANSACTION may open a transaction, and READ ONLY
            // cannot be combined with an isolation level there.
            None if isolation.is_some() => {
                return Err(SqlError::unsupported(
                    &caps.name,
                    "read-only transactions with an isolation level",
                ));
            }
            None => statements.push("SET TRANSACTION READ ONLY".to_string()),
        }
    }
    statements.extend(begin);

    if !isolation_first {
        statements.extend(isolation);
    }
    Ok(statements)
}

pub fn commit(caps: &DialectCapabilities) -> &'static str {
    match caps.transactions.start {
        StartStyle::BeginTransaction => "COMMIT TRANSACTION",
        _ => "COMMIT",
    }
}

pub fn rollback(caps: &DialectCapabilities) -> &'static str {
    match caps.transactions.start {
        StartStyle::BeginTransaction => "ROLLBACK TRANSACTION",
        _ => "ROLLBACK",
    }
}

/// # Errors
///
/// Returns `UnsupportedOperation` on dialects without savepoints.
pub fn create_savepoint(caps: &DialectCapabilities, name: &str) -> SqlResult<String> {
    let name = caps.quote_identifier(name);
    match caps.transactions.savepoints {
        SavepointStyle::Standard | SavepointStyle::WithoutRelease => Ok(format!("SAVEPOINT {name}")),
        SavepointStyle::MsSql => Ok(format!("SAVE TRANSACTION {name}")),
        SavepointStyle::Db2 => Ok(format!("SAVEPOINT {name} ON ROLLBACK RETAIN CURSORS")),
        SavepointStyle::None => Err(SqlError::unsupported(&caps.name, "savepoints")),
    }
}

/// # Errors
///
/// Returns `UnsupportedOperation` on dialects without savepoints.
pub fn rollback_to_savepoint(caps: &DialectCapabilities, name: &str) -> SqlResult<String> {
    let name = caps.quote_identifier(name);
    match caps.transactions.savepoints {
        SavepointStyle::Standard | SavepointStyle::WithoutRelease | SavepointStyle::Db2 => {
            Ok(format!("ROLLBACK TO SAVEPOINT {name}"))
        }
        SavepointStyle::MsSql => Ok(format!("ROLLBACK TRANSACTION {name}")),
        SavepointStyle::None => Err(SqlError::unsupported(&caps.name, "savepoints")),
    }
}

/// The statement releasing a savepoint, or `None` where savepoints are
/// released implicitly at commit.
///
/// # Errors
///
/// Returns `UnsupportedOperation` on dialects without savepoints.
pub fn release_savepoint(caps: &DialectCapabilities, name: &str) -> SqlResult<Option<String>> {
    match caps.transactions.savepoints {
        SavepointStyle::Standard | SavepointStyle::Db2 => Ok(Some(format!(
            "RELEASE SAVEPOINT {}",
            caps.quote_identifier(name)
        ))),
        SavepointStyle::MsSql | SavepointStyle::WithoutRelease => Ok(None),
        SavepointStyle::None => Err(SqlError::unsupported(&caps.name, "savepoints")),
    }
}

/// `SET CONSTRAINTS`, for all deferrable constraints when `names` is empty.
///
/// # Errors
///
/// Returns `UnsupportedOperation` on dialects without deferrable constraints.
pub fn set_constraints(
    caps: &DialectCapabilities,
    names: &[String],
    check: ConstraintCheck,
) -> SqlResult<String> {
    caps.require(Feature::DeferrableConstraints, "SET CONSTRAINTS")?;
    let target = if names.is_empty() {
        "ALL".to_string()
    } else {
        names
            .iter()
            .map(|n| caps.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mode = match check {
        ConstraintCheck::Deferred => "DEFERRED",
        ConstraintCheck::Immediate => "IMMEDIATE",
    };
    Ok(format!("SET CONSTRAINTS {target} {mode}"))
}
