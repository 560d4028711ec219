//! Dialect capability descriptions.
//!
//! A [`DialectCapabilities`] value is the complete, immutable description of
//! what one SQL engine supports: identifier quoting, bind style, DML and DDL
//! syntax variants, transaction commands, and data type limits. Every field is
//! set explicitly by the dialect that owns it; there is no shared base to
//! inherit from, so a capability is never accidentally implied.
//!
//! Query generation never checks a dialect's name. It reads these records,
//! which is what lets a custom dialect registered at runtime (see
//! [`registry`]) behave like a built-in one.

pub mod builtin;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;

use sqlweave_core::{SqlError, SqlResult};

pub use registry::{DialectDescriptor, DialectRegistry};

/// The engine family a dialect belongs to. Drivers and default type
/// overrides are keyed on the family, never on the registered name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DialectFamily {
    Postgres,
    MySql,
    MariaDb,
    Sqlite,
    MsSql,
    Db2,
    Ibmi,
    Snowflake,
    Oracle,
}

impl fmt::Display for DialectFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::Sqlite => "sqlite",
            Self::MsSql => "mssql",
            Self::Db2 => "db2",
            Self::Ibmi => "ibmi",
            Self::Snowflake => "snowflake",
            Self::Oracle => "oracle",
        };
        f.write_str(name)
    }
}

/// How bind parameters are written in the final SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStyle {
    /// `$1, $2, ...`; a repeated name reuses its number.
    DollarNumbered,
    /// `?`; one value is pushed per occurrence.
    Question,
    /// `:1, :2, ...`; a repeated name reuses its number.
    ColonNumbered,
    /// `@name` (or another prefix character); values are keyed by name.
    Named(char),
    /// The engine cannot bind; values are inlined as escaped literals.
    Unsupported,
}

/// How rows written by a DML statement can be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStyle {
    None,
    /// `... RETURNING cols`
    Returning,
    /// `OUTPUT INSERTED.cols` placed before `VALUES`.
    Output,
}

/// Native upsert syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `INSERT ... ON CONFLICT (keys) DO UPDATE SET ...`
    OnConflict,
    /// `INSERT ... ON DUPLICATE KEY UPDATE ...`
    OnDuplicateKey,
    /// `MERGE INTO ... USING ... WHEN MATCHED ... WHEN NOT MATCHED ...`
    Merge(MergeSource),
    /// No native upsert; a probe, update, insert sequence is used instead.
    None,
}

/// How the source row of a `MERGE` statement is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSource {
    /// `USING (VALUES (...)) AS source (cols)`
    Values,
    /// As `Values`, and the statement must end with `;`.
    ValuesTerminated,
    /// `USING (SELECT ... AS col FROM dual) source`
    SelectFromDual,
}

/// Row limiting syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

/// Regular expression matching support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexpStyle {
    None,
    /// `~` and `~*`
    Tilde,
    /// `REGEXP` (case insensitivity is not available)
    Regexp,
}

/// The statement used to empty a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateStatement {
    /// `TRUNCATE t`
    Truncate,
    /// `TRUNCATE TABLE t`
    TruncateTable,
    /// `TRUNCATE TABLE t IMMEDIATE`
    TruncateTableImmediate,
    /// `DELETE FROM t`
    DeleteFrom,
}

/// Truncation capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateSupport {
    pub statement: TruncateStatement,
    pub cascade: bool,
    pub restart_identity: bool,
}

/// The statement used to rename a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameTableSyntax {
    /// `ALTER TABLE a RENAME TO b`
    AlterTableRenameTo,
    /// `RENAME TABLE a TO b`
    RenameTable,
    /// `EXEC sp_rename 'a', 'b'`
    SpRename,
}

/// Table rename capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenameTableSupport {
    pub syntax: RenameTableSyntax,
    /// Moving a table to another schema is possible.
    pub change_schema: bool,
    /// Moving and renaming can happen together.
    pub change_schema_and_table: bool,
    /// The rename target may be schema-qualified in the rename statement itself.
    pub qualified_target: bool,
}

/// How a column definition is changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterColumnStyle {
    /// `ALTER COLUMN c TYPE ..., ALTER COLUMN c SET/DROP NOT NULL, ...`
    AlterColumnClauses,
    /// `ALTER TABLE t CHANGE c c <full definition>`
    Change,
    /// `ALTER TABLE t ALTER COLUMN c <type> [NOT] NULL`
    AlterColumnInline,
    /// `ALTER TABLE t ALTER COLUMN c SET DATA TYPE ...`
    SetDataType,
    /// `ALTER TABLE t MODIFY (c <definition>)`
    Modify,
    /// The engine cannot alter columns; the table is rebuilt.
    RebuildTable,
}

/// How enum columns are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumStyle {
    /// `ENUM('a', 'b')` inline in the column type.
    Native,
    /// A separately created named type (`CREATE TYPE ... AS ENUM`).
    NamedType,
    /// A text column constrained by `CHECK (c IN (...))`.
    CheckConstraint,
}

/// How auto-incrementing keys are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoIncrementStyle {
    /// `SERIAL` / `BIGSERIAL` replace the column type.
    Serial,
    /// A keyword placed after `PRIMARY KEY` (`AUTO_INCREMENT`, `AUTOINCREMENT`).
    Keyword(&'static str),
    /// An identity clause appended after the type.
    Identity(&'static str),
}

/// Index creation capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct IndexSupport {
    pub concurrently: bool,
    pub using: bool,
    pub partial_where: bool,
    pub if_not_exists: bool,
    /// `DROP INDEX` names the table (`DROP INDEX i ON t`).
    pub drop_on_table: bool,
}

/// How a conditional DDL statement (`IF [NOT] EXISTS`) is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceCheck {
    /// `IF [NOT] EXISTS` inside the statement.
    Clause,
    /// A leading T-SQL `IF` test against the catalog.
    IfGuard,
    /// A PL/SQL block around `EXECUTE IMMEDIATE`.
    PlSqlBlock,
    /// The condition cannot be expressed.
    None,
}

/// Conditional DDL support, per statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistenceChecks {
    pub create_table: ExistenceCheck,
    pub drop_table: ExistenceCheck,
    pub create_schema: ExistenceCheck,
    pub drop_schema: ExistenceCheck,
}

impl ExistenceChecks {
    /// The same form for every statement.
    pub const fn uniform(check: ExistenceCheck) -> Self {
        Self {
            create_table: check,
            drop_table: check,
            create_schema: check,
            drop_schema: check,
        }
    }
}

/// The statements that create and drop a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatement {
    /// `CREATE SCHEMA s` / `DROP SCHEMA s`
    Schema,
    /// A schema is a user account: `CREATE USER s NO AUTHENTICATION` / `DROP USER s`.
    User,
}

/// How a transaction is opened and closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStyle {
    /// `BEGIN` / `COMMIT` / `ROLLBACK`
    Begin,
    /// `START TRANSACTION` / `COMMIT` / `ROLLBACK`
    StartTransaction,
    /// `BEGIN TRANSACTION` / `COMMIT TRANSACTION` / `ROLLBACK TRANSACTION`
    BeginTransaction,
    /// Transactions start implicitly with the first statement.
    Implicit,
}

/// Savepoint syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointStyle {
    /// `SAVEPOINT s` / `ROLLBACK TO SAVEPOINT s` / `RELEASE SAVEPOINT s`
    Standard,
    /// `SAVE TRANSACTION s` / `ROLLBACK TRANSACTION s`; no release.
    MsSql,
    /// `SAVEPOINT s ON ROLLBACK RETAIN CURSORS` / standard rollback and release.
    Db2,
    /// `SAVEPOINT s` / `ROLLBACK TO SAVEPOINT s`; no release.
    WithoutRelease,
    /// Savepoints are not available.
    None,
}

/// Where the isolation level statement goes relative to the start statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationPlacement {
    /// `SET TRANSACTION ISOLATION LEVEL ...` before starting.
    BeforeStart,
    /// `SET TRANSACTION ISOLATION LEVEL ...` right after starting.
    AfterStart,
    /// `PRAGMA read_uncommitted = ...` before starting.
    ReadUncommittedPragma,
}

/// Transaction isolation levels.
///
/// Controls the visibility of data changes made by concurrent transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Allows dirty reads.
    ReadUncommitted,
    /// Only sees committed data.
    ReadCommitted,
    /// Repeated reads within a transaction return the same data.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL keyword for this isolation level.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// `SQLite` locking modes for `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Deferred,
    Immediate,
    Exclusive,
}

impl TransactionType {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Deferred => "DEFERRED",
            Self::Immediate => "IMMEDIATE",
            Self::Exclusive => "EXCLUSIVE",
        }
    }
}

/// Transaction capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSupport {
    pub start: StartStyle,
    pub savepoints: SavepointStyle,
    pub isolation_levels: Vec<IsolationLevel>,
    pub isolation_placement: IsolationPlacement,
    pub read_only: bool,
    pub transaction_types: bool,
}

/// How binary literals are written when inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesLiteral {
    /// `X'0a0b'`
    HexString,
    /// `0x0a0b`
    HexNumber,
    /// `'\x0a0b'` (bytea escape format)
    ByteaEscape,
    /// `HEXTORAW('0a0b')`
    HexToRaw,
}

/// Data type capabilities and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DataTypeSupport {
    pub unsigned: bool,
    pub zerofill: bool,
    pub tinyint: bool,
    pub mediumint: bool,
    /// NaN and +/-Infinity can be stored in float columns.
    pub float_nan_infinity: bool,
    /// `FLOAT(p, s)` style parameters are accepted.
    pub float_precision: bool,
    pub json: bool,
    pub jsonb: bool,
    pub array: bool,
    pub range: bool,
    pub hstore: bool,
    pub geometry: bool,
    /// `TIME(p)` / `TIMESTAMP(p)` fractional precision is accepted.
    pub time_precision: bool,
    /// `TINYTEXT` / `MEDIUMTEXT` / `LONGTEXT` exist.
    pub text_sizes: bool,
    pub max_varchar: u32,
    pub max_char: u32,
    /// SQL expression producing a random UUID, used for `DEFAULT` values.
    pub uuid_default_fn: Option<&'static str>,
    pub bytes_literal: BytesLiteral,
}

/// The full capability record for one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DialectCapabilities {
    // ── Identity ─────────────────────────────────────────────────────
    pub name: String,
    pub family: DialectFamily,
    pub identifier_quote: (char, char),
    pub bind_style: BindStyle,
    pub default_port: Option<u16>,
    pub minimum_version: &'static str,
    pub default_schema: Option<&'static str>,

    // ── Query features ───────────────────────────────────────────────
    pub schemas: bool,
    pub returning: ReturningStyle,
    pub upsert: UpsertStyle,
    /// `INSERT ... VALUES (...), (...)` is accepted. Otherwise multi-row
    /// inserts are written as `INSERT ALL ... SELECT 1 FROM dual`.
    pub multi_row_values: bool,
    /// Keyword used to ignore duplicates on insert (`INSERT IGNORE`,
    /// `INSERT OR IGNORE`), when `ON CONFLICT DO NOTHING` is not available.
    pub insert_ignore: Option<&'static str>,
    pub limit: LimitStyle,
    /// `UPDATE` and `DELETE` accept a `LIMIT` clause.
    pub update_limit: bool,
    pub row_locking: bool,
    pub nulls_ordering: bool,
    pub ilike: bool,
    pub regexp: RegexpStyle,

    // ── DDL ──────────────────────────────────────────────────────────
    pub truncate: TruncateSupport,
    pub rename_table: RenameTableSupport,
    pub alter_column: AlterColumnStyle,
    /// Keyword appended to `DROP TABLE` to drop dependents too.
    pub drop_table_cascade: Option<&'static str>,
    pub existence_checks: ExistenceChecks,
    pub schema_statement: SchemaStatement,
    pub indexes: IndexSupport,
    pub enum_style: EnumStyle,
    pub deferrable_constraints: bool,
    pub foreign_key_on_update: bool,
    /// Column-level `REFERENCES` clauses are honored. When false, foreign
    /// keys are always emitted as table-level constraints.
    pub inline_references: bool,
    pub add_column_keyword: &'static str,
    pub auto_increment: AutoIncrementStyle,

    // ── Transactions ─────────────────────────────────────────────────
    pub transactions: TransactionSupport,

    // ── Types and literals ───────────────────────────────────────────
    pub data_types: DataTypeSupport,
    /// Backslash is an escape character inside string literals.
    pub escape_backslashes: bool,
    /// Prefix for unicode string literals (`N'...'`).
    pub unicode_string_prefix: Option<&'static str>,

    // ── Connections ──────────────────────────────────────────────────
    /// Dialect-specific connection option names that are accepted.
    pub connection_options: Vec<String>,
}

/// A named capability that callers can query with
/// [`DialectCapabilities::supports`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Schemas,
    Returning,
    Upsert,
    NativeUpsert,
    InsertIgnore,
    RowLocking,
    NullsOrdering,
    ILike,
    Regexp,
    IRegexp,
    TruncateCascade,
    TruncateRestartIdentity,
    RenameTableChangeSchema,
    RenameTableChangeSchemaAndName,
    DropTableCascade,
    IndexConcurrently,
    IndexUsing,
    IndexWhere,
    DeferrableConstraints,
    ForeignKeyOnUpdate,
    Savepoints,
    ReleaseSavepoint,
    IsolationLevels,
    ReadOnlyTransactions,
    TransactionTypes,
    Unsigned,
    Zerofill,
    Json,
    Jsonb,
    Array,
    Range,
    Hstore,
    Geometry,
    UuidDefault,
    NativeEnum,
}

impl DialectCapabilities {
    /// Answers a capability question from the record.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlweave_db::dialect::{builtin, Feature};
    ///
    /// assert!(builtin::postgres().supports(Feature::Returning));
    /// assert!(!builtin::mysql().supports(Feature::Returning));
    /// ```
    pub fn supports(&self, feature: Feature) -> bool {
        let tx = &self.transactions;
        let types = &self.data_types;
        match feature {
            Feature::Schemas => self.schemas,
            Feature::Returning => self.returning != ReturningStyle::None,
            Feature::Upsert => true,
            Feature::NativeUpsert => self.upsert != UpsertStyle::None,
            Feature::InsertIgnore => {
                self.insert_ignore.is_some() || self.upsert == UpsertStyle::OnConflict
            }
            Feature::RowLocking => self.row_locking,
            Feature::NullsOrdering => self.nulls_ordering,
            Feature::ILike => self.ilike,
            Feature::Regexp => self.regexp != RegexpStyle::None,
            Feature::IRegexp => self.regexp == RegexpStyle::Tilde,
            Feature::TruncateCascade => self.truncate.cascade,
            Feature::TruncateRestartIdentity => self.truncate.restart_identity,
            Feature::RenameTableChangeSchema => self.schemas && self.rename_table.change_schema,
            Feature::RenameTableChangeSchemaAndName => {
                self.schemas && self.rename_table.change_schema_and_table
            }
            Feature::DropTableCascade => self.drop_table_cascade.is_some(),
            Feature::IndexConcurrently => self.indexes.concurrently,
            Feature::IndexUsing => self.indexes.using,
            Feature::IndexWhere => self.indexes.partial_where,
            Feature::DeferrableConstraints => self.deferrable_constraints,
            Feature::ForeignKeyOnUpdate => self.foreign_key_on_update,
            Feature::Savepoints => tx.savepoints != SavepointStyle::None,
            Feature::ReleaseSavepoint => {
                matches!(tx.savepoints, SavepointStyle::Standard | SavepointStyle::Db2)
            }
            Feature::IsolationLevels => !tx.isolation_levels.is_empty(),
            Feature::ReadOnlyTransactions => tx.read_only,
            Feature::TransactionTypes => tx.transaction_types,
            Feature::Unsigned => types.unsigned,
            Feature::Zerofill => types.zerofill,
            Feature::Json => types.json,
            Feature::Jsonb => types.jsonb,
            Feature::Array => types.array,
            Feature::Range => types.range,
            Feature::Hstore => types.hstore,
            Feature::Geometry => types.geometry,
            Feature::UuidDefault => types.uuid_default_fn.is_some(),
            Feature::NativeEnum => self.enum_style == EnumStyle::Native,
        }
    }

    /// Fails with `UnsupportedOperation` naming `what` unless `feature` is supported.
    pub fn require(&self, feature: Feature, what: &str) -> SqlResult<()> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(SqlError::unsupported(&self.name, what))
        }
    }

    /// Quotes an identifier, doubling any embedded closing delimiter.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlweave_db::dialect::builtin;
    ///
    /// assert_eq!(builtin::postgres().quote_identifier("Users"), "\"Users\"");
    /// assert_eq!(builtin::mysql().quote_identifier("a`b"), "`a``b`");
    /// assert_eq!(builtin::mssql().quote_identifier("x]"), "[x]]]");
    /// ```
    pub fn quote_identifier(&self, ident: &str) -> String {
        let (open, close) = self.identifier_quote;
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(open);
        for c in ident.chars() {
            if c == close {
                out.push(close);
            }
            out.push(c);
        }
        out.push(close);
        out
    }

    /// Quotes a possibly schema-qualified table name.
    ///
    /// The dialect's default schema is left out. On engines without schemas
    /// the schema is folded into the table name, so `audit.log` and `log`
    /// stay distinct tables.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlweave_db::dialect::builtin;
    ///
    /// assert_eq!(builtin::postgres().quote_table(Some("public"), "t"), "\"t\"");
    /// assert_eq!(builtin::sqlite().quote_table(Some("audit"), "log"), "\"audit.log\"");
    /// ```
    pub fn quote_table(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) if self.default_schema == Some(schema) => self.quote_identifier(name),
            _ => self.quote_qualified(schema, name),
        }
    }

    /// Like [`quote_table`](Self::quote_table), but keeps the default schema.
    /// Statements that move tables between schemas need the explicit form.
    pub fn quote_qualified(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) if self.schemas => {
                format!(
                    "{}.{}",
                    self.quote_identifier(schema),
                    self.quote_identifier(name)
                )
            }
            Some(schema) => self.quote_identifier(&format!("{schema}.{name}")),
            None => self.quote_identifier(name),
        }
    }

    /// Escapes a string as a SQL literal, including the surrounding quotes.
    ///
    /// Quotes are always doubled. Dialects that treat backslash as an escape
    /// character also get backslash escapes for control characters.
    pub fn escape_string(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 3);
        if let Some(prefix) = self.unicode_string_prefix {
            if !value.is_ascii() {
                out.push_str(prefix);
            }
        }
        out.push('\'');
        for c in value.chars() {
            match c {
                '\'' => out.push_str("''"),
                '\\' if self.escape_backslashes => out.push_str("\\\\"),
                '\0' if self.escape_backslashes => out.push_str("\\0"),
                '\n' if self.escape_backslashes => out.push_str("\\n"),
                '\r' if self.escape_backslashes => out.push_str("\\r"),
                '\x1a' if self.escape_backslashes => out.push_str("\\Z"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    /// Validates dialect-specific connection options against the whitelist.
    pub fn validate_options(&self, options: &BTreeMap<String, serde_json::Value>) -> SqlResult<()> {
        let unknown: Vec<&str> = options
            .keys()
            .filter(|k| !self.connection_options.iter().any(|allowed| allowed == *k))
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(SqlError::ConfigurationError(format!(
                "unsupported connection option(s) for dialect '{}': {}",
                self.name,
                unknown.join(", ")
            )))
        }
    }
}
