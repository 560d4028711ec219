//! Capability records for the built-in dialects.
//!
//! Each function returns a fresh, fully specified record. The builtin
//! [`DialectRegistry`](super::DialectRegistry) is seeded from these, and a
//! custom dialect usually starts from one of them and changes a few fields.

use super::{
    AlterColumnStyle, AutoIncrementStyle, BindStyle, BytesLiteral, DataTypeSupport,
    DialectCapabilities, DialectFamily, EnumStyle, ExistenceCheck, ExistenceChecks, IndexSupport,
    IsolationLevel, IsolationPlacement, LimitStyle, MergeSource, RegexpStyle, RenameTableSupport,
    RenameTableSyntax, ReturningStyle, SavepointStyle, StartStyle, SchemaStatement,
    TransactionSupport, TruncateStatement, TruncateSupport, UpsertStyle,
};

const ALL_LEVELS: [IsolationLevel; 4] = [
    IsolationLevel::ReadUncommitted,
    IsolationLevel::ReadCommitted,
    IsolationLevel::RepeatableRead,
    IsolationLevel::Serializable,
];

fn options(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

/// Returns the records of every built-in dialect.
pub fn all() -> Vec<DialectCapabilities> {
    vec![
        postgres(),
        mysql(),
        mariadb(),
        sqlite(),
        mssql(),
        db2(),
        ibmi(),
        snowflake(),
        oracle(),
    ]
}

pub fn postgres() -> DialectCapabilities {
    DialectCapabilities {
        name: "postgres".into(),
        family: DialectFamily::Postgres,
        identifier_quote: ('"', '"'),
        bind_style: BindStyle::DollarNumbered,
        default_port: Some(5432),
        minimum_version: "11.0.0",
        default_schema: Some("public"),
        schemas: true,
        returning: ReturningStyle::Returning,
        upsert: UpsertStyle::OnConflict,
        multi_row_values: true,
        insert_ignore: None,
        limit: LimitStyle::LimitOffset,
        update_limit: false,
        row_locking: true,
        nulls_ordering: true,
        ilike: true,
        regexp: RegexpStyle::Tilde,
        truncate: TruncateSupport {
            statement: TruncateStatement::Truncate,
            cascade: true,
            restart_identity: true,
        },
        rename_table: RenameTableSupport {
            syntax: RenameTableSyntax::AlterTableRenameTo,
            change_schema: true,
            change_schema_and_table: false,
            qualified_target: false,
        },
        alter_column: AlterColumnStyle::AlterColumnClauses,
        drop_table_cascade: Some("CASCADE"),
        existence_checks: ExistenceChecks::uniform(ExistenceCheck::Clause),
        schema_statement: SchemaStatement::Schema,
        indexes: IndexSupport {
            concurrently: true,
            using: true,
            partial_where: true,
            if_not_exists: true,
            drop_on_table: false,
        },
        enum_style: EnumStyle::NamedType,
        deferrable_constraints: true,
        foreign_key_on_update: true,
        inline_references: true,
        add_column_keyword: "ADD COLUMN",
        auto_increment: AutoIncrementStyle::Serial,
        transactions: TransactionSupport {
            start: StartStyle::Begin,
            savepoints: SavepointStyle::Standard,
            isolation_levels: ALL_LEVELS.to_vec(),
            isolation_placement: IsolationPlacement::AfterStart,
            read_only: true,
            transaction_types: false,
        },
        data_types: DataTypeSupport {
            unsigned: false,
            zerofill: false,
            tinyint: false,
            mediumint: false,
            float_nan_infinity: true,
            float_precision: false,
            json: true,
            jsonb: true,
            array: true,
            range: true,
            hstore: true,
            geometry: true,
            time_precision: true,
            text_sizes: false,
            max_varchar: 10_485_760,
            max_char: 10_485_760,
            uuid_default_fn: Some("gen_random_uuid()"),
            bytes_literal: BytesLiteral::ByteaEscape,
        },
        escape_backslashes: false,
        unicode_string_prefix: None,
        connection_options: options(&[
            "application_name",
            "client_encoding",
            "connect_timeout",
            "keepalives",
            "options",
            "ssl_mode",
            "statement_timeout",
        ]),
    }
}

pub fn mysql() -> DialectCapabilities {
    DialectCapabilities {
        name: "mysql".into(),
        family: DialectFamily::MySql,
        identifier_quote: ('`', '`'),
        bind_style: BindStyle::Question,
        default_port: Some(3306),
        minimum_version: "8.0.19",
        default_schema: None,
        schemas: true,
        returning: ReturningStyle::None,
        upsert: UpsertStyle::OnDuplicateKey,
        multi_row_values: true,
        insert_ignore: Some("INSERT IGNORE"),
        limit: LimitStyle::LimitOffset,
        update_limit: true,
        row_locking: true,
        nulls_ordering: false,
        ilike: false,
        regexp: RegexpStyle::Regexp,
        truncate: TruncateSupport {
            statement: TruncateStatement::TruncateTable,
            cascade: false,
            restart_identity: false,
        },
        rename_table: RenameTableSupport {
            syntax: RenameTableSyntax::RenameTable,
            change_schema: true,
            change_schema_and_table: true,
            qualified_target: true,
        },
        alter_column: AlterColumnStyle::Change,
        drop_table_cascade: None,
        existence_checks: ExistenceChecks::uniform(ExistenceCheck::Clause),
        schema_statement: SchemaStatement::Schema,
        indexes: IndexSupport {
            concurrently: false,
            using: false,
            partial_where: false,
            if_not_exists: false,
            drop_on_table: true,
        },
        enum_style: EnumStyle::Native,
        deferrable_constraints: false,
        foreign_key_on_update: true,
        inline_references: false,
        add_column_keyword: "ADD",
        auto_increment: AutoIncrementStyle::Keyword("AUTO_INCREMENT"),
        transactions: TransactionSupport {
            start: StartStyle::StartTransaction,
            savepoints: SavepointStyle::Standard,
            isolation_levels: ALL_LEVELS.to_vec(),
            isolation_placement: IsolationPlacement::BeforeStart,
            read_only: true,
            transaction_types: false,
        },
        data_types: DataTypeSupport {
            unsigned: true,
            zerofill: true,
            tinyint: true,
            mediumint: true,
            float_nan_infinity: false,
            float_precision: true,
            json: true,
            jsonb: false,
            array: false,
            range: false,
            hstore: false,
            geometry: true,
            time_precision: true,
            text_sizes: true,
            max_varchar: 65_535,
            max_char: 255,
            uuid_default_fn: None,
            bytes_literal: BytesLiteral::HexString,
        },
        escape_backslashes: true,
        unicode_string_prefix: None,
        connection_options: options(&[
            "charset",
            "compress",
            "connect_timeout",
            "socket",
            "ssl",
            "stmt_cache_size",
        ]),
    }
}

pub fn mariadb() -> DialectCapabilities {
    let mut caps = mysql();
    caps.name = "mariadb".into();
    caps.family = DialectFamily::MariaDb;
    caps.minimum_version = "10.4.30";
    caps.data_types.uuid_default_fn = Some("UUID()");
    caps
}

pub fn sqlite() -> DialectCapabilities {
    DialectCapabilities {
        name: "sqlite".into(),
        family: DialectFamily::Sqlite,
        identifier_quote: ('"', '"'),
        bind_style: BindStyle::Question,
        default_port: None,
        minimum_version: "3.35.0",
        default_schema: None,
        schemas: false,
        returning: ReturningStyle::Returning,
        upsert: UpsertStyle::OnConflict,
        multi_row_values: true,
        insert_ignore: None,
        limit: LimitStyle::LimitOffset,
        update_limit: false,
        row_locking: false,
        nulls_ordering: true,
        ilike: false,
        regexp: RegexpStyle::None,
        truncate: TruncateSupport {
            statement: TruncateStatement::DeleteFrom,
            cascade: false,
            restart_identity: true,
        },
        rename_table: RenameTableSupport {
            syntax: RenameTableSyntax::AlterTableRenameTo,
            change_schema: false,
            change_schema_and_table: false,
            qualified_target: false,
        },
        alter_column: AlterColumnStyle::RebuildTable,
        drop_table_cascade: None,
        existence_checks: ExistenceChecks::uniform(ExistenceCheck::Clause),
        schema_statement: SchemaStatement::Schema,
        indexes: IndexSupport {
            concurrently: false,
            using: false,
            partial_where: true,
            if_not_exists: true,
            drop_on_table: false,
        },
        enum_style: EnumStyle::CheckConstraint,
        deferrable_constraints: false,
        foreign_key_on_update: true,
        inline_references: true,
        add_column_keyword: "ADD COLUMN",
        auto_increment: AutoIncrementStyle::Keyword("AUTOINCREMENT"),
        transactions: TransactionSupport {
            start: StartStyle::Begin,
            savepoints: SavepointStyle::Standard,
            isolation_levels: vec![IsolationLevel::ReadUncommitted, IsolationLevel::Serializable],
            isolation_placement: IsolationPlacement::ReadUncommittedPragma,
            read_only: false,
            transaction_types: true,
        },
        data_types: DataTypeSupport {
            unsigned: false,
            zerofill: false,
            tinyint: false,
            mediumint: false,
            float_nan_infinity: false,
            float_precision: false,
            json: true,
            jsonb: false,
            array: false,
            range: false,
            hstore: false,
            geometry: false,
            time_precision: false,
            text_sizes: false,
            max_varchar: 1_000_000_000,
            max_char: 1_000_000_000,
            uuid_default_fn: None,
            bytes_literal: BytesLiteral::HexString,
        },
        escape_backslashes: false,
        unicode_string_prefix: None,
        connection_options: options(&["busy_timeout", "foreign_keys", "mode"]),
    }
}

pub fn mssql() -> DialectCapabilities {
    DialectCapabilities {
        name: "mssql".into(),
        family: DialectFamily::MsSql,
        identifier_quote: ('[', ']'),
        bind_style: BindStyle::Named('@'),
        default_port: Some(1433),
        minimum_version: "14.0.1000",
        default_schema: Some("dbo"),
        schemas: true,
        returning: ReturningStyle::Output,
        upsert: UpsertStyle::Merge(MergeSource::ValuesTerminated),
        multi_row_values: true,
        insert_ignore: None,
        limit: LimitStyle::OffsetFetch,
        update_limit: false,
        row_locking: false,
        nulls_ordering: false,
        ilike: false,
        regexp: RegexpStyle::None,
        truncate: TruncateSupport {
            statement: TruncateStatement::TruncateTable,
            cascade: false,
            restart_identity: false,
        },
        rename_table: RenameTableSupport {
            syntax: RenameTableSyntax::SpRename,
            change_schema: true,
            change_schema_and_table: true,
            qualified_target: false,
        },
        alter_column: AlterColumnStyle::AlterColumnInline,
        drop_table_cascade: None,
        existence_checks: ExistenceChecks {
            create_table: ExistenceCheck::IfGuard,
            drop_table: ExistenceCheck::Clause,
            create_schema: ExistenceCheck::IfGuard,
            drop_schema: ExistenceCheck::Clause,
        },
        schema_statement: SchemaStatement::Schema,
        indexes: IndexSupport {
            concurrently: false,
            using: false,
            partial_where: true,
            if_not_exists: false,
            drop_on_table: true,
        },
        enum_style: EnumStyle::CheckConstraint,
        deferrable_constraints: false,
        foreign_key_on_update: true,
        inline_references: true,
        add_column_keyword: "ADD",
        auto_increment: AutoIncrementStyle::Identity("IDENTITY(1,1)"),
        transactions: TransactionSupport {
            start: StartStyle::BeginTransaction,
            savepoints: SavepointStyle::MsSql,
            isolation_levels: ALL_LEVELS.to_vec(),
            isolation_placement: IsolationPlacement::BeforeStart,
            read_only: false,
            transaction_types: false,
        },
        data_types: DataTypeSupport {
            unsigned: false,
            zerofill: false,
            tinyint: true,
            mediumint: false,
            float_nan_infinity: false,
            float_precision: false,
            json: true,
            jsonb: false,
            array: false,
            range: false,
            hstore: false,
            geometry: false,
            time_precision: true,
            text_sizes: false,
            max_varchar: 8000,
            max_char: 8000,
            uuid_default_fn: Some("NEWID()"),
            bytes_literal: BytesLiteral::HexNumber,
        },
        escape_backslashes: false,
        unicode_string_prefix: Some("N"),
        connection_options: options(&[
            "encrypt",
            "instance_name",
            "request_timeout",
            "tds_version",
            "trust_server_certificate",
        ]),
    }
}

pub fn db2() -> DialectCapabilities {
    DialectCapabilities {
        name: "db2".into(),
        family: DialectFamily::Db2,
        identifier_quote: ('"', '"'),
        bind_style: BindStyle::Question,
        default_port: Some(50_000),
        minimum_version: "11.5.0",
        default_schema: None,
        schemas: true,
        returning: ReturningStyle::None,
        upsert: UpsertStyle::Merge(MergeSource::Values),
        multi_row_values: true,
        insert_ignore: None,
        limit: LimitStyle::OffsetFetch,
        update_limit: false,
        row_locking: true,
        nulls_ordering: false,
        ilike: false,
        regexp: RegexpStyle::None,
        truncate: TruncateSupport {
            statement: TruncateStatement::TruncateTableImmediate,
            cascade: false,
            restart_identity: false,
        },
        rename_table: RenameTableSupport {
            syntax: RenameTableSyntax::RenameTable,
            change_schema: false,
            change_schema_and_table: false,
            qualified_target: false,
        },
        alter_column: AlterColumnStyle::SetDataType,
        drop_table_cascade: None,
        existence_checks: ExistenceChecks::uniform(ExistenceCheck::None),
        schema_statement: SchemaStatement::Schema,
        indexes: IndexSupport {
            concurrently: false,
            using: false,
            partial_where: false,
            if_not_exists: false,
            drop_on_table: false,
        },
        enum_style: EnumStyle::CheckConstraint,
        deferrable_constraints: false,
        foreign_key_on_update: false,
        inline_references: true,
        add_column_keyword: "ADD",
        auto_increment: AutoIncrementStyle::Identity("GENERATED BY DEFAULT AS IDENTITY"),
        transactions: TransactionSupport {
            start: StartStyle::Implicit,
            savepoints: SavepointStyle::Db2,
            isolation_levels: Vec::new(),
            isolation_placement: IsolationPlacement::BeforeStart,
            read_only: false,
            transaction_types: false,
        },
        data_types: DataTypeSupport {
            unsigned: false,
            zerofill: false,
            tinyint: false,
            mediumint: false,
            float_nan_infinity: false,
            float_precision: false,
            json: false,
            jsonb: false,
            array: false,
            range: false,
            hstore: false,
            geometry: false,
            time_precision: true,
            text_sizes: false,
            max_varchar: 32_672,
            max_char: 254,
            uuid_default_fn: None,
            bytes_literal: BytesLiteral::HexString,
        },
        escape_backslashes: false,
        unicode_string_prefix: None,
        connection_options: options(&["connect_timeout", "current_schema", "ssl"]),
    }
}

pub fn ibmi() -> DialectCapabilities {
    let mut caps = db2();
    caps.name = "ibmi".into();
    caps.family = DialectFamily::Ibmi;
    caps.default_port = None;
    caps.minimum_version = "7.3.0";
    caps.transactions.isolation_levels = ALL_LEVELS.to_vec();
    caps.data_types.max_varchar = 32_739;
    caps.data_types.max_char = 32_765;
    caps.connection_options = options(&["connection_timeout", "data_source_name", "odbc_connection_string"]);
    caps
}

pub fn snowflake() -> DialectCapabilities {
    DialectCapabilities {
        name: "snowflake".into(),
        family: DialectFamily::Snowflake,
        identifier_quote: ('"', '"'),
        bind_style: BindStyle::Question,
        default_port: Some(443),
        minimum_version: "8.0.0",
        default_schema: Some("PUBLIC"),
        schemas: true,
        returning: ReturningStyle::None,
        upsert: UpsertStyle::None,
        multi_row_values: true,
        insert_ignore: None,
        limit: LimitStyle::LimitOffset,
        update_limit: false,
        row_locking: false,
        nulls_ordering: true,
        ilike: true,
        regexp: RegexpStyle::Regexp,
        truncate: TruncateSupport {
            statement: TruncateStatement::TruncateTable,
            cascade: false,
            restart_identity: false,
        },
        rename_table: RenameTableSupport {
            syntax: RenameTableSyntax::AlterTableRenameTo,
            change_schema: true,
            change_schema_and_table: true,
            qualified_target: true,
        },
        alter_column: AlterColumnStyle::SetDataType,
        drop_table_cascade: Some("CASCADE"),
        existence_checks: ExistenceChecks::uniform(ExistenceCheck::Clause),
        schema_statement: SchemaStatement::Schema,
        indexes: IndexSupport {
            concurrently: false,
            using: false,
            partial_where: false,
            if_not_exists: false,
            drop_on_table: false,
        },
        enum_style: EnumStyle::CheckConstraint,
        deferrable_constraints: false,
        foreign_key_on_update: true,
        inline_references: true,
        add_column_keyword: "ADD COLUMN",
        auto_increment: AutoIncrementStyle::Identity("AUTOINCREMENT"),
        transactions: TransactionSupport {
            start: StartStyle::StartTransaction,
            savepoints: SavepointStyle::None,
            isolation_levels: Vec::new(),
            isolation_placement: IsolationPlacement::AfterStart,
            read_only: false,
            transaction_types: false,
        },
        data_types: DataTypeSupport {
            unsigned: false,
            zerofill: false,
            tinyint: true,
            mediumint: false,
            float_nan_infinity: true,
            float_precision: false,
            json: true,
            jsonb: false,
            array: false,
            range: false,
            hstore: false,
            geometry: true,
            time_precision: true,
            text_sizes: false,
            max_varchar: 16_777_216,
            max_char: 16_777_216,
            uuid_default_fn: Some("UUID_STRING()"),
            bytes_literal: BytesLiteral::HexString,
        },
        escape_backslashes: true,
        unicode_string_prefix: None,
        connection_options: options(&["account", "application", "role", "warehouse"]),
    }
}

pub fn oracle() -> DialectCapabilities {
    DialectCapabilities {
        name: "oracle".into(),
        family: DialectFamily::Oracle,
        identifier_quote: ('"', '"'),
        bind_style: BindStyle::ColonNumbered,
        default_port: Some(1521),
        minimum_version: "18.0.0",
        default_schema: None,
        schemas: true,
        returning: ReturningStyle::None,
        upsert: UpsertStyle::Merge(MergeSource::SelectFromDual),
        multi_row_values: false,
        insert_ignore: None,
        limit: LimitStyle::OffsetFetch,
        update_limit: false,
        row_locking: true,
        nulls_ordering: true,
        ilike: false,
        regexp: RegexpStyle::None,
        truncate: TruncateSupport {
            statement: TruncateStatement::TruncateTable,
            cascade: true,
            restart_identity: false,
        },
        rename_table: RenameTableSupport {
            syntax: RenameTableSyntax::AlterTableRenameTo,
            change_schema: false,
            change_schema_and_table: false,
            qualified_target: false,
        },
        alter_column: AlterColumnStyle::Modify,
        drop_table_cascade: Some("CASCADE CONSTRAINTS"),
        existence_checks: ExistenceChecks::uniform(ExistenceCheck::PlSqlBlock),
        schema_statement: SchemaStatement::User,
        indexes: IndexSupport {
            concurrently: false,
            using: false,
            partial_where: false,
            if_not_exists: false,
            drop_on_table: false,
        },
        enum_style: EnumStyle::CheckConstraint,
        deferrable_constraints: true,
        foreign_key_on_update: false,
        inline_references: true,
        add_column_keyword: "ADD",
        auto_increment: AutoIncrementStyle::Identity("GENERATED BY DEFAULT AS IDENTITY"),
        transactions: TransactionSupport {
            start: StartStyle::Implicit,
            savepoints: SavepointStyle::WithoutRelease,
            isolation_levels: vec![IsolationLevel::ReadCommitted, IsolationLevel::Serializable],
            isolation_placement: IsolationPlacement::AfterStart,
            read_only: true,
            transaction_types: false,
        },
        data_types: DataTypeSupport {
            unsigned: false,
            zerofill: false,
            tinyint: false,
            mediumint: false,
            float_nan_infinity: true,
            float_precision: false,
            json: true,
            jsonb: false,
            array: false,
            range: false,
            hstore: false,
            geometry: false,
            time_precision: true,
            text_sizes: false,
            max_varchar: 4000,
            max_char: 2000,
            uuid_default_fn: None,
            bytes_literal: BytesLiteral::HexToRaw,
        },
        escape_backslashes: false,
        unicode_string_prefix: None,
        connection_options: options(&["connect_string", "edition", "events"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Feature;

    #[test]
    fn test_all_names_unique() {
        let mut names: Vec<String> = all().into_iter().map(|c| c.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 9);
    }

    #[test]
    fn test_bind_styles() {
        assert_eq!(postgres().bind_style, BindStyle::DollarNumbered);
        assert_eq!(sqlite().bind_style, BindStyle::Question);
        assert_eq!(mssql().bind_style, BindStyle::Named('@'));
        assert_eq!(oracle().bind_style, BindStyle::ColonNumbered);
    }

    #[test]
    fn test_derived_dialects_keep_base_family_traits() {
        let maria = mariadb();
        assert_eq!(maria.family, DialectFamily::MariaDb);
        assert!(maria.supports(Feature::Unsigned));
        assert_eq!(maria.identifier_quote, ('`', '`'));

        let ibmi = ibmi();
        assert_eq!(ibmi.family, DialectFamily::Ibmi);
        assert!(ibmi.supports(Feature::IsolationLevels));
        assert!(!db2().supports(Feature::IsolationLevels));
    }

    #[test]
    fn test_savepoint_release_support() {
        assert!(postgres().supports(Feature::ReleaseSavepoint));
        assert!(db2().supports(Feature::ReleaseSavepoint));
        assert!(!mssql().supports(Feature::ReleaseSavepoint));
        assert!(!oracle().supports(Feature::ReleaseSavepoint));
        assert!(oracle().supports(Feature::Savepoints));
    }

    #[test]
    fn test_rename_schema_support() {
        assert!(postgres().supports(Feature::RenameTableChangeSchema));
        assert!(!postgres().supports(Feature::RenameTableChangeSchemaAndName));
        assert!(!sqlite().supports(Feature::RenameTableChangeSchema));
        assert!(mssql().supports(Feature::RenameTableChangeSchemaAndName));
    }
}
