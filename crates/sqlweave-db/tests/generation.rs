//! Cross-dialect generation tests through the public API.

use sqlweave_core::ErrorKind;
use sqlweave_db::dialect::builtin;
use sqlweave_db::dialect::UpsertStyle;
use sqlweave_db::query::RowLock;
use sqlweave_db::{
    BindParameterSet, ColumnDescriptor, CreateTable, DataType, DialectRegistry, Insert, Lookup,
    OnConflict, Plan, QueryDescriptor, QueryGenerator, Select, TypeOverrides, Value, Q,
};

fn generator(dialect: &str) -> QueryGenerator {
    QueryGenerator::for_dialect(dialect).unwrap()
}

fn simple_select() -> QueryDescriptor {
    Select::new("Users")
        .filter(Q::filter("id", Lookup::Exact(Value::from(42))))
        .into()
}

#[test]
fn test_simple_select_across_dialects() {
    let cases = [
        ("postgres", "SELECT * FROM \"Users\" WHERE \"id\" = $1"),
        ("mysql", "SELECT * FROM `Users` WHERE `id` = ?"),
        ("sqlite", "SELECT * FROM \"Users\" WHERE \"id\" = ?"),
        ("mssql", "SELECT * FROM [Users] WHERE [id] = @sqlweave_1"),
        ("oracle", "SELECT * FROM \"Users\" WHERE \"id\" = :1"),
        ("snowflake", "SELECT * FROM \"Users\" WHERE \"id\" = ?"),
        ("db2", "SELECT * FROM \"Users\" WHERE \"id\" = ?"),
    ];
    for (dialect, expected) in cases {
        let q = generator(dialect).generate(&simple_select()).unwrap();
        assert_eq!(q.sql, expected, "dialect {dialect}");
        assert_eq!(q.binds.len(), 1, "dialect {dialect}");
    }
}

#[test]
fn test_named_binds_keep_their_names() {
    let q = generator("mssql").generate(&simple_select()).unwrap();
    let named = q.binds.as_named().unwrap();
    assert_eq!(named.get("sqlweave_1"), Some(&Value::Int(42)));
}

#[test]
fn test_generation_is_deterministic() {
    for dialect in DialectRegistry::global().names() {
        let gen = generator(&dialect);
        let first = gen.generate(&simple_select()).unwrap();
        let second = gen.generate(&simple_select()).unwrap();
        assert_eq!(first, second, "dialect {dialect}");
    }
}

#[test]
fn test_values_never_reach_the_sql_text() {
    let hostile = "x'); DROP TABLE users; --";
    let select = Select::new("users").filter(Q::filter("name", Lookup::Exact(hostile.into())));
    for dialect in DialectRegistry::global().names() {
        let q = generator(&dialect).generate(&select.clone().into()).unwrap();
        assert!(!q.sql.contains("DROP TABLE"), "dialect {dialect}: {}", q.sql);
        assert!(!q.binds.is_empty(), "dialect {dialect}");
    }
}

#[test]
fn test_identifiers_are_escaped() {
    let q = generator("postgres")
        .generate(&Select::new("we\"ird").into())
        .unwrap();
    assert_eq!(q.sql, "SELECT * FROM \"we\"\"ird\"");
    let q = generator("mssql").generate(&Select::new("a]b").into()).unwrap();
    assert_eq!(q.sql, "SELECT * FROM [a]]b]");
}

#[test]
fn test_unsupported_features_fail_instead_of_degrading() {
    let locked = Select::new("t").lock(RowLock::Share);
    let err = generator("sqlite").generate(&locked.into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(err.to_string().contains("sqlite"));

    let returning = Insert::new("t").value("a", 1).returning(["id"]);
    let err = generator("mysql").generate(&returning.into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn test_reserved_bind_prefix_rejected() {
    let select = Select::new("t").filter(Q::raw("a = $sqlweave_1")).bind("sqlweave_1", 1);
    for dialect in ["postgres", "sqlite", "mssql"] {
        let err = generator(dialect).generate(&select.clone().into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReservedBindName, "dialect {dialect}");
    }
}

#[test]
fn test_upsert_shapes() {
    let insert: QueryDescriptor = Insert::new("users")
        .value("id", 1)
        .value("name", "a")
        .on_conflict(OnConflict::update(["id"]))
        .into();
    assert!(matches!(generator("postgres").plan(&insert).unwrap(), Plan::Statement(_)));
    assert!(matches!(generator("mssql").plan(&insert).unwrap(), Plan::Statement(_)));
    assert!(matches!(
        generator("snowflake").plan(&insert).unwrap(),
        Plan::UpsertFallback { .. }
    ));
}

#[test]
fn test_registered_dialect_inherits_family_types() {
    let registry = DialectRegistry::builtin();
    let mut caps = builtin::sqlite();
    caps.name = "sqlite-no-upsert".into();
    caps.upsert = UpsertStyle::None;
    let descriptor = registry.register(caps, &TypeOverrides::new()).unwrap();
    assert_eq!(descriptor.name(), "sqlite-no-upsert");

    let gen = QueryGenerator::new(descriptor);
    let insert: QueryDescriptor = Insert::new("t")
        .value("id", 1)
        .value("v", "a")
        .on_conflict(OnConflict::update(["id"]))
        .into();
    assert!(matches!(gen.plan(&insert).unwrap(), Plan::UpsertFallback { .. }));
    assert_eq!(DataType::text().to_sql(gen.dialect()).unwrap(), "TEXT");
}

#[test]
fn test_unknown_dialect() {
    let err = QueryGenerator::for_dialect("informix").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownDialect);
}

#[test]
fn test_create_table_binds_nothing() {
    let table = CreateTable::new("users")
        .column(ColumnDescriptor::new("id", DataType::integer()).primary_key().auto_increment())
        .column(ColumnDescriptor::new("email", DataType::string(255)).not_null());
    for dialect in ["postgres", "mysql", "sqlite", "mssql", "oracle"] {
        let plan = generator(dialect).plan(&table.clone().into()).unwrap();
        for statement in plan.statements() {
            assert!(statement.sql.starts_with("CREATE"), "dialect {dialect}: {}", statement.sql);
            assert_eq!(statement.binds, BindParameterSet::Positional(Vec::new()));
        }
    }
}
