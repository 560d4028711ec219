//! End-to-end execution against in-memory SQLite through the pool.

use sqlweave_core::ErrorKind;
use sqlweave_db::dialect::{builtin, UpsertStyle};
use sqlweave_db::{
    ColumnDescriptor, CreateTable, DataType, DialectRegistry, Executor, ForeignKey, Insert,
    Lookup, OnConflict, Plan, QueryDescriptor, QueryGenerator, Select, TableName,
    TransactionOptions, TransactionState, TypeOverrides, Value, Q,
};
use sqlweave_db_backends::{ConnectionConfig, Pool};

/// A single-connection pool, so every statement sees the same in-memory
/// database.
fn memory_pool(config: ConnectionConfig) -> Pool {
    let mut config = config;
    config.pool.max_size = 1;
    Pool::from_config(&config).unwrap()
}

fn items_table() -> CreateTable {
    CreateTable::new("items")
        .column(ColumnDescriptor::new("id", DataType::integer()).primary_key())
        .column(ColumnDescriptor::new("v", DataType::text()))
}

async fn create(pool: &Pool, gen: &QueryGenerator, table: CreateTable) {
    let conn = pool.acquire().await.unwrap();
    gen.plan(&table.into()).unwrap().execute(&conn).await.unwrap();
}

async fn values(pool: &Pool, gen: &QueryGenerator) -> Vec<(i64, String)> {
    let conn = pool.acquire().await.unwrap();
    let select: QueryDescriptor = Select::new("items")
        .order_by(sqlweave_db::OrderBy::asc("id"))
        .into();
    let rows = conn.execute(&gen.generate(&select).unwrap()).await.unwrap();
    rows.rows
        .iter()
        .map(|r| (r.get::<i64>("id").unwrap(), r.get::<String>("v").unwrap()))
        .collect()
}

#[tokio::test]
async fn test_nested_savepoint_rolls_back_inner_work_only() {
    let pool = memory_pool(ConnectionConfig::sqlite_memory().unwrap());
    let gen = QueryGenerator::new(pool.dialect().clone());
    create(&pool, &gen, items_table()).await;

    let tx = pool.begin(TransactionOptions::default()).await.unwrap();
    let outer = Insert::new("items").value("id", 1).value("v", "outer");
    tx.execute_plan(gen.plan(&outer.into()).unwrap()).await.unwrap();

    let gen_inner = gen.clone();
    let inner = tx
        .nested(|tx| async move {
            let insert = Insert::new("items").value("id", 2).value("v", "inner");
            tx.execute_plan(gen_inner.plan(&insert.into())?).await?;
            assert!(matches!(tx.state(), TransactionState::Nested(1, _)));
            Err::<(), _>(sqlweave_core::SqlError::invalid_value("sqlite", "abort inner block"))
        })
        .await;
    assert_eq!(inner.unwrap_err().kind(), ErrorKind::InvalidValue);
    assert_eq!(tx.state(), TransactionState::Started);
    tx.commit().await.unwrap();

    assert_eq!(values(&pool, &gen).await, vec![(1, "outer".to_string())]);
}

#[tokio::test]
async fn test_rolled_back_transaction_leaves_no_rows() {
    let pool = memory_pool(ConnectionConfig::sqlite_memory().unwrap());
    let gen = QueryGenerator::new(pool.dialect().clone());
    create(&pool, &gen, items_table()).await;

    let tx = pool.begin(TransactionOptions::default()).await.unwrap();
    let insert = Insert::new("items").value("id", 1).value("v", "gone");
    tx.execute_plan(gen.plan(&insert.into()).unwrap()).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(values(&pool, &gen).await.is_empty());
}

#[tokio::test]
async fn test_upsert_fallback_matches_native_upsert() {
    let registry = DialectRegistry::builtin();
    let mut caps = builtin::sqlite();
    caps.name = "sqlite-no-upsert".into();
    caps.upsert = UpsertStyle::None;
    let fallback = registry.register(caps, &TypeOverrides::new()).unwrap();

    let native_config = ConnectionConfig::sqlite_memory().unwrap();
    let fallback_config = ConnectionConfig::sqlite_memory()
        .unwrap()
        .with_dialect(fallback);

    let mut results = Vec::new();
    for config in [native_config, fallback_config] {
        let pool = memory_pool(config);
        let gen = QueryGenerator::new(pool.dialect().clone());
        create(&pool, &gen, items_table()).await;

        let conn = pool.acquire().await.unwrap();
        for (id, v) in [(1, "a"), (2, "b"), (1, "c")] {
            let upsert: QueryDescriptor = Insert::new("items")
                .value("id", id)
                .value("v", v)
                .on_conflict(OnConflict::update(["id"]))
                .into();
            let plan = gen.plan(&upsert).unwrap();
            if pool.dialect().name() == "sqlite" {
                assert!(matches!(plan, Plan::Statement(_)));
            } else {
                assert!(matches!(plan, Plan::UpsertFallback { .. }));
            }
            plan.execute(&conn).await.unwrap();
        }
        drop(conn);
        results.push(values(&pool, &gen).await);
    }

    assert_eq!(results[0], vec![(1, "c".to_string()), (2, "b".to_string())]);
    assert_eq!(results[0], results[1]);
}

fn children_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id", DataType::integer()).primary_key(),
        ColumnDescriptor::new("parent_id", DataType::integer())
            .references(ForeignKey::new("parents", "id")),
        ColumnDescriptor::new("v", DataType::text()),
    ]
}

fn alter_children(column: ColumnDescriptor) -> QueryDescriptor {
    QueryDescriptor::AlterColumn {
        table: TableName::new("children"),
        column,
        current_columns: children_columns(),
    }
}

async fn parents_and_children(pool: &Pool, gen: &QueryGenerator) {
    create(
        pool,
        gen,
        CreateTable::new("parents")
            .column(ColumnDescriptor::new("id", DataType::integer()).primary_key()),
    )
    .await;
    create(
        pool,
        gen,
        CreateTable::new("children")
            .column(ColumnDescriptor::new("id", DataType::integer()).primary_key())
            .column(
                ColumnDescriptor::new("parent_id", DataType::integer())
                    .references(ForeignKey::new("parents", "id")),
            )
            .column(ColumnDescriptor::new("v", DataType::text())),
    )
    .await;
}

#[tokio::test]
async fn test_rebuild_changes_column_and_keeps_rows() {
    let pool = memory_pool(ConnectionConfig::sqlite_memory().unwrap());
    let gen = QueryGenerator::new(pool.dialect().clone());
    parents_and_children(&pool, &gen).await;

    let conn = pool.acquire().await.unwrap();
    conn.execute_raw("INSERT INTO parents (id) VALUES (1)").await.unwrap();
    conn.execute_raw("INSERT INTO children (id, parent_id, v) VALUES (10, 1, 'x')")
        .await
        .unwrap();
    conn.execute_raw("CREATE INDEX children_v ON children (v)").await.unwrap();

    let v_not_null = ColumnDescriptor::new("v", DataType::text()).not_null();
    let plan = gen.plan(&alter_children(v_not_null)).unwrap();
    assert!(matches!(plan, Plan::TableRebuild(_)));
    let copied = plan.execute(&conn).await.unwrap();
    assert_eq!(copied.rows_affected, 1);

    let index = conn
        .execute_raw("SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'children_v'")
        .await
        .unwrap();
    assert_eq!(index.rows.len(), 1);

    let err = conn
        .execute_raw("INSERT INTO children (id, parent_id, v) VALUES (11, 1, NULL)")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DatabaseError);
}

#[tokio::test]
async fn test_rebuild_with_dangling_reference_keeps_original_table() {
    let pool = memory_pool(ConnectionConfig::sqlite_memory().unwrap());
    let gen = QueryGenerator::new(pool.dialect().clone());
    parents_and_children(&pool, &gen).await;

    let conn = pool.acquire().await.unwrap();
    conn.execute_raw("PRAGMA foreign_keys = OFF").await.unwrap();
    conn.execute_raw("INSERT INTO children (id, parent_id, v) VALUES (10, 99, 'orphan')")
        .await
        .unwrap();
    conn.execute_raw("PRAGMA foreign_keys = ON").await.unwrap();

    let parent_id = ColumnDescriptor::new("parent_id", DataType::bigint())
        .references(ForeignKey::new("parents", "id"));
    let err = gen
        .plan(&alter_children(parent_id))
        .unwrap()
        .execute(&conn)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ForeignKeyConstraint);
    assert!(err.to_string().contains("parents"), "{err}");

    let tables = conn
        .execute_raw("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .await
        .unwrap();
    let names: Vec<String> = tables
        .rows
        .iter()
        .map(|r| r.get::<String>("name").unwrap())
        .collect();
    assert_eq!(names, vec!["children".to_string(), "parents".to_string()]);

    // The original definition still accepts NULL.
    conn.execute_raw("PRAGMA foreign_keys = OFF").await.unwrap();
    conn.execute_raw("INSERT INTO children (id, parent_id, v) VALUES (11, 99, NULL)")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rebuild_ignores_unrelated_violations() {
    let pool = memory_pool(ConnectionConfig::sqlite_memory().unwrap());
    let gen = QueryGenerator::new(pool.dialect().clone());
    parents_and_children(&pool, &gen).await;
    create(
        &pool,
        &gen,
        CreateTable::new("notes")
            .column(ColumnDescriptor::new("id", DataType::integer()).primary_key())
            .column(
                ColumnDescriptor::new("parent_id", DataType::integer())
                    .references(ForeignKey::new("parents", "id")),
            ),
    )
    .await;

    let conn = pool.acquire().await.unwrap();
    conn.execute_raw("INSERT INTO parents (id) VALUES (1)").await.unwrap();
    conn.execute_raw("INSERT INTO children (id, parent_id, v) VALUES (10, 1, 'x')")
        .await
        .unwrap();
    conn.execute_raw("PRAGMA foreign_keys = OFF").await.unwrap();
    conn.execute_raw("INSERT INTO notes (id, parent_id) VALUES (1, 99)")
        .await
        .unwrap();
    conn.execute_raw("PRAGMA foreign_keys = ON").await.unwrap();

    let v_not_null = ColumnDescriptor::new("v", DataType::text()).not_null();
    let copied = gen
        .plan(&alter_children(v_not_null))
        .unwrap()
        .execute(&conn)
        .await
        .unwrap();
    assert_eq!(copied.rows_affected, 1);
}

#[tokio::test]
async fn test_schema_qualified_tables_stay_distinct() {
    let pool = memory_pool(ConnectionConfig::sqlite_memory().unwrap());
    let gen = QueryGenerator::new(pool.dialect().clone());
    create(&pool, &gen, items_table()).await;
    let audit_items = CreateTable::new(TableName::qualified("audit", "items"))
        .column(ColumnDescriptor::new("id", DataType::integer()).primary_key())
        .column(ColumnDescriptor::new("v", DataType::text()));
    create(&pool, &gen, audit_items).await;

    let conn = pool.acquire().await.unwrap();
    let insert = Insert::new(TableName::qualified("audit", "items"))
        .value("id", 1)
        .value("v", "audited");
    gen.plan(&insert.into()).unwrap().execute(&conn).await.unwrap();
    drop(conn);

    assert!(values(&pool, &gen).await.is_empty());
}

#[tokio::test]
async fn test_binds_reach_the_driver() {
    let pool = memory_pool(ConnectionConfig::sqlite_memory().unwrap());
    let gen = QueryGenerator::new(pool.dialect().clone());
    create(&pool, &gen, items_table()).await;

    let conn = pool.acquire().await.unwrap();
    let hostile = "x'); DROP TABLE items; --";
    let insert = Insert::new("items").value("id", 1).value("v", hostile);
    gen.plan(&insert.into()).unwrap().execute(&conn).await.unwrap();

    let select: QueryDescriptor = Select::new("items")
        .filter(Q::filter("v", Lookup::Exact(Value::from(hostile))))
        .into();
    let rows = conn.execute(&gen.generate(&select).unwrap()).await.unwrap();
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0].get::<String>("v").unwrap(), hostile);
}
