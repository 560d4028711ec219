//! Compiled statements and multi-statement execution plans.

use serde::{Deserialize, Serialize};
use sqlweave_core::{SqlError, SqlResult};

use crate::bind::BindParameterSet;
use crate::connection::Executor;
use crate::row::RawRowSet;
use crate::value::Value;

use super::transaction_sql;

/// One statement ready to send: SQL text and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: BindParameterSet,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, binds: BindParameterSet) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }

    /// A statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, BindParameterSet::default())
    }
}

/// The statements needed to change a column on an engine that cannot alter
/// columns in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRebuild {
    /// Unquoted name of the table being rebuilt.
    pub table: String,
    pub savepoint: String,
    pub create_backup: CompiledQuery,
    pub copy_rows: CompiledQuery,
    pub drop_original: CompiledQuery,
    pub rename_backup: CompiledQuery,
}

const REBUILD_SAVEPOINT: &str = "sqlweave_rebuild";

impl TableRebuild {
    pub(crate) fn new(
        table: impl Into<String>,
        create_backup: CompiledQuery,
        copy_rows: CompiledQuery,
        drop_original: CompiledQuery,
        rename_backup: CompiledQuery,
    ) -> Self {
        Self {
            table: table.into(),
            savepoint: REBUILD_SAVEPOINT.to_string(),
            create_backup,
            copy_rows,
            drop_original,
            rename_backup,
        }
    }

    /// Selects the DDL of the table's explicitly created indexes.
    /// Automatic indexes have no SQL and are recreated by the engine.
    fn index_query(&self) -> CompiledQuery {
        CompiledQuery::new(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL",
            BindParameterSet::Positional(vec![Value::String(self.table.clone())]),
        )
    }

    /// Selects the tables whose foreign keys point at the rebuilt table.
    fn referencing_query(&self) -> CompiledQuery {
        CompiledQuery::new(
            "SELECT DISTINCT m.name FROM sqlite_master m, pragma_foreign_key_list(m.name) f \
             WHERE m.type = 'table' AND f.\"table\" = ? COLLATE NOCASE",
            BindParameterSet::Positional(vec![Value::String(self.table.clone())]),
        )
    }

    /// Checks the foreign keys of the rebuilt table and of the tables that
    /// reference it. Violations elsewhere in the database are left alone.
    async fn check_foreign_keys<E: Executor + ?Sized>(&self, executor: &E) -> SqlResult<()> {
        let caps = &executor.dialect().capabilities;
        let referencing = executor.execute(&self.referencing_query()).await?;
        let mut tables = vec![self.table.clone()];
        for name in referencing.rows.iter().filter_map(|row| row.get::<String>("name").ok()) {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
                tables.push(name);
            }
        }

        for table in &tables {
            let check = format!("PRAGMA foreign_key_check({})", caps.quote_identifier(table));
            let violations = executor.execute_raw(&check).await?;
            if let Some(first) = violations.first() {
                let child = first.get::<String>("table").unwrap_or_else(|_| table.clone());
                let parent = first.get::<String>("parent").unwrap_or_default();
                return Err(SqlError::ForeignKeyConstraint {
                    dialect: executor.dialect().name().to_string(),
                    table: child,
                    message: format!(
                        "{} row(s) reference missing rows in '{parent}' after rebuilding '{}'",
                        violations.rows.len(),
                        self.table
                    ),
                });
            }
        }
        Ok(())
    }

    async fn run<E: Executor + ?Sized>(&self, executor: &E) -> SqlResult<RawRowSet> {
        let caps = &executor.dialect().capabilities;
        executor.execute_raw("PRAGMA foreign_keys = OFF").await?;
        let outcome = match executor
            .execute_raw(&transaction_sql::create_savepoint(caps, &self.savepoint)?)
            .await
        {
            Ok(_) => self.rebuild(executor).await,
            Err(e) => Err(e),
        };

        let restore = executor.execute_raw("PRAGMA foreign_keys = ON").await;
        let result = outcome?;
        restore?;
        Ok(result)
    }

    /// Runs the rebuild inside the savepoint, rolling back to it on any
    /// failure.
    async fn rebuild<E: Executor + ?Sized>(&self, executor: &E) -> SqlResult<RawRowSet> {
        let caps = &executor.dialect().capabilities;
        let result = self.swap(executor).await;
        if result.is_err() {
            let rollback = transaction_sql::rollback_to_savepoint(caps, &self.savepoint)?;
            if let Err(e) = executor.execute_raw(&rollback).await {
                tracing::warn!(table = %self.table, error = %e, "Rollback of failed table rebuild failed");
            }
        }
        if let Some(release) = transaction_sql::release_savepoint(caps, &self.savepoint)? {
            executor.execute_raw(&release).await?;
        }
        result
    }

    async fn swap<E: Executor + ?Sized>(&self, executor: &E) -> SqlResult<RawRowSet> {
        let indexes = executor.execute(&self.index_query()).await?;
        let index_sql: Vec<String> = indexes
            .rows
            .iter()
            .filter_map(|row| row.get::<String>("sql").ok())
            .collect();

        executor.execute(&self.create_backup).await?;
        let copied = executor.execute(&self.copy_rows).await?;
        executor.execute(&self.drop_original).await?;
        executor.execute(&self.rename_backup).await?;
        for sql in &index_sql {
            executor.execute_raw(sql).await?;
        }

        self.check_foreign_keys(executor).await?;
        tracing::debug!(table = %self.table, rows = copied.rows_affected, "Rebuilt table");
        Ok(copied)
    }
}

/// The statements produced for one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// A single statement.
    Statement(CompiledQuery),
    /// Statements run in order; the last result is returned.
    Sequence(Vec<CompiledQuery>),
    /// An upsert for dialects without native support: `probe` selects the
    /// existing row, then `update` runs if it exists and `insert` otherwise.
    UpsertFallback {
        probe: CompiledQuery,
        update: Option<CompiledQuery>,
        insert: CompiledQuery,
    },
    /// A table rebuild (see [`TableRebuild`]).
    TableRebuild(TableRebuild),
}

impl Plan {
    /// Every statement the plan may run. For a rebuild this excludes the
    /// index statements discovered at run time.
    pub fn statements(&self) -> Vec<&CompiledQuery> {
        match self {
            Self::Statement(q) => vec![q],
            Self::Sequence(qs) => qs.iter().collect(),
            Self::UpsertFallback {
                probe,
                update,
                insert,
            } => std::iter::once(probe)
                .chain(update.iter())
                .chain(std::iter::once(insert))
                .collect(),
            Self::TableRebuild(r) => vec![
                &r.create_backup,
                &r.copy_rows,
                &r.drop_original,
                &r.rename_backup,
            ],
        }
    }

    /// The single statement, when the plan has exactly one.
    pub fn into_statement(self) -> Option<CompiledQuery> {
        match self {
            Self::Statement(q) => Some(q),
            Self::Sequence(mut qs) if qs.len() == 1 => qs.pop(),
            _ => None,
        }
    }

    /// The plan's SQL as one script, statements separated by `;`.
    pub fn to_script(&self) -> String {
        let mut script = self
            .statements()
            .iter()
            .map(|q| q.sql.trim_end_matches(';'))
            .collect::<Vec<_>>()
            .join(";\n");
        script.push(';');
        script
    }

    /// Runs the plan. Multi-statement plans do not open a transaction of
    /// their own; run them inside one when atomicity matters.
    pub async fn execute<E: Executor + ?Sized>(&self, executor: &E) -> SqlResult<RawRowSet> {
        match self {
            Self::Statement(q) => executor.execute(q).await,
            Self::Sequence(qs) => {
                let mut last = RawRowSet::default();
                for q in qs {
                    last = executor.execute(q).await?;
                }
                Ok(last)
            }
            Self::UpsertFallback {
                probe,
                update,
                insert,
            } => {
                let existing = executor.execute(probe).await?;
                if existing.rows.is_empty() {
                    executor.execute(insert).await
                } else if let Some(update) = update {
                    executor.execute(update).await
                } else {
                    Ok(RawRowSet::affected(0))
                }
            }
            Self::TableRebuild(rebuild) => rebuild.run(executor).await,
        }
    }
}
