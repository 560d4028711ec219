//! The query generator.
//!
//! [`QueryGenerator`] turns a [`QueryDescriptor`] into SQL for one dialect.
//! Every syntax decision reads the dialect's capability record; nothing here
//! looks at a dialect's name. Generation is pure: the same descriptor and
//! dialect always give the same text and parameters, and a descriptor that
//! needs a missing capability fails before any SQL is produced.
//!
//! DML values always go through the bind collector. DDL literals (defaults,
//! enum members) are escaped inline, since most engines cannot bind in DDL.

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use sqlweave_core::logging::query_span;
use sqlweave_core::{DatabaseSettings, Settings, SqlError, SqlResult};

use super::descriptor::{
    column_type, ConflictAction, Delete, Insert, OnConflict, QueryDescriptor, RowLock, Select,
    SelectColumn, TableName, Update,
};
use super::plan::{CompiledQuery, Plan};
use super::where_clause::{self, Lookup, Q};
use crate::bind::BindCollector;
use crate::dialect::{
    DialectCapabilities, DialectDescriptor, DialectRegistry, Feature, LimitStyle, MergeSource,
    ReturningStyle, UpsertStyle,
};
use crate::types::{BindContext, DataType};
use crate::value::Value;

/// Upper bound used when an offset is given without a limit.
const UNBOUNDED_LIMIT: u64 = i64::MAX as u64;

/// Per-connection generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Schema applied to tables that do not name one.
    pub default_schema: Option<String>,
    /// Offset applied to date-times when they are bound or escaped.
    pub timezone: FixedOffset,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            default_schema: None,
            timezone: Utc.fix(),
        }
    }
}

impl GeneratorOptions {
    /// Options for one configured database.
    pub fn from_settings(settings: &Settings, database: &DatabaseSettings) -> SqlResult<Self> {
        Ok(Self {
            default_schema: database.schema.clone(),
            timezone: settings.timezone_for(database)?,
        })
    }

    #[must_use]
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    #[must_use]
    pub const fn timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = timezone;
        self
    }

    pub(crate) const fn bind_context(&self) -> BindContext {
        BindContext {
            timezone: self.timezone,
        }
    }
}

/// Builds the text and binds of one statement.
pub(crate) struct StatementBuilder<'d> {
    dialect: &'d DialectDescriptor,
    default_schema: Option<&'d str>,
    binds: BindCollector<'d>,
}

impl<'d> StatementBuilder<'d> {
    pub(crate) fn new(
        dialect: &'d DialectDescriptor,
        default_schema: Option<&'d str>,
        ctx: BindContext,
    ) -> Self {
        Self {
            dialect,
            default_schema,
            binds: BindCollector::new(dialect, ctx),
        }
    }

    pub(crate) fn capabilities(&self) -> &'d DialectCapabilities {
        &self.dialect.capabilities
    }

    pub(crate) fn quote(&self, ident: &str) -> String {
        self.dialect.capabilities.quote_identifier(ident)
    }

    /// Quotes `column`, `table.column`, or a `*` in either position.
    pub(crate) fn quote_column(&self, column: &str) -> String {
        column
            .split('.')
            .map(|part| if part == "*" { part.to_string() } else { self.quote(part) })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quotes a table, qualifying it with the default schema when it has none.
    pub(crate) fn table(&self, table: &TableName) -> String {
        let schema = table.schema.as_deref().or(self.default_schema);
        self.dialect.capabilities.quote_table(schema, &table.name)
    }

    /// Validates `value` against `data_type` and reserves its wire form.
    pub(crate) fn bind(&mut self, data_type: &DataType, value: &Value) -> SqlResult<String> {
        data_type.validate(value, self.dialect)?;
        let wire = data_type.to_bindable(value, self.dialect, self.binds.context())?;
        let token = self.binds.reserve(wire);
        Ok(data_type.placeholder(&token, self.dialect))
    }

    /// Binds a value for `column`, typed by its declaration when there is one.
    pub(crate) fn bind_column(
        &mut self,
        attributes: &[super::descriptor::ColumnDescriptor],
        column: &str,
        value: &Value,
    ) -> SqlResult<String> {
        match column_type(attributes, column) {
            Some(data_type) => self.bind(data_type, value),
            None => self.bind(&DataType::infer(value), value),
        }
    }

    pub(crate) fn merge_user_binds(&mut self, binds: &[(String, Value)]) -> SqlResult<()> {
        for (name, value) in binds {
            self.binds.merge_user_supplied(name, value.clone())?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn reserved_len(&self) -> usize {
        self.binds.reserved_len()
    }

    pub(crate) fn finish(self, sql: String) -> SqlResult<CompiledQuery> {
        let dialect = self.dialect;
        let (sql, binds) = self.binds.finalize(&sql)?;
        tracing::debug!(dialect = %dialect.name(), sql = %sql, binds = binds.len(), "Generated statement");
        Ok(CompiledQuery::new(sql, binds))
    }
}

/// Compiles descriptors for one dialect.
///
/// # Examples
///
/// ```
/// use sqlweave_db::query::{Lookup, Q, QueryGenerator, Select};
/// use sqlweave_db::value::Value;
///
/// let generator = QueryGenerator::for_dialect("sqlite").unwrap();
/// let select = Select::new("Users").filter(Q::filter("id", Lookup::Exact(Value::from(42))));
/// let query = generator.generate(&select.into()).unwrap();
/// assert_eq!(query.sql, "SELECT * FROM \"Users\" WHERE \"id\" = ?");
/// assert_eq!(query.binds.as_positional().unwrap(), &[Value::Int(42)]);
/// ```
#[derive(Debug, Clone)]
pub struct QueryGenerator {
    dialect: Arc<DialectDescriptor>,
    options: GeneratorOptions,
}

impl QueryGenerator {
    pub fn new(dialect: Arc<DialectDescriptor>) -> Self {
        Self::with_options(dialect, GeneratorOptions::default())
    }

    pub const fn with_options(dialect: Arc<DialectDescriptor>, options: GeneratorOptions) -> Self {
        Self { dialect, options }
    }

    /// A generator for a dialect from the global registry.
    pub fn for_dialect(name: &str) -> SqlResult<Self> {
        Ok(Self::new(DialectRegistry::global().resolve(name)?))
    }

    pub const fn dialect(&self) -> &Arc<DialectDescriptor> {
        &self.dialect
    }

    pub const fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub(crate) fn caps(&self) -> &DialectCapabilities {
        &self.dialect.capabilities
    }

    pub(crate) fn builder(&self) -> StatementBuilder<'_> {
        StatementBuilder::new(
            &self.dialect,
            self.options.default_schema.as_deref(),
            self.options.bind_context(),
        )
    }

    pub(crate) fn unsupported(&self, what: impl Into<String>) -> SqlError {
        SqlError::unsupported(self.dialect.name(), what)
    }

    pub(crate) fn invalid(&self, message: impl Into<String>) -> SqlError {
        SqlError::invalid_descriptor(self.dialect.name(), message)
    }

    /// Compiles a descriptor that produces exactly one statement.
    ///
    /// # Errors
    ///
    /// Fails like [`plan`](Self::plan), and with `InvalidDescriptor` when the
    /// descriptor needs several statements on this dialect.
    pub fn generate(&self, descriptor: &QueryDescriptor) -> SqlResult<CompiledQuery> {
        self.plan(descriptor)?.into_statement().ok_or_else(|| {
            self.invalid(format!(
                "{} compiles to several statements on this dialect; use QueryGenerator::plan",
                descriptor.operation()
            ))
        })
    }

    /// Compiles a descriptor into an execution plan.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` when the descriptor needs a capability
    /// the dialect lacks, `InvalidValue` when a value fails its type, and
    /// `InvalidDescriptor` when the descriptor is malformed.
    pub fn plan(&self, descriptor: &QueryDescriptor) -> SqlResult<Plan> {
        let span = query_span(self.dialect.name(), descriptor.operation());
        let _guard = span.enter();

        match descriptor {
            QueryDescriptor::Select(s) => self.select(s).map(Plan::Statement),
            QueryDescriptor::Insert(i) => self.insert(i),
            QueryDescriptor::Update(u) => self.update(u).map(Plan::Statement),
            QueryDescriptor::Delete(d) => self.delete(d).map(Plan::Statement),
            QueryDescriptor::Truncate(t) => self.truncate(t),
            QueryDescriptor::CreateSchema {
                name,
                if_not_exists,
            } => self.create_schema(name, *if_not_exists),
            QueryDescriptor::DropSchema {
                name,
                if_exists,
                cascade,
            } => self.drop_schema(name, *if_exists, *cascade),
            QueryDescriptor::CreateTable(t) => self.create_table(t),
            QueryDescriptor::DropTable {
                table,
                if_exists,
                cascade,
            } => self.drop_table(table, *if_exists, *cascade),
            QueryDescriptor::RenameTable { from, to } => self.rename_table(from, to),
            QueryDescriptor::AddColumn { table, column } => self.add_column(table, column),
            QueryDescriptor::DropColumn { table, column } => self.drop_column(table, column),
            QueryDescriptor::RenameColumn { table, from, to } => {
                self.rename_column(table, from, to)
            }
            QueryDescriptor::AlterColumn {
                table,
                column,
                current_columns,
            } => self.alter_column(table, column, current_columns),
            QueryDescriptor::CreateIndex(i) => self.create_index(i),
            QueryDescriptor::DropIndex {
                table,
                name,
                if_exists,
                concurrently,
            } => self.drop_index(table, name, *if_exists, *concurrently),
        }
    }

    // ── SELECT ───────────────────────────────────────────────────────

    fn select(&self, s: &Select) -> SqlResult<CompiledQuery> {
        let caps = self.caps();
        let mut b = self.builder();
        b.merge_user_binds(&s.binds)?;

        let mut sql = String::from("SELECT ");
        if s.distinct {
            sql.push_str("DISTINCT ");
        }
        if s.columns.is_empty() {
            sql.push('*');
        } else {
            let columns: Vec<String> = s
                .columns
                .iter()
                .map(|c| match c {
                    SelectColumn::Column(name) => b.quote_column(name),
                    SelectColumn::Aliased(name, alias) => {
                        format!("{} AS {}", b.quote_column(name), b.quote(alias))
                    }
                    SelectColumn::Raw(expr) => expr.clone(),
                    SelectColumn::Star => "*".to_string(),
                })
                .collect();
            sql.push_str(&columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&b.table(&s.table));

        self.push_where(&mut sql, &mut b, s.where_clause.as_ref(), &s.attributes)?;

        if !s.group_by.is_empty() {
            let cols: Vec<String> = s.group_by.iter().map(|c| b.quote_column(c)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !s.order_by.is_empty() {
            let mut parts = Vec::with_capacity(s.order_by.len());
            for order in &s.order_by {
                let mut part = b.quote_column(&order.column);
                part.push_str(if order.descending { " DESC" } else { " ASC" });
                if let Some(first) = order.nulls_first {
                    caps.require(Feature::NullsOrdering, "NULLS FIRST/LAST ordering")?;
                    part.push_str(if first { " NULLS FIRST" } else { " NULLS LAST" });
                }
                parts.push(part);
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        match caps.limit {
            LimitStyle::LimitOffset => {
                match (s.limit, s.offset) {
                    (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
                    (None, Some(_)) => sql.push_str(&format!(" LIMIT {UNBOUNDED_LIMIT}")),
                    (None, None) => {}
                }
                if let Some(offset) = s.offset {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            LimitStyle::OffsetFetch => {
                if s.limit.is_some() || s.offset.is_some() {
                    if s.order_by.is_empty() {
                        return Err(self.invalid("OFFSET/FETCH row limiting requires an ORDER BY"));
                    }
                    sql.push_str(&format!(" OFFSET {} ROWS", s.offset.unwrap_or(0)));
                    if let Some(limit) = s.limit {
                        sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                    }
                }
            }
        }

        if let Some(lock) = s.lock {
            caps.require(Feature::RowLocking, "row locking")?;
            sql.push_str(match lock {
                RowLock::Update => " FOR UPDATE",
                RowLock::Share => " FOR SHARE",
            });
        }

        b.finish(sql)
    }

    fn push_where(
        &self,
        sql: &mut String,
        b: &mut StatementBuilder<'_>,
        q: Option<&Q>,
        attributes: &[super::descriptor::ColumnDescriptor],
    ) -> SqlResult<()> {
        if let Some(q) = q {
            let predicate = where_clause::compile(q, b, attributes)?;
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(())
    }

    /// The `OUTPUT` clause (placed before `VALUES`/`WHERE`) and the
    /// `RETURNING` clause (placed at the end) for `columns`.
    fn returning_clauses(
        &self,
        b: &StatementBuilder<'_>,
        columns: &[String],
        pseudo_table: &str,
    ) -> SqlResult<(String, String)> {
        if columns.is_empty() {
            return Ok((String::new(), String::new()));
        }
        match self.caps().returning {
            ReturningStyle::Returning => {
                let cols: Vec<String> = columns.iter().map(|c| b.quote_column(c)).collect();
                Ok((String::new(), format!(" RETURNING {}", cols.join(", "))))
            }
            ReturningStyle::Output => {
                let cols: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{pseudo_table}.{}", b.quote_column(c)))
                    .collect();
                Ok((format!(" OUTPUT {}", cols.join(", ")), String::new()))
            }
            ReturningStyle::None => Err(self.unsupported("RETURNING")),
        }
    }

    // ── INSERT ───────────────────────────────────────────────────────

    fn insert(&self, i: &Insert) -> SqlResult<Plan> {
        if i.columns.is_empty() || i.rows.is_empty() {
            return Err(self.invalid("insert has no values"));
        }
        if let Some(bad) = i.rows.iter().position(|row| row.len() != i.columns.len()) {
            return Err(self.invalid(format!(
                "insert row {bad} has {} values for {} columns",
                i.rows[bad].len(),
                i.columns.len()
            )));
        }
        if let Some(on_conflict) = &i.on_conflict {
            return self.upsert(i, on_conflict);
        }

        let caps = self.caps();
        let mut b = self.builder();
        let sql = if i.ignore_duplicates {
            if caps.upsert == UpsertStyle::OnConflict {
                self.insert_sql(&mut b, i, "INSERT INTO", " ON CONFLICT DO NOTHING")?
            } else if let Some(keyword) = caps.insert_ignore {
                self.insert_sql(&mut b, i, &format!("{keyword} INTO"), "")?
            } else {
                return Err(self.unsupported("INSERT ignoring duplicates"));
            }
        } else {
            self.insert_sql(&mut b, i, "INSERT INTO", "")?
        };
        b.finish(sql).map(Plan::Statement)
    }

    fn insert_sql(
        &self,
        b: &mut StatementBuilder<'_>,
        i: &Insert,
        verb: &str,
        tail: &str,
    ) -> SqlResult<String> {
        let columns: Vec<String> = i.columns.iter().map(|c| b.quote(c)).collect();
        if i.rows.len() > 1 && !self.caps().multi_row_values {
            return self.insert_all_sql(b, i, &columns, verb, tail);
        }
        let (output, returning) = self.returning_clauses(b, &i.returning, "INSERTED")?;
        let mut rows = Vec::with_capacity(i.rows.len());
        for row in &i.rows {
            rows.push(format!("({})", self.bind_row(b, i, row)?.join(", ")));
        }
        Ok(format!(
            "{verb} {} ({}){output} VALUES {}{tail}{returning}",
            b.table(&i.table),
            columns.join(", "),
            rows.join(", ")
        ))
    }

    /// `INSERT ALL INTO t (...) VALUES (...) ... SELECT 1 FROM dual`, for
    /// engines without multi-row `VALUES` lists.
    fn insert_all_sql(
        &self,
        b: &mut StatementBuilder<'_>,
        i: &Insert,
        columns: &[String],
        verb: &str,
        tail: &str,
    ) -> SqlResult<String> {
        if verb != "INSERT INTO" || !tail.is_empty() {
            return Err(self.unsupported("multi-row INSERT with conflict handling"));
        }
        if !i.returning.is_empty() {
            return Err(self.unsupported("multi-row INSERT with RETURNING"));
        }
        let into = format!("INTO {} ({})", b.table(&i.table), columns.join(", "));
        let mut sql = String::from("INSERT ALL");
        for row in &i.rows {
            sql.push_str(&format!(" {into} VALUES ({})", self.bind_row(b, i, row)?.join(", ")));
        }
        sql.push_str(" SELECT 1 FROM dual");
        Ok(sql)
    }

    fn bind_row(
        &self,
        b: &mut StatementBuilder<'_>,
        i: &Insert,
        row: &[Value],
    ) -> SqlResult<Vec<String>> {
        i.columns
            .iter()
            .zip(row)
            .map(|(column, value)| b.bind_column(&i.attributes, column, value))
            .collect()
    }

    /// Picks the upsert strategy from the dialect's upsert style.
    fn upsert(&self, i: &Insert, on_conflict: &OnConflict) -> SqlResult<Plan> {
        if on_conflict.keys.is_empty() {
            return Err(self.invalid("upsert requires at least one conflict key"));
        }
        for key in &on_conflict.keys {
            if !i.columns.contains(key) {
                return Err(self.invalid(format!("conflict key '{key}' is not an inserted column")));
            }
        }
        let updates: Vec<&String> = match &on_conflict.action {
            ConflictAction::DoNothing => Vec::new(),
            ConflictAction::Update(columns) if columns.is_empty() => i
                .columns
                .iter()
                .filter(|c| !on_conflict.keys.contains(c))
                .collect(),
            ConflictAction::Update(columns) => {
                if let Some(missing) = columns.iter().find(|c| !i.columns.contains(c)) {
                    return Err(self.invalid(format!(
                        "update column '{missing}' is not an inserted column"
                    )));
                }
                columns.iter().collect()
            }
        };

        match self.caps().upsert {
            UpsertStyle::OnConflict => self.upsert_on_conflict(i, &on_conflict.keys, &updates),
            UpsertStyle::OnDuplicateKey => self.upsert_on_duplicate_key(i, &updates),
            UpsertStyle::Merge(source) => self.upsert_merge(i, &on_conflict.keys, &updates, source),
            UpsertStyle::None => self.upsert_fallback(i, &on_conflict.keys, &updates),
        }
    }

    fn upsert_on_conflict(&self, i: &Insert, keys: &[String], updates: &[&String]) -> SqlResult<Plan> {
        let mut b = self.builder();
        let keys: Vec<String> = keys.iter().map(|k| b.quote(k)).collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let sets: Vec<String> = updates
                .iter()
                .map(|c| {
                    let c = b.quote(c);
                    format!("{c} = EXCLUDED.{c}")
                })
                .collect();
            format!("DO UPDATE SET {}", sets.join(", "))
        };
        let tail = format!(" ON CONFLICT ({}) {action}", keys.join(", "));
        let sql = self.insert_sql(&mut b, i, "INSERT INTO", &tail)?;
        b.finish(sql).map(Plan::Statement)
    }

    fn upsert_on_duplicate_key(&self, i: &Insert, updates: &[&String]) -> SqlResult<Plan> {
        let mut b = self.builder();
        let sql = if updates.is_empty() {
            let keyword = self
                .caps()
                .insert_ignore
                .ok_or_else(|| self.unsupported("INSERT ignoring duplicates"))?;
            self.insert_sql(&mut b, i, &format!("{keyword} INTO"), "")?
        } else {
            let sets: Vec<String> = updates
                .iter()
                .map(|c| {
                    let c = b.quote(c);
                    format!("{c} = VALUES({c})")
                })
                .collect();
            let tail = format!(" ON DUPLICATE KEY UPDATE {}", sets.join(", "));
            self.insert_sql(&mut b, i, "INSERT INTO", &tail)?
        };
        b.finish(sql).map(Plan::Statement)
    }

    fn upsert_merge(
        &self,
        i: &Insert,
        keys: &[String],
        updates: &[&String],
        source: MergeSource,
    ) -> SqlResult<Plan> {
        let mut b = self.builder();
        let (output, _) = match self.caps().returning {
            ReturningStyle::Output => self.returning_clauses(&b, &i.returning, "INSERTED")?,
            _ if i.returning.is_empty() => (String::new(), String::new()),
            _ => return Err(self.unsupported("RETURNING with MERGE")),
        };
        let columns: Vec<String> = i.columns.iter().map(|c| b.quote(c)).collect();
        let table = b.table(&i.table);

        let mut rows = Vec::with_capacity(i.rows.len());
        for row in &i.rows {
            rows.push(self.bind_row(&mut b, i, row)?);
        }
        let using = match source {
            MergeSource::Values | MergeSource::ValuesTerminated => {
                let values: Vec<String> = rows.iter().map(|r| format!("({})", r.join(", "))).collect();
                format!(
                    "MERGE INTO {table} AS target USING (VALUES {}) AS source ({})",
                    values.join(", "),
                    columns.join(", ")
                )
            }
            MergeSource::SelectFromDual => {
                let selects: Vec<String> = rows
                    .iter()
                    .map(|r| {
                        let cols: Vec<String> = r
                            .iter()
                            .zip(&columns)
                            .map(|(token, column)| format!("{token} AS {column}"))
                            .collect();
                        format!("SELECT {} FROM dual", cols.join(", "))
                    })
                    .collect();
                format!(
                    "MERGE INTO {table} target USING ({}) source",
                    selects.join(" UNION ALL ")
                )
            }
        };

        let on: Vec<String> = keys
            .iter()
            .map(|k| {
                let k = b.quote(k);
                format!("target.{k} = source.{k}")
            })
            .collect();
        let mut sql = format!("{using} ON ({})", on.join(" AND "));
        if !updates.is_empty() {
            let sets: Vec<String> = updates
                .iter()
                .map(|c| {
                    let c = b.quote(c);
                    format!("target.{c} = source.{c}")
                })
                .collect();
            sql.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", sets.join(", ")));
        }
        let inserted: Vec<String> = columns.iter().map(|c| format!("source.{c}")).collect();
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            columns.join(", "),
            inserted.join(", ")
        ));
        sql.push_str(&output);
        if source == MergeSource::ValuesTerminated {
            sql.push(';');
        }
        b.finish(sql).map(Plan::Statement)
    }

    /// Probe, then update or insert. Runs inside the caller's transaction.
    fn upsert_fallback(&self, i: &Insert, keys: &[String], updates: &[&String]) -> SqlResult<Plan> {
        let row = match i.rows.as_slice() {
            [row] => row,
            _ => return Err(self.unsupported("multi-row upsert without native upsert support")),
        };
        if !i.returning.is_empty() {
            return Err(self.unsupported("RETURNING with an emulated upsert"));
        }
        let value_of = |column: &str| {
            i.columns
                .iter()
                .position(|c| c == column)
                .map(|pos| &row[pos])
        };
        let key_filter = keys
            .iter()
            .filter_map(|k| value_of(k).map(|v| Q::filter(k.clone(), Lookup::Exact(v.clone()))))
            .fold(Q::And(Vec::new()), |acc, q| acc & q);

        let mut b = self.builder();
        let mut probe = format!("SELECT 1 FROM {}", b.table(&i.table));
        self.push_where(&mut probe, &mut b, Some(&key_filter), &i.attributes)?;
        let probe = b.finish(probe)?;

        let update = if updates.is_empty() {
            None
        } else {
            let mut b = self.builder();
            let mut sets = Vec::with_capacity(updates.len());
            for column in updates {
                let value = value_of(column).ok_or_else(|| {
                    self.invalid(format!("update column '{column}' is not an inserted column"))
                })?;
                sets.push(format!(
                    "{} = {}",
                    b.quote(column),
                    b.bind_column(&i.attributes, column, value)?
                ));
            }
            let mut sql = format!("UPDATE {} SET {}", b.table(&i.table), sets.join(", "));
            self.push_where(&mut sql, &mut b, Some(&key_filter), &i.attributes)?;
            Some(b.finish(sql)?)
        };

        let mut b = self.builder();
        let sql = self.insert_sql(&mut b, i, "INSERT INTO", "")?;
        let insert = b.finish(sql)?;

        tracing::debug!(dialect = %self.dialect.name(), "Using emulated upsert");
        Ok(Plan::UpsertFallback {
            probe,
            update,
            insert,
        })
    }

    // ── UPDATE / DELETE ──────────────────────────────────────────────

    fn update(&self, u: &Update) -> SqlResult<CompiledQuery> {
        if u.values.is_empty() {
            return Err(self.invalid("update sets no columns"));
        }
        let mut b = self.builder();
        b.merge_user_binds(&u.binds)?;

        let mut sets = Vec::with_capacity(u.values.len());
        for (column, value) in &u.values {
            let token = b.bind_column(&u.attributes, column, value)?;
            sets.push(format!("{} = {token}", b.quote_column(column)));
        }
        let (output, returning) = self.returning_clauses(&b, &u.returning, "INSERTED")?;
        let mut sql = format!("UPDATE {} SET {}{output}", b.table(&u.table), sets.join(", "));
        self.push_where(&mut sql, &mut b, u.where_clause.as_ref(), &u.attributes)?;
        sql.push_str(&returning);
        self.push_dml_limit(&mut sql, u.limit, "UPDATE ... LIMIT")?;
        b.finish(sql)
    }

    fn delete(&self, d: &Delete) -> SqlResult<CompiledQuery> {
        let mut b = self.builder();
        b.merge_user_binds(&d.binds)?;

        let (output, returning) = self.returning_clauses(&b, &d.returning, "DELETED")?;
        let mut sql = format!("DELETE FROM {}{output}", b.table(&d.table));
        self.push_where(&mut sql, &mut b, d.where_clause.as_ref(), &d.attributes)?;
        sql.push_str(&returning);
        self.push_dml_limit(&mut sql, d.limit, "DELETE ... LIMIT")?;
        b.finish(sql)
    }

    fn push_dml_limit(&self, sql: &mut String, limit: Option<u64>, what: &str) -> SqlResult<()> {
        if let Some(limit) = limit {
            if !self.caps().update_limit {
                return Err(self.unsupported(what));
            }
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(())
    }
}
