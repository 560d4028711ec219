//! Structured query and schema descriptors.
//!
//! A [`QueryDescriptor`] is what callers hand to the
//! [`QueryGenerator`](super::QueryGenerator). Descriptors are plain data:
//! built per call, never mutated by generation, and discarded once the SQL
//! text exists. Builders are provided for the common cases.

use crate::types::DataType;
use crate::value::Value;

use super::where_clause::Q;

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

impl From<&str> for TableName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TableName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A column default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A literal, escaped into the DDL.
    Literal(Value),
    /// The current timestamp.
    Now,
    /// A random UUID from the dialect's generator function.
    UuidV4,
    /// SQL text used verbatim.
    Raw(String),
}

/// Referential actions for foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// When a deferrable constraint is checked by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferrable {
    InitiallyDeferred,
    InitiallyImmediate,
}

/// A column-level foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub table: TableName,
    pub column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub deferrable: Option<Deferrable>,
}

impl ForeignKey {
    pub fn new(table: impl Into<TableName>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: None,
            on_update: None,
            deferrable: None,
        }
    }

    #[must_use]
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    #[must_use]
    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    #[must_use]
    pub const fn deferrable(mut self, mode: Deferrable) -> Self {
        self.deferrable = Some(mode);
        self
    }
}

/// A column declaration, used both for DDL and to type DML values.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub references: Option<ForeignKey>,
}

impl ColumnDescriptor {
    /// A nullable column with no constraints.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
            references: None,
        }
    }

    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as the primary key. Primary keys are never null.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn references(mut self, fk: ForeignKey) -> Self {
        self.references = Some(fk);
        self
    }
}

/// Looks up the declared type of `column`, if any.
pub(crate) fn column_type<'a>(attributes: &'a [ColumnDescriptor], column: &str) -> Option<&'a DataType> {
    let bare = column.rsplit('.').next().unwrap_or(column);
    attributes.iter().find(|c| c.name == bare).map(|c| &c.data_type)
}

// ── DML ────────────────────────────────────────────────────────────────

/// A column ordering direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
    /// `Some(true)` for `NULLS FIRST`, `Some(false)` for `NULLS LAST`.
    pub nulls_first: Option<bool>,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
            nulls_first: None,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
            nulls_first: None,
        }
    }

    #[must_use]
    pub const fn nulls_first(mut self) -> Self {
        self.nulls_first = Some(true);
        self
    }

    #[must_use]
    pub const fn nulls_last(mut self) -> Self {
        self.nulls_first = Some(false);
        self
    }
}

/// A column to select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectColumn {
    /// A column name, optionally `table.column`.
    Column(String),
    /// A column with an alias.
    Aliased(String, String),
    /// A SQL expression used verbatim. It may reference caller binds as `$name`.
    Raw(String),
    /// All columns (`*`).
    Star,
}

/// Row locking for `SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    Update,
    Share,
}

/// A `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: TableName,
    pub columns: Vec<SelectColumn>,
    pub distinct: bool,
    pub where_clause: Option<Q>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<RowLock>,
    /// Caller binds referenced from raw fragments.
    pub binds: Vec<(String, Value)>,
    /// Declared column types, used to convert filter values.
    pub attributes: Vec<ColumnDescriptor>,
}

impl Select {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            distinct: false,
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
            binds: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(|c| SelectColumn::Column(c.into())).collect();
        self
    }

    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Adds a filter, AND-ed with any existing one.
    #[must_use]
    pub fn filter(mut self, q: Q) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing & q,
            None => q,
        });
        self
    }

    #[must_use]
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub const fn lock(mut self, lock: RowLock) -> Self {
        self.lock = Some(lock);
        self
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.binds.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: Vec<ColumnDescriptor>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// What an upsert does when the row already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    DoNothing,
    /// Updates the listed columns, or every inserted non-key column when
    /// the list is empty.
    Update(Vec<String>),
}

/// Conflict handling for an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnConflict {
    /// Columns of the unique key that identifies an existing row.
    pub keys: Vec<String>,
    pub action: ConflictAction,
}

impl OnConflict {
    pub fn update<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            action: ConflictAction::Update(Vec::new()),
        }
    }

    pub fn do_nothing<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            action: ConflictAction::DoNothing,
        }
    }
}

/// An `INSERT` of one or more rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: TableName,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub returning: Vec<String>,
    pub on_conflict: Option<OnConflict>,
    /// Silently skip rows that violate a unique constraint.
    pub ignore_duplicates: bool,
    pub attributes: Vec<ColumnDescriptor>,
}

impl Insert {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            returning: Vec::new(),
            on_conflict: None,
            ignore_duplicates: false,
            attributes: Vec::new(),
        }
    }

    /// Adds a column and its value in the first row.
    #[must_use]
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push(column.into());
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
        self.rows[0].push(value.into());
        self
    }

    /// Appends a row, in column order.
    #[must_use]
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    #[must_use]
    pub const fn ignore_duplicates(mut self) -> Self {
        self.ignore_duplicates = true;
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: Vec<ColumnDescriptor>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// An `UPDATE`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: TableName,
    pub values: Vec<(String, Value)>,
    pub where_clause: Option<Q>,
    pub returning: Vec<String>,
    pub limit: Option<u64>,
    pub binds: Vec<(String, Value)>,
    pub attributes: Vec<ColumnDescriptor>,
}

impl Update {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            where_clause: None,
            returning: Vec::new(),
            limit: None,
            binds: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn filter(mut self, q: Q) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing & q,
            None => q,
        });
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.binds.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: Vec<ColumnDescriptor>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A `DELETE`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: TableName,
    pub where_clause: Option<Q>,
    pub returning: Vec<String>,
    pub limit: Option<u64>,
    pub binds: Vec<(String, Value)>,
    pub attributes: Vec<ColumnDescriptor>,
}

impl Delete {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
            returning: Vec::new(),
            limit: None,
            binds: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, q: Q) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing & q,
            None => q,
        });
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: Vec<ColumnDescriptor>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Empties a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncate {
    pub table: TableName,
    pub cascade: bool,
    pub restart_identity: bool,
}

impl Truncate {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            cascade: false,
            restart_identity: false,
        }
    }

    #[must_use]
    pub const fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    #[must_use]
    pub const fn restart_identity(mut self) -> Self {
        self.restart_identity = true;
        self
    }
}

// ── DDL ────────────────────────────────────────────────────────────────

/// `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub table: TableName,
    pub columns: Vec<ColumnDescriptor>,
    /// Multi-column unique constraints.
    pub unique_together: Vec<Vec<String>>,
    pub if_not_exists: bool,
}

impl CreateTable {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            unique_together: Vec::new(),
            if_not_exists: false,
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn unique_together<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together.push(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }
}

/// `CREATE INDEX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndex {
    pub table: TableName,
    /// Defaults to `<table>_<columns>_idx`.
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
    pub concurrently: bool,
    /// Index method (`btree`, `gin`, ...).
    pub using: Option<String>,
    /// Partial index predicate, used verbatim.
    pub where_clause: Option<String>,
    pub if_not_exists: bool,
}

impl CreateIndex {
    pub fn new<I, S>(table: impl Into<TableName>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            concurrently: false,
            using: None,
            where_clause: None,
            if_not_exists: false,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn concurrently(mut self) -> Self {
        self.concurrently = true;
        self
    }

    #[must_use]
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.using = Some(method.into());
        self
    }

    #[must_use]
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    #[must_use]
    pub const fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// The explicit name, or the derived default.
    pub fn index_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            format!("{}_{}_idx", self.table.name, self.columns.join("_"))
        })
    }
}

/// Every statement the generator understands.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDescriptor {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Truncate(Truncate),
    CreateSchema {
        name: String,
        if_not_exists: bool,
    },
    DropSchema {
        name: String,
        if_exists: bool,
        cascade: bool,
    },
    CreateTable(CreateTable),
    DropTable {
        table: TableName,
        if_exists: bool,
        cascade: bool,
    },
    RenameTable {
        from: TableName,
        to: TableName,
    },
    AddColumn {
        table: TableName,
        column: ColumnDescriptor,
    },
    DropColumn {
        table: TableName,
        column: String,
    },
    RenameColumn {
        table: TableName,
        from: String,
        to: String,
    },
    /// Changes a column to `column`. `current_columns` is the table's full
    /// definition before the change; it is required by dialects that rebuild
    /// the table.
    AlterColumn {
        table: TableName,
        column: ColumnDescriptor,
        current_columns: Vec<ColumnDescriptor>,
    },
    CreateIndex(CreateIndex),
    DropIndex {
        table: TableName,
        name: String,
        if_exists: bool,
        concurrently: bool,
    },
}

impl QueryDescriptor {
    /// A short operation name for logs and spans.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Truncate(_) => "truncate",
            Self::CreateSchema { .. } => "create_schema",
            Self::DropSchema { .. } => "drop_schema",
            Self::CreateTable(_) => "create_table",
            Self::DropTable { .. } => "drop_table",
            Self::RenameTable { .. } => "rename_table",
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::AlterColumn { .. } => "alter_column",
            Self::CreateIndex(_) => "create_index",
            Self::DropIndex { .. } => "drop_index",
        }
    }
}

impl From<Select> for QueryDescriptor {
    fn from(s: Select) -> Self {
        Self::Select(s)
    }
}

impl From<Insert> for QueryDescriptor {
    fn from(i: Insert) -> Self {
        Self::Insert(i)
    }
}

impl From<Update> for QueryDescriptor {
    fn from(u: Update) -> Self {
        Self::Update(u)
    }
}

impl From<Delete> for QueryDescriptor {
    fn from(d: Delete) -> Self {
        Self::Delete(d)
    }
}

impl From<Truncate> for QueryDescriptor {
    fn from(t: Truncate) -> Self {
        Self::Truncate(t)
    }
}

impl From<CreateTable> for QueryDescriptor {
    fn from(t: CreateTable) -> Self {
        Self::CreateTable(t)
    }
}

impl From<CreateIndex> for QueryDescriptor {
    fn from(i: CreateIndex) -> Self {
        Self::CreateIndex(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::where_clause::Lookup;

    #[test]
    fn test_insert_builder_fills_first_row() {
        let insert = Insert::new("users").value("id", 1).value("name", "a");
        assert_eq!(insert.columns, vec!["id", "name"]);
        assert_eq!(insert.rows, vec![vec![Value::Int(1), Value::from("a")]]);
    }

    #[test]
    fn test_select_filters_are_anded() {
        let select = Select::new("t")
            .filter(Q::filter("a", Lookup::Exact(Value::from(1))))
            .filter(Q::filter("b", Lookup::Exact(Value::from(2))));
        match select.where_clause {
            Some(Q::And(children)) => assert_eq!(children.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_primary_key_implies_not_null() {
        let col = ColumnDescriptor::new("id", DataType::integer()).primary_key();
        assert!(!col.nullable);
    }

    #[test]
    fn test_default_index_name() {
        let idx = CreateIndex::new("users", ["email", "tenant"]);
        assert_eq!(idx.index_name(), "users_email_tenant_idx");
        assert_eq!(idx.name("custom").index_name(), "custom");
    }

    #[test]
    fn test_column_type_lookup_ignores_table_prefix() {
        let attrs = vec![ColumnDescriptor::new("age", DataType::integer())];
        assert_eq!(column_type(&attrs, "users.age"), Some(&DataType::integer()));
        assert_eq!(column_type(&attrs, "missing"), None);
    }
}
