//! Schema statements.
//!
//! DDL cannot carry bind parameters on most engines, so literals in column
//! defaults and enum members are validated and escaped inline.

use sqlweave_core::SqlResult;

use super::descriptor::{
    ColumnDescriptor, CreateIndex, CreateTable, DefaultValue, Deferrable, ForeignKey, TableName,
    Truncate,
};
use super::generator::QueryGenerator;
use super::plan::{CompiledQuery, Plan, TableRebuild};
use crate::dialect::{
    AlterColumnStyle, AutoIncrementStyle, EnumStyle, ExistenceCheck, Feature, RenameTableSyntax,
    SchemaStatement, TruncateStatement,
};
use crate::types::{DataType, IntWidth};

/// A rendered column definition and, where foreign keys cannot be declared
/// inline, the table-level constraint that goes with it.
struct ColumnSql {
    definition: String,
    foreign_key: Option<String>,
}

impl QueryGenerator {
    fn schema_of<'a>(&'a self, table: &'a TableName) -> Option<&'a str> {
        table
            .schema
            .as_deref()
            .or(self.options().default_schema.as_deref())
    }

    fn quote(&self, ident: &str) -> String {
        self.caps().quote_identifier(ident)
    }

    fn table_sql(&self, table: &TableName) -> String {
        self.caps().quote_table(self.schema_of(table), &table.name)
    }

    /// The unqualified name the engine stores for `table`. Without schema
    /// support a non-default schema is folded into it.
    fn stored_name(&self, table: &TableName) -> String {
        let caps = self.caps();
        match self.schema_of(table) {
            Some(schema) if !caps.schemas && caps.default_schema != Some(schema) => {
                format!("{schema}.{}", table.name)
            }
            _ => table.name.clone(),
        }
    }

    fn ddl(&self, sql: String) -> SqlResult<CompiledQuery> {
        self.builder().finish(sql)
    }

    fn ddl_plan(&self, statements: Vec<String>) -> SqlResult<Plan> {
        let mut compiled = statements
            .into_iter()
            .map(|sql| self.ddl(sql))
            .collect::<SqlResult<Vec<_>>>()?;
        if compiled.len() == 1 {
            Ok(Plan::Statement(compiled.remove(0)))
        } else {
            Ok(Plan::Sequence(compiled))
        }
    }

    /// `BEGIN EXECUTE IMMEDIATE '...'` that ignores one error code.
    fn plsql_ignoring(&self, statement: &str, sqlcode: i32) -> String {
        format!(
            "BEGIN EXECUTE IMMEDIATE {}; EXCEPTION WHEN OTHERS THEN IF SQLCODE != {sqlcode} THEN RAISE; END IF; END;",
            self.caps().escape_string(statement)
        )
    }

    /// Runs `statement` only when the catalog lookup for `name` finds
    /// (`exists`) or misses the object.
    fn catalog_guarded(
        &self,
        check: ExistenceCheck,
        catalog: &str,
        name: &str,
        exists: bool,
        statement: &str,
        what: &str,
    ) -> SqlResult<String> {
        let caps = self.caps();
        let lookup = format!("FROM {catalog} = {}", caps.escape_string(name));
        match check {
            ExistenceCheck::IfGuard => Ok(format!(
                "IF {}EXISTS (SELECT 1 {lookup}) EXEC({})",
                if exists { "" } else { "NOT " },
                caps.escape_string(statement)
            )),
            ExistenceCheck::PlSqlBlock => Ok(format!(
                "DECLARE n INTEGER; BEGIN SELECT COUNT(1) INTO n {lookup}; IF n {} 0 THEN EXECUTE IMMEDIATE {}; END IF; END;",
                if exists { "!=" } else { "=" },
                caps.escape_string(statement)
            )),
            ExistenceCheck::Clause | ExistenceCheck::None => Err(self.unsupported(what)),
        }
    }

    // ── Columns ──────────────────────────────────────────────────────

    fn uses_named_enum(&self, column: &ColumnDescriptor) -> bool {
        self.caps().enum_style == EnumStyle::NamedType
            && matches!(column.data_type, DataType::Enum { .. })
    }

    fn enum_type_name(&self, table: &TableName, column: &str) -> String {
        self.caps().quote_table(
            self.schema_of(table),
            &format!("enum_{}_{}", table.name, column),
        )
    }

    fn create_enum_type(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<String> {
        let DataType::Enum { values } = &column.data_type else {
            return Err(self.invalid(format!("column '{}' is not an enum", column.name)));
        };
        if values.is_empty() {
            return Err(self.invalid("ENUM requires at least one value"));
        }
        let members: Vec<String> = values.iter().map(|v| self.caps().escape_string(v)).collect();
        Ok(format!(
            "CREATE TYPE {} AS ENUM ({})",
            self.enum_type_name(table, &column.name),
            members.join(", ")
        ))
    }

    fn column_type_sql(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<String> {
        if column.auto_increment {
            let DataType::Integer { width, .. } = &column.data_type else {
                return Err(self.invalid(format!(
                    "auto-increment column '{}' must be an integer",
                    column.name
                )));
            };
            if self.caps().auto_increment == AutoIncrementStyle::Serial {
                return Ok(match width {
                    IntWidth::Tiny | IntWidth::Small => "SMALLSERIAL",
                    IntWidth::Big => "BIGSERIAL",
                    IntWidth::Medium | IntWidth::Int => "SERIAL",
                }
                .to_string());
            }
        }
        if self.uses_named_enum(column) {
            return Ok(self.enum_type_name(table, &column.name));
        }
        column.data_type.to_sql(self.dialect())
    }

    fn default_sql(&self, column: &ColumnDescriptor) -> SqlResult<Option<String>> {
        let Some(default) = &column.default else {
            return Ok(None);
        };
        let sql = match default {
            DefaultValue::Literal(value) => {
                column.data_type.validate(value, self.dialect())?;
                column
                    .data_type
                    .escape(value, self.dialect(), &self.options().bind_context())?
            }
            DefaultValue::Now => "CURRENT_TIMESTAMP".to_string(),
            DefaultValue::UuidV4 => {
                let function = self
                    .caps()
                    .data_types
                    .uuid_default_fn
                    .ok_or_else(|| self.unsupported("UUID column defaults"))?;
                format!("({function})")
            }
            DefaultValue::Raw(sql) => sql.clone(),
        };
        Ok(Some(sql))
    }

    fn references_sql(&self, fk: &ForeignKey) -> SqlResult<String> {
        let caps = self.caps();
        let mut sql = format!(
            "REFERENCES {} ({})",
            self.table_sql(&fk.table),
            self.quote(&fk.column)
        );
        if let Some(action) = fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = fk.on_update {
            caps.require(Feature::ForeignKeyOnUpdate, "ON UPDATE referential actions")?;
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        if let Some(mode) = fk.deferrable {
            caps.require(Feature::DeferrableConstraints, "deferrable constraints")?;
            sql.push_str(match mode {
                Deferrable::InitiallyDeferred => " DEFERRABLE INITIALLY DEFERRED",
                Deferrable::InitiallyImmediate => " DEFERRABLE INITIALLY IMMEDIATE",
            });
        }
        Ok(sql)
    }

    fn foreign_key_constraint(&self, column: &str, fk: &ForeignKey) -> SqlResult<String> {
        Ok(format!(
            "FOREIGN KEY ({}) {}",
            self.quote(column),
            self.references_sql(fk)?
        ))
    }

    /// Renders one column. `inline_pk` places `PRIMARY KEY` on the column.
    fn column_sql(
        &self,
        table: &TableName,
        column: &ColumnDescriptor,
        inline_pk: bool,
    ) -> SqlResult<ColumnSql> {
        let caps = self.caps();
        let name = self.quote(&column.name);
        let mut sql = format!("{name} {}", self.column_type_sql(table, column)?);

        if column.auto_increment {
            if let AutoIncrementStyle::Identity(clause) = caps.auto_increment {
                sql.push(' ');
                sql.push_str(clause);
            }
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_sql(column)? {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        if column.unique && !column.primary_key {
            sql.push_str(" UNIQUE");
        }
        if inline_pk {
            sql.push_str(" PRIMARY KEY");
        }
        if column.auto_increment {
            if let AutoIncrementStyle::Keyword(keyword) = caps.auto_increment {
                sql.push(' ');
                sql.push_str(keyword);
            }
        }
        if let Some(check) = column.data_type.check_constraint(&name, self.dialect()) {
            sql.push_str(&format!(" CHECK ({check})"));
        }

        let mut foreign_key = None;
        if let Some(fk) = &column.references {
            if caps.inline_references {
                sql.push(' ');
                sql.push_str(&self.references_sql(fk)?);
            } else {
                foreign_key = Some(self.foreign_key_constraint(&column.name, fk)?);
            }
        }
        Ok(ColumnSql {
            definition: sql,
            foreign_key,
        })
    }

    // ── Tables ───────────────────────────────────────────────────────

    fn create_table_sql(&self, t: &CreateTable) -> SqlResult<String> {
        if t.columns.is_empty() {
            return Err(self.invalid(format!("table '{}' has no columns", t.table.name)));
        }
        let primary_keys: Vec<&ColumnDescriptor> =
            t.columns.iter().filter(|c| c.primary_key).collect();
        let inline_pk = primary_keys.len() == 1;

        let mut parts = Vec::with_capacity(t.columns.len() + 1);
        let mut constraints = Vec::new();
        for column in &t.columns {
            let rendered = self.column_sql(&t.table, column, inline_pk && column.primary_key)?;
            parts.push(rendered.definition);
            constraints.extend(rendered.foreign_key);
        }
        if primary_keys.len() > 1 {
            let cols: Vec<String> = primary_keys.iter().map(|c| self.quote(&c.name)).collect();
            parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }
        for group in &t.unique_together {
            if let Some(missing) = group
                .iter()
                .find(|name| !t.columns.iter().any(|c| &c.name == *name))
            {
                return Err(self.invalid(format!(
                    "unique constraint names unknown column '{missing}'"
                )));
            }
            let cols: Vec<String> = group.iter().map(|c| self.quote(c)).collect();
            parts.push(format!("UNIQUE ({})", cols.join(", ")));
        }
        parts.extend(constraints);

        let table = self.table_sql(&t.table);
        let create = format!("CREATE TABLE {table} ({})", parts.join(", "));
        if !t.if_not_exists {
            return Ok(create);
        }
        match self.caps().existence_checks.create_table {
            ExistenceCheck::Clause => Ok(format!(
                "CREATE TABLE IF NOT EXISTS {table} ({})",
                parts.join(", ")
            )),
            ExistenceCheck::IfGuard => Ok(format!(
                "IF OBJECT_ID({}, 'U') IS NULL {create}",
                self.caps().escape_string(&table)
            )),
            // ORA-00955: name is already used by an existing object
            ExistenceCheck::PlSqlBlock => Ok(self.plsql_ignoring(&create, -955)),
            ExistenceCheck::None => Err(self.unsupported("CREATE TABLE IF NOT EXISTS")),
        }
    }

    pub(super) fn create_table(&self, t: &CreateTable) -> SqlResult<Plan> {
        let mut statements = Vec::new();
        for column in t.columns.iter().filter(|c| self.uses_named_enum(c)) {
            statements.push(self.create_enum_type(&t.table, column)?);
        }
        statements.push(self.create_table_sql(t)?);
        self.ddl_plan(statements)
    }

    pub(super) fn drop_table(&self, table: &TableName, if_exists: bool, cascade: bool) -> SqlResult<Plan> {
        let table_sql = self.table_sql(table);
        let mut target = table_sql.clone();
        if cascade {
            let keyword = self
                .caps()
                .drop_table_cascade
                .ok_or_else(|| self.unsupported("DROP TABLE ... CASCADE"))?;
            target.push(' ');
            target.push_str(keyword);
        }
        let drop = format!("DROP TABLE {target}");
        let sql = if if_exists {
            match self.caps().existence_checks.drop_table {
                ExistenceCheck::Clause => format!("DROP TABLE IF EXISTS {target}"),
                ExistenceCheck::IfGuard => format!(
                    "IF OBJECT_ID({}, 'U') IS NOT NULL {drop}",
                    self.caps().escape_string(&table_sql)
                ),
                // ORA-00942: table or view does not exist
                ExistenceCheck::PlSqlBlock => self.plsql_ignoring(&drop, -942),
                ExistenceCheck::None => return Err(self.unsupported("DROP TABLE IF EXISTS")),
            }
        } else {
            drop
        };
        self.ddl_plan(vec![sql])
    }

    /// The `'schema.name'` literal `sp_rename` expects.
    fn sp_rename_target(&self, schema: Option<&str>, parts: &[&str]) -> String {
        let mut path: Vec<&str> = schema.into_iter().collect();
        path.extend_from_slice(parts);
        self.caps().escape_string(&path.join("."))
    }

    pub(super) fn rename_table(&self, from: &TableName, to: &TableName) -> SqlResult<Plan> {
        let caps = self.caps();
        let support = caps.rename_table;
        let from_schema = self.schema_of(from);
        let to_schema = self.schema_of(to);
        let source = self.table_sql(from);
        let renames = from.name != to.name;

        // Without schemas the schema is part of the folded table name.
        if from_schema == to_schema || !caps.schemas {
            let target = if support.qualified_target {
                self.table_sql(to)
            } else {
                self.quote(&self.stored_name(to))
            };
            let sql = match support.syntax {
                RenameTableSyntax::AlterTableRenameTo => {
                    format!("ALTER TABLE {source} RENAME TO {target}")
                }
                RenameTableSyntax::RenameTable => format!("RENAME TABLE {source} TO {target}"),
                RenameTableSyntax::SpRename => format!(
                    "EXEC sp_rename {}, {}",
                    self.sp_rename_target(from_schema, &[&from.name]),
                    caps.escape_string(&to.name)
                ),
            };
            return self.ddl_plan(vec![sql]);
        }

        caps.require(
            Feature::RenameTableChangeSchema,
            "moving a table to another schema",
        )?;
        if renames {
            caps.require(
                Feature::RenameTableChangeSchemaAndName,
                "moving and renaming a table in one operation",
            )?;
        }
        let target_schema = to_schema
            .or(caps.default_schema)
            .ok_or_else(|| self.invalid("the rename target needs a schema"))?;

        if support.qualified_target {
            let target = caps.quote_qualified(Some(target_schema), &to.name);
            let sql = match support.syntax {
                RenameTableSyntax::RenameTable => format!("RENAME TABLE {source} TO {target}"),
                _ => format!("ALTER TABLE {source} RENAME TO {target}"),
            };
            return self.ddl_plan(vec![sql]);
        }

        let moved = caps.quote_qualified(Some(target_schema), &from.name);
        let mut statements = Vec::new();
        match support.syntax {
            RenameTableSyntax::SpRename => {
                statements.push(format!(
                    "ALTER SCHEMA {} TRANSFER {source}",
                    self.quote(target_schema)
                ));
                if renames {
                    statements.push(format!(
                        "EXEC sp_rename {}, {}",
                        self.sp_rename_target(Some(target_schema), &[&from.name]),
                        caps.escape_string(&to.name)
                    ));
                }
            }
            _ => {
                statements.push(format!(
                    "ALTER TABLE {source} SET SCHEMA {}",
                    self.quote(target_schema)
                ));
                if renames {
                    statements.push(format!(
                        "ALTER TABLE {moved} RENAME TO {}",
                        self.quote(&to.name)
                    ));
                }
            }
        }
        self.ddl_plan(statements)
    }

    pub(super) fn truncate(&self, t: &Truncate) -> SqlResult<Plan> {
        let caps = self.caps();
        if t.cascade {
            caps.require(Feature::TruncateCascade, "TRUNCATE ... CASCADE")?;
        }
        if t.restart_identity {
            caps.require(Feature::TruncateRestartIdentity, "TRUNCATE ... RESTART IDENTITY")?;
        }
        let table = self.table_sql(&t.table);
        let mut statements = Vec::new();
        match caps.truncate.statement {
            TruncateStatement::DeleteFrom => {
                statements.push(format!("DELETE FROM {table}"));
                if t.restart_identity {
                    statements.push(format!(
                        "DELETE FROM sqlite_sequence WHERE name = {}",
                        caps.escape_string(&self.stored_name(&t.table))
                    ));
                }
            }
            statement => {
                let mut sql = match statement {
                    TruncateStatement::Truncate => format!("TRUNCATE {table}"),
                    TruncateStatement::TruncateTableImmediate => {
                        format!("TRUNCATE TABLE {table} IMMEDIATE")
                    }
                    _ => format!("TRUNCATE TABLE {table}"),
                };
                if t.restart_identity {
                    sql.push_str(" RESTART IDENTITY");
                }
                if t.cascade {
                    sql.push_str(" CASCADE");
                }
                statements.push(sql);
            }
        }
        self.ddl_plan(statements)
    }

    // ── Schemas ──────────────────────────────────────────────────────

    /// The object keyword behind a schema, and the catalog column that lists
    /// existing ones.
    fn schema_object(&self) -> (&'static str, &'static str) {
        match self.caps().schema_statement {
            SchemaStatement::Schema => ("SCHEMA", "information_schema.schemata WHERE schema_name"),
            SchemaStatement::User => ("USER", "all_users WHERE username"),
        }
    }

    pub(super) fn create_schema(&self, name: &str, if_not_exists: bool) -> SqlResult<Plan> {
        let caps = self.caps();
        caps.require(Feature::Schemas, "schemas")?;
        let (object, catalog) = self.schema_object();
        let suffix = match caps.schema_statement {
            SchemaStatement::Schema => "",
            SchemaStatement::User => " NO AUTHENTICATION DEFAULT TABLESPACE USERS QUOTA UNLIMITED ON USERS",
        };
        let quoted = self.quote(name);
        let create = format!("CREATE {object} {quoted}{suffix}");
        let sql = match caps.existence_checks.create_schema {
            _ if !if_not_exists => create,
            ExistenceCheck::Clause => format!("CREATE {object} IF NOT EXISTS {quoted}{suffix}"),
            check => self.catalog_guarded(
                check,
                catalog,
                name,
                false,
                &create,
                "CREATE SCHEMA IF NOT EXISTS",
            )?,
        };
        self.ddl_plan(vec![sql])
    }

    pub(super) fn drop_schema(&self, name: &str, if_exists: bool, cascade: bool) -> SqlResult<Plan> {
        let caps = self.caps();
        caps.require(Feature::Schemas, "schemas")?;
        let (object, catalog) = self.schema_object();
        let mut target = self.quote(name);
        if cascade {
            caps.require(Feature::DropTableCascade, "DROP SCHEMA ... CASCADE")?;
            target.push_str(" CASCADE");
        }
        let drop = format!("DROP {object} {target}");
        let sql = match caps.existence_checks.drop_schema {
            _ if !if_exists => drop,
            ExistenceCheck::Clause => format!("DROP {object} IF EXISTS {target}"),
            check => self.catalog_guarded(check, catalog, name, true, &drop, "DROP SCHEMA IF EXISTS")?,
        };
        self.ddl_plan(vec![sql])
    }

    // ── Columns ──────────────────────────────────────────────────────

    pub(super) fn add_column(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<Plan> {
        let mut statements = Vec::new();
        if self.uses_named_enum(column) {
            statements.push(self.create_enum_type(table, column)?);
        }
        let rendered = self.column_sql(table, column, column.primary_key)?;
        let mut sql = format!(
            "ALTER TABLE {} {} {}",
            self.table_sql(table),
            self.caps().add_column_keyword,
            rendered.definition
        );
        if let Some(fk) = rendered.foreign_key {
            sql.push_str(&format!(", ADD {fk}"));
        }
        statements.push(sql);
        self.ddl_plan(statements)
    }

    pub(super) fn drop_column(&self, table: &TableName, column: &str) -> SqlResult<Plan> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.table_sql(table),
            self.quote(column)
        );
        self.ddl_plan(vec![sql])
    }

    pub(super) fn rename_column(&self, table: &TableName, from: &str, to: &str) -> SqlResult<Plan> {
        let sql = if self.caps().rename_table.syntax == RenameTableSyntax::SpRename {
            format!(
                "EXEC sp_rename {}, {}, 'COLUMN'",
                self.sp_rename_target(self.schema_of(table), &[&table.name, from]),
                self.caps().escape_string(to)
            )
        } else {
            format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.table_sql(table),
                self.quote(from),
                self.quote(to)
            )
        };
        self.ddl_plan(vec![sql])
    }

    /// Changes a column definition using the dialect's alter style.
    pub(super) fn alter_column(
        &self,
        table: &TableName,
        column: &ColumnDescriptor,
        current_columns: &[ColumnDescriptor],
    ) -> SqlResult<Plan> {
        let style = self.caps().alter_column;
        if column.auto_increment
            && !matches!(style, AlterColumnStyle::Change | AlterColumnStyle::RebuildTable)
        {
            return Err(self.unsupported("changing a column to auto-increment"));
        }
        match style {
            AlterColumnStyle::AlterColumnClauses => self.alter_column_clauses(table, column),
            AlterColumnStyle::Change => self.alter_column_change(table, column),
            AlterColumnStyle::AlterColumnInline => self.alter_column_inline(table, column),
            AlterColumnStyle::SetDataType => self.alter_column_set_data_type(table, column),
            AlterColumnStyle::Modify => self.alter_column_modify(table, column),
            AlterColumnStyle::RebuildTable => self.alter_column_rebuild(table, column, current_columns),
        }
    }

    fn alter_column_clauses(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<Plan> {
        let name = self.quote(&column.name);
        let mut statements = Vec::new();
        let mut clauses = Vec::new();

        let type_sql = self.column_type_sql(table, column)?;
        if self.uses_named_enum(column) {
            statements.push(self.create_enum_type(table, column)?);
            clauses.push(format!(
                "ALTER COLUMN {name} TYPE {type_sql} USING ({name}::text::{type_sql})"
            ));
        } else {
            clauses.push(format!("ALTER COLUMN {name} TYPE {type_sql}"));
        }
        clauses.push(if column.nullable {
            format!("ALTER COLUMN {name} DROP NOT NULL")
        } else {
            format!("ALTER COLUMN {name} SET NOT NULL")
        });
        clauses.push(match self.default_sql(column)? {
            Some(default) => format!("ALTER COLUMN {name} SET DEFAULT {default}"),
            None => format!("ALTER COLUMN {name} DROP DEFAULT"),
        });
        if column.unique && !column.primary_key {
            clauses.push(format!("ADD UNIQUE ({name})"));
        }
        if let Some(check) = column.data_type.check_constraint(&name, self.dialect()) {
            clauses.push(format!("ADD CHECK ({check})"));
        }
        if let Some(fk) = &column.references {
            clauses.push(format!("ADD {}", self.foreign_key_constraint(&column.name, fk)?));
        }
        statements.push(format!(
            "ALTER TABLE {} {}",
            self.table_sql(table),
            clauses.join(", ")
        ));
        self.ddl_plan(statements)
    }

    fn alter_column_change(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<Plan> {
        let rendered = self.column_sql(table, column, false)?;
        let mut sql = format!(
            "ALTER TABLE {} CHANGE {} {}",
            self.table_sql(table),
            self.quote(&column.name),
            rendered.definition
        );
        if let Some(fk) = rendered.foreign_key {
            sql.push_str(&format!(", ADD {fk}"));
        }
        self.ddl_plan(vec![sql])
    }

    /// Statements for the parts of a column that inline alter styles cannot
    /// express in the type change itself.
    fn alter_column_constraints(
        &self,
        table_sql: &str,
        column: &ColumnDescriptor,
        statements: &mut Vec<String>,
    ) -> SqlResult<()> {
        let name = self.quote(&column.name);
        if column.unique && !column.primary_key {
            statements.push(format!("ALTER TABLE {table_sql} ADD UNIQUE ({name})"));
        }
        if let Some(check) = column.data_type.check_constraint(&name, self.dialect()) {
            statements.push(format!("ALTER TABLE {table_sql} ADD CHECK ({check})"));
        }
        if let Some(fk) = &column.references {
            statements.push(format!(
                "ALTER TABLE {table_sql} ADD {}",
                self.foreign_key_constraint(&column.name, fk)?
            ));
        }
        Ok(())
    }

    fn alter_column_inline(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<Plan> {
        let table_sql = self.table_sql(table);
        let name = self.quote(&column.name);
        let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
        let mut statements = vec![format!(
            "ALTER TABLE {table_sql} ALTER COLUMN {name} {} {nullability}",
            self.column_type_sql(table, column)?
        )];
        if let Some(default) = self.default_sql(column)? {
            statements.push(format!("ALTER TABLE {table_sql} ADD DEFAULT {default} FOR {name}"));
        }
        self.alter_column_constraints(&table_sql, column, &mut statements)?;
        self.ddl_plan(statements)
    }

    fn alter_column_set_data_type(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<Plan> {
        let table_sql = self.table_sql(table);
        let name = self.quote(&column.name);
        let alter = format!("ALTER TABLE {table_sql} ALTER COLUMN {name}");
        let mut statements = vec![
            format!("{alter} SET DATA TYPE {}", self.column_type_sql(table, column)?),
            if column.nullable {
                format!("{alter} DROP NOT NULL")
            } else {
                format!("{alter} SET NOT NULL")
            },
            match self.default_sql(column)? {
                Some(default) => format!("{alter} SET DEFAULT {default}"),
                None => format!("{alter} DROP DEFAULT"),
            },
        ];
        self.alter_column_constraints(&table_sql, column, &mut statements)?;
        self.ddl_plan(statements)
    }

    fn alter_column_modify(&self, table: &TableName, column: &ColumnDescriptor) -> SqlResult<Plan> {
        let table_sql = self.table_sql(table);
        let mut definition = format!(
            "{} {}",
            self.quote(&column.name),
            self.column_type_sql(table, column)?
        );
        if let Some(default) = self.default_sql(column)? {
            definition.push_str(&format!(" DEFAULT {default}"));
        }
        // Re-declaring NULL on a nullable column is an error on these engines.
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        let mut statements = vec![format!("ALTER TABLE {table_sql} MODIFY ({definition})")];
        self.alter_column_constraints(&table_sql, column, &mut statements)?;
        self.ddl_plan(statements)
    }

    fn alter_column_rebuild(
        &self,
        table: &TableName,
        column: &ColumnDescriptor,
        current_columns: &[ColumnDescriptor],
    ) -> SqlResult<Plan> {
        if current_columns.is_empty() {
            return Err(self.invalid(format!(
                "changing a column of '{}' requires the table's current columns",
                table.name
            )));
        }
        if !current_columns.iter().any(|c| c.name == column.name) {
            return Err(self.invalid(format!(
                "column '{}' is not part of '{}'",
                column.name, table.name
            )));
        }
        let columns: Vec<ColumnDescriptor> = current_columns
            .iter()
            .map(|c| if c.name == column.name { column.clone() } else { c.clone() })
            .collect();
        let backup = TableName {
            schema: table.schema.clone(),
            name: format!("{}_backup", table.name),
        };

        let create = CreateTable {
            table: backup.clone(),
            columns,
            unique_together: Vec::new(),
            if_not_exists: false,
        };
        let names: Vec<String> = create.columns.iter().map(|c| self.quote(&c.name)).collect();
        let names = names.join(", ");

        let create_backup = self.ddl(self.create_table_sql(&create)?)?;
        let copy_rows = self.ddl(format!(
            "INSERT INTO {} ({names}) SELECT {names} FROM {}",
            self.table_sql(&backup),
            self.table_sql(table)
        ))?;
        let drop_original = self.ddl(format!("DROP TABLE {}", self.table_sql(table)))?;
        let rename_backup = self.ddl(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table_sql(&backup),
            self.quote(&self.stored_name(table))
        ))?;

        Ok(Plan::TableRebuild(TableRebuild::new(
            self.stored_name(table),
            create_backup,
            copy_rows,
            drop_original,
            rename_backup,
        )))
    }

    // ── Indexes ──────────────────────────────────────────────────────

    pub(super) fn create_index(&self, i: &CreateIndex) -> SqlResult<Plan> {
        let caps = self.caps();
        if i.columns.is_empty() {
            return Err(self.invalid("an index needs at least one column"));
        }
        let mut sql = String::from("CREATE ");
        if i.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if i.concurrently {
            caps.require(Feature::IndexConcurrently, "CREATE INDEX CONCURRENTLY")?;
            sql.push_str("CONCURRENTLY ");
        }
        if i.if_not_exists {
            if !caps.indexes.if_not_exists {
                return Err(self.unsupported("CREATE INDEX IF NOT EXISTS"));
            }
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&format!(
            "{} ON {}",
            self.quote(&i.index_name()),
            self.table_sql(&i.table)
        ));
        if let Some(method) = &i.using {
            caps.require(Feature::IndexUsing, "index methods")?;
            if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(self.invalid(format!("'{method}' is not a valid index method")));
            }
            sql.push_str(&format!(" USING {method}"));
        }
        let columns: Vec<String> = i.columns.iter().map(|c| self.quote(c)).collect();
        sql.push_str(&format!(" ({})", columns.join(", ")));
        if let Some(predicate) = &i.where_clause {
            caps.require(Feature::IndexWhere, "partial indexes")?;
            sql.push_str(&format!(" WHERE {predicate}"));
        }
        self.ddl_plan(vec![sql])
    }

    pub(super) fn drop_index(
        &self,
        table: &TableName,
        name: &str,
        if_exists: bool,
        concurrently: bool,
    ) -> SqlResult<Plan> {
        let caps = self.caps();
        let mut sql = String::from("DROP INDEX ");
        if concurrently {
            caps.require(Feature::IndexConcurrently, "DROP INDEX CONCURRENTLY")?;
            sql.push_str("CONCURRENTLY ");
        }
        if if_exists {
            if !caps.indexes.if_not_exists {
                return Err(self.unsupported("DROP INDEX IF EXISTS"));
            }
            sql.push_str("IF EXISTS ");
        }
        if caps.indexes.drop_on_table {
            sql.push_str(&format!("{} ON {}", self.quote(name), self.table_sql(table)));
        } else {
            sql.push_str(&caps.quote_table(self.schema_of(table), name));
        }
        self.ddl_plan(vec![sql])
    }
}
