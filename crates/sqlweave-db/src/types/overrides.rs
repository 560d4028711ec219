//! Per-dialect data type overrides.
//!
//! Every [`DataType`] method consults the dialect's override table before
//! falling back to the generic behavior, so families differ only in the
//! entries registered here. A user-supplied table passed to
//! [`DialectRegistry::register`](crate::dialect::DialectRegistry::register)
//! is merged over the family defaults method by method.

use std::collections::BTreeMap;

use sqlweave_core::{SqlError, SqlResult};

use super::{format_datetime, to_datetime, BindContext, DataType, FloatKind};
use crate::dialect::{DialectDescriptor, DialectFamily};
use crate::value::Value;

/// Identifies a [`DataType`] variant in an override table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKey {
    Integer,
    Float,
    Decimal,
    Boolean,
    String,
    Char,
    Text,
    Date,
    DateOnly,
    Time,
    Blob,
    Json,
    Jsonb,
    Enum,
    Uuid,
    Geometry,
    Array,
    Range,
    Hstore,
    Virtual,
}

pub type ToSqlFn = fn(&DataType, &DialectDescriptor) -> SqlResult<String>;
pub type ValidateFn = fn(&DataType, &Value, &DialectDescriptor) -> SqlResult<()>;
pub type BindFn = fn(&DataType, &Value, &DialectDescriptor, &BindContext) -> SqlResult<Value>;
pub type ParseFn = fn(&DataType, &Value, &DialectDescriptor) -> SqlResult<Value>;
pub type EscapeFn = fn(&DataType, &Value, &DialectDescriptor, &BindContext) -> SqlResult<String>;
pub type PlaceholderFn = fn(&DataType, &str, &DialectDescriptor) -> String;
/// Produces a column CHECK expression given the quoted column name.
pub type CheckFn = fn(&DataType, &str, &DialectDescriptor) -> Option<String>;

/// Replacement methods for one data type. `None` keeps the generic method.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeOverride {
    pub to_sql: Option<ToSqlFn>,
    pub validate: Option<ValidateFn>,
    pub bind: Option<BindFn>,
    pub parse: Option<ParseFn>,
    pub escape: Option<EscapeFn>,
    pub placeholder: Option<PlaceholderFn>,
    pub check: Option<CheckFn>,
}

impl TypeOverride {
    /// Fills every method this override leaves unset from `base`.
    #[must_use]
    pub fn or(self, base: Self) -> Self {
        Self {
            to_sql: self.to_sql.or(base.to_sql),
            validate: self.validate.or(base.validate),
            bind: self.bind.or(base.bind),
            parse: self.parse.or(base.parse),
            escape: self.escape.or(base.escape),
            placeholder: self.placeholder.or(base.placeholder),
            check: self.check.or(base.check),
        }
    }
}

/// The override table of one dialect.
#[derive(Debug, Clone, Default)]
pub struct TypeOverrides(BTreeMap<TypeKey, TypeOverride>);

impl TypeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the override for `key`.
    #[must_use]
    pub fn with(mut self, key: TypeKey, entry: TypeOverride) -> Self {
        self.0.insert(key, entry);
        self
    }

    pub fn get(&self, key: TypeKey) -> Option<&TypeOverride> {
        self.0.get(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges `user` over this table. For each type the user's methods win
    /// and the rest are kept.
    #[must_use]
    pub fn merge(mut self, user: &Self) -> Self {
        for (key, entry) in &user.0 {
            let base = self.0.get(key).copied().unwrap_or_default();
            self.0.insert(*key, entry.or(base));
        }
        self
    }

    /// The default overrides of a dialect family.
    pub fn for_family(family: DialectFamily) -> Self {
        match family {
            DialectFamily::Postgres => postgres(),
            DialectFamily::MySql | DialectFamily::MariaDb => mysql(),
            DialectFamily::MsSql => mssql(),
            DialectFamily::Sqlite => sqlite(),
            DialectFamily::Oracle => oracle(),
            DialectFamily::Db2 | DialectFamily::Ibmi => db2(),
            DialectFamily::Snowflake => snowflake(),
        }
    }
}

fn sql(f: ToSqlFn) -> TypeOverride {
    TypeOverride {
        to_sql: Some(f),
        ..TypeOverride::default()
    }
}

fn with_precision(name: &str, precision: Option<u32>) -> String {
    match precision {
        Some(p) => format!("{name}({p})"),
        None => name.to_string(),
    }
}

fn escape_bool_as_int(_: &DataType, value: &Value, _: &DialectDescriptor, _: &BindContext) -> SqlResult<String> {
    Ok(match value {
        Value::Bool(true) => "1".into(),
        Value::Bool(false) => "0".into(),
        Value::Int(n) => i64::from(*n != 0).to_string(),
        other => other.to_string(),
    })
}

fn bind_bool_as_int(_: &DataType, value: &Value, _: &DialectDescriptor, _: &BindContext) -> SqlResult<Value> {
    Ok(match value {
        Value::Bool(b) => Value::Int(i64::from(*b)),
        other => other.clone(),
    })
}

// ── Postgres ───────────────────────────────────────────────────────────

fn postgres() -> TypeOverrides {
    fn reject_nul(t: &DataType, value: &Value, d: &DialectDescriptor) -> SqlResult<()> {
        if let Value::String(s) = value {
            if s.contains('\0') {
                return Err(SqlError::invalid_value(
                    &d.capabilities.name,
                    "text values cannot contain NUL characters",
                ));
            }
        }
        t.base_validate(value, d)
    }
    fn bytea_or_base(t: &DataType, d: &DialectDescriptor) -> SqlResult<String> {
        match t {
            DataType::String { binary: true, .. } | DataType::Char { binary: true, .. } => Ok("BYTEA".into()),
            _ => t.base_sql(d),
        }
    }
    fn keep_native(t: &DataType, value: &Value, d: &DialectDescriptor, ctx: &BindContext) -> SqlResult<Value> {
        match (t, value) {
            (DataType::Uuid { .. }, Value::Uuid(_))
            | (DataType::DateOnly, Value::Date(_))
            | (DataType::Time { .. }, Value::Time(_))
            | (DataType::Json | DataType::Jsonb, Value::Json(_)) => Ok(value.clone()),
            (DataType::Uuid { .. }, Value::String(s)) => uuid::Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|_| SqlError::invalid_value(&d.capabilities.name, format!("'{s}' is not a valid UUID"))),
            (DataType::Date { .. }, _) => Ok(Value::DateTimeTz(
                to_datetime(value, &d.capabilities)?.with_timezone(&ctx.timezone),
            )),
            (DataType::Array(inner), Value::List(items)) => items
                .iter()
                .map(|item| inner.to_bindable(item, d, ctx))
                .collect::<SqlResult<Vec<_>>>()
                .map(Value::List),
            _ => t.base_bindable(value, d, ctx),
        }
    }
    fn cast_text(t: &DataType, token: &str, d: &DialectDescriptor) -> String {
        let target = match t {
            DataType::Decimal { .. } => "numeric".to_string(),
            DataType::Hstore => "hstore".to_string(),
            DataType::Range(inner) => super::range_subtype(inner).unwrap_or("numrange").to_string(),
            _ => return t.placeholder_base(token, d),
        };
        format!("{token}::text::{target}")
    }
    fn geometry_placeholder(_: &DataType, token: &str, _: &DialectDescriptor) -> String {
        format!("ST_GeomFromGeoJSON({token}::text)")
    }

    let native = TypeOverride {
        bind: Some(keep_native),
        ..TypeOverride::default()
    };
    let cast = TypeOverride {
        placeholder: Some(cast_text),
        ..TypeOverride::default()
    };
    let text = TypeOverride {
        validate: Some(reject_nul),
        to_sql: Some(bytea_or_base),
        ..TypeOverride::default()
    };

    TypeOverrides::new()
        .with(
            TypeKey::Uuid,
            TypeOverride {
                to_sql: Some(|_, _| Ok("UUID".into())),
                ..native
            },
        )
        .with(
            TypeKey::Date,
            TypeOverride {
                to_sql: Some(|t, _| match t {
                    DataType::Date { precision } => Ok(format!(
                        "{} WITH TIME ZONE",
                        with_precision("TIMESTAMP", *precision)
                    )),
                    _ => Ok("TIMESTAMP WITH TIME ZONE".into()),
                }),
                ..native
            },
        )
        .with(TypeKey::DateOnly, native)
        .with(TypeKey::Time, native)
        .with(TypeKey::Json, native)
        .with(TypeKey::Jsonb, native)
        .with(TypeKey::Array, native)
        .with(TypeKey::String, text)
        .with(TypeKey::Char, text)
        .with(
            TypeKey::Text,
            TypeOverride {
                validate: Some(reject_nul),
                ..TypeOverride::default()
            },
        )
        .with(TypeKey::Blob, sql(|_, _| Ok("BYTEA".into())))
        .with(TypeKey::Decimal, cast)
        .with(TypeKey::Range, cast)
        .with(TypeKey::Hstore, cast)
        .with(
            TypeKey::Geometry,
            TypeOverride {
                placeholder: Some(geometry_placeholder),
                ..TypeOverride::default()
            },
        )
}

// ── MySQL and MariaDB ──────────────────────────────────────────────────

fn mysql() -> TypeOverrides {
    fn datetime(t: &DataType, _: &DialectDescriptor) -> SqlResult<String> {
        Ok(match t {
            DataType::Date { precision } => with_precision("DATETIME", *precision),
            _ => "DATETIME".into(),
        })
    }
    fn bind_naive(_: &DataType, value: &Value, d: &DialectDescriptor, ctx: &BindContext) -> SqlResult<Value> {
        Ok(Value::String(format_datetime(&to_datetime(value, &d.capabilities)?, ctx, false)))
    }
    fn double(t: &DataType, d: &DialectDescriptor) -> SqlResult<String> {
        match t {
            DataType::Float {
                kind: FloatKind::Double,
                precision,
                scale,
                unsigned,
                zerofill,
            } => {
                let mut sql = "DOUBLE".to_string();
                if let (Some(p), Some(s)) = (precision, scale) {
                    sql.push_str(&format!("({p},{s})"));
                }
                if *unsigned {
                    sql.push_str(" UNSIGNED");
                }
                if *zerofill {
                    sql.push_str(" ZEROFILL");
                }
                Ok(sql)
            }
            _ => t.base_sql(d),
        }
    }
    fn binary_suffix(t: &DataType, d: &DialectDescriptor) -> SqlResult<String> {
        match t {
            DataType::String { length, binary: true } => Ok(format!("VARCHAR({length}) BINARY")),
            DataType::Char { length, binary: true } => Ok(format!("CHAR({length}) BINARY")),
            _ => t.base_sql(d),
        }
    }
    fn geometry(t: &DataType, _: &DialectDescriptor) -> SqlResult<String> {
        Ok(match t {
            DataType::Geometry {
                subtype: Some(sub),
                srid,
            } => {
                let mut sql = sub.to_uppercase();
                if let Some(srid) = srid {
                    sql.push_str(&format!(" SRID {srid}"));
                }
                sql
            }
            DataType::Geometry { srid: Some(srid), .. } => format!("GEOMETRY SRID {srid}"),
            _ => "GEOMETRY".into(),
        })
    }

    TypeOverrides::new()
        .with(TypeKey::Uuid, sql(|_, _| Ok("CHAR(36) BINARY".into())))
        .with(TypeKey::Boolean, sql(|_, _| Ok("TINYINT(1)".into())))
        .with(
            TypeKey::Date,
            TypeOverride {
                to_sql: Some(datetime),
                bind: Some(bind_naive),
                ..TypeOverride::default()
            },
        )
        .with(TypeKey::Float, sql(double))
        .with(TypeKey::String, sql(binary_suffix))
        .with(TypeKey::Char, sql(binary_suffix))
        .with(TypeKey::Geometry, sql(geometry))
}

// ── SQL Server ─────────────────────────────────────────────────────────

fn mssql() -> TypeOverrides {
    fn datetimeoffset(t: &DataType, _: &DialectDescriptor) -> SqlResult<String> {
        Ok(match t {
            DataType::Date { precision } => with_precision("DATETIMEOFFSET", *precision),
            _ => "DATETIMEOFFSET".into(),
        })
    }
    fn national(t: &DataType, d: &DialectDescriptor) -> SqlResult<String> {
        match t {
            DataType::String { length, binary: false } => Ok(format!("NVARCHAR({length})")),
            DataType::Char { length, binary: false } => Ok(format!("NCHAR({length})")),
            _ => t.base_sql(d),
        }
    }

    TypeOverrides::new()
        .with(TypeKey::Uuid, sql(|_, _| Ok("UNIQUEIDENTIFIER".into())))
        .with(
            TypeKey::Boolean,
            TypeOverride {
                to_sql: Some(|_, _| Ok("BIT".into())),
                escape: Some(escape_bool_as_int),
                ..TypeOverride::default()
            },
        )
        .with(TypeKey::Date, sql(datetimeoffset))
        .with(TypeKey::String, sql(national))
        .with(TypeKey::Char, sql(national))
        .with(TypeKey::Text, sql(|_, _| Ok("NVARCHAR(MAX)".into())))
        .with(
            TypeKey::Json,
            TypeOverride {
                to_sql: Some(|_, _| Ok("NVARCHAR(MAX)".into())),
                check: Some(|_, column, _| Some(format!("ISJSON({column}) = 1"))),
                ..TypeOverride::default()
            },
        )
        .with(TypeKey::Blob, sql(|_, _| Ok("VARBINARY(MAX)".into())))
}

// ── SQLite ─────────────────────────────────────────────────────────────

fn sqlite() -> TypeOverrides {
    TypeOverrides::new()
        .with(TypeKey::Uuid, sql(|_, _| Ok("TEXT".into())))
        .with(
            TypeKey::Boolean,
            TypeOverride {
                to_sql: Some(|_, _| Ok("INTEGER".into())),
                bind: Some(bind_bool_as_int),
                escape: Some(escape_bool_as_int),
                ..TypeOverride::default()
            },
        )
        .with(TypeKey::Date, sql(|_, _| Ok("DATETIME".into())))
        .with(TypeKey::Json, sql(|_, _| Ok("TEXT".into())))
}

// ── Oracle ─────────────────────────────────────────────────────────────

fn oracle() -> TypeOverrides {
    fn varchar2(t: &DataType, d: &DialectDescriptor) -> SqlResult<String> {
        match t {
            DataType::String { length, binary: false } => Ok(format!("VARCHAR2({length})")),
            DataType::String { length, binary: true } => Ok(format!("RAW({length})")),
            _ => t.base_sql(d),
        }
    }

    TypeOverrides::new()
        .with(TypeKey::String, sql(varchar2))
        .with(TypeKey::Text, sql(|_, _| Ok("CLOB".into())))
        .with(
            TypeKey::Boolean,
            TypeOverride {
                to_sql: Some(|_, _| Ok("NUMBER(1)".into())),
                bind: Some(bind_bool_as_int),
                escape: Some(escape_bool_as_int),
                ..TypeOverride::default()
            },
        )
        .with(
            TypeKey::Json,
            TypeOverride {
                to_sql: Some(|_, _| Ok("CLOB".into())),
                check: Some(|_, column, _| Some(format!("{column} IS JSON"))),
                ..TypeOverride::default()
            },
        )
}

// ── DB2 and IBM i ──────────────────────────────────────────────────────

fn db2() -> TypeOverrides {
    TypeOverrides::new()
        .with(TypeKey::Text, sql(|_, _| Ok("CLOB".into())))
        .with(
            TypeKey::Boolean,
            TypeOverride {
                escape: Some(escape_bool_as_int),
                ..TypeOverride::default()
            },
        )
}

// ── Snowflake ──────────────────────────────────────────────────────────

fn snowflake() -> TypeOverrides {
    TypeOverrides::new()
        .with(
            TypeKey::Json,
            TypeOverride {
                to_sql: Some(|_, _| Ok("VARIANT".into())),
                placeholder: Some(|_, token, _| format!("PARSE_JSON({token})")),
                ..TypeOverride::default()
            },
        )
        .with(TypeKey::Blob, sql(|_, _| Ok("BINARY".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectRegistry;

    #[test]
    fn test_merge_replaces_per_method() {
        let family = TypeOverrides::for_family(DialectFamily::MsSql);
        let user = TypeOverrides::new().with(
            TypeKey::Json,
            TypeOverride {
                to_sql: Some(|_, _| Ok("JSON".into())),
                ..TypeOverride::default()
            },
        );
        let merged = family.merge(&user);
        let json = merged.get(TypeKey::Json).unwrap();
        assert!(json.to_sql.is_some());
        // The family's check constraint survives the user's to_sql override.
        assert!(json.check.is_some());
    }

    #[test]
    fn test_family_tables_are_independent() {
        assert!(TypeOverrides::for_family(DialectFamily::Postgres).get(TypeKey::Uuid).is_some());
        assert!(TypeOverrides::for_family(DialectFamily::Db2).get(TypeKey::Uuid).is_none());
    }

    #[test]
    fn test_postgres_placeholder_casts() {
        let pg = DialectRegistry::builtin().resolve("postgres").unwrap();
        assert_eq!(DataType::decimal(10, 2).placeholder("$1", &pg), "$1::text::numeric");
        assert_eq!(DataType::Hstore.placeholder("$2", &pg), "$2::text::hstore");
        assert_eq!(
            DataType::Range(Box::new(DataType::bigint())).placeholder("$3", &pg),
            "$3::text::int8range"
        );
        assert_eq!(DataType::integer().placeholder("$4", &pg), "$4");
    }

    #[test]
    fn test_postgres_binds_native_values() {
        let pg = DialectRegistry::builtin().resolve("postgres").unwrap();
        let id = uuid::Uuid::new_v4();
        let ctx = BindContext::default();
        assert_eq!(DataType::uuid().to_bindable(&Value::Uuid(id), &pg, &ctx).unwrap(), Value::Uuid(id));
        assert!(matches!(
            DataType::date().to_bindable(&Value::from("2024-01-01 00:00:00"), &pg, &ctx).unwrap(),
            Value::DateTimeTz(_)
        ));
    }

    #[test]
    fn test_postgres_rejects_nul_in_text() {
        let pg = DialectRegistry::builtin().resolve("postgres").unwrap();
        assert!(DataType::text().validate(&Value::from("a\0b"), &pg).is_err());
        assert!(DataType::text().validate(&Value::from("ab"), &pg).is_ok());
    }

    #[test]
    fn test_mysql_datetime_has_no_offset() {
        let mysql = DialectRegistry::builtin().resolve("mysql").unwrap();
        let wire = DataType::date()
            .to_bindable(&Value::from("2024-05-06 07:08:09"), &mysql, &BindContext::default())
            .unwrap();
        assert_eq!(wire, Value::String("2024-05-06 07:08:09.000".into()));
        assert_eq!(DataType::Date { precision: Some(3) }.to_sql(&mysql).unwrap(), "DATETIME(3)");
    }

    #[test]
    fn test_boolean_literals() {
        let registry = DialectRegistry::builtin();
        let ctx = BindContext::default();
        let t = DataType::Boolean;
        assert_eq!(t.escape(&Value::Bool(true), &registry.resolve("postgres").unwrap(), &ctx).unwrap(), "true");
        assert_eq!(t.escape(&Value::Bool(true), &registry.resolve("mssql").unwrap(), &ctx).unwrap(), "1");
        assert_eq!(t.escape(&Value::Bool(false), &registry.resolve("sqlite").unwrap(), &ctx).unwrap(), "0");
        assert_eq!(t.to_sql(&registry.resolve("mssql").unwrap()).unwrap(), "BIT");
        assert_eq!(t.to_sql(&registry.resolve("oracle").unwrap()).unwrap(), "NUMBER(1)");
    }

    #[test]
    fn test_json_checks() {
        let registry = DialectRegistry::builtin();
        let mssql = registry.resolve("mssql").unwrap();
        assert_eq!(DataType::Json.to_sql(&mssql).unwrap(), "NVARCHAR(MAX)");
        assert_eq!(
            DataType::Json.check_constraint("[doc]", &mssql).as_deref(),
            Some("ISJSON([doc]) = 1")
        );
        assert_eq!(DataType::Json.check_constraint("\"doc\"", &registry.resolve("postgres").unwrap()), None);
    }
}
