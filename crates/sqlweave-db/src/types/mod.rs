//! The data type catalog.
//!
//! [`DataType`] is a flat tagged variant covering every column type sqlweave
//! understands. Each variant knows how to:
//!
//! - validate a candidate [`Value`] against the dialect's capabilities,
//! - escape a value as an inline SQL literal (DDL defaults, engines without binds),
//! - convert a value into the representation sent to the driver,
//! - parse a value read back from the driver,
//! - render its SQL declaration.
//!
//! Dialect differences are expressed in two places only: the capability
//! record (which modifiers and types exist) and the per-dialect
//! [`TypeOverrides`] table resolved at registration time. No method here
//! inspects a dialect name.

pub mod encoding;
pub mod overrides;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use sqlweave_core::{SqlError, SqlResult};

use crate::dialect::{BytesLiteral, DialectCapabilities, DialectDescriptor, EnumStyle};
use crate::value::{RangeValue, Value};

pub use overrides::{TypeKey, TypeOverride, TypeOverrides};

/// Per-call conversion context threaded through bind and escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindContext {
    /// Offset applied to date-times when they are formatted for the wire.
    pub timezone: FixedOffset,
}

impl Default for BindContext {
    fn default() -> Self {
        Self {
            timezone: Utc.fix(),
        }
    }
}

/// Integer storage widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    Tiny,
    Small,
    Medium,
    Int,
    Big,
}

impl IntWidth {
    const fn sql_name(self) -> &'static str {
        match self {
            Self::Tiny => "TINYINT",
            Self::Small => "SMALLINT",
            Self::Medium => "MEDIUMINT",
            Self::Int => "INTEGER",
            Self::Big => "BIGINT",
        }
    }

    /// Inclusive bounds for the width. Unsigned `BIGINT` is capped at
    /// `i64::MAX` because values are carried as `i64`.
    const fn bounds(self, unsigned: bool) -> (i64, i64) {
        match (self, unsigned) {
            (Self::Tiny, false) => (-128, 127),
            (Self::Tiny, true) => (0, 255),
            (Self::Small, false) => (-32_768, 32_767),
            (Self::Small, true) => (0, 65_535),
            (Self::Medium, false) => (-8_388_608, 8_388_607),
            (Self::Medium, true) => (0, 16_777_215),
            (Self::Int, false) => (-2_147_483_648, 2_147_483_647),
            (Self::Int, true) => (0, 4_294_967_295),
            (Self::Big, false) => (i64::MIN, i64::MAX),
            (Self::Big, true) => (0, i64::MAX),
        }
    }
}

/// Approximate numeric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Real,
    Float,
    Double,
}

/// Size classes for TEXT and BLOB columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SizeClass {
    Tiny,
    #[default]
    Default,
    Medium,
    Long,
}

impl SizeClass {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Tiny => "TINY",
            Self::Default => "",
            Self::Medium => "MEDIUM",
            Self::Long => "LONG",
        }
    }
}

/// A column data type.
///
/// # Examples
///
/// ```
/// use sqlweave_db::dialect::DialectRegistry;
/// use sqlweave_db::types::DataType;
///
/// let registry = DialectRegistry::builtin();
/// let mysql = registry.resolve("mysql").unwrap();
/// let sqlite = registry.resolve("sqlite").unwrap();
///
/// let t = DataType::Integer { width: sqlweave_db::types::IntWidth::Int, length: None, unsigned: true, zerofill: false };
/// assert_eq!(t.to_sql(&mysql).unwrap(), "INTEGER UNSIGNED");
/// // SQLite has no UNSIGNED; the modifier is dropped with a warning.
/// assert_eq!(t.to_sql(&sqlite).unwrap(), "INTEGER");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Integer {
        width: IntWidth,
        length: Option<u32>,
        unsigned: bool,
        zerofill: bool,
    },
    Float {
        kind: FloatKind,
        precision: Option<u32>,
        scale: Option<u32>,
        unsigned: bool,
        zerofill: bool,
    },
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
        unsigned: bool,
        zerofill: bool,
    },
    Boolean,
    /// `VARCHAR(length)`; `binary` stores bytes instead of text.
    String {
        length: u32,
        binary: bool,
    },
    Char {
        length: u32,
        binary: bool,
    },
    Text(SizeClass),
    /// A date and time, with optional fractional second precision.
    Date {
        precision: Option<u32>,
    },
    DateOnly,
    Time {
        precision: Option<u32>,
    },
    Blob(SizeClass),
    Json,
    Jsonb,
    Enum {
        values: Vec<String>,
    },
    /// A UUID, optionally restricted to one version.
    Uuid {
        version: Option<usize>,
    },
    Geometry {
        subtype: Option<String>,
        srid: Option<u32>,
    },
    Array(Box<DataType>),
    Range(Box<DataType>),
    Hstore,
    /// An attribute with no backing column.
    Virtual,
}

// ── Constructors ────────────────────────────────────────────────────────

impl DataType {
    pub const fn integer() -> Self {
        Self::Integer {
            width: IntWidth::Int,
            length: None,
            unsigned: false,
            zerofill: false,
        }
    }

    pub const fn bigint() -> Self {
        Self::Integer {
            width: IntWidth::Big,
            length: None,
            unsigned: false,
            zerofill: false,
        }
    }

    pub const fn double() -> Self {
        Self::Float {
            kind: FloatKind::Double,
            precision: None,
            scale: None,
            unsigned: false,
            zerofill: false,
        }
    }

    pub const fn decimal(precision: u32, scale: u32) -> Self {
        Self::Decimal {
            precision: Some(precision),
            scale: Some(scale),
            unsigned: false,
            zerofill: false,
        }
    }

    pub const fn string(length: u32) -> Self {
        Self::String {
            length,
            binary: false,
        }
    }

    pub const fn text() -> Self {
        Self::Text(SizeClass::Default)
    }

    pub const fn date() -> Self {
        Self::Date { precision: None }
    }

    pub const fn uuid() -> Self {
        Self::Uuid { version: None }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Picks a data type for a value that has no declared column type.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null | Value::String(_) => Self::text(),
            Value::Bool(_) => Self::Boolean,
            Value::Int(_) => Self::bigint(),
            Value::Float(_) => Self::double(),
            Value::Decimal(_) => Self::Decimal {
                precision: None,
                scale: None,
                unsigned: false,
                zerofill: false,
            },
            Value::Bytes(_) => Self::Blob(SizeClass::Default),
            Value::Date(_) => Self::DateOnly,
            Value::DateTime(_) | Value::DateTimeTz(_) => Self::date(),
            Value::Time(_) => Self::Time { precision: None },
            Value::Uuid(_) => Self::uuid(),
            Value::Json(_) => Self::Json,
            Value::List(items) => Self::Array(Box::new(
                items
                    .iter()
                    .find(|v| !v.is_null())
                    .map_or_else(Self::text, Self::infer),
            )),
            Value::HStore(_) => Self::Hstore,
            Value::Range(r) => Self::Range(Box::new(
                r.lower
                    .as_ref()
                    .or(r.upper.as_ref())
                    .map_or_else(Self::integer, Self::infer),
            )),
        }
    }

    /// The override-table key for this variant.
    pub const fn key(&self) -> TypeKey {
        match self {
            Self::Integer { .. } => TypeKey::Integer,
            Self::Float { .. } => TypeKey::Float,
            Self::Decimal { .. } => TypeKey::Decimal,
            Self::Boolean => TypeKey::Boolean,
            Self::String { .. } => TypeKey::String,
            Self::Char { .. } => TypeKey::Char,
            Self::Text(_) => TypeKey::Text,
            Self::Date { .. } => TypeKey::Date,
            Self::DateOnly => TypeKey::DateOnly,
            Self::Time { .. } => TypeKey::Time,
            Self::Blob(_) => TypeKey::Blob,
            Self::Json => TypeKey::Json,
            Self::Jsonb => TypeKey::Jsonb,
            Self::Enum { .. } => TypeKey::Enum,
            Self::Uuid { .. } => TypeKey::Uuid,
            Self::Geometry { .. } => TypeKey::Geometry,
            Self::Array(_) => TypeKey::Array,
            Self::Range(_) => TypeKey::Range,
            Self::Hstore => TypeKey::Hstore,
            Self::Virtual => TypeKey::Virtual,
        }
    }
}

// ── Dialect normalization ──────────────────────────────────────────────

impl DataType {
    /// Adapts the declaration to what the dialect supports.
    ///
    /// Modifiers the dialect lacks (UNSIGNED, ZEROFILL, float precision,
    /// fractional seconds) are dropped with a warning. Types the dialect lacks
    /// entirely, and lengths beyond its maxima, fail with
    /// `UnsupportedOperation`. Malformed declarations fail with
    /// `InvalidDescriptor`.
    pub fn for_dialect(&self, caps: &DialectCapabilities) -> SqlResult<(Self, Vec<String>)> {
        let mut warnings = Vec::new();
        let adapted = self.normalize(caps, &mut warnings)?;
        for warning in &warnings {
            tracing::warn!(dialect = %caps.name, "{warning}");
        }
        Ok((adapted, warnings))
    }

    fn normalize(&self, caps: &DialectCapabilities, warnings: &mut Vec<String>) -> SqlResult<Self> {
        let types = &caps.data_types;
        let gate = |supported: bool, what: &str| -> SqlResult<()> {
            if supported {
                Ok(())
            } else {
                Err(SqlError::unsupported(&caps.name, what))
            }
        };
        let mut drop_numeric_modifiers = |unsigned: bool, zerofill: bool, name: &str| {
            let keep_unsigned = unsigned && types.unsigned;
            let keep_zerofill = zerofill && types.zerofill;
            if unsigned && !keep_unsigned {
                warnings.push(format!("{} does not support {name} UNSIGNED; the modifier was dropped", caps.name));
            }
            if zerofill && !keep_zerofill {
                warnings.push(format!("{} does not support {name} ZEROFILL; the modifier was dropped", caps.name));
            }
            (keep_unsigned, keep_zerofill)
        };

        Ok(match self {
            Self::Integer {
                width,
                length,
                unsigned,
                zerofill,
            } => {
                let (unsigned, zerofill) = drop_numeric_modifiers(*unsigned, *zerofill, width.sql_name());
                let width = match width {
                    IntWidth::Tiny if !types.tinyint => IntWidth::Small,
                    IntWidth::Medium if !types.mediumint => IntWidth::Int,
                    other => *other,
                };
                Self::Integer {
                    width,
                    length: length.filter(|_| types.unsigned),
                    unsigned,
                    zerofill,
                }
            }
            Self::Float {
                kind,
                precision,
                scale,
                unsigned,
                zerofill,
            } => {
                let (unsigned, zerofill) = drop_numeric_modifiers(*unsigned, *zerofill, "FLOAT");
                let (precision, scale) = if (precision.is_some() || scale.is_some()) && !types.float_precision {
                    warnings.push(format!(
                        "{} does not support float precision or scale; the parameters were dropped",
                        caps.name
                    ));
                    (None, None)
                } else {
                    (*precision, *scale)
                };
                if scale.is_some() && precision.is_none() {
                    return Err(SqlError::invalid_descriptor(
                        &caps.name,
                        "float scale requires a precision",
                    ));
                }
                Self::Float {
                    kind: *kind,
                    precision,
                    scale,
                    unsigned,
                    zerofill,
                }
            }
            Self::Decimal {
                precision,
                scale,
                unsigned,
                zerofill,
            } => {
                let (unsigned, zerofill) = drop_numeric_modifiers(*unsigned, *zerofill, "DECIMAL");
                if scale.is_some() && precision.is_none() {
                    return Err(SqlError::invalid_descriptor(
                        &caps.name,
                        "decimal scale requires a precision",
                    ));
                }
                if let (Some(p), Some(s)) = (precision, scale) {
                    if s > p {
                        return Err(SqlError::invalid_descriptor(
                            &caps.name,
                            format!("decimal scale {s} exceeds precision {p}"),
                        ));
                    }
                }
                Self::Decimal {
                    precision: *precision,
                    scale: *scale,
                    unsigned,
                    zerofill,
                }
            }
            Self::String { length, binary } => {
                if *length > types.max_varchar {
                    return Err(SqlError::unsupported(
                        &caps.name,
                        format!("VARCHAR({length}) exceeds the maximum length {}", types.max_varchar),
                    ));
                }
                Self::String {
                    length: *length,
                    binary: *binary,
                }
            }
            Self::Char { length, binary } => {
                if *length > types.max_char {
                    return Err(SqlError::unsupported(
                        &caps.name,
                        format!("CHAR({length}) exceeds the maximum length {}", types.max_char),
                    ));
                }
                Self::Char {
                    length: *length,
                    binary: *binary,
                }
            }
            Self::Text(size) => {
                if *size != SizeClass::Default && !types.text_sizes {
                    warnings.push(format!(
                        "{} does not support {}TEXT; using TEXT",
                        caps.name,
                        size.prefix()
                    ));
                    Self::Text(SizeClass::Default)
                } else {
                    Self::Text(*size)
                }
            }
            Self::Date { precision } => Self::Date {
                precision: self.time_precision(*precision, caps, warnings),
            },
            Self::Time { precision } => Self::Time {
                precision: self.time_precision(*precision, caps, warnings),
            },
            Self::Json => {
                gate(types.json, "JSON")?;
                Self::Json
            }
            Self::Jsonb => {
                gate(types.jsonb, "JSONB")?;
                Self::Jsonb
            }
            Self::Enum { values } => {
                if values.is_empty() {
                    return Err(SqlError::invalid_descriptor(
                        &caps.name,
                        "ENUM requires at least one value",
                    ));
                }
                self.clone()
            }
            Self::Geometry { .. } => {
                gate(types.geometry, "GEOMETRY")?;
                self.clone()
            }
            Self::Array(inner) => {
                gate(types.array, "ARRAY")?;
                Self::Array(Box::new(inner.normalize(caps, warnings)?))
            }
            Self::Range(inner) => {
                gate(types.range, "RANGE")?;
                let inner = inner.normalize(caps, warnings)?;
                range_subtype(&inner).ok_or_else(|| {
                    SqlError::invalid_descriptor(&caps.name, format!("no range type exists over {:?}", inner.key()))
                })?;
                Self::Range(Box::new(inner))
            }
            Self::Hstore => {
                gate(types.hstore, "HSTORE")?;
                Self::Hstore
            }
            Self::Boolean
            | Self::DateOnly
            | Self::Blob(_)
            | Self::Uuid { .. }
            | Self::Virtual => self.clone(),
        })
    }

    fn time_precision(
        &self,
        precision: Option<u32>,
        caps: &DialectCapabilities,
        warnings: &mut Vec<String>,
    ) -> Option<u32> {
        if precision.is_some() && !caps.data_types.time_precision {
            warnings.push(format!(
                "{} does not support fractional second precision on {:?}; the precision was dropped",
                caps.name,
                self.key()
            ));
            None
        } else {
            precision
        }
    }
}

/// The Postgres range type for an element type.
pub(crate) const fn range_subtype(inner: &DataType) -> Option<&'static str> {
    match inner {
        DataType::Integer {
            width: IntWidth::Big, ..
        } => Some("int8range"),
        DataType::Integer { .. } => Some("int4range"),
        DataType::Decimal { .. } | DataType::Float { .. } => Some("numrange"),
        DataType::Date { .. } => Some("tstzrange"),
        DataType::DateOnly => Some("daterange"),
        _ => None,
    }
}

// ── SQL declarations ───────────────────────────────────────────────────

impl DataType {
    /// Renders the column type declaration for the dialect.
    pub fn to_sql(&self, dialect: &DialectDescriptor) -> SqlResult<String> {
        let caps = &dialect.capabilities;
        let (adapted, _) = self.for_dialect(caps)?;
        adapted.declare(dialect)
    }

    /// Declares an already-normalized type, consulting overrides.
    pub(crate) fn declare(&self, dialect: &DialectDescriptor) -> SqlResult<String> {
        if let Some(f) = dialect.types.get(self.key()).and_then(|o| o.to_sql) {
            return f(self, dialect);
        }
        self.base_sql(dialect)
    }

    /// The override-free declaration.
    pub fn base_sql(&self, dialect: &DialectDescriptor) -> SqlResult<String> {
        let caps = &dialect.capabilities;
        Ok(match self {
            Self::Integer {
                width,
                length,
                unsigned,
                zerofill,
            } => {
                let mut sql = width.sql_name().to_string();
                if let Some(len) = length {
                    sql.push_str(&format!("({len})"));
                }
                numeric_modifiers(&mut sql, *unsigned, *zerofill);
                sql
            }
            Self::Float {
                kind,
                precision,
                scale,
                unsigned,
                zerofill,
            } => {
                let mut sql = match kind {
                    FloatKind::Real => "REAL",
                    FloatKind::Float => "FLOAT",
                    FloatKind::Double => "DOUBLE PRECISION",
                }
                .to_string();
                push_precision(&mut sql, *precision, *scale);
                numeric_modifiers(&mut sql, *unsigned, *zerofill);
                sql
            }
            Self::Decimal {
                precision,
                scale,
                unsigned,
                zerofill,
            } => {
                let mut sql = "DECIMAL".to_string();
                push_precision(&mut sql, *precision, *scale);
                numeric_modifiers(&mut sql, *unsigned, *zerofill);
                sql
            }
            Self::Boolean => "BOOLEAN".into(),
            Self::String { length, binary } => {
                if *binary {
                    format!("VARBINARY({length})")
                } else {
                    format!("VARCHAR({length})")
                }
            }
            Self::Char { length, binary } => {
                if *binary {
                    format!("BINARY({length})")
                } else {
                    format!("CHAR({length})")
                }
            }
            Self::Text(size) => format!("{}TEXT", size.prefix()),
            Self::Date { precision } => match precision {
                Some(p) => format!("TIMESTAMP({p})"),
                None => "TIMESTAMP".into(),
            },
            Self::DateOnly => "DATE".into(),
            Self::Time { precision } => match precision {
                Some(p) => format!("TIME({p})"),
                None => "TIME".into(),
            },
            Self::Blob(size) => format!("{}BLOB", size.prefix()),
            Self::Json => "JSON".into(),
            Self::Jsonb => "JSONB".into(),
            Self::Enum { values } => match caps.enum_style {
                EnumStyle::Native => {
                    let members: Vec<String> =
                        values.iter().map(|v| caps.escape_string(v)).collect();
                    format!("ENUM({})", members.join(", "))
                }
                EnumStyle::CheckConstraint => "VARCHAR(255)".into(),
                EnumStyle::NamedType => {
                    return Err(SqlError::invalid_descriptor(
                        &caps.name,
                        "named enum types are declared per column by the generator",
                    ))
                }
            },
            Self::Uuid { .. } => "CHAR(36)".into(),
            Self::Geometry { subtype, srid } => match (subtype, srid) {
                (Some(sub), Some(srid)) => format!("GEOMETRY({}, {srid})", sub.to_uppercase()),
                (Some(sub), None) => format!("GEOMETRY({})", sub.to_uppercase()),
                (None, _) => "GEOMETRY".into(),
            },
            Self::Array(inner) => format!("{}[]", inner.declare(dialect)?),
            Self::Range(inner) => range_subtype(inner)
                .ok_or_else(|| SqlError::invalid_descriptor(&caps.name, "unsupported range subtype"))?
                .to_string(),
            Self::Hstore => "HSTORE".into(),
            Self::Virtual => {
                return Err(SqlError::invalid_descriptor(
                    &caps.name,
                    "virtual attributes have no column declaration",
                ))
            }
        })
    }
}

fn push_precision(sql: &mut String, precision: Option<u32>, scale: Option<u32>) {
    match (precision, scale) {
        (Some(p), Some(s)) => sql.push_str(&format!("({p},{s})")),
        (Some(p), None) => sql.push_str(&format!("({p})")),
        _ => {}
    }
}

fn numeric_modifiers(sql: &mut String, unsigned: bool, zerofill: bool) {
    if unsigned {
        sql.push_str(" UNSIGNED");
    }
    if zerofill {
        sql.push_str(" ZEROFILL");
    }
}

// ── Validation ─────────────────────────────────────────────────────────

impl DataType {
    /// Checks that `value` conforms to this type on the dialect.
    pub fn validate(&self, value: &Value, dialect: &DialectDescriptor) -> SqlResult<()> {
        if let Some(f) = dialect.types.get(self.key()).and_then(|o| o.validate) {
            return f(self, value, dialect);
        }
        self.base_validate(value, dialect)
    }

    /// The override-free validation rule.
    pub fn base_validate(&self, value: &Value, dialect: &DialectDescriptor) -> SqlResult<()> {
        let caps = &dialect.capabilities;
        let invalid = |message: String| Err(SqlError::invalid_value(&caps.name, message));
        let mismatch = || {
            Err(SqlError::invalid_value(
                &caps.name,
                format!("{value} ({}) is not a valid {:?} value", value.type_name(), self.key()),
            ))
        };

        if value.is_null() {
            return Ok(());
        }

        match (self, value) {
            (
                Self::Integer {
                    width, unsigned, ..
                },
                _,
            ) => {
                let n = match value {
                    Value::Int(n) => *n,
                    Value::String(s) => match s.trim().parse::<i64>() {
                        Ok(n) => n,
                        Err(_) => return mismatch(),
                    },
                    _ => return mismatch(),
                };
                let (min, max) = width.bounds(*unsigned && caps.data_types.unsigned);
                if n < min || n > max {
                    return invalid(format!(
                        "{n} is out of range for {}{} ({min}..={max})",
                        width.sql_name(),
                        if *unsigned { " UNSIGNED" } else { "" }
                    ));
                }
                Ok(())
            }
            (Self::Float { unsigned, .. }, Value::Float(f)) => {
                if !f.is_finite() && !caps.data_types.float_nan_infinity {
                    return invalid(format!("{f} cannot be stored in a {} float column", caps.name));
                }
                if *unsigned && caps.data_types.unsigned && *f < 0.0 {
                    return invalid(format!("{f} is negative but the column is UNSIGNED"));
                }
                Ok(())
            }
            (Self::Float { .. }, Value::Int(_)) => Ok(()),
            (Self::Decimal { precision, scale, unsigned, .. }, Value::Decimal(s) | Value::String(s)) => {
                validate_decimal(s, *precision, *scale, *unsigned && caps.data_types.unsigned)
                    .map_err(|m| SqlError::invalid_value(&caps.name, m))
            }
            (Self::Decimal { precision, scale, unsigned, .. }, Value::Int(n)) => {
                validate_decimal(&n.to_string(), *precision, *scale, *unsigned && caps.data_types.unsigned)
                    .map_err(|m| SqlError::invalid_value(&caps.name, m))
            }
            (Self::Decimal { .. }, Value::Float(f)) if f.is_finite() => Ok(()),
            (Self::Boolean, Value::Bool(_) | Value::Int(0 | 1)) => Ok(()),
            (Self::String { binary, .. } | Self::Char { binary, .. }, Value::Bytes(_)) if *binary => Ok(()),
            (Self::String { .. } | Self::Char { .. } | Self::Text(_), Value::String(_)) => Ok(()),
            (Self::Date { .. }, Value::DateTimeTz(_) | Value::DateTime(_) | Value::Date(_)) => Ok(()),
            (Self::Date { .. }, Value::String(s)) => parse_datetime(s)
                .map(|_| ())
                .ok_or(())
                .or_else(|()| invalid(format!("'{s}' is not a valid date-time"))),
            (Self::DateOnly, Value::Date(_) | Value::DateTime(_) | Value::DateTimeTz(_)) => Ok(()),
            (Self::DateOnly, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| ())
                .or_else(|_| invalid(format!("'{s}' is not a valid date"))),
            (Self::Time { .. }, Value::Time(_)) => Ok(()),
            (Self::Time { .. }, Value::String(s)) => parse_time(s)
                .map(|_| ())
                .ok_or(())
                .or_else(|()| invalid(format!("'{s}' is not a valid time"))),
            (Self::Blob(_), Value::Bytes(_) | Value::String(_)) => Ok(()),
            (Self::Json | Self::Jsonb, Value::Json(_)) => Ok(()),
            (Self::Enum { values }, Value::String(s)) => {
                if values.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    invalid(format!("'{s}' is not one of the enum values {values:?}"))
                }
            }
            (Self::Uuid { version }, Value::Uuid(_) | Value::String(_)) => {
                let id = match value {
                    Value::Uuid(u) => *u,
                    Value::String(s) => match uuid::Uuid::parse_str(s) {
                        Ok(u) => u,
                        Err(_) => return invalid(format!("'{s}' is not a valid UUID")),
                    },
                    _ => return mismatch(),
                };
                match version {
                    Some(v) if id.get_version_num() != *v => {
                        invalid(format!("{id} is not a version {v} UUID"))
                    }
                    _ => Ok(()),
                }
            }
            (Self::Geometry { subtype, .. }, Value::Json(json)) => {
                encoding::validate_geojson(json, subtype.as_deref())
                    .map_err(|m| SqlError::invalid_value(&caps.name, m))
            }
            (Self::Array(inner), Value::List(items)) => {
                for item in items {
                    inner.validate(item, dialect)?;
                }
                Ok(())
            }
            (Self::Range(inner), Value::Range(range)) => {
                for bound in [&range.lower, &range.upper].into_iter().flatten() {
                    inner.validate(bound, dialect)?;
                }
                Ok(())
            }
            (Self::Hstore, Value::HStore(_)) => Ok(()),
            (Self::Virtual, _) => invalid("virtual attributes cannot be written".into()),
            _ => mismatch(),
        }
    }
}

/// Checks a decimal literal against precision and scale. Only the
/// integer-digit budget is enforced; extra fractional digits are rounded by
/// the database.
fn validate_decimal(
    text: &str,
    precision: Option<u32>,
    scale: Option<u32>,
    unsigned: bool,
) -> Result<(), String> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let well_formed = !int_part.is_empty()
        && int_part.chars().all(|c| c.is_ascii_digit())
        && frac_part.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(format!("'{text}' is not a decimal number"));
    }
    if unsigned && trimmed.starts_with('-') {
        return Err(format!("{text} is negative but the column is UNSIGNED"));
    }
    if let Some(p) = precision {
        let int_digits = int_part.trim_start_matches('0').len();
        let allowed = p.saturating_sub(scale.unwrap_or(0)) as usize;
        if int_digits > allowed {
            return Err(format!(
                "{text} has {int_digits} integer digits but DECIMAL({p},{}) allows {allowed}",
                scale.unwrap_or(0)
            ));
        }
    }
    Ok(())
}

// ── Bind values ────────────────────────────────────────────────────────

impl DataType {
    /// Converts a validated value into the representation sent to the driver.
    pub fn to_bindable(&self, value: &Value, dialect: &DialectDescriptor, ctx: &BindContext) -> SqlResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(f) = dialect.types.get(self.key()).and_then(|o| o.bind) {
            return f(self, value, dialect, ctx);
        }
        self.base_bindable(value, dialect, ctx)
    }

    /// The override-free bind conversion.
    pub fn base_bindable(&self, value: &Value, dialect: &DialectDescriptor, ctx: &BindContext) -> SqlResult<Value> {
        let caps = &dialect.capabilities;
        Ok(match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Integer { .. }, Value::String(s)) => Value::Int(
                s.trim()
                    .parse()
                    .map_err(|_| SqlError::invalid_value(&caps.name, format!("'{s}' is not an integer")))?,
            ),
            (Self::Float { .. }, Value::Int(n)) => Value::Float(*n as f64),
            (Self::Decimal { .. }, Value::String(s)) => Value::Decimal(s.trim().to_string()),
            (Self::Decimal { .. }, Value::Int(n)) => Value::Decimal(n.to_string()),
            (Self::Decimal { .. }, Value::Float(f)) => Value::Decimal(f.to_string()),
            (Self::Boolean, Value::Int(n)) => Value::Bool(*n != 0),
            (Self::Date { .. }, _) => Value::String(format_datetime(&to_datetime(value, caps)?, ctx, true)),
            (Self::DateOnly, _) => Value::String(to_date(value, caps)?.format("%Y-%m-%d").to_string()),
            (Self::Time { .. }, Value::Time(t)) => Value::String(format_time(*t)),
            (Self::Blob(_), Value::String(s)) => Value::Bytes(s.as_bytes().to_vec()),
            (Self::Json | Self::Jsonb | Self::Geometry { .. }, Value::Json(j)) => Value::String(j.to_string()),
            (Self::Uuid { .. }, Value::Uuid(u)) => Value::String(u.hyphenated().to_string()),
            (Self::Uuid { .. }, Value::String(s)) => Value::String(
                uuid::Uuid::parse_str(s)
                    .map_err(|_| SqlError::invalid_value(&caps.name, format!("'{s}' is not a valid UUID")))?
                    .hyphenated()
                    .to_string(),
            ),
            (Self::Array(inner), Value::List(items)) => Value::List(
                items
                    .iter()
                    .map(|item| inner.to_bindable(item, dialect, ctx))
                    .collect::<SqlResult<_>>()?,
            ),
            (Self::Range(inner), Value::Range(range)) => {
                Value::String(self.range_text(inner, range, dialect, ctx)?)
            }
            (Self::Hstore, Value::HStore(map)) => Value::String(encoding::encode_hstore(map)),
            _ => value.clone(),
        })
    }

    fn range_text(
        &self,
        inner: &Self,
        range: &RangeValue,
        dialect: &DialectDescriptor,
        ctx: &BindContext,
    ) -> SqlResult<String> {
        let mut bounds = Vec::with_capacity(2);
        for bound in [&range.lower, &range.upper] {
            bounds.push(match bound {
                Some(v) => Some(inner.base_bindable(v, dialect, ctx)?),
                None => None,
            });
        }
        let text_range = RangeValue {
            lower: bounds[0].clone(),
            upper: bounds[1].clone(),
            lower_inclusive: range.lower_inclusive,
            upper_inclusive: range.upper_inclusive,
        };
        Ok(encoding::encode_range(&text_range, Value::to_string))
    }

    /// Wraps a bind placeholder when the type needs a conversion on the
    /// database side.
    pub fn placeholder(&self, token: &str, dialect: &DialectDescriptor) -> String {
        if let Some(f) = dialect.types.get(self.key()).and_then(|o| o.placeholder) {
            return f(self, token, dialect);
        }
        self.placeholder_base(token, dialect)
    }

    /// The override-free placeholder.
    pub fn placeholder_base(&self, token: &str, _dialect: &DialectDescriptor) -> String {
        match self {
            Self::Geometry { .. } => format!("ST_GeomFromGeoJSON({token})"),
            _ => token.to_string(),
        }
    }

    /// A CHECK expression the column needs on this dialect, given its quoted
    /// name. Enums on dialects without an enum type are checked by membership.
    pub fn check_constraint(&self, column: &str, dialect: &DialectDescriptor) -> Option<String> {
        if let Some(f) = dialect.types.get(self.key()).and_then(|o| o.check) {
            return f(self, column, dialect);
        }
        match self {
            Self::Enum { values } if dialect.capabilities.enum_style == EnumStyle::CheckConstraint => {
                let members: Vec<String> = values
                    .iter()
                    .map(|v| dialect.capabilities.escape_string(v))
                    .collect();
                Some(format!("{column} IN ({})", members.join(", ")))
            }
            _ => None,
        }
    }
}

// ── Inline literals ────────────────────────────────────────────────────

impl DataType {
    /// Escapes a validated value as an inline SQL literal.
    pub fn escape(&self, value: &Value, dialect: &DialectDescriptor, ctx: &BindContext) -> SqlResult<String> {
        if value.is_null() {
            return Ok("NULL".into());
        }
        if let Some(f) = dialect.types.get(self.key()).and_then(|o| o.escape) {
            return f(self, value, dialect, ctx);
        }
        self.base_escape(value, dialect, ctx)
    }

    /// The override-free literal escape.
    pub fn base_escape(&self, value: &Value, dialect: &DialectDescriptor, ctx: &BindContext) -> SqlResult<String> {
        let caps = &dialect.capabilities;
        Ok(match (self, value) {
            (_, Value::Null) => "NULL".into(),
            (Self::Boolean, Value::Bool(b)) => if *b { "true" } else { "false" }.into(),
            (Self::Boolean, Value::Int(n)) => if *n != 0 { "true" } else { "false" }.into(),
            (_, Value::Int(n)) if !matches!(self, Self::String { .. } | Self::Char { .. } | Self::Text(_) | Self::Enum { .. }) => {
                n.to_string()
            }
            (Self::Float { .. } | Self::Decimal { .. }, Value::Float(f)) => {
                if f.is_nan() {
                    caps.escape_string("NaN")
                } else if f.is_infinite() {
                    caps.escape_string(if *f > 0.0 { "Infinity" } else { "-Infinity" })
                } else {
                    f.to_string()
                }
            }
            (Self::Decimal { .. }, Value::Decimal(s) | Value::String(s)) => s.trim().to_string(),
            (_, Value::Bytes(bytes)) => bytes_literal(bytes, caps.data_types.bytes_literal),
            (Self::Blob(_), Value::String(s)) => bytes_literal(s.as_bytes(), caps.data_types.bytes_literal),
            (Self::Geometry { .. }, Value::Json(j)) => {
                self.placeholder(&caps.escape_string(&j.to_string()), dialect)
            }
            (Self::Array(inner), Value::List(items)) => {
                let elements = items
                    .iter()
                    .map(|item| inner.escape(item, dialect, ctx))
                    .collect::<SqlResult<Vec<_>>>()?;
                if elements.is_empty() {
                    format!("ARRAY[]::{}", self.declare(dialect)?)
                } else {
                    format!("ARRAY[{}]", elements.join(","))
                }
            }
            _ => match self.base_bindable(value, dialect, ctx)? {
                Value::String(s) => caps.escape_string(&s),
                Value::Bool(b) => if b { "true" } else { "false" }.into(),
                Value::Int(n) => n.to_string(),
                Value::Float(f) => f.to_string(),
                Value::Decimal(d) => d,
                Value::Bytes(bytes) => bytes_literal(&bytes, caps.data_types.bytes_literal),
                other => caps.escape_string(&other.to_string()),
            },
        })
    }
}

fn bytes_literal(bytes: &[u8], style: BytesLiteral) -> String {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    match style {
        BytesLiteral::HexString => format!("X'{hex}'"),
        BytesLiteral::HexNumber => format!("0x{hex}"),
        BytesLiteral::ByteaEscape => format!("'\\x{hex}'"),
        BytesLiteral::HexToRaw => format!("HEXTORAW('{hex}')"),
    }
}

// ── Parsing wire values ────────────────────────────────────────────────

impl DataType {
    /// Converts a value read from the driver into its native representation.
    pub fn parse_from_wire(&self, value: &Value, dialect: &DialectDescriptor) -> SqlResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(f) = dialect.types.get(self.key()).and_then(|o| o.parse) {
            return f(self, value, dialect);
        }
        self.base_parse(value, dialect)
    }

    /// The override-free parse.
    pub fn base_parse(&self, value: &Value, dialect: &DialectDescriptor) -> SqlResult<Value> {
        let caps = &dialect.capabilities;
        let corrupt = |message: String| SqlError::corruption(&caps.name, message);
        let unexpected = || {
            corrupt(format!(
                "cannot read {} value {value} as {:?}",
                value.type_name(),
                self.key()
            ))
        };

        Ok(match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Integer { .. }, Value::Int(n)) => Value::Int(*n),
            (Self::Integer { .. }, Value::String(s)) => Value::Int(
                s.trim()
                    .parse()
                    .map_err(|_| corrupt(format!("'{s}' is not an integer")))?,
            ),
            (Self::Float { .. }, Value::Float(f)) => Value::Float(*f),
            (Self::Float { .. }, Value::Int(n)) => Value::Float(*n as f64),
            (Self::Float { .. }, Value::String(s)) => Value::Float(parse_float(s).ok_or_else(|| corrupt(format!("'{s}' is not a number")))?),
            (Self::Decimal { .. }, Value::Decimal(s) | Value::String(s)) => Value::Decimal(s.trim().to_string()),
            (Self::Decimal { .. }, Value::Int(n)) => Value::Decimal(n.to_string()),
            (Self::Decimal { .. }, Value::Float(f)) => Value::Decimal(f.to_string()),
            (Self::Boolean, Value::Bool(b)) => Value::Bool(*b),
            (Self::Boolean, Value::Int(n)) => Value::Bool(*n != 0),
            (Self::Boolean, Value::Bytes(b)) if b.len() == 1 => Value::Bool(b[0] != 0),
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Value::Bool(true),
                "0" | "f" | "false" | "n" | "no" => Value::Bool(false),
                _ => return Err(corrupt(format!("'{s}' is not a boolean"))),
            },
            (Self::String { binary: true, .. } | Self::Char { binary: true, .. }, Value::Bytes(b)) => Value::Bytes(b.clone()),
            (Self::String { .. } | Self::Char { .. } | Self::Text(_) | Self::Enum { .. }, Value::String(s)) => {
                Value::String(s.clone())
            }
            (Self::String { .. } | Self::Char { .. } | Self::Text(_) | Self::Enum { .. }, Value::Bytes(b)) => {
                Value::String(
                    String::from_utf8(b.clone())
                        .map_err(|e| corrupt(format!("text column holds invalid UTF-8: {e}")))?,
                )
            }
            (Self::Date { .. }, Value::DateTimeTz(dt)) => Value::DateTimeTz(*dt),
            (Self::Date { .. }, Value::DateTime(naive)) => Value::DateTimeTz(naive.and_utc().fixed_offset()),
            (Self::Date { .. }, Value::String(s)) => Value::DateTimeTz(
                parse_datetime(s).ok_or_else(|| corrupt(format!("'{s}' is not a date-time")))?,
            ),
            (Self::DateOnly, Value::Date(d)) => Value::Date(*d),
            (Self::DateOnly, Value::DateTime(dt)) => Value::Date(dt.date()),
            (Self::DateOnly, Value::DateTimeTz(dt)) => Value::Date(dt.date_naive()),
            (Self::DateOnly, Value::String(s)) => Value::Date(
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map_err(|_| corrupt(format!("'{s}' is not a date")))?,
            ),
            (Self::Time { .. }, Value::Time(t)) => Value::Time(*t),
            (Self::Time { .. }, Value::String(s)) => {
                Value::Time(parse_time(s).ok_or_else(|| corrupt(format!("'{s}' is not a time")))?)
            }
            (Self::Blob(_), Value::Bytes(b)) => Value::Bytes(b.clone()),
            (Self::Blob(_), Value::String(s)) => Value::Bytes(s.as_bytes().to_vec()),
            (Self::Json | Self::Jsonb | Self::Geometry { .. }, Value::Json(j)) => Value::Json(j.clone()),
            (Self::Json | Self::Jsonb | Self::Geometry { .. }, Value::String(s)) => Value::Json(
                serde_json::from_str(s).map_err(|e| corrupt(format!("invalid JSON: {e}")))?,
            ),
            (Self::Json | Self::Jsonb, Value::Bytes(b)) => Value::Json(
                serde_json::from_slice(b).map_err(|e| corrupt(format!("invalid JSON: {e}")))?,
            ),
            (Self::Uuid { .. }, Value::Uuid(u)) => Value::Uuid(*u),
            (Self::Uuid { .. }, Value::String(s)) => Value::Uuid(
                uuid::Uuid::parse_str(s.trim()).map_err(|e| corrupt(format!("invalid UUID '{s}': {e}")))?,
            ),
            (Self::Uuid { .. }, Value::Bytes(b)) => Value::Uuid(
                uuid::Uuid::from_slice(b).map_err(|e| corrupt(format!("invalid UUID bytes: {e}")))?,
            ),
            (Self::Array(inner), Value::List(items)) => Value::List(
                items
                    .iter()
                    .map(|item| inner.parse_from_wire(item, dialect))
                    .collect::<SqlResult<_>>()?,
            ),
            (Self::Array(inner), Value::String(s)) => {
                let elements = encoding::parse_array(s).map_err(corrupt)?;
                Value::List(inner.parse_elements(&elements, dialect)?)
            }
            (Self::Range(_), Value::Range(r)) => Value::Range(r.clone()),
            (Self::Range(inner), Value::String(s)) => {
                let raw = encoding::parse_range(s).map_err(corrupt)?;
                let bound = |text: Option<String>| -> SqlResult<Option<Value>> {
                    text.map(|t| inner.parse_from_wire(&Value::String(t), dialect))
                        .transpose()
                };
                Value::from(RangeValue {
                    lower: bound(raw.lower)?,
                    upper: bound(raw.upper)?,
                    lower_inclusive: raw.lower_inclusive,
                    upper_inclusive: raw.upper_inclusive,
                })
            }
            (Self::Hstore, Value::HStore(map)) => Value::HStore(map.clone()),
            (Self::Hstore, Value::String(s)) => Value::HStore(encoding::parse_hstore(s).map_err(corrupt)?),
            (Self::Virtual, other) => other.clone(),
            _ => return Err(unexpected()),
        })
    }

    fn parse_elements(
        &self,
        elements: &[encoding::ArrayElement],
        dialect: &DialectDescriptor,
    ) -> SqlResult<Vec<Value>> {
        elements
            .iter()
            .map(|element| match element {
                encoding::ArrayElement::Null => Ok(Value::Null),
                encoding::ArrayElement::Text(t) => self.parse_from_wire(&Value::String(t.clone()), dialect),
                encoding::ArrayElement::Nested(items) => match self {
                    Self::Array(inner) => inner.parse_elements(items, dialect).map(Value::List),
                    _ => Err(SqlError::corruption(
                        &dialect.capabilities.name,
                        "nested array where a scalar element was expected",
                    )),
                },
            })
            .collect()
    }
}

// ── Date and time helpers ──────────────────────────────────────────────

/// Formats a date-time in the canonical `YYYY-MM-DD HH:MM:SS.SSS [+HH:MM]`
/// form, after moving it to the context timezone.
pub fn format_datetime(dt: &DateTime<FixedOffset>, ctx: &BindContext, with_offset: bool) -> String {
    let local = dt.with_timezone(&ctx.timezone);
    if with_offset {
        local.format("%Y-%m-%d %H:%M:%S%.3f %:z").to_string()
    } else {
        local.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }
}

fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M:%S%.f").to_string()
}

/// Interprets a value as an instant. Naive date-times are taken as UTC.
pub(crate) fn to_datetime(value: &Value, caps: &DialectCapabilities) -> SqlResult<DateTime<FixedOffset>> {
    match value {
        Value::DateTimeTz(dt) => Ok(*dt),
        Value::DateTime(naive) => Ok(naive.and_utc().fixed_offset()),
        Value::Date(d) => Ok(d.and_time(NaiveTime::MIN).and_utc().fixed_offset()),
        Value::String(s) => parse_datetime(s)
            .ok_or_else(|| SqlError::invalid_value(&caps.name, format!("'{s}' is not a valid date-time"))),
        other => Err(SqlError::invalid_value(
            &caps.name,
            format!("{} value {other} is not a date-time", other.type_name()),
        )),
    }
}

fn to_date(value: &Value, caps: &DialectCapabilities) -> SqlResult<NaiveDate> {
    match value {
        Value::Date(d) => Ok(*d),
        Value::DateTime(dt) => Ok(dt.date()),
        Value::DateTimeTz(dt) => Ok(dt.date_naive()),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| SqlError::invalid_value(&caps.name, format!("'{s}' is not a valid date"))),
        other => Err(SqlError::invalid_value(
            &caps.name,
            format!("{} value {other} is not a date", other.type_name()),
        )),
    }
}

/// Parses the date-time forms drivers return, with or without an offset.
/// Values without an offset are UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    const WITH_OFFSET: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f %:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%#z",
        "%Y-%m-%d %H:%M:%S%.f %z",
    ];
    for fmt in WITH_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    const NAIVE: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    for fmt in NAIVE {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc().fixed_offset())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

fn parse_float(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" => Some(f64::NAN),
        "Infinity" | "inf" => Some(f64::INFINITY),
        "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dialect::DialectRegistry;
    use sqlweave_core::ErrorKind;

    fn dialect(name: &str) -> std::sync::Arc<DialectDescriptor> {
        DialectRegistry::builtin().resolve(name).unwrap()
    }

    fn utc() -> BindContext {
        BindContext::default()
    }

    fn round_trip(t: &DataType, v: &Value, d: &DialectDescriptor) -> Value {
        t.validate(v, d).unwrap();
        let wire = t.to_bindable(v, d, &utc()).unwrap();
        t.parse_from_wire(&wire, d).unwrap()
    }

    #[test]
    fn test_integer_range_checks() {
        let d = dialect("mysql");
        let tiny = DataType::Integer {
            width: IntWidth::Tiny,
            length: None,
            unsigned: false,
            zerofill: false,
        };
        assert!(tiny.validate(&Value::Int(127), &d).is_ok());
        let err = tiny.validate(&Value::Int(128), &d).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);

        let utiny = DataType::Integer {
            width: IntWidth::Tiny,
            length: None,
            unsigned: true,
            zerofill: false,
        };
        assert!(utiny.validate(&Value::Int(255), &d).is_ok());
        assert!(utiny.validate(&Value::Int(-1), &d).is_err());
    }

    #[test]
    fn test_unsigned_ignored_where_unsupported() {
        let pg = dialect("postgres");
        let t = DataType::Integer {
            width: IntWidth::Int,
            length: None,
            unsigned: true,
            zerofill: true,
        };
        let (adapted, warnings) = t.for_dialect(&pg.capabilities).unwrap();
        assert_eq!(warnings.len(), 2);
        assert_eq!(adapted.to_sql(&pg).unwrap(), "INTEGER");
        // Signed bounds apply once the modifier is gone.
        assert!(t.validate(&Value::Int(-5), &pg).is_ok());
    }

    #[test]
    fn test_mysql_integer_with_modifiers() {
        let mysql = dialect("mysql");
        let t = DataType::Integer {
            width: IntWidth::Int,
            length: Some(11),
            unsigned: true,
            zerofill: true,
        };
        assert_eq!(t.to_sql(&mysql).unwrap(), "INTEGER(11) UNSIGNED ZEROFILL");
    }

    #[test]
    fn test_tinyint_widens_without_support() {
        let pg = dialect("postgres");
        let tiny = DataType::Integer {
            width: IntWidth::Tiny,
            length: None,
            unsigned: false,
            zerofill: false,
        };
        assert_eq!(tiny.to_sql(&pg).unwrap(), "SMALLINT");
    }

    #[test]
    fn test_float_precision_dropped_with_warning() {
        let pg = dialect("postgres");
        let t = DataType::Float {
            kind: FloatKind::Float,
            precision: Some(10),
            scale: Some(2),
            unsigned: false,
            zerofill: false,
        };
        let (_, warnings) = t.for_dialect(&pg.capabilities).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(t.to_sql(&pg).unwrap(), "FLOAT");
        assert_eq!(t.to_sql(&dialect("mysql")).unwrap(), "FLOAT(10,2)");
    }

    #[test]
    fn test_float_nan_gated() {
        let t = DataType::double();
        assert!(t.validate(&Value::Float(f64::NAN), &dialect("postgres")).is_ok());
        assert!(t.validate(&Value::Float(f64::INFINITY), &dialect("mysql")).is_err());
        assert_eq!(
            t.escape(&Value::Float(f64::NEG_INFINITY), &dialect("postgres"), &utc()).unwrap(),
            "'-Infinity'"
        );
    }

    #[test]
    fn test_decimal_validation() {
        let d = dialect("postgres");
        let t = DataType::decimal(5, 2);
        assert!(t.validate(&Value::Decimal("123.45".into()), &d).is_ok());
        assert!(t.validate(&Value::Decimal("-0.5".into()), &d).is_ok());
        assert!(t.validate(&Value::Decimal("1234.5".into()), &d).is_err());
        assert!(t.validate(&Value::Decimal("12a".into()), &d).is_err());
        assert_eq!(t.to_sql(&d).unwrap(), "DECIMAL(5,2)");
    }

    #[test]
    fn test_decimal_scale_requires_precision() {
        let t = DataType::Decimal {
            precision: None,
            scale: Some(2),
            unsigned: false,
            zerofill: false,
        };
        let err = t.to_sql(&dialect("postgres")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDescriptor);
    }

    #[test]
    fn test_varchar_max_length_rejected() {
        let err = DataType::string(9000).to_sql(&dialect("mssql")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(err.to_string().contains("VARCHAR(9000)"));
        assert!(DataType::string(9000).to_sql(&dialect("postgres")).is_ok());
    }

    #[test]
    fn test_boolean_parsing() {
        let d = dialect("sqlite");
        let t = DataType::Boolean;
        assert_eq!(t.parse_from_wire(&Value::Int(1), &d).unwrap(), Value::Bool(true));
        assert_eq!(t.parse_from_wire(&Value::String("f".into()), &d).unwrap(), Value::Bool(false));
        assert_eq!(t.parse_from_wire(&Value::Bytes(vec![1]), &d).unwrap(), Value::Bool(true));
        assert_eq!(t.parse_from_wire(&Value::String("maybe".into()), &d).unwrap_err().kind(), ErrorKind::DataCorruption);
    }

    #[test]
    fn test_enum_membership() {
        let d = dialect("postgres");
        let t = DataType::enumeration(["draft", "published"]);
        assert!(t.validate(&Value::from("draft"), &d).is_ok());
        let err = t.validate(&Value::from("deleted"), &d).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert!(err.to_string().contains("deleted"));
    }

    #[test]
    fn test_native_enum_declaration() {
        let t = DataType::enumeration(["a", "b'c"]);
        assert_eq!(t.to_sql(&dialect("mysql")).unwrap(), "ENUM('a', 'b''c')");
        assert_eq!(t.to_sql(&dialect("sqlite")).unwrap(), "VARCHAR(255)");
    }

    #[test]
    fn test_uuid_version_check() {
        let d = dialect("postgres");
        let v4 = DataType::Uuid { version: Some(4) };
        assert!(v4.validate(&Value::Uuid(uuid::Uuid::new_v4()), &d).is_ok());
        assert!(v4.validate(&Value::from("not-a-uuid"), &d).is_err());
        assert!(v4.validate(&Value::Uuid(uuid::Uuid::nil()), &d).is_err());
    }

    #[test]
    fn test_uuid_declarations() {
        let t = DataType::uuid();
        assert_eq!(t.to_sql(&dialect("postgres")).unwrap(), "UUID");
        assert_eq!(t.to_sql(&dialect("mysql")).unwrap(), "CHAR(36) BINARY");
        assert_eq!(t.to_sql(&dialect("mssql")).unwrap(), "UNIQUEIDENTIFIER");
        assert_eq!(t.to_sql(&dialect("sqlite")).unwrap(), "TEXT");
        assert_eq!(t.to_sql(&dialect("db2")).unwrap(), "CHAR(36)");
    }

    #[test]
    fn test_date_bind_applies_offset_once() {
        let d = dialect("sqlite");
        let t = DataType::date();
        let dt = DateTime::parse_from_rfc3339("2024-03-01T10:15:30.250+00:00").unwrap();
        let ctx = BindContext {
            timezone: FixedOffset::east_opt(2 * 3600).unwrap(),
        };
        let wire = t.to_bindable(&Value::DateTimeTz(dt), &d, &ctx).unwrap();
        assert_eq!(wire, Value::String("2024-03-01 12:15:30.250 +02:00".into()));
        assert_eq!(t.parse_from_wire(&wire, &d).unwrap(), Value::DateTimeTz(dt));
    }

    #[test]
    fn test_naive_datetime_is_utc() {
        let d = dialect("sqlite");
        let naive = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 6)
            .unwrap();
        let wire = DataType::date().to_bindable(&Value::DateTime(naive), &d, &utc()).unwrap();
        assert_eq!(wire, Value::String("2024-01-02 03:04:05.006 +00:00".into()));
    }

    #[test]
    fn test_round_trips() {
        let sqlite = dialect("sqlite");
        let pg = dialect("postgres");
        let cases: Vec<(DataType, Value, &DialectDescriptor)> = vec![
            (DataType::integer(), Value::Int(-42), &sqlite),
            (DataType::double(), Value::Float(2.5), &sqlite),
            (DataType::decimal(10, 3), Value::Decimal("1234.567".into()), &sqlite),
            (DataType::Boolean, Value::Bool(true), &sqlite),
            (DataType::string(20), Value::from("it's"), &sqlite),
            (DataType::text(), Value::from("long\ntext"), &sqlite),
            (DataType::DateOnly, Value::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()), &sqlite),
            (DataType::Time { precision: None }, Value::Time(NaiveTime::from_hms_milli_opt(23, 59, 1, 500).unwrap()), &sqlite),
            (DataType::Blob(SizeClass::Default), Value::Bytes(vec![0, 1, 255]), &sqlite),
            (DataType::Json, Value::Json(serde_json::json!({"a": [1, null, "x"]})), &sqlite),
            (DataType::enumeration(["x", "y"]), Value::from("y"), &sqlite),
            (DataType::uuid(), Value::Uuid(uuid::Uuid::new_v4()), &sqlite),
            (DataType::Array(Box::new(DataType::integer())), Value::List(vec![Value::Int(1), Value::Int(2)]), &pg),
            (DataType::Range(Box::new(DataType::integer())), Value::from(RangeValue::half_open(1_i64, 5_i64)), &pg),
            (DataType::Hstore, Value::HStore(BTreeMap::from([("k".to_string(), Some("v".to_string()))])), &pg),
            (
                DataType::Geometry { subtype: None, srid: None },
                Value::Json(serde_json::json!({"type": "Point", "coordinates": [1.5, 2.0]})),
                &pg,
            ),
        ];
        for (t, v, d) in cases {
            assert_eq!(round_trip(&t, &v, d), v, "round trip failed for {t:?}");
        }
    }

    #[test]
    fn test_json_parse_failure_is_corruption() {
        let err = DataType::Json
            .parse_from_wire(&Value::String("{not json".into()), &dialect("mysql"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataCorruption);
    }

    #[test]
    fn test_gated_types() {
        let sqlite = dialect("sqlite");
        for t in [
            DataType::Jsonb,
            DataType::Hstore,
            DataType::Array(Box::new(DataType::integer())),
            DataType::Range(Box::new(DataType::integer())),
            DataType::Geometry { subtype: None, srid: None },
        ] {
            let err = t.to_sql(&sqlite).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedOperation, "{t:?}");
        }
    }

    #[test]
    fn test_range_declarations() {
        let pg = dialect("postgres");
        assert_eq!(DataType::Range(Box::new(DataType::integer())).to_sql(&pg).unwrap(), "int4range");
        assert_eq!(DataType::Range(Box::new(DataType::bigint())).to_sql(&pg).unwrap(), "int8range");
        assert_eq!(DataType::Range(Box::new(DataType::DateOnly)).to_sql(&pg).unwrap(), "daterange");
        assert!(DataType::Range(Box::new(DataType::text())).to_sql(&pg).is_err());
    }

    #[test]
    fn test_array_parse_from_text() {
        let pg = dialect("postgres");
        let t = DataType::Array(Box::new(DataType::integer()));
        assert_eq!(
            t.parse_from_wire(&Value::String("{1,NULL,3}".into()), &pg).unwrap(),
            Value::List(vec![Value::Int(1), Value::Null, Value::Int(3)])
        );
    }

    #[test]
    fn test_escape_literals() {
        let mysql = dialect("mysql");
        let pg = dialect("postgres");
        let ctx = utc();
        assert_eq!(DataType::text().escape(&Value::from("a'b\\c"), &mysql, &ctx).unwrap(), "'a''b\\\\c'");
        assert_eq!(DataType::text().escape(&Value::from("a'b\\c"), &pg, &ctx).unwrap(), "'a''b\\c'");
        assert_eq!(DataType::Blob(SizeClass::Default).escape(&Value::Bytes(vec![1, 171]), &pg, &ctx).unwrap(), "'\\x01ab'");
        assert_eq!(DataType::Blob(SizeClass::Default).escape(&Value::Bytes(vec![1, 171]), &mysql, &ctx).unwrap(), "X'01ab'");
        assert_eq!(
            DataType::Array(Box::new(DataType::text())).escape(&Value::List(vec![Value::from("x")]), &pg, &ctx).unwrap(),
            "ARRAY['x']"
        );
        assert_eq!(DataType::integer().escape(&Value::Null, &pg, &ctx).unwrap(), "NULL");
    }

    #[test]
    fn test_infer() {
        assert_eq!(DataType::infer(&Value::Int(1)), DataType::bigint());
        assert_eq!(DataType::infer(&Value::from("x")), DataType::text());
        assert_eq!(
            DataType::infer(&Value::List(vec![Value::Null, Value::Bool(true)])),
            DataType::Array(Box::new(DataType::Boolean))
        );
    }
}
