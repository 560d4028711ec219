//! Filter trees for WHERE clauses.
//!
//! [`Lookup`] is a single column comparison and [`Q`] combines lookups with
//! AND, OR, and NOT. Every value in a lookup is bound through the statement's
//! bind collector; only raw fragments reach the SQL text verbatim.
//!
//! # Examples
//!
//! ```
//! use sqlweave_db::query::{Lookup, Q};
//! use sqlweave_db::value::Value;
//!
//! // name = 'Alice' AND age > 25
//! let q = Q::filter("name", Lookup::Exact(Value::from("Alice")))
//!     & Q::filter("age", Lookup::Gt(Value::from(25)));
//!
//! // NOT (active = false)
//! let negated = !Q::filter("active", Lookup::Exact(Value::from(false)));
//! # let _ = (q, negated);
//! ```

use std::ops;

use sqlweave_core::{SqlError, SqlResult};

use super::descriptor::{column_type, ColumnDescriptor};
use super::generator::StatementBuilder;
use crate::dialect::{Feature, RegexpStyle};
use crate::types::DataType;
use crate::value::Value;

/// Escape character used for LIKE patterns built from plain text.
const LIKE_ESCAPE: char = '!';

/// A column-level comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// `col = v`, or `col IS NULL` for a null value.
    Exact(Value),
    /// `col <> v`, or `col IS NOT NULL` for a null value.
    NotEqual(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// `col IN (...)`. An empty list matches nothing.
    In(Vec<Value>),
    /// `col NOT IN (...)`. An empty list matches everything.
    NotIn(Vec<Value>),
    /// `col BETWEEN low AND high`.
    Between(Value, Value),
    /// `col IS NULL` when true, `col IS NOT NULL` when false.
    IsNull(bool),
    /// `col LIKE pattern`, with the pattern used as given.
    Like(String),
    /// `col ILIKE pattern`.
    ILike(String),
    /// Substring match. Wildcards in the text are matched literally.
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    IContains(String),
    IStartsWith(String),
    IEndsWith(String),
    /// Regular expression match.
    Regex(String),
    /// Case-insensitive regular expression match.
    IRegex(String),
}

/// A composable filter.
///
/// `Q` values combine with `&` (AND), `|` (OR) and `!` (NOT). Nested ANDs and
/// ORs are flattened as they are built.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// A single column lookup.
    Filter {
        /// The column, optionally qualified as `table.column`.
        field: String,
        lookup: Lookup,
    },
    /// All children hold. An empty AND is always true.
    And(Vec<Q>),
    /// Any child holds. An empty OR is always false.
    Or(Vec<Q>),
    Not(Box<Q>),
    /// A caller-written predicate, used verbatim. It may reference caller
    /// binds as `$name`.
    Raw(String),
}

impl Q {
    pub fn filter(field: impl Into<String>, lookup: Lookup) -> Self {
        Self::Filter {
            field: field.into(),
            lookup,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// Returns `true` for an AND or OR without children.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

// ── Compilation ────────────────────────────────────────────────────────

/// Compiles a filter tree into a predicate, binding every lookup value.
pub(crate) fn compile(
    q: &Q,
    builder: &mut StatementBuilder<'_>,
    attributes: &[ColumnDescriptor],
) -> SqlResult<String> {
    match q {
        Q::Filter { field, lookup } => compile_lookup(field, lookup, builder, attributes),
        Q::And(children) => compile_group(children, " AND ", "1=1", builder, attributes),
        Q::Or(children) => compile_group(children, " OR ", "1=0", builder, attributes),
        Q::Not(inner) => Ok(format!("NOT ({})", compile(inner, builder, attributes)?)),
        Q::Raw(sql) => Ok(format!("({sql})")),
    }
}

fn compile_group(
    children: &[Q],
    separator: &str,
    empty: &str,
    builder: &mut StatementBuilder<'_>,
    attributes: &[ColumnDescriptor],
) -> SqlResult<String> {
    match children {
        [] => Ok(empty.to_string()),
        [only] => compile(only, builder, attributes),
        _ => {
            let parts = children
                .iter()
                .map(|child| compile(child, builder, attributes))
                .collect::<SqlResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(separator)))
        }
    }
}

fn compile_lookup(
    field: &str,
    lookup: &Lookup,
    builder: &mut StatementBuilder<'_>,
    attributes: &[ColumnDescriptor],
) -> SqlResult<String> {
    let column = builder.quote_column(field);
    let declared = column_type(attributes, field).cloned();
    let bind = |builder: &mut StatementBuilder<'_>, value: &Value| -> SqlResult<String> {
        match &declared {
            Some(data_type) => builder.bind(data_type, value),
            None => builder.bind(&DataType::infer(value), value),
        }
    };
    let caps = builder.capabilities();

    let sql = match lookup {
        Lookup::Exact(v) if v.is_null() => format!("{column} IS NULL"),
        Lookup::NotEqual(v) if v.is_null() => format!("{column} IS NOT NULL"),
        Lookup::Exact(v) => format!("{column} = {}", bind(builder, v)?),
        Lookup::NotEqual(v) => format!("{column} <> {}", bind(builder, v)?),
        Lookup::Gt(v) => format!("{column} > {}", bind(builder, v)?),
        Lookup::Gte(v) => format!("{column} >= {}", bind(builder, v)?),
        Lookup::Lt(v) => format!("{column} < {}", bind(builder, v)?),
        Lookup::Lte(v) => format!("{column} <= {}", bind(builder, v)?),
        Lookup::In(values) | Lookup::NotIn(values) => {
            let negated = matches!(lookup, Lookup::NotIn(_));
            if values.is_empty() {
                return Ok(if negated { "1=1" } else { "1=0" }.to_string());
            }
            let tokens = values
                .iter()
                .map(|v| bind(builder, v))
                .collect::<SqlResult<Vec<_>>>()?;
            let op = if negated { "NOT IN" } else { "IN" };
            format!("{column} {op} ({})", tokens.join(", "))
        }
        Lookup::Between(low, high) => {
            let low = bind(builder, low)?;
            let high = bind(builder, high)?;
            format!("{column} BETWEEN {low} AND {high}")
        }
        Lookup::IsNull(true) => format!("{column} IS NULL"),
        Lookup::IsNull(false) => format!("{column} IS NOT NULL"),
        Lookup::Like(pattern) => {
            let token = builder.bind(&DataType::text(), &Value::from(pattern.as_str()))?;
            format!("{column} LIKE {token}")
        }
        Lookup::ILike(pattern) => {
            caps.require(Feature::ILike, "ILIKE")?;
            let token = builder.bind(&DataType::text(), &Value::from(pattern.as_str()))?;
            format!("{column} ILIKE {token}")
        }
        Lookup::Contains(text) | Lookup::StartsWith(text) | Lookup::EndsWith(text) => {
            let pattern = like_pattern(lookup, text);
            let token = builder.bind(&DataType::text(), &Value::String(pattern))?;
            format!("{column} LIKE {token} ESCAPE '{LIKE_ESCAPE}'")
        }
        Lookup::IContains(text) | Lookup::IStartsWith(text) | Lookup::IEndsWith(text) => {
            caps.require(Feature::ILike, "ILIKE")?;
            let pattern = like_pattern(lookup, text);
            let token = builder.bind(&DataType::text(), &Value::String(pattern))?;
            format!("{column} ILIKE {token} ESCAPE '{LIKE_ESCAPE}'")
        }
        Lookup::Regex(pattern) => {
            let token = builder.bind(&DataType::text(), &Value::from(pattern.as_str()))?;
            match caps.regexp {
                RegexpStyle::Tilde => format!("{column} ~ {token}"),
                RegexpStyle::Regexp => format!("{column} REGEXP {token}"),
                RegexpStyle::None => {
                    return Err(SqlError::unsupported(&caps.name, "regular expression matching"))
                }
            }
        }
        Lookup::IRegex(pattern) => {
            caps.require(Feature::IRegexp, "case-insensitive regular expression matching")?;
            let token = builder.bind(&DataType::text(), &Value::from(pattern.as_str()))?;
            format!("{column} ~* {token}")
        }
    };
    Ok(sql)
}

/// Escapes LIKE wildcards in `text` and adds the lookup's own.
fn like_pattern(lookup: &Lookup, text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    match lookup {
        Lookup::StartsWith(_) | Lookup::IStartsWith(_) => format!("{escaped}%"),
        Lookup::EndsWith(_) | Lookup::IEndsWith(_) => format!("%{escaped}"),
        _ => format!("%{escaped}%"),
    }
}
