//! Bind parameter collection.
//!
//! The generator never writes dialect placeholders directly. Each value it
//! parameterizes is [`reserve`](BindCollector::reserve)d and replaced by an
//! internal token (`$sqlweave_1`, `$sqlweave_2`, ...). Raw SQL fragments may
//! reference caller binds as `$name`. Only [`finalize`](BindCollector::finalize)
//! rewrites tokens into the dialect's bind style, so sub-expressions can be
//! built in any order without knowing their final positions.
//!
//! The rewrite scans the SQL text and leaves string literals, quoted
//! identifiers, comments and dollar-quoted bodies untouched.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlweave_core::{SqlError, SqlResult};

use crate::dialect::{BindStyle, DialectDescriptor};
use crate::types::{BindContext, DataType};
use crate::value::Value;

/// Prefix of internally generated bind names. Caller bind names may not
/// start with it.
pub const RESERVED_PREFIX: &str = "sqlweave_";

static BIND_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// The parameters of one compiled statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", content = "values", rename_all = "snake_case")]
pub enum BindParameterSet {
    /// Values in placeholder order, for `?`, `$N` and `:N` styles.
    Positional(Vec<Value>),
    /// Values keyed by placeholder name, for named styles.
    Named(BTreeMap<String, Value>),
}

impl Default for BindParameterSet {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl BindParameterSet {
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The positional values, or `None` for a named set.
    pub fn as_positional(&self) -> Option<&[Value]> {
        match self {
            Self::Positional(values) => Some(values),
            Self::Named(_) => None,
        }
    }

    /// The named values, or `None` for a positional set.
    pub fn as_named(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Named(values) => Some(values),
            Self::Positional(_) => None,
        }
    }
}

/// Accumulates the values of one statement while it is generated.
#[derive(Debug)]
pub struct BindCollector<'d> {
    dialect: &'d DialectDescriptor,
    ctx: BindContext,
    reserved: Vec<Value>,
    user: HashMap<String, Value>,
}

impl<'d> BindCollector<'d> {
    pub fn new(dialect: &'d DialectDescriptor, ctx: BindContext) -> Self {
        Self {
            dialect,
            ctx,
            reserved: Vec::new(),
            user: HashMap::new(),
        }
    }

    pub const fn dialect(&self) -> &'d DialectDescriptor {
        self.dialect
    }

    pub const fn context(&self) -> &BindContext {
        &self.ctx
    }

    /// Number of values reserved so far.
    pub fn reserved_len(&self) -> usize {
        self.reserved.len()
    }

    /// Stores an already converted wire value and returns its token.
    pub fn reserve(&mut self, value: Value) -> String {
        self.reserved.push(value);
        format!("${RESERVED_PREFIX}{}", self.reserved.len())
    }

    /// Registers a caller-supplied bind that raw fragments reference as
    /// `$name`.
    ///
    /// # Errors
    ///
    /// Returns `ReservedBindName` if `name` starts with [`RESERVED_PREFIX`],
    /// and `InvalidDescriptor` if it is not a plain identifier.
    pub fn merge_user_supplied(&mut self, name: &str, value: Value) -> SqlResult<()> {
        if name.starts_with(RESERVED_PREFIX) {
            return Err(SqlError::ReservedBindName {
                name: name.to_string(),
                prefix: RESERVED_PREFIX.to_string(),
            });
        }
        if !BIND_NAME.is_match(name) {
            return Err(SqlError::invalid_descriptor(
                self.dialect.name(),
                format!("'{name}' is not a valid bind parameter name"),
            ));
        }
        let wire = DataType::infer(&value).to_bindable(&value, self.dialect, &self.ctx)?;
        self.user.insert(name.to_string(), wire);
        Ok(())
    }

    fn lookup(&self, name: &str) -> SqlResult<&Value> {
        let found = match name.strip_prefix(RESERVED_PREFIX) {
            Some(index) => index
                .parse::<usize>()
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| self.reserved.get(i)),
            None => self.user.get(name),
        };
        found.ok_or_else(|| {
            SqlError::invalid_descriptor(
                self.dialect.name(),
                format!("bind parameter '${name}' has no value"),
            )
        })
    }

    /// Rewrites every token in `sql` into the dialect's bind style and
    /// returns the final text with its parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` when the text references a bind that was
    /// never supplied.
    pub fn finalize(self, sql: &str) -> SqlResult<(String, BindParameterSet)> {
        let caps = &self.dialect.capabilities;
        match caps.bind_style {
            BindStyle::Question => {
                let mut values = Vec::new();
                let text = rewrite(sql, self.dialect, |name| {
                    values.push(self.lookup(name)?.clone());
                    Ok("?".to_string())
                })?;
                Ok((text, BindParameterSet::Positional(values)))
            }
            BindStyle::DollarNumbered | BindStyle::ColonNumbered => {
                let sigil = if caps.bind_style == BindStyle::DollarNumbered { '$' } else { ':' };
                let mut order: Vec<&str> = Vec::new();
                let mut values = Vec::new();
                let text = rewrite(sql, self.dialect, |name| {
                    let index = match order.iter().position(|n| *n == name) {
                        Some(i) => i + 1,
                        None => {
                            values.push(self.lookup(name)?.clone());
                            order.push(name);
                            order.len()
                        }
                    };
                    Ok(format!("{sigil}{index}"))
                })?;
                Ok((text, BindParameterSet::Positional(values)))
            }
            BindStyle::Named(sigil) => {
                let mut values = BTreeMap::new();
                let text = rewrite(sql, self.dialect, |name| {
                    values.insert(name.to_string(), self.lookup(name)?.clone());
                    Ok(format!("{sigil}{name}"))
                })?;
                Ok((text, BindParameterSet::Named(values)))
            }
            BindStyle::Unsupported => {
                let text = rewrite(sql, self.dialect, |name| {
                    let value = self.lookup(name)?;
                    DataType::infer(value).escape(value, self.dialect, &self.ctx)
                })?;
                Ok((text, BindParameterSet::default()))
            }
        }
    }
}

const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Copies `sql`, replacing each `$name` outside literals and comments with
/// the output of `on_bind`. `$` followed by digits only is left as is.
fn rewrite<'s>(
    sql: &'s str,
    dialect: &DialectDescriptor,
    mut on_bind: impl FnMut(&'s str) -> SqlResult<String>,
) -> SqlResult<String> {
    let caps = &dialect.capabilities;
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        let end = match b {
            b'\'' => skip_quoted(bytes, i, b'\'', caps.escape_backslashes),
            b'"' | b'`' => skip_quoted(bytes, i, b, false),
            b'[' if caps.identifier_quote.0 == '[' => skip_quoted(bytes, i, b']', false),
            b'-' if next == Some(b'-') => sql[i..].find('\n').map_or(len, |p| i + p),
            b'/' if next == Some(b'*') => sql[i + 2..].find("*/").map_or(len, |p| i + 2 + p + 2),
            b'$' if i == 0 || !is_ident_byte(bytes[i - 1]) => {
                let mut j = i + 1;
                while j < len && is_ident_byte(bytes[j]) {
                    j += 1;
                }
                let name = &sql[i + 1..j];
                let digits_only = name.bytes().all(|c| c.is_ascii_digit());
                if j < len && bytes[j] == b'$' && (name.is_empty() || !name.as_bytes()[0].is_ascii_digit()) {
                    // Dollar-quoted body: copy through the matching closing tag.
                    let tag = &sql[i..=j];
                    sql[j + 1..].find(tag).map_or(len, |p| j + 1 + p + tag.len())
                } else if name.is_empty() || digits_only {
                    j
                } else {
                    out.push_str(&on_bind(name)?);
                    i = j;
                    continue;
                }
            }
            _ => {
                let mut j = i + 1;
                while j < len && !matches!(bytes[j], b'\'' | b'"' | b'`' | b'[' | b'-' | b'/' | b'$') {
                    j += 1;
                }
                j
            }
        };
        out.push_str(&sql[i..end]);
        i = end;
    }
    Ok(out)
}

/// Returns the index just past the closing `close` byte of a quoted run
/// starting at `start`. Doubled closing bytes are escapes.
fn skip_quoted(bytes: &[u8], start: usize, close: u8, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
            continue;
        }
        if b == close {
            if bytes.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}
