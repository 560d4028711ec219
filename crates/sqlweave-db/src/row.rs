//! Result rows returned by connections.
//!
//! A [`Row`] holds column names and their raw [`Value`]s exactly as the driver
//! produced them. Typed access goes through [`FromValue`]; dialect-aware
//! decoding of wire values goes through [`DataType::parse_from_wire`](crate::types::DataType::parse_from_wire).

use sqlweave_core::{SqlError, SqlResult};

use crate::value::Value;

/// A generic database row for passing data between backends and callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the raw values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the value cannot be
    /// converted to the requested type.
    pub fn get<T: FromValue>(&self, column: &str) -> SqlResult<T> {
        let value = self
            .get_value(column)
            .ok_or_else(|| SqlError::ConfigurationError(format!("column '{column}' not found in row")))?;
        T::from_value(value)
    }

    /// Gets a typed value by column index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the value cannot be
    /// converted to the requested type.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> SqlResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            SqlError::ConfigurationError(format!(
                "column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }
}

/// The raw outcome of executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRowSet {
    /// Rows produced by the statement, if any.
    pub rows: Vec<Row>,
    /// Rows affected, as reported by the driver.
    pub rows_affected: u64,
}

impl RawRowSet {
    /// A result with no rows and the given affected count.
    pub const fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }

    /// A result holding the given rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            rows,
            rows_affected,
        }
    }

    /// Returns the first row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> SqlResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> SqlError {
    SqlError::ConfigurationError(format!(
        "expected {expected}, got {} value {value}",
        value.type_name()
    ))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch("int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::Int(i) => i32::try_from(*i).map_err(|e| {
                SqlError::ConfigurationError(format!("int value out of i32 range: {e}"))
            }),
            _ => Err(mismatch("int", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(mismatch("float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::String(s) | Value::Decimal(s) => Ok(s.clone()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => uuid::Uuid::parse_str(s)
                .map_err(|e| SqlError::ConfigurationError(format!("invalid uuid '{s}': {e}"))),
            _ => Err(mismatch("uuid", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            _ => Err(mismatch("json", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> SqlResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> SqlResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(
            vec!["id".into(), "name".into(), "deleted_at".into()],
            vec![Value::Int(7), Value::from("alice"), Value::Null],
        )
    }

    #[test]
    fn test_get_by_name() {
        let row = sample();
        assert_eq!(row.get::<i64>("id").unwrap(), 7);
        assert_eq!(row.get::<String>("name").unwrap(), "alice");
        assert_eq!(row.get::<Option<String>>("deleted_at").unwrap(), None);
    }

    #[test]
    fn test_get_missing_column() {
        let row = sample();
        assert!(row.get::<i64>("missing").is_err());
        assert!(row.get_by_index::<i64>(9).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let row = sample();
        let err = row.get::<bool>("name").unwrap_err();
        assert!(err.to_string().contains("expected bool"));
    }

    #[test]
    fn test_bool_from_integer_flag() {
        assert!(bool::from_value(&Value::Int(1)).unwrap());
        assert!(!bool::from_value(&Value::Int(0)).unwrap());
        assert!(bool::from_value(&Value::Int(2)).is_err());
    }

    #[test]
    fn test_uuid_from_text() {
        let id = uuid::Uuid::new_v4();
        let parsed = uuid::Uuid::from_value(&Value::String(id.to_string())).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_raw_row_set() {
        let set = RawRowSet::from_rows(vec![sample()]);
        assert_eq!(set.rows_affected, 1);
        assert_eq!(set.first().unwrap().len(), 3);
        assert!(RawRowSet::affected(3).rows.is_empty());
    }
}
