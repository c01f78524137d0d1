//! Result rows and hydrated relations.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single result row.
///
/// Fields keep the order the driver produced them in. Relations hydrated by
/// the relation engine are stored next to the fields under the relation's
/// name, so a row can carry a whole nested graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
    relations: Vec<(String, Related)>,
}

/// Related rows attached to a parent row.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// Cardinality one: the first matching child, if any.
    One(Option<Box<Row>>),
    /// Cardinality many: every matching child in result order.
    Many(Vec<Row>),
}

impl Related {
    /// Number of rows held.
    pub fn len(&self) -> usize {
        match self {
            Related::One(row) => usize::from(row.is_some()),
            Related::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a row from column names and values of equal length.
    pub fn from_columns(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            fields: columns.into_iter().zip(values).collect(),
            relations: Vec::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Check if a column exists.
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Set a field, replacing an existing value in place or appending.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Set a field only when it is not already present.
    pub fn set_default(&mut self, column: &str, value: impl Into<Value>) {
        if !self.contains(column) {
            self.fields.push((column.to_string(), value.into()));
        }
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(index).1)
    }

    /// Get a typed value by column name.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.get(column).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", column),
                column: Some(column.to_string()),
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(column.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Get all column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over all values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Consume the row, returning its fields.
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }

    /// Keep only the named columns, in the order given.
    pub fn project(&self, columns: &[&str]) -> Row {
        let fields = columns
            .iter()
            .filter_map(|c| self.get(c).map(|v| ((*c).to_string(), v.clone())))
            .collect();
        Row {
            fields,
            relations: Vec::new(),
        }
    }

    /// Attach related rows under `name`, replacing a previous attachment.
    pub fn attach(&mut self, name: impl Into<String>, related: Related) {
        let name = name.into();
        match self.relations.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = related,
            None => self.relations.push((name, related)),
        }
    }

    /// Get a hydrated relation by name.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, related)| related)
    }

    /// Get a cardinality-one relation; `None` when absent or unmatched.
    pub fn one(&self, name: &str) -> Option<&Row> {
        match self.relation(name)? {
            Related::One(row) => row.as_deref(),
            Related::Many(rows) => rows.first(),
        }
    }

    /// Get a cardinality-many relation; empty when absent.
    pub fn many(&self, name: &str) -> &[Row] {
        match self.relation(name) {
            Some(Related::Many(rows)) => rows,
            Some(Related::One(Some(row))) => std::slice::from_ref(row.as_ref()),
            _ => &[],
        }
    }

    /// Iterate over attached relations.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Related)> {
        self.relations.iter().map(|(n, r)| (n.as_str(), r))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.relations.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        for (name, related) in &self.relations {
            match related {
                Related::One(row) => map.serialize_entry(name, row)?,
                Related::Many(rows) => map.serialize_entry(name, rows)?,
            }
        }
        map.end()
    }
}

/// Build a [`Row`] from `column => value` pairs.
///
/// # Example
///
/// ```ignore
/// let row = row! { "id" => 1, "title" => "hello" };
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {
        $crate::Row::new()$(.with($column, $value))+
    };
}

/// Trait for converting from a `Value` to a typed value.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn type_error(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| type_error("bool", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::BigInt(v) => i32::try_from(*v).map_err(|_| Error::Type(TypeError {
                expected: "i32",
                actual: format!("out of range value {}", v),
                column: None,
            })),
            Value::Bool(v) => Ok(i32::from(*v)),
            other => Err(type_error("i32", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| type_error("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| type_error("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            other => Err(type_error("string", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            other => Err(type_error("bytes", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| Error::Type(TypeError {
                expected: "json",
                actual: e.to_string(),
                column: None,
            })),
            other => serde_json::to_value(other).map_err(|e| Error::Custom(e.to_string())),
        }
    }
}
