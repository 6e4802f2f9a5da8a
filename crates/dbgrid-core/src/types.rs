//! Core types for dbgrid

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// A cell value of one of the supported scalar column types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string (fixed or variable width columns)
    String(String),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => self.as_i64().map(|v| v as f64),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the runtime type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int16(_) => "smallint",
            Value::Int32(_) => "integer",
            Value::Int64(_) => "bigint",
            Value::Float32(_) => "real",
            Value::Float64(_) => "double",
            Value::String(_) => "text",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Declared scalar type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    /// CHAR(n); values longer than `length` characters are rejected
    FixedChar { length: u32 },
    VarText,
}

impl ColumnType {
    /// Whether a non-null value has the runtime type this column declares
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ColumnType::Boolean, Value::Bool(_)) => true,
            (ColumnType::SmallInt, Value::Int16(_)) => true,
            (ColumnType::Integer, Value::Int32(_)) => true,
            (ColumnType::BigInt, Value::Int64(_)) => true,
            (ColumnType::Real, Value::Float32(_)) => true,
            (ColumnType::Double, Value::Float64(_)) => true,
            (ColumnType::FixedChar { length }, Value::String(s)) => {
                s.chars().count() <= *length as usize
            }
            (ColumnType::VarText, Value::String(_)) => true,
            _ => false,
        }
    }

    /// Parse edit text into a value of this type.
    ///
    /// Text columns take the input verbatim, so numeric-looking strings
    /// (postal codes, phone numbers) and the word `null` stay strings. For
    /// every other type `NULL` (any case) parses to `Value::Null`;
    /// nullability is checked by the owning [`Column`], not here.
    pub fn parse_literal(&self, text: &str) -> Option<Value> {
        if matches!(self, ColumnType::FixedChar { .. } | ColumnType::VarText) {
            let value = Value::String(text.to_string());
            return self.accepts(&value).then_some(value);
        }
        if text.eq_ignore_ascii_case("null") {
            return Some(Value::Null);
        }

        let trimmed = text.trim();
        let value = match self {
            ColumnType::Boolean => match trimmed.to_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Value::Bool(true),
                "false" | "f" | "0" | "no" => Value::Bool(false),
                _ => return None,
            },
            ColumnType::SmallInt => Value::Int16(trimmed.parse().ok()?),
            ColumnType::Integer => Value::Int32(trimmed.parse().ok()?),
            ColumnType::BigInt => Value::Int64(trimmed.parse().ok()?),
            ColumnType::Real => Value::Float32(trimmed.parse().ok()?),
            ColumnType::Double => Value::Float64(trimmed.parse().ok()?),
            ColumnType::FixedChar { .. } | ColumnType::VarText => return None,
        };

        self.accepts(&value).then_some(value)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::SmallInt => write!(f, "smallint"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::BigInt => write!(f, "bigint"),
            ColumnType::Real => write!(f, "real"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::FixedChar { length } => write!(f, "char({})", length),
            ColumnType::VarText => write!(f, "text"),
        }
    }
}

/// Column metadata. Immutable once part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within a table
    pub name: String,
    /// Declared scalar type
    pub column_type: ColumnType,
    /// Whether the column accepts NULL
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    /// Create a nullable column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    /// Mark the column NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Whether `value` may be stored in this column
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            self.nullable
        } else {
            self.column_type.accepts(value)
        }
    }

    /// Check `value` against this column, producing a `TypeMismatch` on failure
    pub fn check(&self, value: &Value) -> Result<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(CoreError::TypeMismatch {
                column: self.name.clone(),
                expected: self.column_type.to_string(),
                found: value.type_name().to_string(),
            })
        }
    }

    /// Parse edit text for this column
    pub fn parse(&self, text: &str) -> Result<Value> {
        let value = self
            .column_type
            .parse_literal(text)
            .ok_or_else(|| CoreError::TypeMismatch {
                column: self.name.clone(),
                expected: self.column_type.to_string(),
                found: format!("'{}'", text),
            })?;
        self.check(&value)?;
        Ok(value)
    }
}

/// A row of cell values, positionally aligned with a column list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    /// Cell values
    pub values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pair each cell with its column name
    pub fn named(&self, columns: &[Column]) -> Vec<(String, Value)> {
        columns
            .iter()
            .zip(self.values.iter())
            .map(|(col, val)| (col.name.clone(), val.clone()))
            .collect()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
