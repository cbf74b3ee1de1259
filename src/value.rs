// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Record values.
//!
//! - [`Value`] - Tagged union for one field value
//! - [`Record`] - Positional field values of one record instance
//! - [`FromValue`] - Extraction of Rust values from a [`Value`]
//! - [`Compound`] - Static description of a typed record
//!
//! A [`Record`] carries no layout of its own; values are matched to fields
//! by position when encoded against a [`RecordLayout`].

use crate::error::{Result, SynaError};
use crate::layout::{derive_layout, TypeShape};
use crate::types::RecordLayout;

/// One field value.
///
/// # Examples
///
/// ```rust
/// use syna_compound::Value;
///
/// let v: Value = 42i32.into();
/// assert_eq!(v, Value::I32(42));
/// assert_eq!(v.type_name(), "i32");
///
/// let arr: Value = vec![1.0f64, 2.0].into();
/// assert_eq!(arr, Value::Array(vec![Value::F64(1.0), Value::F64(2.0)]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Signed 8-bit integer.
    I8(i8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Signed 16-bit integer.
    I16(i16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Signed 32-bit integer.
    I32(i32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// Signed 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 text.
    Text(String),
    /// Fixed-length array elements.
    Array(Vec<Value>),
    /// Nested record.
    Record(Record),
}

impl Value {
    /// Returns the type name as a static string for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::I8(_) => "i8",
            Value::U16(_) => "u16",
            Value::I16(_) => "i16",
            Value::U32(_) => "u32",
            Value::I32(_) => "i32",
            Value::U64(_) => "u64",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }

    /// Returns the text if this is a [`Text`](Value::Text) variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested record if this is a [`Record`](Value::Record) variant.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

/// Extracts a Rust value from a [`Value`] of the matching variant.
pub trait FromValue: Sized {
    /// Returns `None` when the variant does not match.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! scalar_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

scalar_value! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(values: [T; N]) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FromValue for Record {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_record().cloned()
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromValue, const N: usize> FromValue for [T; N] {
    fn from_value(value: &Value) -> Option<Self> {
        let items: Vec<T> = Vec::from_value(value)?;
        items.try_into().ok()
    }
}

/// Positional field values of one record instance.
///
/// # Examples
///
/// ```rust
/// use syna_compound::Record;
///
/// let record = Record::new().with(7i64).with(1.5f64).with("sensor");
/// assert_eq!(record.len(), 3);
/// assert_eq!(record.get_as::<i64>(0).unwrap(), 7);
/// assert_eq!(record.get_as::<String>(2).unwrap(), "sensor");
/// assert!(record.get_as::<f32>(1).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from values in field order.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Appends a value, builder style.
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Appends a value.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    /// Values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the record and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the record has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Extracts the value at `index` as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::ValueMismatch`] when the index is out of range or
    /// the value has a different type.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| SynaError::ValueMismatch {
            field: format!("#{}", index),
            expected: std::any::type_name::<T>().to_string(),
            found: "nothing".to_string(),
        })?;
        T::from_value(value).ok_or_else(|| SynaError::ValueMismatch {
            field: format!("#{}", index),
            expected: std::any::type_name::<T>().to_string(),
            found: value.type_name().to_string(),
        })
    }
}

impl FromIterator<Value> for Record {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A Rust type with a static record shape.
///
/// Implementing `Compound` replaces runtime type introspection: the type
/// states its shape once and converts itself to and from a [`Record`].
///
/// # Examples
///
/// ```rust
/// use syna_compound::{Compound, NumericType, Record, Result, ShapeType, TypeShape};
///
/// #[derive(Debug, PartialEq)]
/// struct Reading {
///     timestamp: i64,
///     level: f64,
/// }
///
/// impl Compound for Reading {
///     fn shape() -> TypeShape {
///         TypeShape::new("reading")
///             .field("timestamp", ShapeType::Numeric(NumericType::I64))
///             .field("level", ShapeType::Numeric(NumericType::F64))
///     }
///
///     fn to_record(&self) -> Record {
///         Record::new().with(self.timestamp).with(self.level)
///     }
///
///     fn from_record(record: &Record) -> Result<Self> {
///         Ok(Self {
///             timestamp: record.get_as(0)?,
///             level: record.get_as(1)?,
///         })
///     }
/// }
///
/// assert_eq!(Reading::layout().unwrap().total_size(), 16);
/// ```
pub trait Compound: Sized {
    /// Static shape of the type.
    fn shape() -> TypeShape;

    /// Field values in shape order.
    fn to_record(&self) -> Record;

    /// Rebuilds a value from decoded field values.
    fn from_record(record: &Record) -> Result<Self>;

    /// Derives the packed layout of [`shape`](Self::shape).
    fn layout() -> Result<RecordLayout> {
        derive_layout(&Self::shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip_through_value() {
        let v: Value = 3u16.into();
        assert_eq!(u16::from_value(&v), Some(3));
        assert_eq!(u32::from_value(&v), None);
    }

    #[test]
    fn test_fixed_array_extraction() {
        let v: Value = [1i32, 2, 3].into();
        assert_eq!(<[i32; 3]>::from_value(&v), Some([1, 2, 3]));
        assert_eq!(<[i32; 2]>::from_value(&v), None);
    }

    #[test]
    fn test_get_as_out_of_range() {
        let record = Record::new().with(true);
        assert!(matches!(
            record.get_as::<bool>(1),
            Err(SynaError::ValueMismatch { .. })
        ));
        assert!(record.get_as::<bool>(0).unwrap());
    }

    #[test]
    fn test_nested_record_value() {
        let inner = Record::new().with(1u8).with(2u8);
        let outer = Record::new().with(inner.clone());
        assert_eq!(outer.get_as::<Record>(0).unwrap(), inner);
    }
}
