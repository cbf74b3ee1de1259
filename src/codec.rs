// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Compound codec.
//!
//! [`CompoundCodec`] converts between [`Record`]s and fixed-size byte blocks
//! laid out by a [`RecordLayout`]. Each field is written at its offset:
//!
//! - numbers as little-endian fixed-width bytes
//! - text as UTF-8 truncated (on a character boundary) or padded to its length
//! - arrays as contiguous elements
//! - nested records inline, recursively
//!
//! Decoding is the exact inverse for values that fit their declared sizes.
//! Over-length text and arrays are truncated on encode and cannot be
//! reconstructed; short arrays are zero-filled and decode to their full count.
//!
//! # Examples
//!
//! ```rust
//! use syna_compound::{derive_layout, CompoundCodec, NumericType, Record, ShapeType, TypeShape};
//!
//! let layout = derive_layout(
//!     &TypeShape::new("tag")
//!         .field("id", ShapeType::Numeric(NumericType::U32))
//!         .field("name", ShapeType::text(5)),
//! )
//! .unwrap();
//!
//! let codec = CompoundCodec::default();
//! let bytes = codec.encode(&Record::new().with(9u32).with("abcdefgh"), &layout).unwrap();
//! assert_eq!(bytes.len(), 9);
//!
//! let back = codec.decode(&bytes, &layout).unwrap();
//! assert_eq!(back.get_as::<String>(1).unwrap(), "abcde");
//! ```

use crate::config::TextPad;
use crate::error::{Result, SynaError};
use crate::types::{FieldKind, NumericType, RecordLayout};
use crate::value::{Compound, Record, Value};

/// Encoder/decoder for fixed-layout records.
///
/// The codec is pure: it holds only the text padding policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompoundCodec {
    pad: TextPad,
}

impl CompoundCodec {
    /// Creates a codec with the given text padding.
    pub fn new(pad: TextPad) -> Self {
        Self { pad }
    }

    /// Returns the text padding policy.
    pub fn pad(&self) -> TextPad {
        self.pad
    }

    /// Encodes one record into a new buffer of `layout.total_size()` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::ValueMismatch`] when the record's values do not
    /// match the layout's fields.
    pub fn encode(&self, record: &Record, layout: &RecordLayout) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; layout.total_size()];
        self.encode_into(record, layout, &mut buf)?;
        Ok(buf)
    }

    /// Encodes one record into `out`, which must be exactly one record long.
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::EncodingSizeMismatch`] before writing anything
    /// when `out` is not `layout.total_size()` bytes.
    pub fn encode_into(&self, record: &Record, layout: &RecordLayout, out: &mut [u8]) -> Result<()> {
        if out.len() != layout.total_size() {
            return Err(SynaError::EncodingSizeMismatch {
                expected: layout.total_size(),
                got: out.len(),
            });
        }
        if record.len() != layout.len() {
            return Err(SynaError::ValueMismatch {
                field: layout.name().to_string(),
                expected: format!("{} fields", layout.len()),
                found: format!("{} fields", record.len()),
            });
        }

        for (field, value) in layout.fields().iter().zip(record.values()) {
            self.write_value(&field.name, &field.kind, value, &mut out[field.range()])?;
        }
        Ok(())
    }

    /// Encodes a batch of records into one contiguous buffer.
    pub fn encode_batch(&self, records: &[Record], layout: &RecordLayout) -> Result<Vec<u8>> {
        let size = layout.total_size();
        let mut buf = vec![0u8; size * records.len()];
        for (record, slot) in records.iter().zip(buf.chunks_exact_mut(size)) {
            self.encode_into(record, layout, slot)?;
        }
        Ok(buf)
    }

    /// Decodes one record from exactly `layout.total_size()` bytes.
    pub fn decode(&self, bytes: &[u8], layout: &RecordLayout) -> Result<Record> {
        if bytes.len() != layout.total_size() {
            return Err(SynaError::EncodingSizeMismatch {
                expected: layout.total_size(),
                got: bytes.len(),
            });
        }

        Ok(layout
            .fields()
            .iter()
            .map(|field| self.read_value(&field.kind, &bytes[field.range()]))
            .collect())
    }

    /// Decodes a contiguous run of records.
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::EncodingSizeMismatch`] when `bytes` is not a
    /// whole number of records.
    pub fn decode_batch(&self, bytes: &[u8], layout: &RecordLayout) -> Result<Vec<Record>> {
        let size = layout.total_size();
        if size == 0 || bytes.len() % size != 0 {
            return Err(SynaError::EncodingSizeMismatch {
                expected: bytes.len() - bytes.len() % size.max(1),
                got: bytes.len(),
            });
        }
        bytes
            .chunks_exact(size)
            .map(|chunk| self.decode(chunk, layout))
            .collect()
    }

    /// Encodes a typed value against `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::EncodingSizeMismatch`] when the type's own layout
    /// size differs from `layout`.
    pub fn encode_item<T: Compound>(&self, item: &T, layout: &RecordLayout) -> Result<Vec<u8>> {
        check_item_size::<T>(layout)?;
        self.encode(&item.to_record(), layout)
    }

    /// Encodes typed values into one contiguous buffer.
    pub fn encode_items<T: Compound>(&self, items: &[T], layout: &RecordLayout) -> Result<Vec<u8>> {
        check_item_size::<T>(layout)?;
        let records: Vec<Record> = items.iter().map(Compound::to_record).collect();
        self.encode_batch(&records, layout)
    }

    /// Decodes a typed value.
    pub fn decode_item<T: Compound>(&self, bytes: &[u8], layout: &RecordLayout) -> Result<T> {
        T::from_record(&self.decode(bytes, layout)?)
    }

    fn write_value(&self, field: &str, kind: &FieldKind, value: &Value, out: &mut [u8]) -> Result<()> {
        match (kind, value) {
            (FieldKind::Primitive(ty), value) => write_numeric(field, *ty, value, out),
            (FieldKind::FixedText { .. }, Value::Text(text)) => {
                let bytes = truncate_utf8(text, out.len());
                out[..bytes.len()].copy_from_slice(bytes);
                out[bytes.len()..].fill(self.pad.byte());
                Ok(())
            }
            (FieldKind::FixedArray { element, count }, Value::Array(items)) => {
                let element_size = element.size();
                for (item, slot) in items.iter().take(*count).zip(out.chunks_exact_mut(element_size)) {
                    self.write_value(field, element, item, slot)?;
                }
                if items.len() < *count {
                    out[items.len() * element_size..].fill(0);
                }
                Ok(())
            }
            (FieldKind::Nested(sub), Value::Record(record)) => self.encode_into(record, sub, out),
            (kind, value) => Err(mismatch(field, kind, value)),
        }
    }

    fn read_value(&self, kind: &FieldKind, bytes: &[u8]) -> Value {
        match kind {
            FieldKind::Primitive(ty) => read_numeric(*ty, bytes),
            FieldKind::FixedText { .. } => {
                let pad = self.pad.byte();
                let end = bytes
                    .iter()
                    .rposition(|&b| b != pad && b != 0)
                    .map_or(0, |i| i + 1);
                Value::Text(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            FieldKind::FixedArray { element, .. } => Value::Array(
                bytes
                    .chunks_exact(element.size())
                    .map(|chunk| self.read_value(element, chunk))
                    .collect(),
            ),
            FieldKind::Nested(sub) => Value::Record(
                sub.fields()
                    .iter()
                    .map(|field| self.read_value(&field.kind, &bytes[field.range()]))
                    .collect(),
            ),
        }
    }
}

fn check_item_size<T: Compound>(layout: &RecordLayout) -> Result<()> {
    let own = T::layout()?;
    if own.total_size() != layout.total_size() {
        return Err(SynaError::EncodingSizeMismatch {
            expected: layout.total_size(),
            got: own.total_size(),
        });
    }
    Ok(())
}

fn mismatch(field: &str, kind: &FieldKind, value: &Value) -> SynaError {
    SynaError::ValueMismatch {
        field: field.to_string(),
        expected: kind.describe(),
        found: value.type_name().to_string(),
    }
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a character.
#[inline]
fn truncate_utf8(text: &str, max: usize) -> &[u8] {
    if text.len() <= max {
        return text.as_bytes();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text.as_bytes()[..end]
}

fn write_numeric(field: &str, ty: NumericType, value: &Value, out: &mut [u8]) -> Result<()> {
    match (ty, value) {
        (NumericType::U8, Value::U8(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::I8, Value::I8(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::U16, Value::U16(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::I16, Value::I16(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::U32, Value::U32(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::I32, Value::I32(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::U64, Value::U64(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::I64, Value::I64(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::F32, Value::F32(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::F64, Value::F64(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (NumericType::Bool, Value::Bool(v)) => out[0] = u8::from(*v),
        (ty, value) => return Err(mismatch(field, &FieldKind::Primitive(ty), value)),
    }
    Ok(())
}

macro_rules! le {
    ($ty:ty, $bytes:expr) => {{
        let mut arr = [0u8; std::mem::size_of::<$ty>()];
        arr.copy_from_slice($bytes);
        <$ty>::from_le_bytes(arr)
    }};
}

fn read_numeric(ty: NumericType, bytes: &[u8]) -> Value {
    match ty {
        NumericType::U8 => Value::U8(bytes[0]),
        NumericType::I8 => Value::I8(le!(i8, bytes)),
        NumericType::U16 => Value::U16(le!(u16, bytes)),
        NumericType::I16 => Value::I16(le!(i16, bytes)),
        NumericType::U32 => Value::U32(le!(u32, bytes)),
        NumericType::I32 => Value::I32(le!(i32, bytes)),
        NumericType::U64 => Value::U64(le!(u64, bytes)),
        NumericType::I64 => Value::I64(le!(i64, bytes)),
        NumericType::F32 => Value::F32(le!(f32, bytes)),
        NumericType::F64 => Value::F64(le!(f64, bytes)),
        NumericType::Bool => Value::Bool(bytes[0] != 0),
    }
}
