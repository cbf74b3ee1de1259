// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Core layout types for compound records.
//!
//! This module defines the resolved, fixed-size description of a record:
//! - [`NumericType`] - Fixed-width numeric representations
//! - [`FieldKind`] - Binary kind of one field (numeric, text, array, nested)
//! - [`FieldDescriptor`] - One field with its resolved size and offset
//! - [`RecordLayout`] - Ordered fields plus the total record size
//! - [`FlatField`] - One entry of the flattened table a store registers
//!
//! Layouts are produced by [`derive_layout`](crate::layout::derive_layout);
//! they cannot be built field by field, so every `RecordLayout` satisfies the
//! packing invariant below.
//!
//! # Binary Layout
//!
//! Fields are packed in declaration order with no padding:
//!
//! ```text
//! offset[0] = 0
//! offset[i] = offset[i-1] + size[i-1]
//! total     = sum(size)
//! ```
//!
//! Numeric values are little-endian. Text is a fixed-length byte run padded
//! with the configured [`TextPad`](crate::TextPad) byte. Arrays store their
//! elements contiguously and nested records are stored inline.

use serde::{Deserialize, Serialize};

/// Fixed-width numeric representation of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericType {
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 64-bit integer.
    I64,
    /// 32-bit IEEE float.
    F32,
    /// 64-bit IEEE float.
    F64,
    /// Boolean stored as one byte (0 or 1).
    Bool,
}

impl NumericType {
    /// Returns the size in bytes for this numeric type.
    pub fn size(&self) -> usize {
        match self {
            NumericType::U8 | NumericType::I8 | NumericType::Bool => 1,
            NumericType::U16 | NumericType::I16 => 2,
            NumericType::U32 | NumericType::I32 | NumericType::F32 => 4,
            NumericType::U64 | NumericType::I64 | NumericType::F64 => 8,
        }
    }

    /// Returns the type name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            NumericType::U8 => "u8",
            NumericType::I8 => "i8",
            NumericType::U16 => "u16",
            NumericType::I16 => "i16",
            NumericType::U32 => "u32",
            NumericType::I32 => "i32",
            NumericType::U64 => "u64",
            NumericType::I64 => "i64",
            NumericType::F32 => "f32",
            NumericType::F64 => "f64",
            NumericType::Bool => "bool",
        }
    }
}

/// Binary kind of a resolved field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A single fixed-width number.
    Primitive(NumericType),
    /// Text truncated or padded to exactly `max_bytes` bytes.
    FixedText {
        /// Declared byte length of the field
        max_bytes: usize,
    },
    /// `count` contiguous elements of one kind.
    FixedArray {
        /// Kind of every element
        element: Box<FieldKind>,
        /// Declared number of elements
        count: usize,
    },
    /// A sub-record stored inline.
    Nested(RecordLayout),
}

impl FieldKind {
    /// Returns the resolved size in bytes.
    pub fn size(&self) -> usize {
        match self {
            FieldKind::Primitive(n) => n.size(),
            FieldKind::FixedText { max_bytes } => *max_bytes,
            FieldKind::FixedArray { element, count } => element.size() * count,
            FieldKind::Nested(layout) => layout.total_size(),
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            FieldKind::Primitive(n) => n.name().to_string(),
            FieldKind::FixedText { max_bytes } => format!("text[{}]", max_bytes),
            FieldKind::FixedArray { element, count } => {
                format!("{}[{}]", element.describe(), count)
            }
            FieldKind::Nested(layout) => format!("record {}", layout.name()),
        }
    }

    fn flat_kind(&self) -> FlatKind {
        match self {
            FieldKind::Primitive(n) => FlatKind::Numeric(*n),
            FieldKind::FixedText { max_bytes } => FlatKind::Text {
                max_bytes: *max_bytes,
            },
            FieldKind::FixedArray { element, count } => FlatKind::Array {
                element: Box::new(element.flat_kind()),
                count: *count,
            },
            FieldKind::Nested(layout) => FlatKind::Compound {
                size: layout.total_size(),
                fields: layout.flatten(),
            },
        }
    }
}

/// One field of a resolved record layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Canonical identifier.
    pub name: String,
    /// Persisted field name (defaults to `name`).
    pub display_name: String,
    /// Binary kind.
    pub kind: FieldKind,
    /// Resolved size in bytes.
    pub size_bytes: usize,
    /// Byte offset within the enclosing record.
    pub offset: usize,
}

impl FieldDescriptor {
    /// Returns the byte range this field occupies in its enclosing record.
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size_bytes
    }
}

/// Ordered, packed field list of a record type.
///
/// A layout is immutable once derived. Deriving the same
/// [`TypeShape`](crate::TypeShape) twice yields equal layouts.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    name: String,
    fields: Vec<FieldDescriptor>,
    total_size_bytes: usize,
}

impl RecordLayout {
    /// Packs `fields` sequentially, assigning offsets and the total size.
    ///
    /// Any offsets already present on `fields` are overwritten.
    pub(crate) fn packed(name: impl Into<String>, mut fields: Vec<FieldDescriptor>) -> Self {
        let mut offset = 0usize;
        for field in &mut fields {
            field.offset = offset;
            offset += field.size_bytes;
        }
        Self {
            name: name.into(),
            fields,
            total_size_bytes: offset,
        }
    }

    /// Name of the record type this layout was derived from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Total record size in bytes.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size_bytes
    }

    /// Number of top-level fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the layout has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a top-level field by canonical or display name.
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name || f.display_name == name)
    }

    /// Flattens the layout into the single field table a store registers.
    ///
    /// Nested records are expanded into their leaf fields with offsets
    /// relative to the start of this record and dotted display names
    /// (`outer.inner`). Arrays remain one entry; an array of records carries
    /// the element's own flat table with element-relative offsets.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use syna_compound::{derive_layout, NumericType, ShapeType, TypeShape};
    ///
    /// let point = TypeShape::new("point")
    ///     .field("x", ShapeType::Numeric(NumericType::F32))
    ///     .field("y", ShapeType::Numeric(NumericType::F32));
    /// let shape = TypeShape::new("sample")
    ///     .field("id", ShapeType::Numeric(NumericType::U16))
    ///     .field("pos", ShapeType::Nested(point));
    ///
    /// let flat = derive_layout(&shape).unwrap().flatten();
    /// let names: Vec<_> = flat.iter().map(|f| (f.name.as_str(), f.offset)).collect();
    /// assert_eq!(names, vec![("id", 0), ("pos.x", 2), ("pos.y", 6)]);
    /// ```
    pub fn flatten(&self) -> Vec<FlatField> {
        let mut out = Vec::new();
        self.flatten_into("", 0, &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, base: usize, out: &mut Vec<FlatField>) {
        for field in &self.fields {
            let name = if prefix.is_empty() {
                field.display_name.clone()
            } else {
                format!("{}.{}", prefix, field.display_name)
            };
            match &field.kind {
                FieldKind::Nested(sub) => sub.flatten_into(&name, base + field.offset, out),
                kind => out.push(FlatField {
                    name,
                    offset: base + field.offset,
                    size: field.size_bytes,
                    kind: kind.flat_kind(),
                }),
            }
        }
    }
}

/// Kind of an entry in a flattened field table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlatKind {
    /// Fixed-width number.
    Numeric(NumericType),
    /// Fixed-length text.
    Text {
        /// Byte length
        max_bytes: usize,
    },
    /// Fixed-length array.
    Array {
        /// Element kind
        element: Box<FlatKind>,
        /// Element count
        count: usize,
    },
    /// Array element that is itself a record.
    Compound {
        /// Element size in bytes
        size: usize,
        /// Element fields, offsets relative to the element start
        fields: Vec<FlatField>,
    },
}

/// One entry of a flattened field table with an absolute offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatField {
    /// Dotted persisted name.
    pub name: String,
    /// Byte offset from the record start.
    pub offset: usize,
    /// Size in bytes.
    pub size: usize,
    /// Binary kind.
    pub kind: FlatKind,
}
