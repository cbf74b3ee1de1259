// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Layout descriptor builder.
//!
//! Callers describe a record type statically with a [`TypeShape`] and derive
//! its packed [`RecordLayout`] with [`derive_layout`]:
//!
//! ```rust
//! use syna_compound::{derive_layout, NumericType, ShapeType, TypeShape};
//!
//! let shape = TypeShape::new("system_event")
//!     .field("kind", ShapeType::Numeric(NumericType::I32))
//!     .field_as("timestamp", "time_stamp", ShapeType::Numeric(NumericType::I64))
//!     .field("data", ShapeType::text(12));
//!
//! let layout = derive_layout(&shape).unwrap();
//! assert_eq!(layout.total_size(), 24);
//! assert_eq!(layout.fields()[2].offset, 12);
//! assert_eq!(layout.fields()[1].display_name, "time_stamp");
//! ```

use std::collections::HashSet;

use crate::error::{Result, SynaError};
use crate::types::{FieldDescriptor, FieldKind, NumericType, RecordLayout};

/// Semantic type of a field as declared by the caller.
///
/// Variable-length variants exist so a shape can be described faithfully;
/// they are rejected by [`derive_layout`] because they have no fixed size.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeType {
    /// Fixed-width number.
    Numeric(NumericType),
    /// Text with a declared maximum byte length.
    Text {
        /// Byte length of the stored field
        max_bytes: usize,
    },
    /// Text without a declared maximum.
    VarText,
    /// Array with a declared element count.
    Array {
        /// Element type
        element: Box<ShapeType>,
        /// Element count
        count: usize,
    },
    /// Array without a declared element count.
    VarArray(Box<ShapeType>),
    /// A sub-record.
    Nested(TypeShape),
}

impl ShapeType {
    /// Text field of `max_bytes` bytes.
    pub fn text(max_bytes: usize) -> Self {
        ShapeType::Text { max_bytes }
    }

    /// Array of `count` elements of `element`.
    pub fn array(element: ShapeType, count: usize) -> Self {
        ShapeType::Array {
            element: Box::new(element),
            count,
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    /// Canonical identifier.
    pub name: String,
    /// Persisted name override.
    pub display_name: Option<String>,
    /// Semantic type.
    pub ty: ShapeType,
}

/// Static description of a record type: a name and ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeShape {
    name: String,
    fields: Vec<FieldShape>,
}

impl TypeShape {
    /// Starts an empty shape.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field persisted under its own name.
    pub fn field(mut self, name: impl Into<String>, ty: ShapeType) -> Self {
        self.fields.push(FieldShape {
            name: name.into(),
            display_name: None,
            ty,
        });
        self
    }

    /// Appends a field persisted under `display_name`.
    pub fn field_as(
        mut self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        ty: ShapeType,
    ) -> Self {
        self.fields.push(FieldShape {
            name: name.into(),
            display_name: Some(display_name.into()),
            ty,
        });
        self
    }

    /// Name of the record type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in order.
    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }
}

/// Derives the packed layout of `shape`.
///
/// Fields keep declaration order with no alignment padding. Nested shapes
/// are derived recursively and contribute their total size to the parent.
///
/// # Errors
///
/// Returns [`SynaError::UnsupportedFieldKind`] for variable-length text or
/// arrays, zero-length text or arrays, records without fields, sizes that
/// overflow `usize`, and duplicate persisted names in the flattened table.
pub fn derive_layout(shape: &TypeShape) -> Result<RecordLayout> {
    if shape.fields.is_empty() {
        return Err(SynaError::UnsupportedFieldKind {
            field: shape.name.clone(),
            reason: "record has no fields".to_string(),
        });
    }

    let mut total = 0usize;
    let mut fields = Vec::with_capacity(shape.fields.len());
    for field in &shape.fields {
        let display_name = field
            .display_name
            .clone()
            .unwrap_or_else(|| field.name.clone());
        let kind = resolve_kind(&field.name, &field.ty)?;
        let size_bytes = kind.size();
        total = total
            .checked_add(size_bytes)
            .ok_or_else(|| SynaError::UnsupportedFieldKind {
                field: field.name.clone(),
                reason: format!("record {} is larger than usize::MAX bytes", shape.name),
            })?;
        fields.push(FieldDescriptor {
            name: field.name.clone(),
            display_name,
            size_bytes,
            kind,
            offset: 0,
        });
    }

    let layout = RecordLayout::packed(shape.name.clone(), fields);

    // `pos.x` declared next to a nested `pos { x }` collides only once flattened.
    let mut seen = HashSet::new();
    for flat in layout.flatten() {
        if !seen.insert(flat.name.clone()) {
            return Err(SynaError::UnsupportedFieldKind {
                field: flat.name.clone(),
                reason: format!("duplicate field name '{}' in {}", flat.name, shape.name),
            });
        }
    }
    Ok(layout)
}

fn resolve_kind(field: &str, ty: &ShapeType) -> Result<FieldKind> {
    let unsupported = |reason: &str| SynaError::UnsupportedFieldKind {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    match ty {
        ShapeType::Numeric(n) => Ok(FieldKind::Primitive(*n)),
        ShapeType::Text { max_bytes: 0 } => Err(unsupported("text length must be at least 1 byte")),
        ShapeType::Text { max_bytes } => Ok(FieldKind::FixedText {
            max_bytes: *max_bytes,
        }),
        ShapeType::VarText => Err(unsupported("text requires a declared maximum byte length")),
        ShapeType::Array { count: 0, .. } => Err(unsupported("array count must be at least 1")),
        ShapeType::Array { element, count } => {
            let element = resolve_kind(field, element)?;
            if element.size().checked_mul(*count).is_none() {
                return Err(unsupported("array size overflows usize"));
            }
            Ok(FieldKind::FixedArray {
                element: Box::new(element),
                count: *count,
            })
        }
        ShapeType::VarArray(_) => Err(unsupported("array requires a declared element count")),
        ShapeType::Nested(sub) => Ok(FieldKind::Nested(derive_layout(sub)?)),
    }
}
