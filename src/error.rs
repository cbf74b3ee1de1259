//! Error types for compound record storage.
//!
//! This module provides:
//! - [`SynaError`] - The main error enum
//! - [`Result<T>`] - A type alias for `std::result::Result<T, SynaError>`
//!
//! Layout and codec errors always propagate to the caller. Store errors raised
//! while appending or reading are logged first and then either returned or
//! absorbed according to [`StoreSettings::throw_on_error`](crate::StoreSettings::throw_on_error).

/// Result type alias for compound storage operations.
pub type Result<T> = std::result::Result<T, SynaError>;

/// Error taxonomy for layout derivation, encoding, and dataset storage.
///
/// # Examples
///
/// ```rust
/// use syna_compound::{derive_layout, SynaError, TypeShape, ShapeType};
///
/// // Text without a declared maximum has no fixed binary size
/// let shape = TypeShape::new("event").field("note", ShapeType::VarText);
/// match derive_layout(&shape) {
///     Err(SynaError::UnsupportedFieldKind { field, .. }) => assert_eq!(field, "note"),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SynaError {
    /// I/O error from a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset metadata could not be serialized or parsed.
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// A field's semantic type has no fixed-size binary representation.
    #[error("Unsupported field kind for '{field}': {reason}")]
    UnsupportedFieldKind {
        /// Name of the offending field
        field: String,
        /// Why the field cannot be laid out
        reason: String,
    },

    /// A record's resolved layout size differs from the target layout.
    #[error("Encoding size mismatch: layout is {expected} bytes, record resolves to {got} bytes")]
    EncodingSizeMismatch {
        /// Size of the target layout in bytes
        expected: usize,
        /// Size resolved from the supplied record or buffer
        got: usize,
    },

    /// A record value does not fit the field it is written to.
    #[error("Value mismatch for '{field}': expected {expected}, found {found}")]
    ValueMismatch {
        /// Field name (or position) being encoded
        field: String,
        /// Kind required by the layout
        expected: String,
        /// Kind supplied by the record
        found: String,
    },

    /// An empty batch was presented where records are required.
    #[error("Empty batch for dataset: {0}")]
    EmptyBatch(String),

    /// The dataset handle has been closed.
    #[error("Dataset closed: {0}")]
    DatasetClosed(String),

    /// The dataset does not exist in the store.
    #[error("Dataset not found: {0}")]
    MissingDataset(String),

    /// The dataset already exists and overriding is disabled.
    #[error("Dataset already exists: {0}")]
    DatasetExists(String),

    /// Extending a dataset failed in the store.
    #[error("Extend failed for '{dataset}': {reason}")]
    ExtendFailed {
        /// Dataset name
        dataset: String,
        /// Store-reported cause
        reason: String,
    },

    /// Writing a region failed in the store.
    #[error("Write failed for '{dataset}': {reason}")]
    WriteFailed {
        /// Dataset name
        dataset: String,
        /// Store-reported cause
        reason: String,
    },

    /// Reading a region failed in the store.
    #[error("Read failed for '{dataset}': {reason}")]
    ReadFailed {
        /// Dataset name
        dataset: String,
        /// Store-reported cause
        reason: String,
    },

    /// Records of one layout were presented to a dataset of another.
    #[error("Layout mismatch for '{dataset}': {reason}")]
    LayoutMismatch {
        /// Dataset name
        dataset: String,
        /// Description of the difference
        reason: String,
    },

    /// A row range lies outside the dataset's current extent.
    #[error("Row range {start}..{end} out of bounds (extent {extent})")]
    RowRangeOutOfBounds {
        /// First row of the requested range
        start: u64,
        /// One past the last row of the requested range
        end: u64,
        /// Current extent in rows
        extent: u64,
    },

    /// Dataset names must be non-empty relative paths.
    #[error("Invalid dataset name: {0}")]
    InvalidName(String),

    /// The background writer no longer accepts records.
    #[error("Writer closed")]
    WriterClosed,
}
