// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Container store boundary.
//!
//! The append engine and batch reader never touch files directly; they talk
//! to a [`ContainerStore`], which owns named growable datasets of fixed-size
//! rows. Two backends ship with the crate:
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`MemoryStore`] | In-process datasets with I/O counters, for tests and buffering |
//! | [`FileStore`] | Directory-backed persistent datasets with mmap reads |
//!
//! Stores take `&self` and lock internally, so one store can be shared by
//! engines writing different datasets from different threads. Writers of the
//! same dataset must still be serialized by the caller (see
//! [`ChunkedCompound`](crate::ChunkedCompound)).

use std::ops::Range;

use crate::error::{Result, SynaError};
use crate::types::{FlatField, RecordLayout};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, StoreStats};

/// Handle to an open dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(pub u64);

/// Handle to a registered record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(pub u64);

/// Description of an existing dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    /// Handle for region operations.
    pub id: DatasetId,
    /// Normalized dataset name.
    pub name: String,
    /// Current extent in rows.
    pub extent_rows: u64,
    /// Size of one row in bytes.
    pub record_size: usize,
    /// Storage growth unit in rows.
    pub chunk_rows: u64,
    /// Flat field table registered at creation.
    pub fields: Vec<FlatField>,
}

/// Storage primitives required by the append engine and batch reader.
///
/// Row ranges are half-open. Region reads and writes must lie inside the
/// dataset's current extent; writes must supply exactly
/// `rows.len() * record_size` bytes.
pub trait ContainerStore: Send + Sync {
    /// Registers the flat field table of `layout` and returns its handle.
    fn register_type(&self, layout: &RecordLayout) -> Result<TypeHandle>;

    /// Creates a dataset of `initial_rows` rows that grows in `chunk_rows` units.
    ///
    /// Fails with [`SynaError::DatasetExists`] if the name is taken.
    fn create_dataset(
        &self,
        name: &str,
        ty: TypeHandle,
        initial_rows: u64,
        chunk_rows: u64,
    ) -> Result<DatasetId>;

    /// Opens an existing dataset, or returns `None` if there is none.
    fn open_dataset(&self, name: &str) -> Result<Option<DatasetInfo>>;

    /// Returns `true` if a dataset with this name exists.
    fn dataset_exists(&self, name: &str) -> Result<bool>;

    /// Removes a dataset. Returns `false` if it did not exist.
    fn delete_dataset(&self, name: &str) -> Result<bool>;

    /// Sets the extent of a dataset to `new_rows`.
    fn extend_dataset(&self, id: DatasetId, new_rows: u64) -> Result<()>;

    /// Writes `bytes` into the selected rows.
    fn write_region(&self, id: DatasetId, rows: Range<u64>, bytes: &[u8]) -> Result<()>;

    /// Reads the selected rows.
    fn read_region(&self, id: DatasetId, rows: Range<u64>) -> Result<Vec<u8>>;

    /// Makes completed writes durable.
    fn flush(&self, id: DatasetId) -> Result<()>;

    /// Releases the handle. The dataset itself is kept.
    fn close_dataset(&self, id: DatasetId) -> Result<()>;

    /// Names of all datasets, sorted.
    fn list_datasets(&self) -> Result<Vec<String>>;
}

/// Validates a dataset name and strips leading separators.
///
/// Names are `/`-separated relative paths such as `ecg/means_events`.
pub(crate) fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(SynaError::InvalidName(name.to_string()));
    }
    for part in trimmed.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
            return Err(SynaError::InvalidName(name.to_string()));
        }
    }
    Ok(trimmed.to_string())
}

/// Checks a region request against the extent and the buffer length.
pub(crate) fn check_region(
    rows: &Range<u64>,
    extent: u64,
    record_size: usize,
    bytes: Option<usize>,
) -> Result<()> {
    if rows.start > rows.end || rows.end > extent {
        return Err(SynaError::RowRangeOutOfBounds {
            start: rows.start,
            end: rows.end,
            extent,
        });
    }
    if let Some(len) = bytes {
        let expected = (rows.end - rows.start) as usize * record_size;
        if len != expected {
            return Err(SynaError::EncodingSizeMismatch { expected, got: len });
        }
    }
    Ok(())
}
