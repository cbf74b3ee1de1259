// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Chunked append engine.
//!
//! [`ChunkedCompound`] turns a sequence of record batches into one growable
//! dataset:
//!
//! - The first non-empty batch creates the dataset with a chunk size of
//!   [`initial_chunk_rows`] and writes rows `[0, n)` in one region write.
//! - Every later batch extends the dataset to `extent + n` and writes exactly
//!   the new region `[extent, extent + n)`.
//! - [`append_or_create`](ChunkedCompound::append_or_create) picks the right
//!   path from the cached handle state, so callers never query the store for
//!   existence.
//!
//! Row order is the concatenation order of all batches. The engine takes
//! `&mut self` for every write, which serializes extend+write per handle.
//!
//! # Store failures
//!
//! Extend, write and flush failures are logged and then either returned or
//! absorbed according to [`StoreSettings::throw_on_error`]. When absorbed, the
//! call returns the unchanged extent and the batch is dropped. Layout and
//! codec errors always propagate.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use syna_compound::store::MemoryStore;
//! use syna_compound::{derive_layout, ChunkedCompound, NumericType, Record, ShapeType, StoreSettings, TypeShape};
//!
//! let layout = derive_layout(
//!     &TypeShape::new("event")
//!         .field("t", ShapeType::Numeric(NumericType::I64))
//!         .field("code", ShapeType::Numeric(NumericType::U16)),
//! )
//! .unwrap();
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut events = ChunkedCompound::new(store, "ecg/events", layout, StoreSettings::default()).unwrap();
//!
//! let batch: Vec<Record> = (0..3).map(|i| Record::new().with(i as i64).with(7u16)).collect();
//! assert_eq!(events.append_or_create(&batch).unwrap(), 3);
//! assert_eq!(events.append_or_create(&batch).unwrap(), 6);
//! assert_eq!(events.append_or_create(&[]).unwrap(), 6);
//! ```

use std::sync::Arc;

use crate::codec::CompoundCodec;
use crate::config::StoreSettings;
use crate::error::{Result, SynaError};
use crate::reader::{batch_rows, BatchReader, Records};
use crate::store::{validate_name, ContainerStore, DatasetId};
use crate::types::RecordLayout;
use crate::value::{Compound, Record};

/// Upper bound for the heuristic chunk size, in rows.
pub const MAX_INITIAL_CHUNK_ROWS: u64 = 1000;

/// Chunk size for a dataset whose first batch has `batch_rows` rows.
///
/// Returns the largest power of ten not above `batch_rows`, capped at
/// [`MAX_INITIAL_CHUNK_ROWS`]. Never returns zero.
///
/// ```rust
/// use syna_compound::initial_chunk_rows;
///
/// assert_eq!(initial_chunk_rows(1), 1);
/// assert_eq!(initial_chunk_rows(9), 1);
/// assert_eq!(initial_chunk_rows(10), 10);
/// assert_eq!(initial_chunk_rows(250), 100);
/// assert_eq!(initial_chunk_rows(1_000_000), 1000);
/// ```
pub fn initial_chunk_rows(batch_rows: u64) -> u64 {
    if batch_rows == 0 {
        return 1;
    }
    10u64.pow(batch_rows.ilog10()).min(MAX_INITIAL_CHUNK_ROWS)
}

/// Lifecycle of a dataset handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    /// No dataset yet; the next non-empty batch creates it.
    Uninitialized,
    /// Created by the first batch.
    Created,
    /// At least one append after creation, or reattached to an existing dataset.
    Extended,
    /// Released; every further operation fails with [`SynaError::DatasetClosed`].
    Closed,
}

/// Append-only writer for one dataset of fixed-layout records.
pub struct ChunkedCompound<S: ContainerStore> {
    store: Arc<S>,
    name: String,
    layout: RecordLayout,
    codec: CompoundCodec,
    settings: StoreSettings,
    dataset: Option<DatasetId>,
    state: DatasetState,
    extent: u64,
    chunk_rows: u64,
}

impl<S: ContainerStore> ChunkedCompound<S> {
    /// Creates an uninitialized handle. Nothing touches the store until the
    /// first non-empty batch.
    pub fn new(
        store: Arc<S>,
        name: &str,
        layout: RecordLayout,
        settings: StoreSettings,
    ) -> Result<Self> {
        let name = validate_name(&settings.normalize_name(name))?;
        Ok(Self {
            store,
            name,
            layout,
            codec: CompoundCodec::new(settings.text_pad),
            settings,
            dataset: None,
            state: DatasetState::Uninitialized,
            extent: 0,
            chunk_rows: 0,
        })
    }

    /// Reattaches to a dataset that already exists in the store.
    ///
    /// # Errors
    ///
    /// - [`SynaError::MissingDataset`] if there is no such dataset
    /// - [`SynaError::LayoutMismatch`] if its stored field table differs from `layout`
    pub fn open_existing(
        store: Arc<S>,
        name: &str,
        layout: RecordLayout,
        settings: StoreSettings,
    ) -> Result<Self> {
        let mut handle = Self::new(store, name, layout, settings)?;
        if !handle.attach()? {
            return Err(SynaError::MissingDataset(handle.name.clone()));
        }
        Ok(handle)
    }

    /// Reattaches to an existing dataset, or returns an uninitialized handle
    /// if there is none yet.
    pub fn open_or_new(
        store: Arc<S>,
        name: &str,
        layout: RecordLayout,
        settings: StoreSettings,
    ) -> Result<Self> {
        let mut handle = Self::new(store, name, layout, settings)?;
        handle.attach()?;
        Ok(handle)
    }

    fn attach(&mut self) -> Result<bool> {
        let Some(info) = self.store.open_dataset(&self.name)? else {
            return Ok(false);
        };
        if info.record_size != self.layout.total_size() || info.fields != self.layout.flatten() {
            let _ = self.store.close_dataset(info.id);
            return Err(SynaError::LayoutMismatch {
                dataset: self.name.clone(),
                reason: format!(
                    "stored record is {} bytes with {} fields, layout '{}' is {} bytes with {} fields",
                    info.record_size,
                    info.fields.len(),
                    self.layout.name(),
                    self.layout.total_size(),
                    self.layout.flatten().len()
                ),
            });
        }
        tracing::debug!(
            dataset = %self.name,
            extent = info.extent_rows,
            chunk_rows = info.chunk_rows,
            "Reattached to existing dataset"
        );
        self.dataset = Some(info.id);
        self.extent = info.extent_rows;
        self.chunk_rows = info.chunk_rows;
        self.state = DatasetState::Extended;
        Ok(true)
    }

    /// Normalized dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout of the records in this dataset.
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Settings this handle was created with.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Current handle state.
    pub fn state(&self) -> DatasetState {
        self.state
    }

    /// Rows written so far. Never decreases.
    pub fn current_extent(&self) -> u64 {
        self.extent
    }

    /// Chunk size chosen at creation, or 0 before the dataset exists.
    pub fn chunk_rows(&self) -> u64 {
        self.chunk_rows
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates the dataset from its first batch.
    ///
    /// # Errors
    ///
    /// - [`SynaError::EmptyBatch`] for an empty batch (also logged as a warning)
    /// - [`SynaError::DatasetExists`] if the handle already has a dataset or
    ///   the store already holds one under this name
    /// - [`SynaError::WriteFailed`] on store failure when `throw_on_error` is set
    pub fn create_first(&mut self, records: &[Record]) -> Result<u64> {
        self.ensure_open()?;
        if records.is_empty() {
            self.warn_empty();
            return Err(SynaError::EmptyBatch(self.name.clone()));
        }
        if self.state != DatasetState::Uninitialized {
            return Err(SynaError::DatasetExists(self.name.clone()));
        }

        let bytes = self.codec.encode_batch(records, &self.layout)?;
        let rows = records.len() as u64;
        let chunk_rows = initial_chunk_rows(rows);

        let ty = match self.store.register_type(&self.layout) {
            Ok(ty) => ty,
            Err(e) => return self.absorb(FailedOp::Write, e),
        };
        let id = match self.store.create_dataset(&self.name, ty, rows, chunk_rows) {
            Ok(id) => id,
            Err(e @ SynaError::DatasetExists(_)) => return Err(e),
            Err(e) => return self.absorb(FailedOp::Write, e),
        };

        if let Err(e) = self.store.write_region(id, 0..rows, &bytes) {
            // Leave no zero-filled dataset behind; the handle stays uninitialized.
            let _ = self.store.close_dataset(id);
            let _ = self.store.delete_dataset(&self.name);
            return self.absorb(FailedOp::Write, e);
        }

        tracing::debug!(
            dataset = %self.name,
            rows,
            chunk_rows,
            record_size = self.layout.total_size(),
            "Created dataset"
        );
        self.dataset = Some(id);
        self.chunk_rows = chunk_rows;
        self.extent = rows;
        self.state = DatasetState::Created;
        Ok(self.extent)
    }

    /// Appends a batch to an existing dataset and returns the new extent.
    ///
    /// An empty batch is logged and leaves the dataset unchanged.
    ///
    /// # Errors
    ///
    /// - [`SynaError::MissingDataset`] if the dataset has not been created yet
    /// - [`SynaError::ExtendFailed`] / [`SynaError::WriteFailed`] on store failure
    ///   when `throw_on_error` is set
    pub fn append(&mut self, records: &[Record]) -> Result<u64> {
        self.ensure_open()?;
        if records.is_empty() {
            self.warn_empty();
            return Ok(self.extent);
        }
        let Some(id) = self.dataset else {
            return Err(SynaError::MissingDataset(self.name.clone()));
        };

        let bytes = self.codec.encode_batch(records, &self.layout)?;
        let start = self.extent;
        let end = start + records.len() as u64;

        if let Err(e) = self.store.extend_dataset(id, end) {
            return self.absorb(FailedOp::Extend, e);
        }
        if let Err(e) = self.store.write_region(id, start..end, &bytes) {
            // Give back the unwritten rows so the stored extent matches ours.
            let _ = self.store.extend_dataset(id, start);
            return self.absorb(FailedOp::Write, e);
        }

        tracing::trace!(dataset = %self.name, start, end, "Appended region");
        self.extent = end;
        self.state = DatasetState::Extended;
        Ok(self.extent)
    }

    /// Creates the dataset on the first non-empty batch and appends afterwards.
    ///
    /// Returns the extent after the call. Empty batches are logged no-ops.
    pub fn append_or_create(&mut self, records: &[Record]) -> Result<u64> {
        self.ensure_open()?;
        if records.is_empty() {
            self.warn_empty();
            return Ok(self.extent);
        }
        match self.state {
            DatasetState::Uninitialized => self.create_first(records),
            _ => self.append(records),
        }
    }

    /// Typed [`append`](Self::append).
    pub fn append_items<T: Compound>(&mut self, items: &[T]) -> Result<u64> {
        self.check_item_layout::<T>()?;
        let records: Vec<Record> = items.iter().map(Compound::to_record).collect();
        self.append(&records)
    }

    /// Typed [`append_or_create`](Self::append_or_create).
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::LayoutMismatch`] when `T`'s layout differs from the
    /// dataset's.
    pub fn append_or_create_items<T: Compound>(&mut self, items: &[T]) -> Result<u64> {
        self.check_item_layout::<T>()?;
        let records: Vec<Record> = items.iter().map(Compound::to_record).collect();
        self.append_or_create(&records)
    }

    /// Makes every completed append durable.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        let Some(id) = self.dataset else {
            return Ok(());
        };
        if let Err(e) = self.store.flush(id) {
            self.absorb(FailedOp::Write, e)?;
        }
        Ok(())
    }

    /// Releases the dataset handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == DatasetState::Closed {
            return Ok(());
        }
        self.state = DatasetState::Closed;
        if let Some(id) = self.dataset.take() {
            self.store.close_dataset(id)?;
            tracing::debug!(dataset = %self.name, extent = self.extent, "Closed dataset");
        }
        Ok(())
    }

    /// Reads every record written so far, lazily.
    pub fn read_all(&self, mandatory: bool) -> Result<Records<'_, S>> {
        self.ensure_open()?;
        BatchReader::new(self.store.as_ref(), self.settings.clone()).read_all(
            &self.name,
            &self.layout,
            mandatory,
        )
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == DatasetState::Closed {
            return Err(SynaError::DatasetClosed(self.name.clone()));
        }
        Ok(())
    }

    fn check_item_layout<T: Compound>(&self) -> Result<()> {
        let item = T::layout()?;
        if item.flatten() != self.layout.flatten() {
            return Err(SynaError::LayoutMismatch {
                dataset: self.name.clone(),
                reason: format!(
                    "record type '{}' does not match layout '{}'",
                    item.name(),
                    self.layout.name()
                ),
            });
        }
        Ok(())
    }

    fn warn_empty(&self) {
        if self.settings.error_logging {
            tracing::warn!(dataset = %self.name, "Empty batch, nothing to write");
        }
    }

    /// Logs a store failure and applies the `throw_on_error` policy.
    fn absorb(&self, op: FailedOp, err: SynaError) -> Result<u64> {
        absorb_failure(&self.settings, &self.name, op, err).map(|()| self.extent)
    }
}

impl<S: ContainerStore> Drop for ChunkedCompound<S> {
    fn drop(&mut self) {
        if let Some(id) = self.dataset.take() {
            let _ = self.store.close_dataset(id);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FailedOp {
    Extend,
    Write,
    Read,
}

impl FailedOp {
    pub(crate) fn wrap(self, dataset: &str, err: SynaError) -> SynaError {
        let dataset = dataset.to_string();
        let reason = err.to_string();
        match self {
            FailedOp::Extend => SynaError::ExtendFailed { dataset, reason },
            FailedOp::Write => SynaError::WriteFailed { dataset, reason },
            FailedOp::Read => SynaError::ReadFailed { dataset, reason },
        }
    }
}

/// Wraps and logs a store failure, then returns it or swallows it.
///
/// The error event is emitted regardless of [`StoreSettings::error_logging`],
/// so an absorbed failure always leaves a trace.
pub(crate) fn absorb_failure(
    settings: &StoreSettings,
    dataset: &str,
    op: FailedOp,
    err: SynaError,
) -> Result<()> {
    let err = match err {
        e @ (SynaError::ExtendFailed { .. }
        | SynaError::WriteFailed { .. }
        | SynaError::ReadFailed { .. }) => e,
        e => op.wrap(dataset, e),
    };
    tracing::error!(dataset = %dataset, error = %err, "Store operation failed");
    if settings.throw_on_error {
        Err(err)
    } else {
        Ok(())
    }
}

/// Writes a complete collection into a fresh dataset in one region write.
///
/// With [`StoreSettings::override_existing`] an existing dataset of the same
/// name is deleted first; otherwise it fails with [`SynaError::DatasetExists`].
/// Returns the number of rows written (0 for an empty collection, which is
/// logged and skipped). A store failure part way removes the dataset again.
pub fn write_compounds<S: ContainerStore + ?Sized>(
    store: &S,
    name: &str,
    layout: &RecordLayout,
    records: &[Record],
    settings: &StoreSettings,
) -> Result<u64> {
    let Some(name) = prepare_one_shot(store, name, records, settings)? else {
        return Ok(0);
    };
    write_sliced(store, &name, layout, records, settings, records.len())
}

/// Writes a complete collection with bounded memory.
///
/// Like [`write_compounds`], but never encodes more than
/// [`StoreSettings::max_write_bytes`] at once: the dataset is created from
/// the first slice and every later slice is appended with its own extend and
/// region write. A collection below the ceiling is written in one region.
///
/// ```rust
/// use syna_compound::store::MemoryStore;
/// use syna_compound::{derive_layout, write_large_compounds, NumericType, Record, ShapeType, StoreSettings, TypeShape};
///
/// let layout = derive_layout(&TypeShape::new("v").field("v", ShapeType::Numeric(NumericType::U32))).unwrap();
/// let records: Vec<Record> = (0..10u32).map(|i| Record::new().with(i)).collect();
/// let settings = StoreSettings { max_write_bytes: 16, ..Default::default() };
///
/// let store = MemoryStore::new();
/// assert_eq!(write_large_compounds(&store, "values", &layout, &records, &settings).unwrap(), 10);
/// // 4 rows per slice: one create plus two appends
/// assert_eq!(store.stats().region_writes, 3);
/// ```
pub fn write_large_compounds<S: ContainerStore + ?Sized>(
    store: &S,
    name: &str,
    layout: &RecordLayout,
    records: &[Record],
    settings: &StoreSettings,
) -> Result<u64> {
    let Some(name) = prepare_one_shot(store, name, records, settings)? else {
        return Ok(0);
    };
    let slice_rows = batch_rows(records.len() as u64, layout.total_size(), settings.max_write_bytes);
    write_sliced(store, &name, layout, records, settings, slice_rows as usize)
}

/// Resolves the name and applies the empty and override rules. `None` means
/// there is nothing to write.
fn prepare_one_shot<S: ContainerStore + ?Sized>(
    store: &S,
    name: &str,
    records: &[Record],
    settings: &StoreSettings,
) -> Result<Option<String>> {
    let name = validate_name(&settings.normalize_name(name))?;
    if records.is_empty() {
        if settings.error_logging {
            tracing::warn!(dataset = %name, "Empty collection, nothing to write");
        }
        return Ok(None);
    }

    if store.dataset_exists(&name)? {
        if !settings.override_existing {
            return Err(SynaError::DatasetExists(name));
        }
        tracing::debug!(dataset = %name, "Replacing existing dataset");
        store.delete_dataset(&name)?;
    }
    Ok(Some(name))
}

fn write_sliced<S: ContainerStore + ?Sized>(
    store: &S,
    name: &str,
    layout: &RecordLayout,
    records: &[Record],
    settings: &StoreSettings,
    slice_rows: usize,
) -> Result<u64> {
    let codec = CompoundCodec::new(settings.text_pad);
    let mut slices = records.chunks(slice_rows.max(1));
    let Some(first) = slices.next() else {
        return Ok(0);
    };
    let first_bytes = codec.encode_batch(first, layout)?;
    let first_rows = first.len() as u64;
    let chunk_rows = initial_chunk_rows(first_rows);

    let ty = match store.register_type(layout) {
        Ok(ty) => ty,
        Err(e) => return absorb_failure(settings, name, FailedOp::Write, e).map(|()| 0),
    };
    let id = match store.create_dataset(name, ty, first_rows, chunk_rows) {
        Ok(id) => id,
        Err(e @ SynaError::DatasetExists(_)) => return Err(e),
        Err(e) => return absorb_failure(settings, name, FailedOp::Write, e).map(|()| 0),
    };

    let filled = fill_slices(store, id, name, &codec, layout, &first_bytes, first_rows, slices);
    let closed = store.close_dataset(id).map_err(|e| FailedOp::Write.wrap(name, e));

    match filled.and_then(|rows| closed.map(|()| rows)) {
        Ok(rows) => {
            tracing::debug!(dataset = %name, rows, chunk_rows, slice_rows, "Wrote collection");
            Ok(rows)
        }
        Err(e) => {
            // Leave no zero-filled rows behind that would read as real records.
            let _ = store.delete_dataset(name);
            match e {
                e @ (SynaError::ExtendFailed { .. } | SynaError::WriteFailed { .. }) => {
                    absorb_failure(settings, name, FailedOp::Write, e).map(|()| 0)
                }
                e => Err(e),
            }
        }
    }
}

/// Writes the first region of a fresh dataset, then appends the remaining
/// slices. Store errors come back wrapped; codec errors come back as is.
#[allow(clippy::too_many_arguments)]
fn fill_slices<'r, S: ContainerStore + ?Sized>(
    store: &S,
    id: DatasetId,
    name: &str,
    codec: &CompoundCodec,
    layout: &RecordLayout,
    first_bytes: &[u8],
    first_rows: u64,
    rest: impl Iterator<Item = &'r [Record]>,
) -> Result<u64> {
    store
        .write_region(id, 0..first_rows, first_bytes)
        .map_err(|e| FailedOp::Write.wrap(name, e))?;
    let mut extent = first_rows;
    for slice in rest {
        let bytes = codec.encode_batch(slice, layout)?;
        let end = extent + slice.len() as u64;
        store
            .extend_dataset(id, end)
            .map_err(|e| FailedOp::Extend.wrap(name, e))?;
        store
            .write_region(id, extent..end, &bytes)
            .map_err(|e| FailedOp::Write.wrap(name, e))?;
        extent = end;
    }
    Ok(extent)
}

/// Typed [`write_compounds`].
pub fn write_compound_items<S: ContainerStore + ?Sized, T: Compound>(
    store: &S,
    name: &str,
    items: &[T],
    settings: &StoreSettings,
) -> Result<u64> {
    let layout = T::layout()?;
    let records: Vec<Record> = items.iter().map(Compound::to_record).collect();
    write_compounds(store, name, &layout, &records, settings)
}
