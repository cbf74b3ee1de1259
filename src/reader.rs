// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Threshold-bounded batch reader.
//!
//! Reads a whole dataset back as decoded records without holding more than
//! [`StoreSettings::max_read_bytes`] of raw rows at a time:
//!
//! - when `rows * record_size` is below the ceiling, one region read covers
//!   the whole extent
//! - otherwise rows are read in sequential batches of
//!   `max_read_bytes / record_size` rows, each decoded and handed out before
//!   the next is read
//!
//! Both [`Records`] and [`RowBatches`] are lazy; nothing is read until the
//! first call to `next`. Each holds its own store handle and closes it when
//! dropped, so readers never disturb a writer of the same dataset.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use syna_compound::store::MemoryStore;
//! use syna_compound::{
//!     derive_layout, BatchReader, ChunkedCompound, NumericType, Record, ShapeType, StoreSettings, TypeShape,
//! };
//!
//! let layout = derive_layout(
//!     &TypeShape::new("level").field("v", ShapeType::Numeric(NumericType::F64)),
//! )
//! .unwrap();
//! let store = Arc::new(MemoryStore::new());
//! let mut levels = ChunkedCompound::new(Arc::clone(&store), "levels", layout.clone(), StoreSettings::default()).unwrap();
//! levels.append_or_create(&[Record::new().with(0.5f64), Record::new().with(1.5f64)]).unwrap();
//!
//! // 8-byte rows and a 8-byte ceiling: one row per region read
//! let settings = StoreSettings { max_read_bytes: 8, ..Default::default() };
//! let reader = BatchReader::new(store.as_ref(), settings);
//! let values: Vec<f64> = reader
//!     .read_all("levels", &layout, true)
//!     .unwrap()
//!     .map(|r| r.unwrap().get_as::<f64>(0).unwrap())
//!     .collect();
//! assert_eq!(values, vec![0.5, 1.5]);
//! ```

use std::ops::Range;

use crate::chunked::{absorb_failure, FailedOp};
use crate::codec::CompoundCodec;
use crate::config::StoreSettings;
use crate::error::{Result, SynaError};
use crate::store::{validate_name, ContainerStore, DatasetId, DatasetInfo};
use crate::types::RecordLayout;
use crate::value::{Compound, Record};

/// Rows per region read for a dataset of `total_rows` rows.
///
/// Returns `total_rows` when the whole dataset fits under the ceiling, and
/// `max(1, max_read_bytes / record_size)` otherwise.
///
/// ```rust
/// use syna_compound::batch_rows;
///
/// assert_eq!(batch_rows(10, 24, 1_000), 10);
/// assert_eq!(batch_rows(10, 24, 48), 2);
/// assert_eq!(batch_rows(10, 24, 10), 1);
/// ```
pub fn batch_rows(total_rows: u64, record_size: usize, max_read_bytes: u64) -> u64 {
    let record_size = record_size.max(1) as u64;
    let total_bytes = total_rows.saturating_mul(record_size);
    if total_bytes < max_read_bytes {
        total_rows
    } else {
        (max_read_bytes / record_size).max(1)
    }
}

/// Reads datasets of fixed-layout records from a store.
pub struct BatchReader<'a, S: ContainerStore + ?Sized> {
    store: &'a S,
    settings: StoreSettings,
    codec: CompoundCodec,
}

impl<'a, S: ContainerStore + ?Sized> BatchReader<'a, S> {
    /// Creates a reader over `store`.
    pub fn new(store: &'a S, settings: StoreSettings) -> Self {
        let codec = CompoundCodec::new(settings.text_pad);
        Self {
            store,
            settings,
            codec,
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Lazily reads every record of `name`.
    ///
    /// An absent dataset yields nothing, unless `mandatory` or
    /// [`StoreSettings::throw_on_missing_when_reading`] is set, in which case
    /// this fails with [`SynaError::MissingDataset`].
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::LayoutMismatch`] when the stored records do not
    /// have `layout`'s shape.
    pub fn read_all(&self, name: &str, layout: &RecordLayout, mandatory: bool) -> Result<Records<'a, S>> {
        Ok(Records {
            batches: self.read_batches(name, layout, mandatory)?,
            current: Vec::new().into_iter(),
        })
    }

    /// Lazily reads `name` as one `Vec<Record>` per region read.
    pub fn read_batches(
        &self,
        name: &str,
        layout: &RecordLayout,
        mandatory: bool,
    ) -> Result<RowBatches<'a, S>> {
        let name = self.resolve(name)?;
        match self.open(&name, layout)? {
            Some(info) => Ok(self.plan(info, layout)),
            None => {
                self.missing(&name, mandatory)?;
                Ok(RowBatches::empty(self.store, name, layout.clone(), &self.settings))
            }
        }
    }

    /// Like [`read_all`](Self::read_all), falling back to `alternative` when
    /// `name` does not exist.
    pub fn read_all_or(
        &self,
        name: &str,
        alternative: &str,
        layout: &RecordLayout,
        mandatory: bool,
    ) -> Result<Records<'a, S>> {
        let primary = self.resolve(name)?;
        if let Some(info) = self.open(&primary, layout)? {
            return Ok(Records {
                batches: self.plan(info, layout),
                current: Vec::new().into_iter(),
            });
        }
        tracing::debug!(dataset = %primary, alternative = %alternative, "Falling back to alternative name");
        self.read_all(alternative, layout, mandatory)
    }

    /// Reads rows `rows` of `name` in one region read.
    ///
    /// # Errors
    ///
    /// - [`SynaError::MissingDataset`] if the dataset does not exist
    /// - [`SynaError::RowRangeOutOfBounds`] if `rows` extends past the extent
    pub fn read_rows(&self, name: &str, layout: &RecordLayout, rows: Range<u64>) -> Result<Vec<Record>> {
        let name = self.resolve(name)?;
        let info = self
            .open(&name, layout)?
            .ok_or_else(|| SynaError::MissingDataset(name.clone()))?;
        let result = if rows.start > rows.end || rows.end > info.extent_rows {
            Err(SynaError::RowRangeOutOfBounds {
                start: rows.start,
                end: rows.end,
                extent: info.extent_rows,
            })
        } else {
            match self.store.read_region(info.id, rows) {
                Ok(bytes) => self.codec.decode_batch(&bytes, layout),
                Err(e) => absorb_failure(&self.settings, &name, FailedOp::Read, e).map(|()| Vec::new()),
            }
        };
        let _ = self.store.close_dataset(info.id);
        result
    }

    /// Reads every record of `name` as `T`.
    pub fn read_items<T: Compound>(&self, name: &str, mandatory: bool) -> Result<Vec<T>> {
        let layout = T::layout()?;
        self.read_all(name, &layout, mandatory)?
            .map(|record| T::from_record(&record?))
            .collect()
    }

    fn resolve(&self, name: &str) -> Result<String> {
        validate_name(&self.settings.normalize_name(name))
    }

    /// Opens the dataset and checks its record shape. Store failures follow
    /// the `throw_on_error` policy; an absorbed failure reads as absent.
    fn open(&self, name: &str, layout: &RecordLayout) -> Result<Option<DatasetInfo>> {
        let info = match self.store.open_dataset(name) {
            Ok(info) => info,
            Err(e) => {
                absorb_failure(&self.settings, name, FailedOp::Read, e)?;
                return Ok(None);
            }
        };
        if let Some(info) = &info {
            if info.record_size != layout.total_size() || info.fields != layout.flatten() {
                let _ = self.store.close_dataset(info.id);
                return Err(SynaError::LayoutMismatch {
                    dataset: name.to_string(),
                    reason: format!(
                        "stored record is {} bytes, layout '{}' is {} bytes",
                        info.record_size,
                        layout.name(),
                        layout.total_size()
                    ),
                });
            }
        }
        Ok(info)
    }

    fn missing(&self, name: &str, mandatory: bool) -> Result<()> {
        if self.settings.error_logging {
            tracing::warn!(dataset = %name, "Dataset does not exist");
        }
        if mandatory || self.settings.throw_on_missing_when_reading {
            return Err(SynaError::MissingDataset(name.to_string()));
        }
        Ok(())
    }

    fn plan(&self, info: DatasetInfo, layout: &RecordLayout) -> RowBatches<'a, S> {
        let rows_per_read = batch_rows(info.extent_rows, info.record_size, self.settings.max_read_bytes);
        if rows_per_read < info.extent_rows {
            tracing::debug!(
                dataset = %info.name,
                total_rows = info.extent_rows,
                batch_rows = rows_per_read,
                "Reading in batches"
            );
        }
        RowBatches {
            store: self.store,
            id: Some(info.id),
            name: info.name,
            layout: layout.clone(),
            codec: self.codec,
            settings: self.settings.clone(),
            next_row: 0,
            total_rows: info.extent_rows,
            batch_rows: rows_per_read.max(1),
            done: false,
        }
    }
}

/// Decoded row batches, one per region read.
pub struct RowBatches<'a, S: ContainerStore + ?Sized> {
    store: &'a S,
    id: Option<DatasetId>,
    name: String,
    layout: RecordLayout,
    codec: CompoundCodec,
    settings: StoreSettings,
    next_row: u64,
    total_rows: u64,
    batch_rows: u64,
    done: bool,
}

impl<'a, S: ContainerStore + ?Sized> RowBatches<'a, S> {
    fn empty(store: &'a S, name: String, layout: RecordLayout, settings: &StoreSettings) -> Self {
        Self {
            store,
            id: None,
            name,
            layout,
            codec: CompoundCodec::new(settings.text_pad),
            settings: settings.clone(),
            next_row: 0,
            total_rows: 0,
            batch_rows: 1,
            done: true,
        }
    }

    /// Total rows in the dataset when reading started.
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Rows per region read.
    pub fn batch_rows(&self) -> u64 {
        self.batch_rows
    }

    /// Number of region reads a full iteration performs.
    pub fn read_count(&self) -> u64 {
        self.total_rows.div_ceil(self.batch_rows)
    }
}

impl<'a, S: ContainerStore + ?Sized> Iterator for RowBatches<'a, S> {
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_row >= self.total_rows {
            return None;
        }
        let id = self.id?;
        let start = self.next_row;
        let end = (start + self.batch_rows).min(self.total_rows);

        let bytes = match self.store.read_region(id, start..end) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.done = true;
                return match absorb_failure(&self.settings, &self.name, FailedOp::Read, e) {
                    Ok(()) => None,
                    Err(e) => Some(Err(e)),
                };
            }
        };
        self.next_row = end;
        tracing::trace!(dataset = %self.name, start, end, "Read region");

        let decoded = self.codec.decode_batch(&bytes, &self.layout);
        if decoded.is_err() {
            self.done = true;
        }
        Some(decoded)
    }
}

impl<'a, S: ContainerStore + ?Sized> Drop for RowBatches<'a, S> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let _ = self.store.close_dataset(id);
        }
    }
}

/// Lazy sequence of decoded records.
pub struct Records<'a, S: ContainerStore + ?Sized> {
    batches: RowBatches<'a, S>,
    current: std::vec::IntoIter<Record>,
}

impl<'a, S: ContainerStore + ?Sized> Records<'a, S> {
    /// The underlying batch iterator's plan: total rows.
    pub fn total_rows(&self) -> u64 {
        self.batches.total_rows()
    }

    /// Rows per region read.
    pub fn batch_rows(&self) -> u64 {
        self.batches.batch_rows()
    }
}

impl<'a, S: ContainerStore + ?Sized> Iterator for Records<'a, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.next() {
                return Some(Ok(record));
            }
            match self.batches.next()? {
                Ok(batch) => self.current = batch.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
