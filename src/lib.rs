// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! # syna-compound
//!
//! Fixed-layout compound records with chunked append storage.
//!
//! Describe a record type once and get a deterministic packed binary layout,
//! a codec for it, and a growable append-only dataset that stores batches of
//! such records and reads them back without unbounded memory use.
//!
//! ## Features
//!
//! ### Records
//! - **[`derive_layout`]** - Packed offsets for numeric, fixed text, fixed array and nested fields
//! - **[`CompoundCodec`]** - Bit-exact little-endian encode/decode with truncation and padding
//! - **[`Compound`]** - Typed records without runtime reflection
//!
//! ### Storage
//! - **[`ChunkedCompound`]** - Create-then-extend appends, one region write per batch
//! - **[`BatchReader`]** - Lazy reads split into batches under a memory ceiling
//! - **[`store::FileStore`]** - Directory-backed datasets with mmap reads and resume
//! - **[`store::MemoryStore`]** - In-process datasets with I/O counters
//!
//! ### Producers
//! - **[`QueuedWriter`]** - Bounded queue drained by a background appender
//! - **[`TimedWriter`]** - Accumulator flushed on a fixed interval
//!
//! ## Architecture
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`layout`] | Type shapes and layout derivation |
//! | [`codec`] | Record encoding against a layout |
//! | [`chunked`] | Append engine and one-shot writes |
//! | [`reader`] | Threshold-bounded batch reads |
//! | [`pipeline`] | Producer front-ends |
//! | [`store`] | Container store boundary and backends |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syna_compound::store::FileStore;
//! use syna_compound::{
//!     derive_layout, ChunkedCompound, NumericType, Record, Result, ShapeType, StoreSettings, TypeShape,
//! };
//!
//! fn main() -> Result<()> {
//!     let layout = derive_layout(
//!         &TypeShape::new("event")
//!             .field("timestamp", ShapeType::Numeric(NumericType::I64))
//!             .field_as("label", "Label", ShapeType::text(16))
//!             .field("levels", ShapeType::array(ShapeType::Numeric(NumericType::F32), 4)),
//!     )?;
//!
//!     let store = Arc::new(FileStore::open("recording")?);
//!     let mut events = ChunkedCompound::open_or_new(store, "ecg/events", layout, StoreSettings::default())?;
//!
//!     let batch = vec![
//!         Record::new().with(1_700_000_000i64).with("start").with([0.0f32, 0.1, 0.2, 0.3]),
//!         Record::new().with(1_700_000_001i64).with("beat").with([0.4f32, 0.5, 0.6, 0.7]),
//!     ];
//!     events.append_or_create(&batch)?;
//!     events.flush()?;
//!
//!     for record in events.read_all(true)? {
//!         println!("{:?}", record?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod chunked;
pub mod codec;
pub mod config;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod reader;
pub mod store;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use error::{Result, SynaError};
pub use config::{FileStoreConfig, StoreSettings, TextPad, DEFAULT_MAX_READ_BYTES, DEFAULT_MAX_WRITE_BYTES};
pub use types::{FieldDescriptor, FieldKind, FlatField, FlatKind, NumericType, RecordLayout};
pub use value::{Compound, FromValue, Record, Value};

// Re-export layout derivation and the codec
pub use layout::{derive_layout, FieldShape, ShapeType, TypeShape};
pub use codec::CompoundCodec;

// Re-export the append engine
pub use chunked::{
    initial_chunk_rows, write_compound_items, write_compounds, write_large_compounds, ChunkedCompound,
    DatasetState, MAX_INITIAL_CHUNK_ROWS,
};

// Re-export the batch reader
pub use reader::{batch_rows, BatchReader, Records, RowBatches};

// Re-export producer front-ends
pub use pipeline::{QueuedWriter, QueuedWriterConfig, RecordSender, TimedWriter, WriterReport};
