// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Producer front-ends for the append engine.
//!
//! High-frequency producers should not pay for an extend+write per record.
//! Two front-ends batch records before they reach a [`ChunkedCompound`]:
//!
//! - [`QueuedWriter`] - bounded multi-producer queue drained by one
//!   background thread, which appends every `batch_size` records. Once
//!   completed it rejects new records and appends everything it accepted.
//! - [`TimedWriter`] - shared accumulator flushed on a fixed interval
//!
//! In both, the engine is owned by exactly one writer at a time, so
//! extend+write sequences of the dataset never interleave.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use syna_compound::store::MemoryStore;
//! use syna_compound::{
//!     derive_layout, ChunkedCompound, NumericType, QueuedWriter, QueuedWriterConfig, Record, ShapeType,
//!     StoreSettings, TypeShape,
//! };
//!
//! let layout = derive_layout(
//!     &TypeShape::new("sample").field("v", ShapeType::Numeric(NumericType::I32)),
//! )
//! .unwrap();
//! let chunked = ChunkedCompound::new(Arc::new(MemoryStore::new()), "samples", layout, StoreSettings::default()).unwrap();
//!
//! let writer = QueuedWriter::spawn(chunked, QueuedWriterConfig { batch_size: 4, queue_capacity: 16 }).unwrap();
//! let producer = writer.sender();
//! let handle = std::thread::spawn(move || {
//!     for i in 0..10 {
//!         producer.send(Record::new().with(i)).unwrap();
//!     }
//! });
//! handle.join().unwrap();
//!
//! let (report, chunked) = writer.complete().unwrap();
//! assert_eq!(report.records, 10);
//! assert_eq!(report.appends, 3);
//! assert_eq!(chunked.current_extent(), 10);
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self as xchan, select, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::chunked::ChunkedCompound;
use crate::error::{Result, SynaError};
use crate::store::ContainerStore;
use crate::value::{Compound, Record};

/// Configuration for [`QueuedWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedWriterConfig {
    /// Records per append.
    pub batch_size: usize,
    /// Records the queue holds before producers block.
    pub queue_capacity: usize,
}

impl Default for QueuedWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            queue_capacity: 10_000,
        }
    }
}

/// Summary of a finished [`QueuedWriter`].
#[derive(Debug, Default)]
pub struct WriterReport {
    /// Records taken off the queue.
    pub records: u64,
    /// Successful append calls.
    pub appends: u64,
    /// Append calls that returned an error. Their records were dropped.
    pub failed_appends: u64,
    /// Extent of the dataset when the writer stopped.
    pub extent: u64,
    /// Most recent append error, if any.
    pub last_error: Option<SynaError>,
}

/// Producer side of a [`QueuedWriter`].
///
/// Cloneable; each clone may live on a different thread.
#[derive(Clone)]
pub struct RecordSender {
    tx: Sender<Record>,
    closed: Arc<RwLock<bool>>,
}

impl RecordSender {
    /// Enqueues a record, blocking while the queue is full.
    ///
    /// A record for which this returns `Ok` is always appended.
    ///
    /// # Errors
    ///
    /// Returns [`SynaError::WriterClosed`] once the writer has been completed.
    pub fn send(&self, record: Record) -> Result<()> {
        // The read guard is held until the record is queued, so closing the
        // writer waits for every accepted send before the final drain.
        let closed = self.closed.read();
        if *closed {
            return Err(SynaError::WriterClosed);
        }
        self.tx.send(record).map_err(|_| SynaError::WriterClosed)
    }

    /// Enqueues a typed record.
    pub fn send_item<T: Compound>(&self, item: &T) -> Result<()> {
        self.send(item.to_record())
    }
}

/// Bounded queue drained by a background appender.
///
/// The background thread buffers `batch_size` records and hands them to
/// [`ChunkedCompound::append_or_create`] in one call. On completion it drains
/// what is left in the queue, appends the remainder and returns the engine.
pub struct QueuedWriter<S: ContainerStore + 'static> {
    sender: RecordSender,
    stop: Sender<()>,
    worker: Option<JoinHandle<(WriterReport, ChunkedCompound<S>)>>,
}

impl<S: ContainerStore + 'static> QueuedWriter<S> {
    /// Starts the background appender.
    pub fn spawn(chunked: ChunkedCompound<S>, config: QueuedWriterConfig) -> Result<Self> {
        let (tx, rx) = xchan::bounded(config.queue_capacity.max(1));
        let (stop_tx, stop_rx) = xchan::bounded(1);
        let batch_size = config.batch_size.max(1);

        let worker = thread::Builder::new()
            .name(format!("queued-writer-{}", chunked.name()))
            .spawn(move || drain(chunked, rx, stop_rx, batch_size))?;

        Ok(Self {
            sender: RecordSender {
                tx,
                closed: Arc::new(RwLock::new(false)),
            },
            stop: stop_tx,
            worker: Some(worker),
        })
    }

    /// Returns a new producer handle.
    pub fn sender(&self) -> RecordSender {
        self.sender.clone()
    }

    /// Enqueues a record through the writer's own sender.
    pub fn send(&self, record: Record) -> Result<()> {
        self.sender.send(record)
    }

    /// Stops accepting records, appends everything already accepted and
    /// returns the report together with the engine.
    ///
    /// Sends still in flight finish first; any later send on a
    /// [`RecordSender`] clone fails with [`SynaError::WriterClosed`].
    pub fn complete(mut self) -> Result<(WriterReport, ChunkedCompound<S>)> {
        self.close();
        self.join()
    }

    fn close(&self) {
        *self.sender.closed.write() = true;
        let _ = self.stop.try_send(());
    }

    fn join(&mut self) -> Result<(WriterReport, ChunkedCompound<S>)> {
        let worker = self.worker.take().ok_or(SynaError::WriterClosed)?;
        worker.join().map_err(|_| {
            tracing::error!("Queued writer thread panicked");
            SynaError::WriterClosed
        })
    }
}

impl<S: ContainerStore + 'static> Drop for QueuedWriter<S> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.close();
            let _ = self.join();
        }
    }
}

fn drain<S: ContainerStore>(
    mut chunked: ChunkedCompound<S>,
    rx: Receiver<Record>,
    stop: Receiver<()>,
    batch_size: usize,
) -> (WriterReport, ChunkedCompound<S>) {
    let mut report = WriterReport::default();
    let mut buffer = Vec::with_capacity(batch_size);

    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(record) => {
                    report.records += 1;
                    buffer.push(record);
                    if buffer.len() >= batch_size {
                        append(&mut chunked, &mut buffer, &mut report);
                    }
                }
                Err(_) => break,
            },
            recv(stop) -> _ => {
                while let Ok(record) = rx.try_recv() {
                    report.records += 1;
                    buffer.push(record);
                    if buffer.len() >= batch_size {
                        append(&mut chunked, &mut buffer, &mut report);
                    }
                }
                break;
            }
        }
    }

    if !buffer.is_empty() {
        append(&mut chunked, &mut buffer, &mut report);
    }
    report.extent = chunked.current_extent();
    tracing::debug!(
        dataset = %chunked.name(),
        records = report.records,
        appends = report.appends,
        failed = report.failed_appends,
        "Queued writer finished"
    );
    (report, chunked)
}

fn append<S: ContainerStore>(
    chunked: &mut ChunkedCompound<S>,
    buffer: &mut Vec<Record>,
    report: &mut WriterReport,
) {
    match chunked.append_or_create(buffer) {
        Ok(_) => report.appends += 1,
        Err(e) => {
            tracing::error!(dataset = %chunked.name(), error = %e, rows = buffer.len(), "Background append failed");
            report.failed_appends += 1;
            report.last_error = Some(e);
        }
    }
    buffer.clear();
}

/// Shared accumulator flushed on a fixed interval.
///
/// Producers call [`push`](Self::push) from any thread. A background timer
/// appends whatever has accumulated every `interval`; [`shutdown`](Self::shutdown)
/// stops the timer and performs the final flush, which is required because
/// the timer does not fire again after cancellation.
pub struct TimedWriter<S: ContainerStore + 'static> {
    pending: Arc<Mutex<Vec<Record>>>,
    engine: Arc<Mutex<ChunkedCompound<S>>>,
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<S: ContainerStore + 'static> TimedWriter<S> {
    /// Starts the flush timer.
    pub fn spawn(chunked: ChunkedCompound<S>, interval: Duration) -> Result<Self> {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let engine = Arc::new(Mutex::new(chunked));
        let (cancel_tx, cancel_rx) = xchan::bounded::<()>(1);

        let name = engine.lock().name().to_string();
        let worker = {
            let pending = Arc::clone(&pending);
            let engine = Arc::clone(&engine);
            let ticker = xchan::tick(interval);
            thread::Builder::new()
                .name(format!("timed-writer-{}", name))
                .spawn(move || loop {
                    select! {
                        recv(ticker) -> _ => {
                            if let Err(e) = flush_pending(&engine, &pending) {
                                tracing::error!(dataset = %name, error = %e, "Timed flush failed");
                            }
                        }
                        recv(cancel_rx) -> _ => break,
                    }
                })?
        };

        Ok(Self {
            pending,
            engine,
            cancel: Some(cancel_tx),
            worker: Some(worker),
        })
    }

    /// Adds a record to the accumulator.
    pub fn push(&self, record: Record) {
        self.pending.lock().push(record);
    }

    /// Adds several records to the accumulator, keeping their order.
    pub fn extend<I: IntoIterator<Item = Record>>(&self, records: I) {
        self.pending.lock().extend(records);
    }

    /// Adds a typed record to the accumulator.
    pub fn push_item<T: Compound>(&self, item: &T) {
        self.push(item.to_record());
    }

    /// Records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Extent of the dataset after the last flush.
    pub fn current_extent(&self) -> u64 {
        self.engine.lock().current_extent()
    }

    /// Appends everything accumulated so far and returns the new extent.
    pub fn flush(&self) -> Result<u64> {
        flush_pending(&self.engine, &self.pending)
    }

    /// Stops the timer, performs the final flush and returns the engine.
    pub fn shutdown(mut self) -> Result<ChunkedCompound<S>> {
        self.stop_timer();
        flush_pending(&self.engine, &self.pending)?;

        let engine = Arc::clone(&self.engine);
        drop(self);
        match Arc::try_unwrap(engine) {
            Ok(engine) => Ok(engine.into_inner()),
            Err(_) => Err(SynaError::WriterClosed),
        }
    }

    fn stop_timer(&mut self) {
        // Dropping the sender disconnects the channel, which also wakes select!.
        self.cancel.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Timed writer thread panicked");
            }
        }
    }
}

impl<S: ContainerStore + 'static> Drop for TimedWriter<S> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_timer();
            if let Err(e) = flush_pending(&self.engine, &self.pending) {
                tracing::error!(error = %e, "Final flush on drop failed");
            }
        }
    }
}

/// Takes the engine lock first so concurrent flushes append in the order
/// their records were accumulated.
fn flush_pending<S: ContainerStore>(
    engine: &Mutex<ChunkedCompound<S>>,
    pending: &Mutex<Vec<Record>>,
) -> Result<u64> {
    let mut engine = engine.lock();
    let batch = std::mem::take(&mut *pending.lock());
    if batch.is_empty() {
        return Ok(engine.current_extent());
    }
    engine.append_or_create(&batch)
}
