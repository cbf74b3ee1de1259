//! Integration tests for the chunked append engine.
//!
//! Covers append monotonicity and ordering, empty-batch no-ops, layout
//! mismatches, the throw-on-error policy for writes and reads, one-shot
//! writes, concurrent handles to one dataset, and resuming a file-backed
//! dataset.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use syna_compound::store::{ContainerStore, DatasetId, DatasetInfo, FileStore, MemoryStore, TypeHandle};
use syna_compound::{
    derive_layout, write_compound_items, write_large_compounds, BatchReader, ChunkedCompound, Compound,
    DatasetState, NumericType, Record, RecordLayout, Result, ShapeType, StoreSettings, SynaError, TypeShape,
};
use tempfile::tempdir;

/// 24-byte measurement record.
#[derive(Debug, Clone, PartialEq)]
struct Measurement {
    timestamp: i64,
    value: f64,
    code: i32,
    flags: u32,
}

impl Compound for Measurement {
    fn shape() -> TypeShape {
        TypeShape::new("measurement")
            .field("timestamp", ShapeType::Numeric(NumericType::I64))
            .field("value", ShapeType::Numeric(NumericType::F64))
            .field("code", ShapeType::Numeric(NumericType::I32))
            .field("flags", ShapeType::Numeric(NumericType::U32))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with(self.timestamp)
            .with(self.value)
            .with(self.code)
            .with(self.flags)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            timestamp: record.get_as(0)?,
            value: record.get_as(1)?,
            code: record.get_as(2)?,
            flags: record.get_as(3)?,
        })
    }
}

/// A different record type with the same byte size.
struct Wide {
    a: u64,
    b: u64,
    c: u64,
}

impl Compound for Wide {
    fn shape() -> TypeShape {
        TypeShape::new("wide")
            .field("a", ShapeType::Numeric(NumericType::U64))
            .field("b", ShapeType::Numeric(NumericType::U64))
            .field("c", ShapeType::Numeric(NumericType::U64))
    }

    fn to_record(&self) -> Record {
        Record::new().with(self.a).with(self.b).with(self.c)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            a: record.get_as(0)?,
            b: record.get_as(1)?,
            c: record.get_as(2)?,
        })
    }
}

fn measurements(range: Range<i64>) -> Vec<Measurement> {
    range
        .map(|i| Measurement {
            timestamp: i,
            value: i as f64 * 0.5,
            code: -(i as i32),
            flags: i as u32 * 3,
        })
        .collect()
}

fn layout() -> RecordLayout {
    Measurement::layout().unwrap()
}

fn read_back<S: ContainerStore>(chunked: &ChunkedCompound<S>) -> Vec<Measurement> {
    chunked
        .read_all(true)
        .unwrap()
        .map(|r| Measurement::from_record(&r.unwrap()).unwrap())
        .collect()
}

/// Delegates to a [`MemoryStore`] but can be told to fail extends, region
/// writes or region reads.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_extends: AtomicBool,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

fn unplugged() -> SynaError {
    std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged").into()
}

impl ContainerStore for FlakyStore {
    fn register_type(&self, layout: &RecordLayout) -> Result<TypeHandle> {
        self.inner.register_type(layout)
    }

    fn create_dataset(&self, name: &str, ty: TypeHandle, initial_rows: u64, chunk_rows: u64) -> Result<DatasetId> {
        self.inner.create_dataset(name, ty, initial_rows, chunk_rows)
    }

    fn open_dataset(&self, name: &str) -> Result<Option<DatasetInfo>> {
        self.inner.open_dataset(name)
    }

    fn dataset_exists(&self, name: &str) -> Result<bool> {
        self.inner.dataset_exists(name)
    }

    fn delete_dataset(&self, name: &str) -> Result<bool> {
        self.inner.delete_dataset(name)
    }

    fn extend_dataset(&self, id: DatasetId, new_rows: u64) -> Result<()> {
        if self.fail_extends.load(Ordering::SeqCst) {
            return Err(unplugged());
        }
        self.inner.extend_dataset(id, new_rows)
    }

    fn write_region(&self, id: DatasetId, rows: Range<u64>, bytes: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unplugged());
        }
        self.inner.write_region(id, rows, bytes)
    }

    fn read_region(&self, id: DatasetId, rows: Range<u64>) -> Result<Vec<u8>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unplugged());
        }
        self.inner.read_region(id, rows)
    }

    fn flush(&self, id: DatasetId) -> Result<()> {
        self.inner.flush(id)
    }

    fn close_dataset(&self, id: DatasetId) -> Result<()> {
        self.inner.close_dataset(id)
    }

    fn list_datasets(&self) -> Result<Vec<String>> {
        self.inner.list_datasets()
    }
}

#[test]
fn test_scenario_a_create_then_append() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    assert_eq!(layout().total_size(), 24);
    let store = Arc::new(MemoryStore::new());
    let mut chunked = ChunkedCompound::new(Arc::clone(&store), "scenario_a", layout(), StoreSettings::default()).unwrap();

    let all = measurements(0..5);
    assert_eq!(chunked.append_or_create_items(&all[..2]).unwrap(), 2);
    assert_eq!(chunked.append_or_create_items(&all[2..]).unwrap(), 5);
    assert_eq!(chunked.current_extent(), 5);
    assert_eq!(read_back(&chunked), all);
}

#[test]
fn test_empty_batch_is_noop() {
    let store = Arc::new(MemoryStore::new());
    let mut chunked = ChunkedCompound::new(Arc::clone(&store), "noop", layout(), StoreSettings::default()).unwrap();

    // Empty batch into a dataset that does not exist yet
    assert_eq!(chunked.append_or_create(&[]).unwrap(), 0);
    assert_eq!(chunked.state(), DatasetState::Uninitialized);
    assert!(!store.dataset_exists("noop").unwrap());

    chunked.append_or_create_items(&measurements(0..3)).unwrap();
    let before = store.stats();
    assert_eq!(chunked.append(&[]).unwrap(), 3);
    assert_eq!(chunked.append_or_create(&[]).unwrap(), 3);
    assert_eq!(store.stats(), before);
    assert_eq!(read_back(&chunked), measurements(0..3));
}

#[test]
fn test_other_record_type_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mut chunked = ChunkedCompound::new(Arc::clone(&store), "typed", layout(), StoreSettings::default()).unwrap();
    chunked.append_or_create_items(&measurements(0..2)).unwrap();

    assert_eq!(Wide::layout().unwrap().total_size(), layout().total_size());
    let err = chunked
        .append_or_create_items(&[Wide { a: 1, b: 2, c: 3 }])
        .unwrap_err();
    assert!(matches!(err, SynaError::LayoutMismatch { .. }));
    assert_eq!(chunked.current_extent(), 2);
}

#[test]
fn test_store_failure_raised_when_strict() {
    let store = Arc::new(FlakyStore::default());
    let mut chunked = ChunkedCompound::new(Arc::clone(&store), "strict", layout(), StoreSettings::default()).unwrap();
    chunked.append_or_create_items(&measurements(0..2)).unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    let err = chunked.append_or_create_items(&measurements(2..4)).unwrap_err();
    assert!(matches!(err, SynaError::WriteFailed { ref dataset, .. } if dataset == "strict"));
    assert_eq!(chunked.current_extent(), 2);

    store.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(chunked.append_or_create_items(&measurements(2..4)).unwrap(), 4);
    assert_eq!(read_back(&chunked), measurements(0..4));
}

#[test]
fn test_store_failure_absorbed_when_lenient() {
    let store = Arc::new(FlakyStore::default());
    let settings = StoreSettings {
        throw_on_error: false,
        ..Default::default()
    };
    let mut chunked = ChunkedCompound::new(Arc::clone(&store), "lenient", layout(), settings).unwrap();

    // First batch fails: nothing is left behind and the handle stays uninitialized
    store.fail_writes.store(true, Ordering::SeqCst);
    assert_eq!(chunked.append_or_create_items(&measurements(0..2)).unwrap(), 0);
    assert_eq!(chunked.state(), DatasetState::Uninitialized);
    assert!(!store.dataset_exists("lenient").unwrap());

    store.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(chunked.append_or_create_items(&measurements(0..2)).unwrap(), 2);

    // A lost batch keeps the extent
    store.fail_writes.store(true, Ordering::SeqCst);
    assert_eq!(chunked.append_or_create_items(&measurements(2..5)).unwrap(), 2);
    store.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(chunked.append_or_create_items(&measurements(5..6)).unwrap(), 3);

    let timestamps: Vec<i64> = read_back(&chunked).iter().map(|m| m.timestamp).collect();
    assert_eq!(timestamps, vec![0, 1, 5]);
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[test]
fn test_absorbed_failure_logged_without_error_logging() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let store = Arc::new(FlakyStore::default());
        let settings = StoreSettings {
            throw_on_error: false,
            error_logging: false,
            ..Default::default()
        };
        let mut chunked = ChunkedCompound::new(Arc::clone(&store), "quiet", layout(), settings).unwrap();
        chunked.append_or_create_items(&measurements(0..2)).unwrap();
        assert_eq!(chunked.append_or_create(&[]).unwrap(), 2);

        store.fail_writes.store(true, Ordering::SeqCst);
        assert_eq!(chunked.append_or_create_items(&measurements(2..4)).unwrap(), 2);
    });

    let text = logs.text();
    assert!(text.contains("Store operation failed"), "missing error event in {:?}", text);
    assert!(text.contains("quiet"));
    assert!(!text.contains("Empty batch"));
}

#[test]
fn test_one_shot_write_failure_leaves_nothing() {
    let store = FlakyStore::default();
    store.fail_writes.store(true, Ordering::SeqCst);
    let err = write_compound_items(&store, "once", &measurements(0..4), &StoreSettings::default()).unwrap_err();
    assert!(matches!(err, SynaError::WriteFailed { ref dataset, .. } if dataset == "once"));
    assert!(!store.dataset_exists("once").unwrap());

    let lenient = StoreSettings {
        throw_on_error: false,
        ..Default::default()
    };
    assert_eq!(write_compound_items(&store, "once", &measurements(0..4), &lenient).unwrap(), 0);
    assert!(!store.dataset_exists("once").unwrap());

    // A retry without override succeeds once the store recovers
    store.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(write_compound_items(&store, "once", &measurements(0..4), &StoreSettings::default()).unwrap(), 4);
    let stored: Vec<Measurement> = BatchReader::new(&store, StoreSettings::default())
        .read_items("once", true)
        .unwrap();
    assert_eq!(stored, measurements(0..4));
}

#[test]
fn test_large_write_counts_slices() {
    let store = MemoryStore::new();
    let settings = StoreSettings {
        max_write_bytes: 24 * 100,
        ..Default::default()
    };
    let records: Vec<Record> = measurements(0..1050).iter().map(Compound::to_record).collect();
    assert_eq!(write_large_compounds(&store, "large", &layout(), &records, &settings).unwrap(), 1050);

    // Eleven slices of at most 100 rows: one create, ten appends
    let stats = store.stats();
    assert_eq!(stats.creates, 1);
    assert_eq!(stats.extends, 10);
    assert_eq!(stats.region_writes, 11);
    assert_eq!(store.open_dataset("large").unwrap().unwrap().chunk_rows, 100);

    let stored: Vec<Measurement> = BatchReader::new(&store, StoreSettings::default())
        .read_items("large", true)
        .unwrap();
    assert_eq!(stored, measurements(0..1050));
}

#[test]
fn test_large_write_failure_part_way_removes_dataset() {
    let store = FlakyStore::default();
    let settings = StoreSettings {
        max_write_bytes: 48,
        ..Default::default()
    };
    let records: Vec<Record> = measurements(0..6).iter().map(Compound::to_record).collect();

    // The first slice creates the dataset; the extend for the second fails
    store.fail_extends.store(true, Ordering::SeqCst);
    assert!(matches!(
        write_large_compounds(&store, "partial", &layout(), &records, &settings),
        Err(SynaError::ExtendFailed { ref dataset, .. }) if dataset == "partial"
    ));
    assert!(!store.dataset_exists("partial").unwrap());
    assert!(store.list_datasets().unwrap().is_empty());
}

#[test]
fn test_dropped_viewer_leaves_writer_usable() {
    let store = Arc::new(MemoryStore::new());
    let mut writer = ChunkedCompound::new(Arc::clone(&store), "ecg", layout(), StoreSettings::default()).unwrap();
    writer.append_or_create_items(&measurements(0..1)).unwrap();

    {
        let viewer =
            ChunkedCompound::open_existing(Arc::clone(&store), "ecg", layout(), StoreSettings::default()).unwrap();
        assert_eq!(read_back(&viewer), measurements(0..1));
    }
    let reader = BatchReader::new(store.as_ref(), StoreSettings::default());
    assert_eq!(reader.read_rows("ecg", &layout(), 0..1).unwrap().len(), 1);
    drop(reader.read_all("ecg", &layout(), true).unwrap());

    assert_eq!(writer.append_or_create_items(&measurements(1..3)).unwrap(), 3);
    assert_eq!(read_back(&writer), measurements(0..3));
}

#[test]
fn test_dropped_viewer_leaves_file_writer_usable() {
    let dir = tempdir().expect("failed to create temp dir");
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let mut writer = ChunkedCompound::new(Arc::clone(&store), "ecg", layout(), StoreSettings::default()).unwrap();
    writer.append_or_create_items(&measurements(0..1)).unwrap();

    let viewer = ChunkedCompound::open_existing(Arc::clone(&store), "ecg", layout(), StoreSettings::default()).unwrap();
    drop(viewer);

    assert_eq!(writer.append_or_create_items(&measurements(1..2)).unwrap(), 2);
    assert_eq!(read_back(&writer), measurements(0..2));
}

#[test]
fn test_read_failure_raised_when_strict() {
    let store = FlakyStore::default();
    write_compound_items(&store, "trace", &measurements(0..3), &StoreSettings::default()).unwrap();
    store.fail_reads.store(true, Ordering::SeqCst);

    let reader = BatchReader::new(&store, StoreSettings::default());
    let mut records = reader.read_all("trace", &layout(), true).unwrap();
    assert!(matches!(
        records.next(),
        Some(Err(SynaError::ReadFailed { ref dataset, .. })) if dataset == "trace"
    ));
    assert!(records.next().is_none());
    assert!(matches!(
        reader.read_rows("trace", &layout(), 0..1),
        Err(SynaError::ReadFailed { .. })
    ));
}

#[test]
fn test_read_failure_absorbed_when_lenient() {
    let store = FlakyStore::default();
    write_compound_items(&store, "trace", &measurements(0..3), &StoreSettings::default()).unwrap();
    store.fail_reads.store(true, Ordering::SeqCst);

    let lenient = StoreSettings {
        throw_on_error: false,
        ..Default::default()
    };
    let reader = BatchReader::new(&store, lenient);
    assert_eq!(reader.read_all("trace", &layout(), true).unwrap().count(), 0);
    assert!(reader.read_rows("trace", &layout(), 0..2).unwrap().is_empty());

    store.fail_reads.store(false, Ordering::SeqCst);
    assert_eq!(reader.read_all("trace", &layout(), true).unwrap().count(), 3);
}

#[test]
fn test_file_store_resume_after_restart() {
    let dir = tempdir().expect("failed to create temp dir");
    {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let mut chunked = ChunkedCompound::new(store, "session/measurements", layout(), StoreSettings::default()).unwrap();
        chunked.append_or_create_items(&measurements(0..7)).unwrap();
        chunked.append_or_create_items(&measurements(7..12)).unwrap();
        chunked.flush().unwrap();
        chunked.close().unwrap();
    }

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let mut chunked =
        ChunkedCompound::open_or_new(store, "session/measurements", layout(), StoreSettings::default()).unwrap();
    assert_eq!(chunked.state(), DatasetState::Extended);
    assert_eq!(chunked.current_extent(), 12);
    assert_eq!(chunked.chunk_rows(), 1);

    chunked.append_or_create_items(&measurements(12..15)).unwrap();
    assert_eq!(read_back(&chunked), measurements(0..15));
}

#[test]
fn test_closed_handle_rejects_everything() {
    let store = Arc::new(MemoryStore::new());
    let mut chunked = ChunkedCompound::new(store, "closed", layout(), StoreSettings::default()).unwrap();
    chunked.append_or_create_items(&measurements(0..1)).unwrap();
    chunked.close().unwrap();

    assert!(matches!(chunked.append(&[]), Err(SynaError::DatasetClosed(_))));
    assert!(matches!(chunked.flush(), Err(SynaError::DatasetClosed(_))));
    assert!(matches!(chunked.read_all(false), Err(SynaError::DatasetClosed(_))));
}

fn arb_batch_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..40, 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// The extent is the sum of all batch lengths and reading back returns
    /// the concatenation of all batches in order.
    #[test]
    fn prop_append_monotonic(sizes in arb_batch_sizes()) {
        let store = Arc::new(MemoryStore::new());
        let mut chunked = ChunkedCompound::new(Arc::clone(&store), "mono", layout(), StoreSettings::default()).unwrap();

        let mut next = 0i64;
        let mut last_extent = 0;
        for size in &sizes {
            let batch = measurements(next..next + *size as i64);
            next += *size as i64;
            let extent = chunked.append_or_create_items(&batch).unwrap();
            prop_assert!(extent >= last_extent);
            last_extent = extent;
        }

        prop_assert_eq!(chunked.current_extent(), sizes.iter().sum::<usize>() as u64);
        prop_assert_eq!(read_back(&chunked), measurements(0..next));
    }

    /// The dataset's chunk size follows the first non-empty batch.
    #[test]
    fn prop_chunk_size_from_first_batch(first in 1u64..100_000) {
        let chunk = syna_compound::initial_chunk_rows(first);
        prop_assert!(chunk >= 1 && chunk <= 1000);
        prop_assert!(chunk <= first);
        prop_assert!(chunk == 1000 || chunk * 10 > first);
    }
}

#[test]
fn test_dataset_name_stays_separate() {
    let store = Arc::new(MemoryStore::new());
    let settings = StoreSettings::default();
    let mut a = ChunkedCompound::new(Arc::clone(&store), "ecg/a", layout(), settings.clone()).unwrap();
    let mut b = ChunkedCompound::new(Arc::clone(&store), "ecg/b", layout(), settings).unwrap();
    a.append_or_create_items(&measurements(0..3)).unwrap();
    b.append_or_create_items(&measurements(10..11)).unwrap();
    a.append_or_create_items(&measurements(3..4)).unwrap();

    assert_eq!(read_back(&a), measurements(0..4));
    assert_eq!(read_back(&b), measurements(10..11));
    assert_eq!(store.list_datasets().unwrap(), vec!["ecg/a", "ecg/b"]);
}
