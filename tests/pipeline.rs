//! Integration tests for the producer front-ends.
//!
//! Covers the bounded-queue drain (including the single final append for a
//! short stream), multi-producer ordering per producer, completion while
//! producers are still sending, and the timed writer's mandatory final flush.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use syna_compound::store::{ContainerStore, MemoryStore};
use syna_compound::{
    derive_layout, BatchReader, ChunkedCompound, NumericType, QueuedWriter, QueuedWriterConfig, Record,
    RecordLayout, ShapeType, StoreSettings, SynaError, TimedWriter, TypeShape,
};

fn layout() -> RecordLayout {
    derive_layout(
        &TypeShape::new("sample")
            .field("producer", ShapeType::Numeric(NumericType::U8))
            .field("seq", ShapeType::Numeric(NumericType::U32)),
    )
    .unwrap()
}

fn sample(producer: u8, seq: u32) -> Record {
    Record::new().with(producer).with(seq)
}

fn engine(store: &Arc<MemoryStore>, name: &str) -> ChunkedCompound<MemoryStore> {
    ChunkedCompound::new(Arc::clone(store), name, layout(), StoreSettings::default()).unwrap()
}

fn stored(store: &MemoryStore, name: &str) -> Vec<(u8, u32)> {
    BatchReader::new(store, StoreSettings::default())
        .read_all(name, &layout(), true)
        .unwrap()
        .map(|r| {
            let r = r.unwrap();
            (r.get_as::<u8>(0).unwrap(), r.get_as::<u32>(1).unwrap())
        })
        .collect()
}

#[test]
fn test_scenario_d_single_final_append() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = Arc::new(MemoryStore::new());
    let writer = QueuedWriter::spawn(
        engine(&store, "scenario_d"),
        QueuedWriterConfig {
            batch_size: 100,
            queue_capacity: 16,
        },
    )
    .unwrap();

    for seq in 0..10 {
        writer.send(sample(0, seq)).unwrap();
    }
    let (report, chunked) = writer.complete().unwrap();

    assert_eq!(report.records, 10);
    assert_eq!(report.appends, 1);
    assert_eq!(report.extent, 10);
    assert_eq!(chunked.current_extent(), 10);

    let stats = store.stats();
    assert_eq!(stats.creates, 1);
    assert_eq!(stats.region_writes, 1);
    assert_eq!(stats.extends, 0);
    drop(chunked);
    assert_eq!(stored(&store, "scenario_d"), (0..10).map(|s| (0, s)).collect::<Vec<_>>());
}

#[test]
fn test_many_producers_keep_their_order() {
    let store = Arc::new(MemoryStore::new());
    let writer = QueuedWriter::spawn(
        engine(&store, "producers"),
        QueuedWriterConfig {
            batch_size: 64,
            queue_capacity: 32,
        },
    )
    .unwrap();

    let handles: Vec<_> = (0..4u8)
        .map(|producer| {
            let sender = writer.sender();
            thread::spawn(move || {
                for seq in 0..500 {
                    sender.send(sample(producer, seq)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let (report, chunked) = writer.complete().unwrap();
    assert_eq!(report.records, 2000);
    assert_eq!(report.failed_appends, 0);
    assert_eq!(chunked.current_extent(), 2000);
    drop(chunked);

    let mut last: HashMap<u8, u32> = HashMap::new();
    for (producer, seq) in stored(&store, "producers") {
        if let Some(prev) = last.insert(producer, seq) {
            assert!(seq > prev, "producer {} went from {} to {}", producer, prev, seq);
        }
    }
    assert_eq!(last.len(), 4);
}

#[test]
fn test_complete_while_producers_send_keeps_every_accepted_record() {
    for round in 0..20 {
        let store = Arc::new(MemoryStore::new());
        let name = format!("racing_{}", round);
        let writer = QueuedWriter::spawn(
            engine(&store, &name),
            QueuedWriterConfig {
                batch_size: 7,
                queue_capacity: 4,
            },
        )
        .unwrap();

        let handles: Vec<_> = (0..3u8)
            .map(|producer| {
                let sender = writer.sender();
                thread::spawn(move || {
                    let mut accepted = 0u32;
                    while sender.send(sample(producer, accepted)).is_ok() {
                        accepted += 1;
                    }
                    accepted
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(2));
        let (report, chunked) = writer.complete().unwrap();
        let accepted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(report.failed_appends, 0);
        assert_eq!(report.records, accepted as u64);
        assert_eq!(chunked.current_extent(), accepted as u64);
        drop(chunked);
        if accepted > 0 {
            assert_eq!(stored(&store, &name).len() as u32, accepted);
        }
    }
}

#[test]
fn test_failed_append_reported() {
    let store = Arc::new(MemoryStore::new());
    let writer = QueuedWriter::spawn(engine(&store, "bad"), QueuedWriterConfig::default()).unwrap();
    // Wrong type for the first field
    writer.send(Record::new().with(1u64).with(1u32)).unwrap();
    let (report, chunked) = writer.complete().unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(report.appends, 0);
    assert_eq!(report.failed_appends, 1);
    assert!(matches!(report.last_error, Some(SynaError::ValueMismatch { .. })));
    assert_eq!(chunked.current_extent(), 0);
}

#[test]
fn test_timed_writer_final_flush_on_shutdown() {
    let store = Arc::new(MemoryStore::new());
    // The timer never fires during the test
    let writer = TimedWriter::spawn(engine(&store, "means"), Duration::from_secs(3600)).unwrap();

    for seq in 0..25 {
        writer.push(sample(1, seq));
    }
    assert_eq!(writer.pending(), 25);
    assert_eq!(writer.current_extent(), 0);

    let chunked = writer.shutdown().unwrap();
    assert_eq!(chunked.current_extent(), 25);
    assert_eq!(store.stats().region_writes, 1);
}

#[test]
fn test_timed_writer_periodic_flush() {
    let store = Arc::new(MemoryStore::new());
    let writer = Arc::new(TimedWriter::spawn(engine(&store, "periodic"), Duration::from_millis(5)).unwrap());

    let producer = {
        let writer = Arc::clone(&writer);
        thread::spawn(move || {
            for seq in 0..200 {
                writer.push(sample(2, seq));
                if seq % 50 == 0 {
                    thread::sleep(Duration::from_millis(10));
                }
            }
        })
    };
    producer.join().unwrap();

    let writer = match Arc::try_unwrap(writer) {
        Ok(writer) => writer,
        Err(_) => panic!("producer still holds the writer"),
    };
    let chunked = writer.shutdown().unwrap();
    assert_eq!(chunked.current_extent(), 200);
    assert!(store.stats().region_writes >= 1);
    drop(chunked);

    let seqs: Vec<u32> = stored(&store, "periodic").into_iter().map(|(_, s)| s).collect();
    assert_eq!(seqs, (0..200).collect::<Vec<_>>());
    assert!(store.dataset_exists("periodic").unwrap());
}
