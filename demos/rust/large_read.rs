//! Bounded-Memory Read Demo
//!
//! This demo shows how the batch reader keeps memory bounded:
//! - Writing 200,000 rows in one-shot and appended batches
//! - Reading them back under different memory ceilings
//! - Comparing region read counts from the in-memory store
//!
//! Run with: cargo run --example large_read

use std::time::Instant;

use syna_compound::store::MemoryStore;
use syna_compound::{
    batch_rows, derive_layout, write_compounds, BatchReader, NumericType, Record, Result, ShapeType,
    StoreSettings, TypeShape,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    println!("=== syna-compound Bounded-Memory Read Demo ===\n");

    let layout = derive_layout(
        &TypeShape::new("impedance")
            .field("timestamp", ShapeType::Numeric(NumericType::I64))
            .field("electrode", ShapeType::Numeric(NumericType::U16))
            .field("magnitude", ShapeType::Numeric(NumericType::F64))
            .field("phase", ShapeType::Numeric(NumericType::F32))
            .field("label", ShapeType::text(6)),
    )?;
    println!("Record layout '{}': {} bytes", layout.name(), layout.total_size());
    for field in layout.fields() {
        println!("   {:>10} @ {:>2} ({} bytes)", field.display_name, field.offset, field.size_bytes);
    }
    println!();

    // 1. Write
    let rows = 200_000u64;
    println!("1. Writing {} rows...", rows);
    let records: Vec<Record> = (0..rows)
        .map(|i| {
            Record::new()
                .with(i as i64)
                .with((i % 32) as u16)
                .with(100.0 + (i as f64 * 0.01).sin())
                .with((i as f32 * 0.001).cos())
                .with(format!("E{}", i % 32))
        })
        .collect();
    let store = MemoryStore::new();
    let start = Instant::now();
    write_compounds(&store, "eit/impedance", &layout, &records, &StoreSettings::default())?;
    println!("   ✓ {} MB in {:?}\n", rows * layout.total_size() as u64 / 1_000_000, start.elapsed());

    // 2. Read under several ceilings
    println!("2. Reading back under different memory ceilings:");
    for ceiling in [u64::MAX, 1_000_000, 100_000, 4_096] {
        let settings = StoreSettings {
            max_read_bytes: ceiling,
            ..Default::default()
        };
        let before = store.stats().region_reads;
        let start = Instant::now();

        let reader = BatchReader::new(&store, settings);
        let mut count = 0u64;
        let mut sum = 0f64;
        for record in reader.read_all("eit/impedance", &layout, true)? {
            sum += record?.get_as::<f64>(2)?;
            count += 1;
        }

        println!(
            "   ceiling {:>20} B: {:>6} rows/read, {:>4} reads, {} rows, mean {:.4}, {:?}",
            ceiling,
            batch_rows(rows, layout.total_size(), ceiling),
            store.stats().region_reads - before,
            count,
            sum / count as f64,
            start.elapsed()
        );
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
