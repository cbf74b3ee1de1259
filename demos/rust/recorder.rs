//! ECG Recorder Demo
//!
//! This demo shows a recording session built on syna-compound:
//! - Typed event records with text, arrays and a nested sub-record
//! - A bounded queue draining high-frequency frames into a chunked dataset
//! - A timed writer flushing per-second means
//! - Resuming the event dataset after a restart
//!
//! Run with: cargo run --example recorder

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use syna_compound::store::{ContainerStore, FileStore};
use syna_compound::{
    BatchReader, ChunkedCompound, Compound, NumericType, QueuedWriter, QueuedWriterConfig, Record, Result,
    ShapeType, StoreSettings, TimedWriter, TypeShape,
};

/// Gain and offset of one acquisition channel.
#[derive(Debug, Clone, PartialEq)]
struct Calibration {
    gain: f32,
    offset: f32,
}

impl Compound for Calibration {
    fn shape() -> TypeShape {
        TypeShape::new("calibration")
            .field("gain", ShapeType::Numeric(NumericType::F32))
            .field("offset", ShapeType::Numeric(NumericType::F32))
    }

    fn to_record(&self) -> Record {
        Record::new().with(self.gain).with(self.offset)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            gain: record.get_as(0)?,
            offset: record.get_as(1)?,
        })
    }
}

/// One ECG frame: timestamp, sequence number, packet id and lead samples.
#[derive(Debug, Clone, PartialEq)]
struct EcgFrame {
    timestamp: i64,
    seq: u32,
    packet_id: i32,
    leads: [i32; 8],
}

impl Compound for EcgFrame {
    fn shape() -> TypeShape {
        TypeShape::new("ecg_frame")
            .field("timestamp", ShapeType::Numeric(NumericType::I64))
            .field("seq", ShapeType::Numeric(NumericType::U32))
            .field_as("packet_id", "PacketId", ShapeType::Numeric(NumericType::I32))
            .field("leads", ShapeType::array(ShapeType::Numeric(NumericType::I32), 8))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with(self.timestamp)
            .with(self.seq)
            .with(self.packet_id)
            .with(self.leads)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            timestamp: record.get_as(0)?,
            seq: record.get_as(1)?,
            packet_id: record.get_as(2)?,
            leads: record.get_as(3)?,
        })
    }
}

/// A system event with a free-text description.
#[derive(Debug, Clone, PartialEq)]
struct SystemEvent {
    timestamp: i64,
    kind: i32,
    description: String,
    calibration: Calibration,
}

impl Compound for SystemEvent {
    fn shape() -> TypeShape {
        TypeShape::new("system_event")
            .field("timestamp", ShapeType::Numeric(NumericType::I64))
            .field("kind", ShapeType::Numeric(NumericType::I32))
            .field("description", ShapeType::text(32))
            .field("calibration", ShapeType::Nested(Calibration::shape()))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with(self.timestamp)
            .with(self.kind)
            .with(self.description.as_str())
            .with(self.calibration.to_record())
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            timestamp: record.get_as(0)?,
            kind: record.get_as(1)?,
            description: record.get_as(2)?,
            calibration: Calibration::from_record(&record.get_as(3)?)?,
        })
    }
}

/// Per-interval mean of all leads.
#[derive(Debug, Clone, PartialEq)]
struct LeadMeans {
    timestamp: i64,
    means: [f64; 8],
}

impl Compound for LeadMeans {
    fn shape() -> TypeShape {
        TypeShape::new("lead_means")
            .field("timestamp", ShapeType::Numeric(NumericType::I64))
            .field("means", ShapeType::array(ShapeType::Numeric(NumericType::F64), 8))
    }

    fn to_record(&self) -> Record {
        Record::new().with(self.timestamp).with(self.means)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            timestamp: record.get_as(0)?,
            means: record.get_as(1)?,
        })
    }
}

fn frame(seq: u32) -> EcgFrame {
    let t = seq as f64 * 0.004;
    let mut leads = [0i32; 8];
    for (lead, sample) in leads.iter_mut().enumerate() {
        *sample = ((t * 6.28 + lead as f64).sin() * 1000.0) as i32;
    }
    EcgFrame {
        timestamp: 1_700_000_000_000 + seq as i64 * 4,
        seq,
        packet_id: (seq / 16) as i32,
        leads,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== syna-compound Recorder Demo ===\n");

    let root = Path::new("demo_recording");
    if root.exists() {
        std::fs::remove_dir_all(root)?;
    }
    let store = Arc::new(FileStore::open(root)?);
    let settings = StoreSettings::default();

    // 1. Frames through a bounded queue
    println!("1. Recording 5000 frames through a bounded queue...");
    let frames = ChunkedCompound::new(Arc::clone(&store), "ecg/frames", EcgFrame::layout()?, settings.clone())?;
    let writer = QueuedWriter::spawn(
        frames,
        QueuedWriterConfig {
            batch_size: 500,
            queue_capacity: 2000,
        },
    )?;
    let sender = writer.sender();
    let acquisition = thread::spawn(move || -> Result<()> {
        for seq in 0..5000 {
            sender.send_item(&frame(seq))?;
        }
        Ok(())
    });
    if let Ok(result) = acquisition.join() {
        result?;
    }
    let (report, frames) = writer.complete()?;
    println!(
        "   ✓ {} frames in {} appends, extent {}\n",
        report.records,
        report.appends,
        frames.current_extent()
    );

    // 2. Means on a timer
    println!("2. Flushing lead means every 50 ms...");
    let means = ChunkedCompound::new(Arc::clone(&store), "ecg/means", LeadMeans::layout()?, settings.clone())?;
    let timed = TimedWriter::spawn(means, Duration::from_millis(50))?;
    for second in 0..20i64 {
        let mut sums = [0f64; 8];
        for seq in (second as u32 * 250)..((second as u32 + 1) * 250) {
            for (sum, sample) in sums.iter_mut().zip(frame(seq).leads) {
                *sum += sample as f64 / 250.0;
            }
        }
        timed.push_item(&LeadMeans {
            timestamp: second,
            means: sums,
        });
        thread::sleep(Duration::from_millis(10));
    }
    let means = timed.shutdown()?;
    println!("   ✓ {} mean rows\n", means.current_extent());

    // 3. Events, closed and resumed
    println!("3. Writing system events across a restart...");
    let calibration = Calibration {
        gain: 1.5,
        offset: -0.25,
    };
    {
        let mut events =
            ChunkedCompound::new(Arc::clone(&store), "ecg/events", SystemEvent::layout()?, settings.clone())?;
        events.append_or_create_items(&[SystemEvent {
            timestamp: 0,
            kind: 1,
            description: "recording started".to_string(),
            calibration: calibration.clone(),
        }])?;
        events.close()?;
    }
    let mut events =
        ChunkedCompound::open_existing(Arc::clone(&store), "ecg/events", SystemEvent::layout()?, settings.clone())?;
    events.append_or_create_items(&[SystemEvent {
        timestamp: 20,
        kind: 2,
        // Longer than 32 bytes, stored truncated
        description: "electrode impedance above threshold on lead V3".to_string(),
        calibration,
    }])?;
    events.flush()?;

    for name in events.store().list_datasets()? {
        println!("   - {}", name);
    }
    println!();

    // 4. Read back
    println!("4. Reading back...");
    let reader = BatchReader::new(store.as_ref(), settings);
    let stored: Vec<SystemEvent> = reader.read_items("ecg/events", true)?;
    for event in &stored {
        println!("   [{}] kind={} '{}'", event.timestamp, event.kind, event.description);
    }
    let frames_back: Vec<EcgFrame> = reader.read_items("ecg/frames", true)?;
    println!("   ✓ {} frames read, first seq {}", frames_back.len(), frames_back[0].seq);

    println!("\n=== Demo Complete ===");
    Ok(())
}
