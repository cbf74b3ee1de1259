//! In-process container store.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{check_region, validate_name, ContainerStore, DatasetId, DatasetInfo, TypeHandle};
use crate::error::{Result, SynaError};
use crate::types::{FlatField, RecordLayout};

/// Counters of store operations, for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Datasets created.
    pub creates: u64,
    /// Extent changes.
    pub extends: u64,
    /// Region writes.
    pub region_writes: u64,
    /// Region reads.
    pub region_reads: u64,
}

struct MemDataset {
    name: String,
    data: Vec<u8>,
    extent_rows: u64,
    record_size: usize,
    chunk_rows: u64,
    fields: Vec<FlatField>,
}

impl MemDataset {
    fn info(&self, id: DatasetId) -> DatasetInfo {
        DatasetInfo {
            id,
            name: self.name.clone(),
            extent_rows: self.extent_rows,
            record_size: self.record_size,
            chunk_rows: self.chunk_rows,
            fields: self.fields.clone(),
        }
    }
}

type SharedDataset = Arc<Mutex<MemDataset>>;

#[derive(Default)]
struct Registry {
    types: HashMap<TypeHandle, (usize, Vec<FlatField>)>,
    by_name: HashMap<String, SharedDataset>,
    open: HashMap<DatasetId, SharedDataset>,
}

/// Datasets held in memory.
///
/// Contents survive [`close_dataset`](ContainerStore::close_dataset) and are
/// dropped with the store. Each dataset has its own lock, so different
/// datasets can be written and read concurrently. Every
/// [`open_dataset`](ContainerStore::open_dataset) returns a fresh handle;
/// closing it leaves other handles to the same dataset usable.
///
/// # Examples
///
/// ```rust
/// use syna_compound::store::{ContainerStore, MemoryStore};
/// use syna_compound::{derive_layout, NumericType, ShapeType, TypeShape};
///
/// let store = MemoryStore::new();
/// let layout = derive_layout(
///     &TypeShape::new("tick").field("t", ShapeType::Numeric(NumericType::U32)),
/// ).unwrap();
/// let ty = store.register_type(&layout).unwrap();
/// let id = store.create_dataset("ticks", ty, 2, 1).unwrap();
/// store.write_region(id, 0..2, &[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
/// assert_eq!(store.read_region(id, 1..2).unwrap(), vec![2, 0, 0, 0]);
/// ```
#[derive(Default)]
pub struct MemoryStore {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    creates: AtomicU64,
    extends: AtomicU64,
    region_writes: AtomicU64,
    region_reads: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            creates: self.creates.load(Ordering::Relaxed),
            extends: self.extends.load(Ordering::Relaxed),
            region_writes: self.region_writes.load(Ordering::Relaxed),
            region_reads: self.region_reads.load(Ordering::Relaxed),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn dataset(&self, id: DatasetId) -> Result<SharedDataset> {
        self.registry
            .lock()
            .open
            .get(&id)
            .cloned()
            .ok_or_else(|| SynaError::MissingDataset(format!("handle {}", id.0)))
    }
}

impl ContainerStore for MemoryStore {
    fn register_type(&self, layout: &RecordLayout) -> Result<TypeHandle> {
        let handle = TypeHandle(self.next_id());
        self.registry
            .lock()
            .types
            .insert(handle, (layout.total_size(), layout.flatten()));
        Ok(handle)
    }

    fn create_dataset(
        &self,
        name: &str,
        ty: TypeHandle,
        initial_rows: u64,
        chunk_rows: u64,
    ) -> Result<DatasetId> {
        let name = validate_name(name)?;
        let mut registry = self.registry.lock();
        if registry.by_name.contains_key(&name) {
            return Err(SynaError::DatasetExists(name));
        }
        let (record_size, fields) = registry
            .types
            .get(&ty)
            .cloned()
            .ok_or_else(|| SynaError::MissingDataset(format!("type {}", ty.0)))?;

        let id = DatasetId(self.next_id());
        let dataset = Arc::new(Mutex::new(MemDataset {
            name: name.clone(),
            data: vec![0u8; initial_rows as usize * record_size],
            extent_rows: initial_rows,
            record_size,
            chunk_rows: chunk_rows.max(1),
            fields,
        }));
        registry.by_name.insert(name, Arc::clone(&dataset));
        registry.open.insert(id, dataset);
        self.creates.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn open_dataset(&self, name: &str) -> Result<Option<DatasetInfo>> {
        let name = validate_name(name)?;
        let mut registry = self.registry.lock();
        let Some(dataset) = registry.by_name.get(&name).cloned() else {
            return Ok(None);
        };

        let id = DatasetId(self.next_id());
        let info = dataset.lock().info(id);
        registry.open.insert(id, dataset);
        Ok(Some(info))
    }

    fn dataset_exists(&self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        Ok(self.registry.lock().by_name.contains_key(&name))
    }

    fn delete_dataset(&self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        let mut registry = self.registry.lock();
        let Some(dataset) = registry.by_name.remove(&name) else {
            return Ok(false);
        };
        registry.open.retain(|_, d| !Arc::ptr_eq(d, &dataset));
        Ok(true)
    }

    fn extend_dataset(&self, id: DatasetId, new_rows: u64) -> Result<()> {
        let dataset = self.dataset(id)?;
        let mut ds = dataset.lock();
        let len = new_rows as usize * ds.record_size;
        ds.data.resize(len, 0);
        ds.extent_rows = new_rows;
        self.extends.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_region(&self, id: DatasetId, rows: Range<u64>, bytes: &[u8]) -> Result<()> {
        let dataset = self.dataset(id)?;
        let mut ds = dataset.lock();
        check_region(&rows, ds.extent_rows, ds.record_size, Some(bytes.len()))?;
        let start = rows.start as usize * ds.record_size;
        ds.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.region_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_region(&self, id: DatasetId, rows: Range<u64>) -> Result<Vec<u8>> {
        let dataset = self.dataset(id)?;
        let ds = dataset.lock();
        check_region(&rows, ds.extent_rows, ds.record_size, None)?;
        let start = rows.start as usize * ds.record_size;
        let end = rows.end as usize * ds.record_size;
        self.region_reads.fetch_add(1, Ordering::Relaxed);
        Ok(ds.data[start..end].to_vec())
    }

    fn flush(&self, id: DatasetId) -> Result<()> {
        self.dataset(id).map(|_| ())
    }

    fn close_dataset(&self, id: DatasetId) -> Result<()> {
        self.registry.lock().open.remove(&id);
        Ok(())
    }

    fn list_datasets(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.registry.lock().by_name.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{derive_layout, ShapeType, TypeShape};
    use crate::types::NumericType;

    fn store_with_type() -> (MemoryStore, TypeHandle) {
        let store = MemoryStore::new();
        let layout = derive_layout(
            &TypeShape::new("pair")
                .field("a", ShapeType::Numeric(NumericType::U8))
                .field("b", ShapeType::Numeric(NumericType::U8)),
        )
        .unwrap();
        let ty = store.register_type(&layout).unwrap();
        (store, ty)
    }

    #[test]
    fn test_create_extend_write_read() {
        let (store, ty) = store_with_type();
        let id = store.create_dataset("pairs", ty, 1, 1).unwrap();
        store.write_region(id, 0..1, &[1, 2]).unwrap();
        store.extend_dataset(id, 3).unwrap();
        store.write_region(id, 1..3, &[3, 4, 5, 6]).unwrap();
        assert_eq!(store.read_region(id, 0..3).unwrap(), vec![1, 2, 3, 4, 5, 6]);

        let stats = store.stats();
        assert_eq!(stats.creates, 1);
        assert_eq!(stats.extends, 1);
        assert_eq!(stats.region_writes, 2);
        assert_eq!(stats.region_reads, 1);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let (store, ty) = store_with_type();
        store.create_dataset("pairs", ty, 0, 1).unwrap();
        assert!(matches!(
            store.create_dataset("/pairs", ty, 0, 1),
            Err(SynaError::DatasetExists(_))
        ));
    }

    #[test]
    fn test_write_outside_extent_rejected() {
        let (store, ty) = store_with_type();
        let id = store.create_dataset("pairs", ty, 1, 1).unwrap();
        assert!(matches!(
            store.write_region(id, 1..2, &[0, 0]),
            Err(SynaError::RowRangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_close_and_reopen_keeps_data() {
        let (store, ty) = store_with_type();
        let id = store.create_dataset("pairs", ty, 1, 1).unwrap();
        store.write_region(id, 0..1, &[9, 8]).unwrap();
        store.close_dataset(id).unwrap();
        assert!(store.read_region(id, 0..1).is_err());

        let info = store.open_dataset("pairs").unwrap().unwrap();
        assert_ne!(info.id, id);
        assert_eq!(info.extent_rows, 1);
        assert_eq!(info.record_size, 2);
        assert_eq!(store.read_region(info.id, 0..1).unwrap(), vec![9, 8]);
    }

    #[test]
    fn test_closing_one_handle_keeps_others() {
        let (store, ty) = store_with_type();
        let writer = store.create_dataset("pairs", ty, 1, 1).unwrap();
        store.write_region(writer, 0..1, &[1, 2]).unwrap();

        let viewer = store.open_dataset("pairs").unwrap().unwrap().id;
        assert_ne!(viewer, writer);
        assert_eq!(store.read_region(viewer, 0..1).unwrap(), vec![1, 2]);
        store.close_dataset(viewer).unwrap();

        store.extend_dataset(writer, 2).unwrap();
        store.write_region(writer, 1..2, &[3, 4]).unwrap();
        assert_eq!(store.read_region(writer, 0..2).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_delete_invalidates_every_handle() {
        let (store, ty) = store_with_type();
        let writer = store.create_dataset("pairs", ty, 1, 1).unwrap();
        let viewer = store.open_dataset("pairs").unwrap().unwrap().id;
        assert!(store.delete_dataset("pairs").unwrap());
        assert!(store.read_region(writer, 0..1).is_err());
        assert!(store.read_region(viewer, 0..1).is_err());
    }

    #[test]
    fn test_delete_and_list() {
        let (store, ty) = store_with_type();
        store.create_dataset("b", ty, 0, 1).unwrap();
        store.create_dataset("a/x", ty, 0, 1).unwrap();
        assert_eq!(store.list_datasets().unwrap(), vec!["a/x", "b"]);
        assert!(store.delete_dataset("b").unwrap());
        assert!(!store.delete_dataset("b").unwrap());
        assert!(!store.dataset_exists("b").unwrap());
    }
}
