// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Directory-backed container store.
//!
//! Each dataset `group/name` is stored as two files under the store root:
//!
//! ```text
//! group/name.data        fixed-size rows, packed back to back
//! group/name.meta.json   DatasetMeta (extent, record size, chunk rows, field table)
//! ```
//!
//! The data file grows in whole chunks of `chunk_rows * record_size` bytes;
//! the logical extent lives only in the metadata, which is rewritten through
//! a temporary file and a rename on every extent change. Region reads map the
//! selected byte range with `memmap2`.
//!
//! Every `open_dataset` call hands out its own [`DatasetId`]; all ids of one
//! dataset share a single in-process state, which is dropped when the last
//! of them is closed.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::MmapOptions;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{check_region, validate_name, ContainerStore, DatasetId, DatasetInfo, TypeHandle};
use crate::config::FileStoreConfig;
use crate::error::{Result, SynaError};
use crate::types::{FlatField, RecordLayout};

const DATA_EXT: &str = "data";
const META_SUFFIX: &str = ".meta.json";
const META_VERSION: u32 = 1;

/// Persisted description of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct DatasetMeta {
    version: u32,
    name: String,
    record_size: usize,
    chunk_rows: u64,
    extent_rows: u64,
    fields: Vec<FlatField>,
}

impl DatasetMeta {
    fn capacity_bytes(&self, rows: u64) -> u64 {
        rows.div_ceil(self.chunk_rows) * self.chunk_rows * self.record_size as u64
    }
}

struct FileDataset {
    file: File,
    meta_path: PathBuf,
    meta: DatasetMeta,
}

impl FileDataset {
    fn info(&self, id: DatasetId) -> DatasetInfo {
        DatasetInfo {
            id,
            name: self.meta.name.clone(),
            extent_rows: self.meta.extent_rows,
            record_size: self.meta.record_size,
            chunk_rows: self.meta.chunk_rows,
            fields: self.meta.fields.clone(),
        }
    }
}

type SharedDataset = Arc<Mutex<FileDataset>>;

#[derive(Default)]
struct Registry {
    types: HashMap<TypeHandle, (usize, Vec<FlatField>)>,
    by_name: HashMap<String, SharedDataset>,
    open: HashMap<DatasetId, SharedDataset>,
}

impl Registry {
    /// Drops the shared state of `dataset` once no handle refers to it.
    fn release_if_unused(&mut self, dataset: &SharedDataset) {
        if !self.open.values().any(|d| Arc::ptr_eq(d, dataset)) {
            self.by_name.retain(|_, d| !Arc::ptr_eq(d, dataset));
        }
    }
}

/// Datasets persisted as files under a root directory.
///
/// Reopening a store finds every dataset written earlier, so a recording
/// session can resume appending after a restart.
///
/// # Examples
///
/// ```rust,no_run
/// use syna_compound::store::{ContainerStore, FileStore};
///
/// let store = FileStore::open("recording").unwrap();
/// for name in store.list_datasets().unwrap() {
///     let info = store.open_dataset(&name).unwrap().unwrap();
///     println!("{}: {} rows of {} bytes", name, info.extent_rows, info.record_size);
/// }
/// ```
pub struct FileStore {
    root: PathBuf,
    config: FileStoreConfig,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl FileStore {
    /// Opens (or creates) a store rooted at `root` with default configuration.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(root, FileStoreConfig::default())
    }

    /// Opens (or creates) a store rooted at `root`.
    pub fn with_config(root: impl AsRef<Path>, config: FileStoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            config,
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, DATA_EXT))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, META_SUFFIX))
    }

    fn dataset(&self, id: DatasetId) -> Result<SharedDataset> {
        self.registry
            .lock()
            .open
            .get(&id)
            .cloned()
            .ok_or_else(|| SynaError::MissingDataset(format!("handle {}", id.0)))
    }

    fn sync(&self, file: &File) -> Result<()> {
        if self.config.sync_on_write {
            file.sync_data()?;
        }
        Ok(())
    }
}

/// Writes metadata through a temporary file and an atomic rename.
fn write_meta(path: &Path, meta: &DatasetMeta) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(meta)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_meta(path: &Path) -> Result<DatasetMeta> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn collect_names(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let qualified = if prefix.is_empty() {
            file_name.clone()
        } else {
            format!("{}/{}", prefix, file_name)
        };
        if entry.file_type()?.is_dir() {
            collect_names(&entry.path(), &qualified, out)?;
        } else if let Some(name) = qualified.strip_suffix(META_SUFFIX) {
            out.push(name.to_string());
        }
    }
    Ok(())
}

impl ContainerStore for FileStore {
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
        let meta_path = self.meta_path(&name);
        if meta_path.exists() {
            return Err(SynaError::DatasetExists(name));
        }

        let mut registry = self.registry.lock();
        let (record_size, fields) = registry
            .types
            .get(&ty)
            .cloned()
            .ok_or_else(|| SynaError::MissingDataset(format!("type {}", ty.0)))?;

        let data_path = self.data_path(&name);
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let meta = DatasetMeta {
            version: META_VERSION,
            name: name.clone(),
            record_size,
            chunk_rows: chunk_rows.max(1),
            extent_rows: initial_rows,
            fields,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&data_path)?;
        file.set_len(meta.capacity_bytes(initial_rows))?;
        self.sync(&file)?;
        write_meta(&meta_path, &meta)?;

        let id = DatasetId(self.next_id());
        let dataset = Arc::new(Mutex::new(FileDataset {
            file,
            meta_path,
            meta,
        }));
        registry.by_name.insert(name, Arc::clone(&dataset));
        registry.open.insert(id, dataset);
        Ok(id)
    }

    fn open_dataset(&self, name: &str) -> Result<Option<DatasetInfo>> {
        let name = validate_name(name)?;
        let mut registry = self.registry.lock();
        let dataset = match registry.by_name.get(&name) {
            Some(dataset) => Arc::clone(dataset),
            None => {
                let meta_path = self.meta_path(&name);
                if !meta_path.exists() {
                    return Ok(None);
                }
                let meta = read_meta(&meta_path)?;
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(self.data_path(&name))?;
                let dataset = Arc::new(Mutex::new(FileDataset {
                    file,
                    meta_path,
                    meta,
                }));
                registry.by_name.insert(name, Arc::clone(&dataset));
                dataset
            }
        };

        let id = DatasetId(self.next_id());
        let info = dataset.lock().info(id);
        registry.open.insert(id, dataset);
        Ok(Some(info))
    }

    fn dataset_exists(&self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        Ok(self.meta_path(&name).exists())
    }

    fn delete_dataset(&self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        {
            let mut registry = self.registry.lock();
            if let Some(dataset) = registry.by_name.remove(&name) {
                registry.open.retain(|_, d| !Arc::ptr_eq(d, &dataset));
            }
        }

        let meta_path = self.meta_path(&name);
        if !meta_path.exists() {
            return Ok(false);
        }
        fs::remove_file(&meta_path)?;
        let data_path = self.data_path(&name);
        if data_path.exists() {
            fs::remove_file(data_path)?;
        }
        Ok(true)
    }

    fn extend_dataset(&self, id: DatasetId, new_rows: u64) -> Result<()> {
        let dataset = self.dataset(id)?;
        let mut ds = dataset.lock();
        let capacity = ds.meta.capacity_bytes(new_rows);
        if ds.file.metadata()?.len() != capacity {
            ds.file.set_len(capacity)?;
        }
        ds.meta.extent_rows = new_rows;
        self.sync(&ds.file)?;
        write_meta(&ds.meta_path, &ds.meta)
    }

    fn write_region(&self, id: DatasetId, rows: Range<u64>, bytes: &[u8]) -> Result<()> {
        let dataset = self.dataset(id)?;
        let mut ds = dataset.lock();
        check_region(&rows, ds.meta.extent_rows, ds.meta.record_size, Some(bytes.len()))?;
        let offset = rows.start * ds.meta.record_size as u64;
        ds.file.seek(SeekFrom::Start(offset))?;
        ds.file.write_all(bytes)?;
        self.sync(&ds.file)
    }

    fn read_region(&self, id: DatasetId, rows: Range<u64>) -> Result<Vec<u8>> {
        let dataset = self.dataset(id)?;
        let ds = dataset.lock();
        check_region(&rows, ds.meta.extent_rows, ds.meta.record_size, None)?;
        let len = (rows.end - rows.start) as usize * ds.meta.record_size;
        if len == 0 {
            return Ok(Vec::new());
        }
        let offset = rows.start * ds.meta.record_size as u64;
        // Safety: the range lies inside the file (capacity >= extent) and the
        // dataset lock is held, so no writer in this process can truncate it.
        let map = unsafe { MmapOptions::new().offset(offset).len(len).map(&ds.file)? };
        Ok(map.to_vec())
    }

    fn flush(&self, id: DatasetId) -> Result<()> {
        let dataset = self.dataset(id)?;
        let ds = dataset.lock();
        ds.file.sync_all()?;
        write_meta(&ds.meta_path, &ds.meta)
    }

    fn close_dataset(&self, id: DatasetId) -> Result<()> {
        let mut registry = self.registry.lock();
        if let Some(dataset) = registry.open.remove(&id) {
            registry.release_if_unused(&dataset);
        }
        Ok(())
    }

    fn list_datasets(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        collect_names(&self.root, "", &mut names)?;
        names.sort();
        Ok(names)
    }
}
