// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Runtime configuration for compound storage.
//!
//! - [`StoreSettings`] - Strictness, naming, memory ceilings, and text padding
//! - [`FileStoreConfig`] - Durability options for [`FileStore`](crate::store::FileStore)
//! - [`TextPad`] - Padding byte for fixed-length text fields

use serde::{Deserialize, Serialize};

/// Default read memory ceiling in bytes (~1 GB).
///
/// Datasets whose total size reaches this value are read back in
/// sequential row batches instead of a single region read.
pub const DEFAULT_MAX_READ_BYTES: u64 = 1_000_000_000;

/// Default encode ceiling for bounded one-shot writes in bytes (~1 GB).
pub const DEFAULT_MAX_WRITE_BYTES: u64 = 1_000_000_000;

/// Padding byte used when a text value is shorter than its field.
///
/// Decoding strips trailing pad bytes, so a value that itself ends with the
/// pad character (for example `"ab "` under [`TextPad::Space`]) comes back
/// without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPad {
    /// Pad with `0x00`.
    #[default]
    Nul,
    /// Pad with ASCII space `0x20`.
    Space,
}

impl TextPad {
    /// Returns the byte written into unused text positions.
    #[inline]
    pub fn byte(self) -> u8 {
        match self {
            TextPad::Nul => 0x00,
            TextPad::Space => b' ',
        }
    }
}

/// Settings shared by the append engine, the batch reader, and the front-ends.
///
/// # Examples
///
/// ```rust
/// use syna_compound::{StoreSettings, TextPad};
///
/// // Keep recording through transient storage failures
/// let settings = StoreSettings {
///     throw_on_error: false,
///     text_pad: TextPad::Space,
///     ..Default::default()
/// };
/// assert_eq!(settings.max_read_bytes, 1_000_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Return store failures (extend/write/read) to the caller.
    ///
    /// When `false`, failures are logged and absorbed: the append returns the
    /// unchanged extent and the batch is lost. Long-running recorders use this
    /// to keep producing through a storage hiccup, accepting silent data loss.
    pub throw_on_error: bool,

    /// Fail non-mandatory reads of absent datasets with
    /// [`SynaError::MissingDataset`](crate::SynaError::MissingDataset).
    pub throw_on_missing_when_reading: bool,

    /// Replace an existing dataset in one-shot writes instead of failing
    /// with [`SynaError::DatasetExists`](crate::SynaError::DatasetExists).
    pub override_existing: bool,

    /// Lower-case dataset names before they reach the store.
    pub lower_case_naming: bool,

    /// Emit warn-level events (empty batches, missing datasets).
    ///
    /// Store failures are logged at error level regardless.
    pub error_logging: bool,

    /// Memory ceiling for a single region read, in bytes.
    pub max_read_bytes: u64,

    /// Encode ceiling per slice for
    /// [`write_large_compounds`](crate::write_large_compounds), in bytes.
    pub max_write_bytes: u64,

    /// Padding byte for fixed-length text.
    pub text_pad: TextPad,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            throw_on_error: true,
            throw_on_missing_when_reading: false,
            override_existing: false,
            lower_case_naming: false,
            error_logging: true,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            max_write_bytes: DEFAULT_MAX_WRITE_BYTES,
            text_pad: TextPad::Nul,
        }
    }
}

impl StoreSettings {
    /// Parses settings from JSON. Missing keys take their default values.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Applies the naming policy to a dataset name.
    pub fn normalize_name(&self, name: &str) -> String {
        if self.lower_case_naming {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}

/// Durability options for the file-backed store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Sync data to disk after every extend and region write.
    ///
    /// Defaults to `false`; call [`ContainerStore::flush`](crate::store::ContainerStore::flush)
    /// at checkpoints instead.
    pub sync_on_write: bool,
}
