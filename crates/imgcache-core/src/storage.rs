//! Persistence of the metadata cache snapshot.
//!
//! One JSON file holds the whole cache. Writes go through a temp file and an
//! atomic rename so a crashed build never leaves a half-written snapshot.
//! Loading is tolerant: a missing or unreadable snapshot yields an empty
//! cache (a cold start, not an error), and a snapshot with individually
//! malformed entries keeps the valid ones and drops the rest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::MetadataCache;
use crate::types::{AlbumEntry, ImageEntry};

/// Snapshot filename inside the data directory.
const CACHE_FILE: &str = "imgur-cache.json";

/// Filesystem home of the persisted cache snapshot.
#[derive(Debug, Clone)]
pub struct Storage {
    root_dir: PathBuf,
}

impl Storage {
    /// Create a storage instance rooted at the default data directory.
    ///
    /// `IMGCACHE_DATA_DIR` overrides the location explicitly (used by tests
    /// and CI). Otherwise `XDG_DATA_HOME/imgcache` is used when set, falling
    /// back to `~/.imgcache`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when no home directory can be determined or
    /// the directory cannot be created.
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var("IMGCACHE_DATA_DIR") {
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                return Self::with_root(PathBuf::from(trimmed));
            }
        }

        let root_dir = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            let trimmed = xdg.trim();
            if trimmed.is_empty() {
                Self::fallback_data_dir()?
            } else {
                PathBuf::from(trimmed).join("imgcache")
            }
        } else {
            Self::fallback_data_dir()?
        };

        Self::with_root(root_dir)
    }

    fn fallback_data_dir() -> Result<PathBuf> {
        let home = directories::BaseDirs::new()
            .ok_or_else(|| Error::Storage("failed to determine home directory".into()))?;
        Ok(home.home_dir().join(".imgcache"))
    }

    /// Create a storage instance rooted at an explicit directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the directory cannot be created.
    pub fn with_root(root_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root_dir)
            .map_err(|e| Error::Storage(format!("failed to create data directory: {e}")))?;
        Ok(Self { root_dir })
    }

    /// The root data directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Path of the cache snapshot file.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.root_dir.join(CACHE_FILE)
    }

    /// Load the persisted cache snapshot.
    ///
    /// A missing snapshot is a cold start and yields an empty cache. An
    /// unparseable snapshot is logged and also yields an empty cache, since
    /// every entry can be re-fetched. Entries that fail to deserialize on
    /// their own, or whose recorded ID disagrees with their map key, are
    /// dropped individually while the rest of the snapshot loads.
    #[must_use]
    pub fn load_cache(&self) -> MetadataCache {
        let path = self.cache_path();
        if !path.exists() {
            debug!("no cache snapshot at {}, starting empty", path.display());
            return MetadataCache::new();
        }
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to read {}: {err}, starting empty", path.display());
                return MetadataCache::new();
            },
        };
        let snapshot: Value = match serde_json::from_str(&json) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("failed to parse {}: {err}, starting empty", path.display());
                return MetadataCache::new();
            },
        };

        let albums = load_entries::<AlbumEntry>(&snapshot, "albums", |album| &album.id);
        let images = load_entries::<ImageEntry>(&snapshot, "images", |image| &image.id);
        let cache = MetadataCache::from_entries(albums, images);
        debug!("loaded {} cached entries from {}", cache.len(), path.display());
        cache
    }

    /// Persist the cache snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when serialization or any filesystem step
    /// fails; the previous snapshot is left intact in that case.
    pub fn save_cache(&self, cache: &MetadataCache) -> Result<()> {
        let path = self.cache_path();
        let json = serde_json::to_string_pretty(cache)
            .map_err(|e| Error::Storage(format!("failed to serialize cache: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| Error::Storage(format!("failed to write cache snapshot: {e}")))?;

        #[cfg(target_os = "windows")]
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::Storage(format!("failed to remove old snapshot: {e}")))?;
        }
        fs::rename(&tmp_path, &path)
            .map_err(|e| Error::Storage(format!("failed to commit cache snapshot: {e}")))?;

        debug!("saved {} cached entries to {}", cache.len(), path.display());
        Ok(())
    }
}

/// Deserialize one keyed entry map out of a snapshot, entry by entry.
fn load_entries<T>(snapshot: &Value, section: &str, id_of: fn(&T) -> &str) -> BTreeMap<String, T>
where
    T: DeserializeOwned,
{
    let mut entries = BTreeMap::new();
    let Some(map) = snapshot.get(section).and_then(Value::as_object) else {
        return entries;
    };
    for (key, value) in map {
        match serde_json::from_value::<T>(value.clone()) {
            Ok(entry) if id_of(&entry) == key => {
                entries.insert(key.clone(), entry);
            },
            Ok(entry) => {
                warn!(
                    "dropping cached entry {key}: recorded ID {} does not match",
                    id_of(&entry)
                );
            },
            Err(err) => {
                warn!("dropping cached entry {key}: {err}");
            },
        }
    }
    entries
}
