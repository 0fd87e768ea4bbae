//! Persisted metadata cache
//!
//! Maps `"<absolute path>:<mtime millis>"` to a previously probed metadata
//! value. A changed modification time yields a different key, so stale
//! entries are never returned. The backing store is one JSON object.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use crate::config::MetadataMode;
use crate::error::CacheError;
use crate::models::MediaMetadata;

/// Build the cache key for a file
pub fn cache_key(path: &Path, mtime_millis: i64) -> String {
    format!("{}:{}", path.display(), mtime_millis)
}

/// Encode metadata in the value shape used by `mode`
pub fn encode_metadata(meta: &MediaMetadata, mode: MetadataMode) -> Option<Value> {
    match mode {
        MetadataMode::Disabled => None,
        MetadataMode::Duration => serde_json::Number::from_f64(meta.duration).map(Value::Number),
        MetadataMode::Full => serde_json::to_value(meta).ok(),
    }
}

/// Decode a cached value; `None` when its shape does not match `mode`
pub fn decode_metadata(value: &Value, mode: MetadataMode) -> Option<MediaMetadata> {
    match mode {
        MetadataMode::Disabled => None,
        MetadataMode::Duration => value.as_f64().map(MediaMetadata::with_duration),
        MetadataMode::Full => {
            if !value.is_object() {
                return None;
            }
            serde_json::from_value(value.clone()).ok()
        }
    }
}

struct CacheSlot {
    value: Value,
    last_used: AtomicU64,
}

/// Concurrent metadata cache with a dirty-flag gated flush
pub struct MetadataCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, CacheSlot>>,
    dirty: AtomicBool,
    clock: AtomicU64,
    max_entries: Option<usize>,
}

impl MetadataCache {
    /// Open the cache file at `path`; missing or corrupt files start empty
    pub fn open(path: impl Into<PathBuf>, max_entries: Option<usize>) -> Self {
        let path = path.into();
        let entries = match Self::load(&path) {
            Ok(entries) => {
                log::debug!("Loaded {} cache entries from {:?}", entries.len(), path);
                entries
            }
            Err(e) => {
                log::warn!("Failed to load cache: {}", e);
                HashMap::new()
            }
        };
        let cache = Self::with_entries(Some(path), entries, max_entries);
        cache.enforce_bound();
        cache
    }

    /// Cache without persistence
    pub fn in_memory(max_entries: Option<usize>) -> Self {
        Self::with_entries(None, HashMap::new(), max_entries)
    }

    fn with_entries(
        path: Option<PathBuf>,
        entries: HashMap<String, Value>,
        max_entries: Option<usize>,
    ) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, value)| {
                let slot = CacheSlot {
                    value,
                    last_used: AtomicU64::new(0),
                };
                (k, slot)
            })
            .collect();
        Self {
            path,
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(false),
            clock: AtomicU64::new(1),
            max_entries,
        }
    }

    /// Read the persisted mapping
    pub fn load(path: &Path) -> Result<HashMap<String, Value>, CacheError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(serde_json::from_str(&data)?)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|slot| {
            slot.last_used.store(self.tick(), Ordering::Relaxed);
            slot.value.clone()
        })
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let slot = CacheSlot {
            value,
            last_used: AtomicU64::new(self.tick()),
        };
        entries.insert(key.into(), slot);
        if let Some(max) = self.max_entries {
            evict_lru(&mut entries, max);
        }
        self.dirty.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a mutation happened since the last flush
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Persist the cache if it changed. Returns whether a write happened.
    pub fn flush(&self) -> Result<bool, CacheError> {
        let Some(path) = &self.path else {
            self.dirty.store(false, Ordering::Release);
            return Ok(false);
        };

        // Writers set the flag while holding the write lock, so
        // clearing it under the read lock cannot drop a mutation.
        let json = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if !self.dirty.swap(false, Ordering::AcqRel) {
                return Ok(false);
            }
            let ordered: BTreeMap<&str, &Value> =
                entries.iter().map(|(k, slot)| (k.as_str(), &slot.value)).collect();
            serde_json::to_string_pretty(&ordered)?
        };

        if let Err(e) = write_atomic(path, &json) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        log::debug!("Flushed metadata cache to {:?}", path);
        Ok(true)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn enforce_bound(&self) {
        if let Some(max) = self.max_entries {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            if entries.len() > max {
                evict_lru(&mut entries, max);
                self.dirty.store(true, Ordering::Release);
            }
        }
    }
}

/// Evict least recently used entries once `max` is exceeded.
///
/// Removes an extra eighth of `max` per pass so a full cache sorts its
/// ticks once per batch of inserts, not on every insert.
fn evict_lru(entries: &mut HashMap<String, CacheSlot>, max: usize) {
    if entries.len() <= max {
        return;
    }
    let target = max - max / 8;
    let excess = entries.len() - target;
    let mut ticks: Vec<(u64, &String)> = entries
        .iter()
        .map(|(k, slot)| (slot.last_used.load(Ordering::Relaxed), k))
        .collect();
    if excess < ticks.len() {
        ticks.select_nth_unstable_by_key(excess - 1, |(tick, _)| *tick);
    }
    let victims: Vec<String> = ticks[..excess].iter().map(|(_, k)| (*k).clone()).collect();
    for key in victims {
        entries.remove(&key);
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}
