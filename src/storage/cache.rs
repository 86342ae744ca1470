use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Mutex,
    time::Instant,
};

/// One verified layer on local disk
///
/// `digest` is the content digest the registry manifest reported, `path` is
/// where the verified blob lives, and `size` is its byte length on disk.
/// These records persist inside the image catalog, so the field names are
/// stable.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LayerRecord {
    pub digest: String,
    pub path: PathBuf,
    pub size: i64,
}

/// In-memory index of layers available for reuse, bounded by total bytes
///
/// Lookups refresh a last-used stamp; when an insert would push the total
/// past `max_bytes`, the least recently used entries are evicted and their
/// backing files unlinked. A single lock guards the map and the byte total
/// together, since eviction has to walk the whole set anyway.
pub struct LayerCache {
    max_bytes: i64,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    layers: HashMap<String, LayerRecord>,
    last_used: HashMap<String, Instant>,
    total_bytes: i64,
}

impl LayerCache {
    /// Create a cache bounded to `max_bytes` total; `0` means unbounded
    pub fn new(max_bytes: i64) -> Self {
        LayerCache {
            max_bytes,
            inner: Mutex::new(CacheInner {
                layers: HashMap::new(),
                last_used: HashMap::new(),
                total_bytes: 0,
            }),
        }
    }

    /// Look up a layer by digest, refreshing its last-used stamp on a hit
    pub fn get(&self, digest: &str) -> Option<LayerRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.layers.get(digest).cloned()?;
        inner.last_used.insert(digest.to_owned(), Instant::now());
        Some(record)
    }

    /// Insert or replace a layer record
    ///
    /// Records with an empty digest or a negative size are silently
    /// ignored, as is any record that alone would exceed the configured
    /// bound. When replacing, the old entry's size is retired first.
    pub fn add(&self, record: LayerRecord) {
        if record.digest.is_empty() || record.size < 0 {
            return;
        }
        if self.max_bytes > 0 && record.size > self.max_bytes {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.layers.remove(&record.digest) {
            inner.total_bytes -= existing.size;
            inner.last_used.remove(&record.digest);
        }
        if self.max_bytes > 0 {
            let excess = inner.total_bytes + record.size - self.max_bytes;
            if excess > 0 {
                Self::evict(&mut inner, excess);
            }
        }
        inner.total_bytes += record.size;
        inner.last_used.insert(record.digest.clone(), Instant::now());
        inner.layers.insert(record.digest.clone(), record);
    }

    /// Drop a layer from the index
    ///
    /// The backing file is left alone; whoever drops the entry decides what
    /// happens to the file.
    pub fn remove(&self, digest: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.layers.remove(digest) {
            inner.total_bytes -= record.size;
            inner.last_used.remove(digest);
        }
    }

    /// Current sum of the sizes of all cached layers
    pub fn total_bytes(&self) -> i64 {
        self.inner.lock().unwrap().total_bytes
    }

    /// Is this digest currently cached?
    pub fn contains(&self, digest: &str) -> bool {
        self.inner.lock().unwrap().layers.contains_key(digest)
    }

    /// Evict least recently used layers until `space_needed` bytes are
    /// freed, unlinking their backing files
    ///
    /// Zero-size entries are never candidates. Unlink failures are logged
    /// and do not keep the entry alive; a later collection pass reconciles
    /// the filesystem.
    fn evict(inner: &mut CacheInner, space_needed: i64) {
        let now = Instant::now();
        let mut candidates: Vec<(String, Instant, i64)> = inner
            .layers
            .iter()
            .filter(|(_, record)| record.size > 0)
            .map(|(digest, record)| {
                let used = inner.last_used.get(digest).copied().unwrap_or(now);
                (digest.clone(), used, record.size)
            })
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1));

        let mut freed = 0;
        for (digest, _, _) in candidates {
            if freed >= space_needed {
                break;
            }
            if let Some(record) = inner.layers.remove(&digest) {
                if let Err(err) = std::fs::remove_file(&record.path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("could not remove evicted layer {:?}: {}", record.path, err);
                    }
                }
                freed += record.size;
                inner.total_bytes -= record.size;
                inner.last_used.remove(&digest);
            }
        }
    }
}
