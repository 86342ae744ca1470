//! Background reconciliation of the filesystem against the catalog

use super::ImageService;
use crate::{errors::ImageError, storage::LAYER_FILE_NAME};
use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};
use tokio::{fs, sync::watch, task::JoinHandle, time};

/// How often the collector runs unless configured otherwise
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Counters describing what garbage collection has done so far
#[derive(Clone, Debug, Default)]
pub struct GcStats {
    pub last_run: Option<SystemTime>,
    pub total_collections: u64,
    pub total_layers_removed: u64,
    /// Bytes reclaimed by the most recent pass
    pub last_collection_size: i64,
}

/// Periodically deletes layer files no image record references
///
/// A pull that fails partway, a crash between metadata rewrites, or an
/// eviction whose unlink failed can all leave orphan blobs on disk. The
/// collector walks the image root, subtracts the paths the catalog still
/// references, and unlinks the rest. It reads the catalog but never
/// mutates it.
///
/// The collector is an owned task: [GarbageCollector::start] spawns it and
/// [GarbageCollector::stop] signals it and joins. Nothing is detached.
pub struct GarbageCollector {
    service: Arc<ImageService>,
    interval: Duration,
    stats: Arc<Mutex<GcStats>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl GarbageCollector {
    pub fn new(service: Arc<ImageService>, interval: Duration) -> Self {
        GarbageCollector {
            service,
            interval,
            stats: Arc::new(Mutex::new(GcStats::default())),
            stop_tx: None,
            task: None,
        }
    }

    /// Spawn the periodic collection task; the first pass runs one full
    /// interval after start
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let service = self.service.clone();
        let stats = self.stats.clone();
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            // An interval's first tick completes immediately; consume it so
            // collection starts one period from now
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    _ = ticker.tick() => {
                        if let Err(err) = Self::collect_pass(&service, &stats).await {
                            log::warn!("garbage collection failed: {}", err);
                        }
                    }
                }
            }
        });
        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
    }

    /// Signal the task to stop and wait for it to finish
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Run one collection pass now, regardless of the schedule
    pub async fn collect(&self) -> Result<(), ImageError> {
        Self::collect_pass(&self.service, &self.stats).await
    }

    /// A copy of the current collection counters
    pub fn stats(&self) -> GcStats {
        self.stats.lock().unwrap().clone()
    }

    async fn collect_pass(
        service: &ImageService,
        stats: &Mutex<GcStats>,
    ) -> Result<(), ImageError> {
        let start = SystemTime::now();
        log::debug!("starting garbage collection");

        let on_disk = Self::layer_files(service.image_root()).await?;
        let referenced: HashSet<PathBuf> = service.referenced_layer_paths().await;

        let mut removed = 0u64;
        let mut reclaimed = 0i64;
        for path in on_disk {
            if referenced.contains(&path) {
                continue;
            }
            let size = match fs::metadata(&path).await {
                Ok(meta) => meta.len() as i64,
                Err(_) => continue,
            };
            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    reclaimed += size;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    log::warn!("could not remove unreferenced layer {:?}: {}", path, err)
                }
            }
        }

        let mut stats = stats.lock().unwrap();
        stats.last_run = Some(start);
        stats.total_collections += 1;
        stats.total_layers_removed += removed;
        stats.last_collection_size = reclaimed;
        log::info!(
            "garbage collection removed {} unreferenced layers ({} bytes)",
            removed,
            reclaimed
        );
        Ok(())
    }

    /// Every `layer.tar` under the image root
    async fn layer_files(root: &Path) -> Result<Vec<PathBuf>, ImageError> {
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    log::warn!("could not read {:?}: {}", dir, err);
                    continue;
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if entry.file_name() == LAYER_FILE_NAME {
                    found.push(entry.path());
                }
            }
        }
        Ok(found)
    }
}
