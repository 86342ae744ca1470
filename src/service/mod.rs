//! The image service: pull, remove, status, list, and filesystem info

mod gc;

pub use gc::{GarbageCollector, GcStats, DEFAULT_GC_INTERVAL};

use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageName, ImageVersion, Registry, Repository},
    manifest::Descriptor,
    metadata::{ImageRecord, MetadataStore},
    registry::{DefaultRegistry, ProbeStatus, RegistryAuth, RegistryClient},
    storage::{LayerCache, LayerRecord, LayerStore},
};
use std::{
    collections::{HashMap, HashSet},
    env, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::{fs, sync::RwLock};
use tokio_util::sync::CancellationToken;

/// Image root used when neither the builder nor the environment names one
pub const DEFAULT_IMAGE_ROOT: &str = "/var/lib/image-service";

/// Environment variable overriding the default image root
pub const IMAGE_ROOT_ENV: &str = "LAYERSTASH_ROOT";

/// Default ceiling for the layer cache, 10 GiB
pub const DEFAULT_CACHE_MAX_BYTES: i64 = 10 * 1024 * 1024 * 1024;

fn default_image_root() -> PathBuf {
    match env::var(IMAGE_ROOT_ENV) {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from(DEFAULT_IMAGE_ROOT),
    }
}

/// Builder for configuring custom [ImageService] instances
pub struct ImageServiceBuilder {
    image_root: Option<PathBuf>,
    cache_max_bytes: i64,
    default_registry: DefaultRegistry,
    verify_tls: bool,
}

impl ImageServiceBuilder {
    fn new() -> Self {
        ImageServiceBuilder {
            image_root: None,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            default_registry: DefaultRegistry::default(),
            verify_tls: false,
        }
    }

    /// Change the directory images are stored under
    ///
    /// Defaults to `/var/lib/image-service`, or the value of the
    /// `LAYERSTASH_ROOT` environment variable when set.
    pub fn image_root(mut self, dir: &Path) -> Self {
        self.image_root = Some(dir.to_path_buf());
        self
    }

    /// Change the layer cache ceiling in bytes; `0` means unbounded
    pub fn cache_max_bytes(mut self, max_bytes: i64) -> Self {
        self.cache_max_bytes = max_bytes;
        self
    }

    /// Change the registry used for references that name no server
    pub fn default_registry(mut self, default_registry: DefaultRegistry) -> Self {
        self.default_registry = default_registry;
        self
    }

    /// Verify registry TLS certificates
    ///
    /// Off by default, matching the long-standing behavior of this service;
    /// turn it on where the registry presents a real certificate chain.
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Construct the service: create the image root, load the persisted
    /// catalog, and prime the layer cache from it
    ///
    /// Fails if the catalog file exists but cannot be parsed.
    pub async fn build(self) -> Result<ImageService, ImageError> {
        let root = self.image_root.unwrap_or_else(default_image_root);
        fs::create_dir_all(&root).await?;
        log::info!("using image root {:?}", root);

        let store = LayerStore::new(&root);
        let metadata = MetadataStore::new(&root);
        let catalog = metadata.load().await?;

        let cache = LayerCache::new(self.cache_max_bytes);
        for record in catalog.values() {
            for layer in &record.layers {
                cache.add(layer.clone());
            }
        }

        Ok(ImageService {
            catalog: RwLock::new(catalog),
            cache,
            store,
            metadata,
            client: RegistryClient::new(self.verify_tls)?,
            default_registry: self.default_registry,
        })
    }
}

/// Filesystem information about the image store
#[derive(Clone, Debug)]
pub struct FsInfo {
    /// Nanoseconds since the unix epoch at the moment of the query
    pub timestamp: i64,
    /// The image root
    pub mountpoint: PathBuf,
    pub used_bytes: u64,
    pub inodes_used: u64,
}

/// Stores container images on local disk and answers for them
///
/// One instance owns an image root directory: the durable catalog in
/// `metadata.json`, one directory of verified layer blobs per image, and an
/// in-memory layer cache that deduplicates layers across images. All
/// operations take `&self` and may run concurrently; the catalog sits
/// behind a readers-writer lock where status and list take the shared side.
pub struct ImageService {
    catalog: RwLock<HashMap<String, ImageRecord>>,
    cache: LayerCache,
    store: LayerStore,
    metadata: MetadataStore,
    client: RegistryClient,
    default_registry: DefaultRegistry,
}

impl ImageService {
    /// Configure a service instance
    pub fn builder() -> ImageServiceBuilder {
        ImageServiceBuilder::new()
    }

    /// The directory this service stores images under
    pub fn image_root(&self) -> &Path {
        self.store.root()
    }

    /// Resolve a parsed name to its network location and canonical catalog
    /// key: `registry/repository:tag`, or `registry/repository@digest`
    /// when the name pins a digest.
    fn canonicalize(&self, name: &ImageName) -> (Registry, Repository, ImageVersion, String) {
        let (registry, repository) = self.default_registry.resolve(name);
        let version = name.version();
        let canonical = match &version {
            ImageVersion::ContentDigest(digest) => {
                format!("{}/{}@{}", registry, repository, digest)
            }
            ImageVersion::Tag(tag) => format!("{}/{}:{}", registry, repository, tag),
        };
        (registry, repository, version, canonical)
    }

    /// Canonical key for operations on already-stored images, where an
    /// unparseable reference can only mean the image is not stored
    fn canonical_key(&self, reference: &str) -> Result<String, ImageError> {
        let name = ImageName::parse(reference)
            .map_err(|_| ImageError::ImageNotFound(reference.to_owned()))?;
        let (_, _, _, canonical) = self.canonicalize(&name);
        Ok(canonical)
    }

    /// Pull an image from its registry and record it in the catalog
    ///
    /// Idempotent: a reference already in the catalog returns its existing
    /// ID without touching the network. Layers whose digest is cached and
    /// whose file still exists are reused by hardlink or copy; everything
    /// else is downloaded, digest-verified, and installed atomically. The
    /// catalog is only updated after every layer is in place.
    pub async fn pull_image(
        &self,
        reference: &str,
        auth: Option<RegistryAuth>,
        cancel: &CancellationToken,
    ) -> Result<String, ImageError> {
        let name = ImageName::parse(reference)?;
        let (registry, repository, version, canonical) = self.canonicalize(&name);

        {
            let catalog = self.catalog.read().await;
            if let Some(record) = catalog.get(&canonical) {
                log::debug!("{} already present as {}", canonical, record.id);
                return Ok(record.id.clone());
            }
        }

        if cancel.is_cancelled() {
            return Err(ImageError::Cancelled);
        }
        match self.client.probe(&registry, auth.as_ref()).await? {
            ProbeStatus::Ok => {}
            ProbeStatus::AuthRequired => return Err(ImageError::AuthRequired),
            ProbeStatus::AuthFailed => return Err(ImageError::AuthFailed),
            ProbeStatus::OtherError(status) => {
                return Err(ImageError::RegistryUnavailable(format!(
                    "{} version check failed with status {}",
                    registry, status
                )))
            }
        }

        let manifest = self
            .client
            .manifest(&registry, &repository, &version, auth.as_ref())
            .await?;

        let reference_digest = ContentDigest::from_content(canonical.as_bytes());
        let image_dir = self.store.image_dir(&reference_digest);

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for (index, descriptor) in manifest.layers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ImageError::Cancelled);
            }
            let layer_path = LayerStore::layer_path(&image_dir, index);

            if let Some(cached) = self.cache.get(&descriptor.digest) {
                if fs::metadata(&cached.path).await.is_ok() {
                    match self.store.reuse(&cached.path, &layer_path).await {
                        Ok(()) => {
                            log::debug!(
                                "layer {} reused from {:?}",
                                descriptor.digest,
                                cached.path
                            );
                            layers.push(LayerRecord {
                                digest: cached.digest,
                                path: layer_path,
                                size: cached.size,
                            });
                            continue;
                        }
                        Err(err) => {
                            log::warn!(
                                "could not reuse cached layer {}: {}",
                                descriptor.digest,
                                err
                            );
                            self.cache.remove(&descriptor.digest);
                        }
                    }
                } else {
                    // The cached file is gone; forget it and re-download
                    self.cache.remove(&descriptor.digest);
                }
            }

            let record = self
                .download_layer(&registry, &repository, descriptor, &layer_path, auth.as_ref(), cancel)
                .await?;
            self.cache.add(record.clone());
            layers.push(record);
        }

        let size = layers.iter().map(|layer| layer.size).sum();
        let record = ImageRecord {
            id: format!("sha256:{}", reference_digest.hex_str()),
            repo_tags: vec![canonical.clone()],
            repo_digests: vec![format!("{}@{}", canonical, reference_digest)],
            size,
            layers,
        };
        let id = record.id.clone();

        if cancel.is_cancelled() {
            return Err(ImageError::Cancelled);
        }
        let mut catalog = self.catalog.write().await;
        catalog.insert(canonical.clone(), record);
        if let Err(err) = self.metadata.save(&catalog).await {
            // Keep the in-memory catalog consistent with what's on disk
            catalog.remove(&canonical);
            return Err(err);
        }
        log::info!("pulled {} as {}", canonical, id);
        Ok(id)
    }

    /// Download one layer blob, hashing it as it streams to disk
    async fn download_layer(
        &self,
        registry: &Registry,
        repository: &Repository,
        descriptor: &Descriptor,
        layer_path: &Path,
        auth: Option<&RegistryAuth>,
        cancel: &CancellationToken,
    ) -> Result<LayerRecord, ImageError> {
        let expected = ContentDigest::parse(&descriptor.digest).map_err(|_| {
            ImageError::RegistryUnavailable(format!(
                "manifest carries a malformed layer digest {:?}",
                descriptor.digest
            ))
        })?;

        let mut response = self
            .client
            .blob(registry, repository, &expected, auth)
            .await?;
        let mut writer = self.store.begin_install(layer_path).await?;
        loop {
            if cancel.is_cancelled() {
                writer.discard().await;
                return Err(ImageError::Cancelled);
            }
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(err) = writer.write_chunk(&chunk).await {
                        writer.discard().await;
                        return Err(err);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    writer.discard().await;
                    return Err(ImageError::RegistryUnavailable(err.to_string()));
                }
            }
        }
        let (path, _) = writer.commit(&expected).await?;

        // The record carries the verified byte length on disk, not the
        // size the manifest claimed
        let size = fs::metadata(&path).await?.len() as i64;
        log::debug!("layer verified and saved, size={}, digest={}", size, expected);
        Ok(LayerRecord {
            digest: descriptor.digest.clone(),
            path,
            size,
        })
    }

    /// Remove an image, deleting only the layer files no surviving image
    /// still references
    pub async fn remove_image(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ImageError> {
        let canonical = self.canonical_key(reference)?;
        if cancel.is_cancelled() {
            return Err(ImageError::Cancelled);
        }

        let mut catalog = self.catalog.write().await;
        let record = match catalog.get(&canonical) {
            Some(record) => record.clone(),
            None => return Err(ImageError::ImageNotFound(reference.to_owned())),
        };

        let in_use: HashSet<String> = catalog
            .iter()
            .filter(|(key, _)| key.as_str() != canonical)
            .flat_map(|(_, other)| other.layers.iter().map(|layer| layer.digest.clone()))
            .collect();

        for layer in &record.layers {
            if in_use.contains(&layer.digest) {
                continue;
            }
            self.cache.remove(&layer.digest);
            match fs::remove_file(&layer.path).await {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    log::warn!("could not remove layer file {:?}: {}", layer.path, err)
                }
            }
        }

        let reference_digest = ContentDigest::from_content(canonical.as_bytes());
        self.store.remove_image_dir(&reference_digest).await?;

        catalog.remove(&canonical);
        self.metadata.save(&catalog).await?;
        log::info!("removed image {}", canonical);
        Ok(())
    }

    /// Look up one stored image by reference
    pub async fn image_status(&self, reference: &str) -> Result<ImageRecord, ImageError> {
        let canonical = self.canonical_key(reference)?;
        let catalog = self.catalog.read().await;
        catalog
            .get(&canonical)
            .cloned()
            .ok_or_else(|| ImageError::ImageNotFound(reference.to_owned()))
    }

    /// All stored images, in no particular order
    pub async fn list_images(&self) -> Vec<ImageRecord> {
        self.catalog.read().await.values().cloned().collect()
    }

    /// Mount point and placeholder usage counters for the image store
    pub fn image_fs_info(&self) -> FsInfo {
        FsInfo {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as i64)
                .unwrap_or(0),
            mountpoint: self.store.root().to_path_buf(),
            used_bytes: 0,
            inodes_used: 0,
        }
    }

    /// Every layer path some catalog record still points at
    pub(crate) async fn referenced_layer_paths(&self) -> HashSet<PathBuf> {
        self.catalog
            .read()
            .await
            .values()
            .flat_map(|record| record.layers.iter().map(|layer| layer.path.clone()))
            .collect()
    }
}
