//! Durable catalog of stored images, one atomically rewritten JSON file

use crate::{errors::ImageError, storage::LayerRecord};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// File name of the persisted catalog inside the image root
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Everything the service knows about one stored image
///
/// Serialized into `metadata.json` keyed by canonical reference; the field
/// names are a stable on-disk format and must not change.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageRecord {
    /// `sha256:` + hex of the reference digest
    pub id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    /// Byte-exact sum of the layer sizes
    pub size: i64,
    pub layers: Vec<LayerRecord>,
}

/// Loads and atomically rewrites the whole catalog
///
/// The catalog stays small (hundreds to low thousands of records), so every
/// mutation rewrites the entire file: serialize to `metadata.json.tmp` in
/// the same directory, then rename over `metadata.json`. At any crash point
/// exactly one consistent snapshot survives.
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(root: &Path) -> Self {
        MetadataStore {
            path: root.join(METADATA_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the catalog from disk
    ///
    /// A missing file is an empty catalog. A file that exists but does not
    /// parse is a hard error; silently starting over would orphan every
    /// stored image.
    pub async fn load(&self) -> Result<HashMap<String, ImageRecord>, ImageError> {
        let data = match fs::read(&self.path).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(err.into()),
            Ok(data) => data,
        };
        serde_json::from_slice(&data).map_err(|err| {
            ImageError::IoError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("corrupt image catalog {:?}: {}", self.path, err),
            ))
        })
    }

    /// Atomically replace the catalog on disk
    pub async fn save(&self, catalog: &HashMap<String, ImageRecord>) -> Result<(), ImageError> {
        let data = serde_json::to_vec_pretty(catalog)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
            .map_err(ImageError::MetadataPersistFailed)?;

        let mut temp_os = self.path.as_os_str().to_os_string();
        temp_os.push(".tmp");
        let temp_path = PathBuf::from(temp_os);

        fs::write(&temp_path, &data)
            .await
            .map_err(ImageError::MetadataPersistFailed)?;
        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(ImageError::MetadataPersistFailed(err));
        }
        Ok(())
    }
}
