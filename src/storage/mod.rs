//! The on-disk layer store: layout, atomic installs, and reuse

mod cache;
mod writer;

pub use cache::{LayerCache, LayerRecord};
pub use writer::BlobWriter;

use crate::{errors::ImageError, image::ContentDigest};
use std::path::{Path, PathBuf};
use tokio::fs;

/// File name every stored layer blob lives under
pub const LAYER_FILE_NAME: &str = "layer.tar";

/// Owns the image root directory and the blob files inside it
///
/// Layout under the root: one directory per image, named by the hex of the
/// image's reference digest, holding one `layer-<i>/layer.tar` per manifest
/// layer. The catalog file sits beside the image directories.
#[derive(Clone, Debug)]
pub struct LayerStore {
    root: PathBuf,
}

impl LayerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LayerStore { root: root.into() }
    }

    /// The configured image root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a particular image's layers live under
    pub fn image_dir(&self, reference_digest: &ContentDigest) -> PathBuf {
        self.root.join(reference_digest.hex_str())
    }

    /// Final path for layer number `index` of an image
    pub fn layer_path(image_dir: &Path, index: usize) -> PathBuf {
        image_dir
            .join(format!("layer-{}", index))
            .join(LAYER_FILE_NAME)
    }

    /// Begin an atomic install of one layer blob at `final_path`
    pub async fn begin_install(&self, final_path: &Path) -> Result<BlobWriter, ImageError> {
        BlobWriter::create(final_path).await
    }

    /// Materialize an already-downloaded layer at a new path
    ///
    /// Prefers a hard link for zero-cost deduplication and falls back to a
    /// full copy across filesystems; callers must not depend on same-inode
    /// semantics. A failed copy unlinks its partial destination.
    pub async fn reuse(&self, src: &Path, dest: &Path) -> Result<(), ImageError> {
        if let Err(err) = fs::metadata(src).await {
            return match err.kind() {
                std::io::ErrorKind::NotFound => Err(ImageError::SourceMissing(src.to_path_buf())),
                _ => Err(err.into()),
            };
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::hard_link(src, dest).await.is_ok() {
            return Ok(());
        }
        match fs::copy(src, dest).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(dest).await;
                Err(err.into())
            }
        }
    }

    /// Recursively delete an image's directory
    pub async fn remove_image_dir(&self, reference_digest: &ContentDigest) -> Result<(), ImageError> {
        let dir = self.image_dir(reference_digest);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reuse_prefers_hardlink() {
        let dir = TempDir::new().unwrap();
        let store = LayerStore::new(dir.path());
        let src = dir.path().join("src").join(LAYER_FILE_NAME);
        fs::create_dir_all(src.parent().unwrap()).await.unwrap();
        fs::write(&src, b"layer bytes").await.unwrap();

        let dest = dir.path().join("other").join("deep").join(LAYER_FILE_NAME);
        store.reuse(&src, &dest).await.unwrap();
        assert_eq!(fs::read(&dest).await.unwrap(), b"layer bytes");
        // Source must be untouched either way
        assert_eq!(fs::read(&src).await.unwrap(), b"layer bytes");
    }

    #[tokio::test]
    async fn reuse_missing_source() {
        let dir = TempDir::new().unwrap();
        let store = LayerStore::new(dir.path());
        let src = dir.path().join("gone").join(LAYER_FILE_NAME);
        let dest = dir.path().join("dest").join(LAYER_FILE_NAME);
        match store.reuse(&src, &dest).await {
            Err(ImageError::SourceMissing(path)) => assert_eq!(path, src),
            other => panic!("expected SourceMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn install_verifies_and_renames() {
        let dir = TempDir::new().unwrap();
        let store = LayerStore::new(dir.path());
        let content = b"some layer content";
        let expected = ContentDigest::from_content(content);

        let final_path = dir.path().join("img").join("layer-0").join(LAYER_FILE_NAME);
        let mut writer = store.begin_install(&final_path).await.unwrap();
        writer.write_chunk(&content[..5]).await.unwrap();
        writer.write_chunk(&content[5..]).await.unwrap();
        let (path, written) = writer.commit(&expected).await.unwrap();

        assert_eq!(path, final_path);
        assert_eq!(written, content.len() as i64);
        assert_eq!(fs::read(&final_path).await.unwrap(), content);
        let mut temp_os = final_path.as_os_str().to_os_string();
        temp_os.push(".tmp");
        assert!(!PathBuf::from(temp_os).exists());
    }

    #[tokio::test]
    async fn install_rejects_digest_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = LayerStore::new(dir.path());
        let expected = ContentDigest::from_content(b"what the manifest claimed");

        let final_path = dir.path().join("img").join("layer-0").join(LAYER_FILE_NAME);
        let mut writer = store.begin_install(&final_path).await.unwrap();
        writer.write_chunk(b"something else entirely").await.unwrap();
        match writer.commit(&expected).await {
            Err(ImageError::DigestMismatch { .. }) => {}
            other => panic!("expected DigestMismatch, got {:?}", other.map(|_| ())),
        }
        // Neither the final name nor the temporary may remain
        assert!(!final_path.exists());
        let mut temp_os = final_path.as_os_str().to_os_string();
        temp_os.push(".tmp");
        assert!(!PathBuf::from(temp_os).exists());
    }

    #[tokio::test]
    async fn discard_removes_temp() {
        let dir = TempDir::new().unwrap();
        let store = LayerStore::new(dir.path());
        let final_path = dir.path().join("img").join("layer-0").join(LAYER_FILE_NAME);
        let mut writer = store.begin_install(&final_path).await.unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        writer.discard().await;
        assert!(!final_path.exists());
        let mut temp_os = final_path.as_os_str().to_os_string();
        temp_os.push(".tmp");
        assert!(!PathBuf::from(temp_os).exists());
    }
}
