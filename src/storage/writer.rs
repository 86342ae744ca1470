use crate::{errors::ImageError, image::ContentDigest};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

/// Streams one blob into a temporary file while hashing it
///
/// The blob lands at `<final_path>.tmp` first, with a running `sha256`
/// computed over exactly the bytes written. [BlobWriter::commit] checks the
/// digest and renames the temporary into place; the rename stays within one
/// directory, so a crash at any point leaves either no file or the complete
/// verified file at the final name.
pub struct BlobWriter {
    temp_file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    hasher: Sha256,
    written: i64,
}

impl BlobWriter {
    /// Create the temporary file next to `final_path`, making parent
    /// directories as needed
    pub async fn create(final_path: &Path) -> Result<Self, ImageError> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut temp_os = final_path.as_os_str().to_os_string();
        temp_os.push(".tmp");
        let temp_path = PathBuf::from(temp_os);
        let temp_file = fs::File::create(&temp_path).await?;
        Ok(BlobWriter {
            temp_file,
            temp_path,
            final_path: final_path.to_path_buf(),
            hasher: Sha256::new(),
            written: 0,
        })
    }

    /// Append one chunk of blob data
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ImageError> {
        self.temp_file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.written += chunk.len() as i64;
        Ok(())
    }

    /// Verify the computed digest and move the blob to its final name
    ///
    /// On a digest mismatch the temporary file is unlinked and nothing ever
    /// appears at the final name. Returns the final path and the byte count
    /// written.
    pub async fn commit(
        mut self,
        expected: &ContentDigest,
    ) -> Result<(PathBuf, i64), ImageError> {
        self.temp_file.flush().await?;
        drop(self.temp_file);
        let found = ContentDigest::from_parts("sha256", &self.hasher.finalize())
            .expect("sha256 digests always parse");
        if &found != expected {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(ImageError::DigestMismatch {
                expected: expected.clone(),
                found,
            });
        }
        if let Err(err) = fs::rename(&self.temp_path, &self.final_path).await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err.into());
        }
        Ok((self.final_path, self.written))
    }

    /// Abandon the write and unlink the temporary file
    pub async fn discard(self) {
        drop(self.temp_file);
        if let Err(err) = fs::remove_file(&self.temp_path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!("could not remove {:?}: {}", self.temp_path, err);
            }
        }
    }
}
