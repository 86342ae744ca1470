//! Error types you might see while pulling, storing, or removing images

use crate::image::ContentDigest;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the image store and its pull/remove pipelines
#[derive(Error, Debug)]
pub enum ImageError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReference(String),

    /// registry requires authentication and no credentials were supplied
    #[error("registry requires authentication and no credentials were supplied")]
    AuthRequired,

    /// registry rejected the supplied credentials
    #[error("registry rejected the supplied credentials")]
    AuthFailed,

    /// registry is unreachable or returned an unexpected response
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// manifest does not exist on the registry
    #[error("manifest not found for {0:?}")]
    ManifestNotFound(String),

    /// calculated digest of downloaded content is not what the manifest claimed
    #[error("layer digest mismatch, expected {expected}, found {found}")]
    DigestMismatch {
        expected: ContentDigest,
        found: ContentDigest,
    },

    /// reuse source file has vanished
    #[error("layer reuse source does not exist: {0:?}")]
    SourceMissing(PathBuf),

    /// storage io error
    #[error("storage io error: {0}")]
    IoError(#[from] std::io::Error),

    /// image catalog could not be persisted
    #[error("failed to persist image catalog: {0}")]
    MetadataPersistFailed(#[source] std::io::Error),

    /// no image stored under this reference
    #[error("image not found: {0:?}")]
    ImageNotFound(String),

    /// the operation was cancelled by its caller
    #[error("operation cancelled")]
    Cancelled,
}
