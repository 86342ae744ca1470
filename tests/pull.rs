//! Pull pipeline scenarios against a loopback mock registry

mod common;

use common::{count_layer_files, digest_of, MockRegistryBuilder};
use layerstash::{
    ContentDigest, DefaultRegistry, ImageError, ImageService, RegistryAuth,
};
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn service_at(root: &Path) -> ImageService {
    ImageService::builder()
        .image_root(root)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn pull_then_status_and_list() {
    let registry = MockRegistryBuilder::new()
        .image("lib/app", "latest", &[&vec![7u8; 1000]])
        .start()
        .await;
    let root = TempDir::new().unwrap();
    let service = service_at(root.path()).await;
    let cancel = CancellationToken::new();

    let reference = format!("{}/lib/app:latest", registry.addr);
    let id = service
        .pull_image(&reference, None, &cancel)
        .await
        .unwrap();

    // The image ID is derived from the canonical reference string, which
    // for a fully qualified reference is the reference itself
    let reference_digest = ContentDigest::from_content(reference.as_bytes());
    assert_eq!(id, format!("sha256:{}", reference_digest.hex_str()));

    let record = service.image_status(&reference).await.unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.size, 1000);
    assert_eq!(record.repo_tags, vec![reference.clone()]);
    assert_eq!(
        record.repo_digests,
        vec![format!("{}@{}", reference, reference_digest)]
    );

    // Exactly one layer file, at the expected path, with the exact bytes
    assert_eq!(record.layers.len(), 1);
    let layer_path = root
        .path()
        .join(reference_digest.hex_str())
        .join("layer-0")
        .join("layer.tar");
    assert_eq!(record.layers[0].path, layer_path);
    assert_eq!(std::fs::metadata(&layer_path).unwrap().len(), 1000);
    assert_eq!(count_layer_files(root.path()), 1);

    let listed = service.list_images().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
}

#[tokio::test]
async fn digest_mismatch_leaves_nothing_behind() {
    let claimed = digest_of(b"what the manifest claimed");
    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": 2,
            "digest": digest_of(b"{}"),
        },
        "layers": [{
            "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
            "size": 10,
            "digest": claimed,
        }],
    });
    let registry = MockRegistryBuilder::new()
        .manifest_raw("lib/app", "latest", serde_json::to_vec(&manifest).unwrap())
        .blob_raw("lib/app", &claimed, b"other bytes".to_vec())
        .start()
        .await;
    let root = TempDir::new().unwrap();
    let service = service_at(root.path()).await;
    let cancel = CancellationToken::new();

    let reference = format!("{}/lib/app:latest", registry.addr);
    match service.pull_image(&reference, None, &cancel).await {
        Err(ImageError::DigestMismatch { expected, .. }) => {
            assert_eq!(expected.as_str(), claimed)
        }
        other => panic!("expected DigestMismatch, got {:?}", other),
    }

    // No layer file at the final name, and nothing in the catalog
    assert_eq!(count_layer_files(root.path()), 0);
    assert!(matches!(
        service.image_status(&reference).await,
        Err(ImageError::ImageNotFound(_))
    ));
    assert!(!root.path().join("metadata.json").exists());
}

#[tokio::test]
async fn pull_is_idempotent() {
    let registry = MockRegistryBuilder::new()
        .image("lib/app", "latest", &[&vec![1u8; 64], &vec![2u8; 64]])
        .start()
        .await;
    let root = TempDir::new().unwrap();
    let service = service_at(root.path()).await;
    let cancel = CancellationToken::new();

    let reference = format!("{}/lib/app:latest", registry.addr);
    let first = service.pull_image(&reference, None, &cancel).await.unwrap();
    let files_after_first = count_layer_files(root.path());
    let second = service.pull_image(&reference, None, &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(count_layer_files(root.path()), files_after_first);
    assert_eq!(service.list_images().await.len(), 1);
}

#[tokio::test]
async fn auth_handshake() {
    let registry = MockRegistryBuilder::new()
        .auth_basic("u", "p")
        .image("lib/app", "latest", &[&vec![9u8; 32]])
        .start()
        .await;
    let root = TempDir::new().unwrap();
    let service = service_at(root.path()).await;
    let cancel = CancellationToken::new();
    let reference = format!("{}/lib/app:latest", registry.addr);

    assert!(matches!(
        service.pull_image(&reference, None, &cancel).await,
        Err(ImageError::AuthRequired)
    ));
    assert!(matches!(
        service
            .pull_image(&reference, Some(RegistryAuth::new("u", "wrong")), &cancel)
            .await,
        Err(ImageError::AuthFailed)
    ));
    let id = service
        .pull_image(&reference, Some(RegistryAuth::new("u", "p")), &cancel)
        .await
        .unwrap();
    assert!(id.starts_with("sha256:"));
}

#[tokio::test]
async fn unqualified_references_use_the_default_registry() {
    let registry = MockRegistryBuilder::new()
        .image("library/app", "latest", &[&vec![4u8; 16]])
        .start()
        .await;
    let root = TempDir::new().unwrap();
    let default_registry = DefaultRegistry {
        network_name: registry.addr.parse().unwrap(),
        also_known_as: vec![],
        library_prefix: Some("library".parse().unwrap()),
    };
    let service = ImageService::builder()
        .image_root(root.path())
        .default_registry(default_registry)
        .build()
        .await
        .unwrap();
    let cancel = CancellationToken::new();

    let id = service.pull_image("app", None, &cancel).await.unwrap();

    // The canonical reference carries the resolved registry, the library
    // prefix, and the default tag
    let canonical = format!("{}/library/app:latest", registry.addr);
    let expected = ContentDigest::from_content(canonical.as_bytes());
    assert_eq!(id, format!("sha256:{}", expected.hex_str()));

    // Status resolves through the same canonicalization
    let record = service.image_status("app").await.unwrap();
    assert_eq!(record.repo_tags, vec![canonical]);
}

#[tokio::test]
async fn invalid_reference_is_rejected_before_any_network_io() {
    let root = TempDir::new().unwrap();
    let service = service_at(root.path()).await;
    let cancel = CancellationToken::new();
    assert!(matches!(
        service.pull_image("not a reference", None, &cancel).await,
        Err(ImageError::InvalidReference(_))
    ));
}

#[tokio::test]
async fn cancelled_pull_returns_cancelled() {
    let registry = MockRegistryBuilder::new()
        .image("lib/app", "latest", &[&vec![5u8; 16]])
        .start()
        .await;
    let root = TempDir::new().unwrap();
    let service = service_at(root.path()).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let reference = format!("{}/lib/app:latest", registry.addr);
    assert!(matches!(
        service.pull_image(&reference, None, &cancel).await,
        Err(ImageError::Cancelled)
    ));
    assert!(service.list_images().await.is_empty());
}
