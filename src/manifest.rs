use serde::{Deserialize, Serialize};

/// Partial implementation of the image manifest schema, covering the fields
/// the pull pipeline reads.
///
/// Both Docker Image Manifest v2 schema 2 and OCI Image Manifest v1
/// deserialize into this shape; unknown fields are ignored.
///
/// Reference: <https://docs.docker.com/registry/spec/manifest-v2-2/>
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DockerManifest {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: i32,
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    #[serde(default)]
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// A content descriptor: one blob the manifest points at
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: i64,
    pub digest: String,
}

pub mod media_types {
    pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

    /// The Accept list sent with every manifest request
    pub const ACCEPTED: [&str; 4] = [
        MANIFEST_V2,
        MANIFEST_LIST_V2,
        OCI_MANIFEST_V1,
        OCI_INDEX_V1,
    ];
}
