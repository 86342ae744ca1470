//! Local store for OCI/Docker container images
//!
//! `layerstash` pulls images from a registry, verifies every blob against
//! its content digest, and materializes the layers on local disk in a
//! content-addressed layout that shares identical layers between images. A
//! durable catalog records what is stored; a background garbage collector
//! reconciles the filesystem against it. Layers are kept as opaque blobs
//! and never unpacked.

#[macro_use] extern crate lazy_static;

mod errors;
mod image;
mod manifest;
mod metadata;
mod registry;
mod service;
mod storage;

pub use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageName, ImageVersion, Registry, Repository, Tag},
    manifest::{media_types, Descriptor, DockerManifest},
    metadata::{ImageRecord, MetadataStore, METADATA_FILE_NAME},
    registry::{DefaultRegistry, ProbeStatus, RegistryAuth, RegistryClient},
    service::{
        FsInfo, GarbageCollector, GcStats, ImageService, ImageServiceBuilder,
        DEFAULT_CACHE_MAX_BYTES, DEFAULT_GC_INTERVAL, DEFAULT_IMAGE_ROOT, IMAGE_ROOT_ENV,
    },
    storage::{BlobWriter, LayerCache, LayerRecord, LayerStore, LAYER_FILE_NAME},
};
