//! Image identity: references, their components, and content digests


mod digest;
mod name;
mod registry;
mod repository;
mod tag;
mod version;

pub use digest::ContentDigest;
pub use name::ImageName;
pub use registry::Registry;
pub use repository::Repository;
pub use tag::Tag;
pub use version::ImageVersion;
