//! Talking to registry servers: name resolution and the HTTP client

mod client;
mod default;

pub use client::{ProbeStatus, RegistryAuth, RegistryClient};
pub use default::DefaultRegistry;
