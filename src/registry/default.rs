use crate::image::{ImageName, Registry, Repository};

/// Settings for the registry used when a reference names no server
///
/// Besides the name to connect to, a default registry may be known under
/// alias domains and may require a prefix for single-segment repository
/// paths, mirroring the quirks of the main public registry.
#[derive(Clone, Debug)]
pub struct DefaultRegistry {
    /// Connect to the registry under this name
    pub network_name: Registry,
    /// This registry is also known under additional names
    pub also_known_as: Vec<Registry>,
    /// Use this prefix when accessing an image repository with only a
    /// single path component
    pub library_prefix: Option<Repository>,
}

impl From<Registry> for DefaultRegistry {
    fn from(network_name: Registry) -> Self {
        DefaultRegistry {
            network_name,
            also_known_as: vec![],
            library_prefix: None,
        }
    }
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        DefaultRegistry {
            network_name: "registry-1.docker.io".parse().unwrap(),
            also_known_as: vec!["docker.io".parse().unwrap()],
            library_prefix: Some("library".parse().unwrap()),
        }
    }
}

impl DefaultRegistry {
    /// Check whether a particular registry is considered default under
    /// these settings
    ///
    /// Returns true if the given registry is None or if it matches either
    /// the `network_name` or any of the `also_known_as` settings.
    pub fn is_default(&self, registry: Option<&Registry>) -> bool {
        match registry {
            None => true,
            Some(registry) => {
                registry == &self.network_name || self.also_known_as.contains(registry)
            }
        }
    }

    /// Use these settings to determine the actual network server and
    /// repository path for an image
    pub fn resolve(&self, image: &ImageName) -> (Registry, Repository) {
        if !self.is_default(image.registry()) {
            return (image.registry().unwrap().clone(), image.repository().clone());
        }
        let repository = image.repository().clone();
        let repository = match (&self.library_prefix, repository.is_single_segment()) {
            (Some(prefix), true) => prefix.join(&repository),
            _ => repository,
        };
        (self.network_name.clone(), repository)
    }
}
