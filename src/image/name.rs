use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageVersion, Registry, Repository, Tag},
};
use std::{fmt, str::FromStr};

/// Parsed Docker-style image reference
///
/// This is an owned struct representing a docker "reference" (like a URI)
/// which names an image, optionally at a specific version, which can be
/// fetched from a registry server (possibly the configured default).
///
/// A complete image name contains a [Registry], [Repository], [Tag], and
/// [ContentDigest], in that order. Only the [Repository] component is
/// mandatory. The [Tag] always begins with a `:` and the [ContentDigest]
/// with an `@`, but delineating the optional [Registry] from the first
/// section of the [Repository] requires the usual Docker heuristic: the
/// first slash-separated section is a registry if it includes any dot or
/// colon characters, or if it is exactly `localhost`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ImageName {
    serialized: String,
    registry: Option<Registry>,
    repository: Repository,
    tag: Option<Tag>,
    digest: Option<ContentDigest>,
}

impl ImageName {
    /// Returns a reference to the existing string representation of an
    /// [ImageName]
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as an [ImageName]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        let bad = || ImageError::InvalidReference(s.to_owned());

        // The digest is unambiguous: everything after the first at-sign.
        let (rest, digest) = match s.split_once('@') {
            None => (s, None),
            Some((rest, digest)) => (rest, Some(ContentDigest::parse(digest)?)),
        };

        // Docker's registry heuristic on the first path section.
        let (registry, rest) = match rest.split_once('/') {
            Some((first, path))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(Registry::parse(first)?), path)
            }
            _ => (None, rest),
        };
        if rest.is_empty() {
            return Err(bad());
        }

        // A tag colon can only appear after the last path separator.
        let (repository, tag) = match rest.rsplit_once(':') {
            Some((repository, tag)) if !tag.contains('/') => {
                (Repository::parse(repository)?, Some(Tag::parse(tag)?))
            }
            Some(_) => return Err(bad()),
            None => (Repository::parse(rest)?, None),
        };

        Ok(ImageName {
            serialized: s.to_owned(),
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Parse an [ImageName] from its component pieces
    ///
    /// This may fail either because of a problem with one of the components,
    /// or because the resulting name would be parsed in a manner other than
    /// intended. For example, a registry name without dots could be parsed
    /// as the first section of the repository path.
    pub fn from_parts(
        registry: Option<&str>,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Self, ImageError> {
        let mut combined = String::new();
        if let Some(registry) = registry {
            combined.push_str(registry);
            combined.push('/');
        }
        combined.push_str(repository);
        if let Some(tag) = tag {
            combined.push(':');
            combined.push_str(tag);
        }
        if let Some(digest) = digest {
            combined.push('@');
            combined.push_str(digest);
        }
        let parsed = ImageName::parse(&combined)?;
        if parsed.registry_str() == registry
            && parsed.repository_str() == repository
            && parsed.tag_str() == tag
            && parsed.digest_str() == digest
        {
            Ok(parsed)
        } else {
            // Parsing ambiguity
            Err(ImageError::InvalidReference(combined))
        }
    }

    /// Returns the optional registry component
    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    /// Returns the repository component
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Returns the optional tag component
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Returns the optional content digest component
    pub fn content_digest(&self) -> Option<&ContentDigest> {
        self.digest.as_ref()
    }

    /// Returns a reference to the registry portion of the string, if present
    pub fn registry_str(&self) -> Option<&str> {
        self.registry.as_ref().map(Registry::as_str)
    }

    /// Returns a reference to the repository portion of the string
    pub fn repository_str(&self) -> &str {
        self.repository.as_str()
    }

    /// Returns a reference to the tag portion of the string, if present
    pub fn tag_str(&self) -> Option<&str> {
        self.tag.as_ref().map(Tag::as_str)
    }

    /// Returns a reference to the digest portion of the string, if present
    pub fn digest_str(&self) -> Option<&str> {
        self.digest.as_ref().map(ContentDigest::as_str)
    }

    /// Returns the most specific available version
    ///
    /// If the name includes a content digest, this returns the digest.
    /// Otherwise it returns the tag, defaulting to `latest` if no tag is
    /// set.
    pub fn version(&self) -> ImageVersion {
        if let Some(digest) = &self.digest {
            return ImageVersion::ContentDigest(digest.clone());
        }
        match &self.tag {
            Some(tag) => ImageVersion::Tag(tag.clone()),
            None => ImageVersion::Tag(Tag::latest()),
        }
    }
}

impl FromStr for ImageName {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageName::parse(s)
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
