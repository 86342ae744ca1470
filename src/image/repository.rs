use crate::errors::ImageError;
use regex::Regex;
use std::{fmt, str::FromStr};

/// Name of a Docker-style image repository
///
/// A repository groups the versions (tags, digests) of one image under a
/// common name. Repository names are path-like sequences of lowercase
/// alphanumeric segments separated by slashes; a segment may contain single
/// periods, single or double underscores, or runs of dashes as internal
/// separators.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Repository {
    serialized: String,
}

impl Repository {
    /// Returns a reference to the existing string representation of a
    /// [Repository]
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Repository]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Repository::regex_str())).unwrap();
        }
        match RE.is_match(s) {
            false => Err(ImageError::InvalidReference(s.to_owned())),
            true => Ok(Repository {
                serialized: s.to_owned(),
            }),
        }
    }

    /// Iterate over the slash-separated segments of this repository path
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.serialized.split('/')
    }

    /// Does this repository path consist of a single segment?
    ///
    /// Single-segment repositories on a default registry are resolved under
    /// the registry's library prefix, `app` becoming `library/app`.
    pub fn is_single_segment(&self) -> bool {
        !self.serialized.contains('/')
    }

    /// Join this path to another with a slash, forming a new repository path
    pub fn join(&self, other: &Self) -> Self {
        Repository {
            serialized: format!("{}/{}", self.serialized, other.serialized),
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<repo>",
            /*  */ "[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*", // first segment
            /*  */ "(?:",
            /* -- */ "/",
            /* -- */ "[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*", // further segments
            /*  */ ")*",
            ")",
        )
    }
}

impl FromStr for Repository {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Repository::parse(s)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
