use crate::errors::ImageError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

/// A digest securely identifies the specific contents of a binary object
///
/// Digests are serialized as `algorithm:hex`. Every digest this crate
/// computes uses `sha256`, but digests reported by a registry are accepted
/// with any well-formed algorithm label.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ContentDigest {
    serialized: String,
    colon: usize,
}

impl ContentDigest {
    /// Returns a reference to the existing string representation of a
    /// [ContentDigest]
    ///
    /// The string always has a single colon. Before it is an alphanumeric
    /// algorithm label, possibly with internal separator characters; after
    /// it are 32 or more lowercase hexadecimal digits.
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Create a new ContentDigest from parts
    ///
    /// The algorithm label and the hex string are assembled and parsed.
    pub fn from_parts<T: fmt::LowerHex>(
        algorithm: &str,
        hex: &T,
    ) -> Result<Self, ImageError> {
        ContentDigest::parse(&format!("{}:{:x}", algorithm, hex))
    }

    /// Create a new ContentDigest by hashing content data with `sha256`
    pub fn from_content(content_bytes: &[u8]) -> Self {
        ContentDigest::from_parts("sha256", &Sha256::digest(content_bytes))
            .expect("sha256 digests always parse")
    }

    /// Parse a [prim@str] as a [ContentDigest]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(&format!("^{}$", ContentDigest::regex_str())).unwrap();
        }
        match RE.is_match(s) {
            false => Err(ImageError::InvalidReference(s.to_owned())),
            true => Ok(ContentDigest {
                serialized: s.to_owned(),
                colon: s.find(':').unwrap(),
            }),
        }
    }

    /// Return a reference to the algorithm label, `sha256` for everything
    /// this crate stores
    pub fn algorithm_str(&self) -> &str {
        &self.serialized[..self.colon]
    }

    /// Return a reference to the hexadecimal portion of this digest
    pub fn hex_str(&self) -> &str {
        &self.serialized[self.colon + 1..]
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<dig>",
            /*  */ "[a-zA-Z][a-zA-Z0-9]*", // algorithm label
            /*  */ "(?:[-_+.][a-zA-Z][a-zA-Z0-9]*)*", // separated label groups
            /*  */ "[:]",
            /*  */ "[a-f0-9]{32,}", // hex payload
            ")",
        )
    }
}

impl FromStr for ContentDigest {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentDigest::parse(s)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
