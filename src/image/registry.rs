use crate::errors::ImageError;
use regex::Regex;
use std::{fmt, str::FromStr};

/// Name of a Docker-style image registry server
///
/// This is a domain name, with an optional port. Typically the protocol is
/// https, but we include the same heuristic Docker uses to improve the
/// ergonomics of development setups: if the domain has no dots in it, the
/// protocol switches to unencrypted http. This is what lets a local
/// `localhost:5000` registry work without certificates.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Registry {
    serialized: String,
    port: Option<u16>,
    https: bool,
}

impl Registry {
    /// Returns a reference to the existing string representation of a
    /// [Registry]
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Registry]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Registry::regex_str())).unwrap();
        }
        match RE.captures(s) {
            None => Err(ImageError::InvalidReference(s.to_owned())),
            Some(captures) => {
                let port = match captures.name("reg_p") {
                    None => None,
                    Some(m) => match m.as_str().parse() {
                        Ok(port) => Some(port),
                        Err(_) => return Err(ImageError::InvalidReference(s.to_owned())),
                    },
                };
                Ok(Registry {
                    serialized: s.to_owned(),
                    port,
                    https: captures.name("reg_d").unwrap().as_str().contains('.'),
                })
            }
        }
    }

    /// Returns a reference to the domain portion of the string, without the
    /// port
    pub fn domain_str(&self) -> &str {
        match self.serialized.rfind(':') {
            Some(colon) => &self.serialized[..colon],
            None => &self.serialized,
        }
    }

    /// Returns the port, if one was given
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Are we using https to connect to this registry?
    pub fn is_https(&self) -> bool {
        self.https
    }

    /// The protocol to use, either "http" or "https"
    pub fn protocol_str(&self) -> &str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<reg>",
            /*  */ "(?P<reg_d>", // domain group
            /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
            /* -- */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*",
            /*  */ ")",
            /*  */ "(?:[:](?P<reg_p>[0-9]+))?", // optional port
            ")",
        )
    }
}

impl FromStr for Registry {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Registry::parse(s)
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
