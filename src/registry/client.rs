use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageVersion, Registry, Repository},
    manifest::{media_types, DockerManifest},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{header, StatusCode};

/// A resolved username and password for basic authentication
///
/// Credential lookup and parsing happen outside this crate; the client only
/// consumes the resolved pair.
#[derive(Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

impl RegistryAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        RegistryAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    fn header_value(&self) -> String {
        format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegistryAuth({})", self.username)
    }
}

/// Result of probing a registry's `/v2/` endpoint
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeStatus {
    /// The registry answered 200 and is ready for requests
    Ok,
    /// The registry answered 401 and no credentials were supplied
    AuthRequired,
    /// The registry rejected the request with 401 or 403 despite credentials
    AuthFailed,
    /// Any other non-2xx answer
    OtherError(StatusCode),
}

/// HTTP client for the small slice of the registry API this service needs:
/// the version probe, manifests, and blobs
///
/// Requests go over https, or plain http for dotless registry domains such
/// as `localhost:5000`. When credentials are supplied every request carries
/// a basic `Authorization` header; there is no token-exchange flow.
pub struct RegistryClient {
    req: reqwest::Client,
}

impl RegistryClient {
    /// Construct a client
    ///
    /// `verify_tls` off reproduces the historical behavior of accepting any
    /// registry certificate; see [crate::ImageServiceBuilder::verify_tls].
    pub fn new(verify_tls: bool) -> Result<Self, ImageError> {
        let req = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|err| ImageError::RegistryUnavailable(err.to_string()))?;
        Ok(RegistryClient { req })
    }

    fn get(&self, url: String, auth: Option<&RegistryAuth>) -> reqwest::RequestBuilder {
        let request = self.req.get(url);
        match auth {
            Some(auth) => request.header(header::AUTHORIZATION, auth.header_value()),
            None => request,
        }
    }

    /// Check the registry's API version endpoint, `GET /v2/`
    pub async fn probe(
        &self,
        registry: &Registry,
        auth: Option<&RegistryAuth>,
    ) -> Result<ProbeStatus, ImageError> {
        let url = format!("{}://{}/v2/", registry.protocol_str(), registry);
        log::debug!("probing {}", url);
        let response = self
            .get(url, auth)
            .send()
            .await
            .map_err(|err| ImageError::RegistryUnavailable(err.to_string()))?;
        Ok(match response.status() {
            StatusCode::OK => ProbeStatus::Ok,
            StatusCode::UNAUTHORIZED if auth.is_none() => ProbeStatus::AuthRequired,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProbeStatus::AuthFailed,
            status => ProbeStatus::OtherError(status),
        })
    }

    /// Fetch and parse a manifest, `GET /v2/<repository>/manifests/<version>`
    pub async fn manifest(
        &self,
        registry: &Registry,
        repository: &Repository,
        version: &ImageVersion,
        auth: Option<&RegistryAuth>,
    ) -> Result<DockerManifest, ImageError> {
        let url = format!(
            "{}://{}/v2/{}/manifests/{}",
            registry.protocol_str(),
            registry,
            repository,
            version
        );
        log::debug!("fetching manifest {}", url);
        let response = self
            .get(url, auth)
            .header(header::ACCEPT, media_types::ACCEPTED.join(", "))
            .send()
            .await
            .map_err(|err| ImageError::RegistryUnavailable(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(ImageError::ManifestNotFound(format!(
                "{}/{}:{}",
                registry, repository, version
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| ImageError::RegistryUnavailable(err.to_string()))?;
        log::trace!("raw json manifest, {}", String::from_utf8_lossy(&body));
        serde_json::from_slice(&body)
            .map_err(|err| ImageError::RegistryUnavailable(format!("bad manifest: {}", err)))
    }

    /// Start a blob download, `GET /v2/<repository>/blobs/<digest>`
    ///
    /// Returns the open response so the caller can stream the body through
    /// its digest verifier instead of buffering it.
    pub async fn blob(
        &self,
        registry: &Registry,
        repository: &Repository,
        digest: &ContentDigest,
        auth: Option<&RegistryAuth>,
    ) -> Result<reqwest::Response, ImageError> {
        let url = format!(
            "{}://{}/v2/{}/blobs/{}",
            registry.protocol_str(),
            registry,
            repository,
            digest
        );
        log::debug!("downloading blob {}", url);
        let response = self
            .get(url, auth)
            .send()
            .await
            .map_err(|err| ImageError::RegistryUnavailable(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(ImageError::RegistryUnavailable(format!(
                "blob {} fetch failed with status {}",
                digest,
                response.status()
            )));
        }
        Ok(response)
    }
}
