//! Test helpers: a loopback registry speaking just enough HTTP
//!
//! The service contacts dotless registry domains over plain http, so a
//! `localhost:<port>` listener stands in for a real registry without any
//! TLS setup. Every connection serves one request and closes.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// Content digest string for a blob, the way a registry would report it
pub fn digest_of(content: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(content))
}

/// Count the `layer.tar` files currently under an image root
pub fn count_layer_files(root: &std::path::Path) -> usize {
    let mut count = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if entry.file_name() == "layer.tar" {
                count += 1;
            }
        }
    }
    count
}

pub struct MockRegistryBuilder {
    manifests: HashMap<String, Vec<u8>>,
    blobs: HashMap<String, Vec<u8>>,
    required_auth: Option<String>,
}

impl MockRegistryBuilder {
    pub fn new() -> Self {
        MockRegistryBuilder {
            manifests: HashMap::new(),
            blobs: HashMap::new(),
            required_auth: None,
        }
    }

    /// Require basic credentials on every request; anything else gets 401
    pub fn auth_basic(mut self, username: &str, password: &str) -> Self {
        self.required_auth = Some(format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", username, password))
        ));
        self
    }

    /// Serve an image whose manifest lists the given layer blobs
    pub fn image(mut self, repository: &str, tag: &str, layers: &[&[u8]]) -> Self {
        let descriptors: Vec<serde_json::Value> = layers
            .iter()
            .map(|content| {
                let digest = digest_of(content);
                self.blobs.insert(
                    format!("/v2/{}/blobs/{}", repository, digest),
                    content.to_vec(),
                );
                serde_json::json!({
                    "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                    "size": content.len(),
                    "digest": digest,
                })
            })
            .collect();
        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 2,
                "digest": digest_of(b"{}"),
            },
            "layers": descriptors,
        });
        self.manifests.insert(
            format!("/v2/{}/manifests/{}", repository, tag),
            serde_json::to_vec(&manifest).unwrap(),
        );
        self
    }

    /// Serve a verbatim manifest body, for malformed-manifest cases
    pub fn manifest_raw(mut self, repository: &str, tag: &str, body: Vec<u8>) -> Self {
        self.manifests
            .insert(format!("/v2/{}/manifests/{}", repository, tag), body);
        self
    }

    /// Serve blob bytes under an arbitrary digest, for mismatch cases
    pub fn blob_raw(mut self, repository: &str, digest: &str, body: Vec<u8>) -> Self {
        self.blobs
            .insert(format!("/v2/{}/blobs/{}", repository, digest), body);
        self
    }

    pub async fn start(self) -> MockRegistry {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(State {
            manifests: self.manifests,
            blobs: self.blobs,
            required_auth: self.required_auth,
        });
        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, state).await;
                });
            }
        });
        MockRegistry {
            addr: format!("localhost:{}", port),
            task,
        }
    }
}

/// A running loopback registry; `addr` is usable as a reference's registry
/// component
pub struct MockRegistry {
    pub addr: String,
    task: JoinHandle<()>,
}

impl Drop for MockRegistry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct State {
    manifests: HashMap<String, Vec<u8>>,
    blobs: HashMap<String, Vec<u8>>,
    required_auth: Option<String>,
}

async fn serve_connection(mut stream: TcpStream, state: Arc<State>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }
    let head = String::from_utf8_lossy(&request);
    let mut lines = head.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_owned();
    let authorization = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .map(|(_, value)| value.trim().to_owned());

    if let Some(required) = &state.required_auth {
        if authorization.as_deref() != Some(required.as_str()) {
            return respond(&mut stream, 401, "Unauthorized", b"").await;
        }
    }

    if path == "/v2/" {
        return respond(&mut stream, 200, "OK", b"{}").await;
    }
    if let Some(body) = state.manifests.get(&path) {
        return respond(&mut stream, 200, "OK", body).await;
    }
    if let Some(body) = state.blobs.get(&path) {
        return respond(&mut stream, 200, "OK", body).await;
    }
    respond(&mut stream, 404, "Not Found", b"").await
}

async fn respond(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    body: &[u8],
) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}
