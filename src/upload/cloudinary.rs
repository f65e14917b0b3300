//! Cloudinary signed upload of raw (opaque) files.
//!
//! Encrypted clips are not media Cloudinary can process, so they go through the
//! `raw` upload endpoint with `public_id` set to the remote key.

use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{checked_url, read_body, request_error, UploadBackend};
use crate::config::CloudinaryCredentials;
use crate::error::{ConfigError, UploadError};

const NAME: &str = "cloudinary";
const API_BASE: &str = "https://api.cloudinary.com/v1_1/";

pub struct CloudinaryBackend {
    credentials: CloudinaryCredentials,
    endpoint: url::Url,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

impl CloudinaryBackend {
    pub fn new(credentials: CloudinaryCredentials, agent: ureq::Agent) -> Result<Self, ConfigError> {
        let endpoint = upload_endpoint(&credentials.cloud_name)?;
        Ok(Self {
            credentials,
            endpoint,
            agent,
        })
    }
}

impl UploadBackend for CloudinaryBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, UploadError> {
        let contents = std::fs::read(local_path).map_err(|err| UploadError::Io {
            backend: NAME,
            reason: format!("read {}: {}", local_path.display(), err),
        })?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
            .to_string();
        let signature = sign(
            &[("public_id", remote_key), ("timestamp", &timestamp)],
            &self.credentials.api_secret,
        );
        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.enc".to_string());

        let mut form = Multipart::new();
        form.text("api_key", &self.credentials.api_key);
        form.text("timestamp", &timestamp);
        form.text("public_id", remote_key);
        form.text("signature_algorithm", "sha256");
        form.text("signature", &signature);
        form.file("file", &file_name, &contents);
        let (content_type, body) = form.finish();

        let response = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .map_err(|err| request_error(NAME, err))?;
        let body = read_body(NAME, response)?;
        secure_url(&body)
    }
}

pub(crate) fn upload_endpoint(cloud_name: &str) -> Result<url::Url, ConfigError> {
    let cloud_name = cloud_name.trim();
    if cloud_name.is_empty()
        || !cloud_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::new(format!(
            "CLOUDINARY_CLOUD_NAME '{}' is not a valid cloud name",
            cloud_name
        )));
    }
    url::Url::parse(API_BASE)
        .and_then(|base| base.join(&format!("{}/raw/upload", cloud_name)))
        .map_err(|err| ConfigError::new(format!("cloudinary endpoint: {}", err)))
}

/// Cloudinary request signature: parameters sorted by name, joined as
/// `k=v&k=v`, secret appended, SHA-256 hex digest.
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut params = params.to_vec();
    params.sort_by(|a, b| a.0.cmp(b.0));
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn secure_url(body: &str) -> Result<String, UploadError> {
    let parsed: UploadResponse =
        serde_json::from_str(body).map_err(|err| UploadError::Transport {
            backend: NAME,
            reason: format!("unexpected response: {}", err),
        })?;
    let url = parsed
        .secure_url
        .ok_or(UploadError::MissingUrl { backend: NAME })?;
    checked_url(NAME, &url)
}

/// multipart/form-data body builder.
struct Multipart {
    boundary: String,
    body: Vec<u8>,
}

impl Multipart {
    fn new() -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            boundary: format!("----intruder-watch-{}", hex::encode(nonce)),
            body: Vec::new(),
        }
    }

    fn text(&mut self, name: &str, value: &str) {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
    }

    fn file(&mut self, name: &str, file_name: &str, contents: &[u8]) {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                self.boundary,
                name,
                file_name.replace('"', "")
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
    }

    /// Returns the `Content-Type` header value and the body.
    fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}
