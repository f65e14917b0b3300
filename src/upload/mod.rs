//! Remote upload backends.
//!
//! The backend is picked once at startup from `BackendConfig` and shared read-only
//! with the processing thread. Every HTTP request runs on a `ureq` agent with the
//! configured per-request deadline.

pub mod cloudinary;
pub mod dropbox;
pub mod local;

pub use cloudinary::CloudinaryBackend;
pub use dropbox::DropboxBackend;
pub use local::LocalBackend;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendConfig, UploadSettings};
use crate::error::{ConfigError, UploadError};

/// Response bodies quoted in errors are cut to this many characters.
const MAX_ERROR_BODY: usize = 512;

pub trait UploadBackend: Send + Sync {
    /// Backend identifier, for logs and errors.
    fn name(&self) -> &'static str;

    /// Upload `local_path` under `remote_key`. Returns a URL for the stored object.
    fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, UploadError>;
}

/// `{folder}/{file name}`. The key depends only on the file name, so retrying a
/// file always targets the same remote object.
pub fn remote_key(folder: &str, local_path: &Path) -> String {
    let name = local_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name
    } else {
        format!("{}/{}", folder, name)
    }
}

pub fn build_backend(
    config: &BackendConfig,
    settings: &UploadSettings,
) -> Result<Arc<dyn UploadBackend>, ConfigError> {
    let backend: Arc<dyn UploadBackend> = match config {
        BackendConfig::Cloudinary(credentials) => Arc::new(CloudinaryBackend::new(
            credentials.clone(),
            http_agent(settings.timeout),
        )?),
        BackendConfig::Dropbox(credentials) => Arc::new(DropboxBackend::new(
            credentials.clone(),
            http_agent(settings.timeout),
        )),
        BackendConfig::Local { root } => Arc::new(LocalBackend::new(root.clone())),
    };
    log::info!("upload backend: {}", backend.name());
    Ok(backend)
}

pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(concat!("intruder-watch/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Map a failed request to an `UploadError`, keeping the provider's error body.
pub(crate) fn request_error(backend: &'static str, err: ureq::Error) -> UploadError {
    match err {
        ureq::Error::Status(status, response) => UploadError::Rejected {
            backend,
            status,
            body: truncate(&response.into_string().unwrap_or_default()),
        },
        ureq::Error::Transport(transport) => UploadError::Transport {
            backend,
            reason: transport.to_string(),
        },
    }
}

pub(crate) fn read_body(
    backend: &'static str,
    response: ureq::Response,
) -> Result<String, UploadError> {
    response.into_string().map_err(|err| UploadError::Transport {
        backend,
        reason: format!("read response: {}", err),
    })
}

/// Accept only absolute http(s) URLs.
pub(crate) fn checked_url(backend: &'static str, raw: &str) -> Result<String, UploadError> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(parsed.to_string()),
        _ => Err(UploadError::MissingUrl { backend }),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}
