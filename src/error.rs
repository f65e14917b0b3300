//! Error taxonomy for the capture pipeline.
//!
//! Fatal errors (`ConfigError`, `DeviceError`) abort startup. `IntegrityError` and
//! `UploadError` are scoped to a single file; the pipeline logs them and moves on.

use std::path::PathBuf;

/// Startup configuration is missing or invalid. Carries every problem found,
/// not just the first one.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {}", .problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl ConfigError {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }

    pub fn from_problems(problems: Vec<String>) -> Self {
        Self { problems }
    }
}

/// The capture device could not be opened or stopped producing frames.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("cannot open camera {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("frame capture failed on {device}: {reason}")]
    Capture { device: String, reason: String },
    #[error("{0}")]
    Unsupported(String),
}

/// The pipeline could not be assembled. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("cannot start upload worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// A clip recording was cut short.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("cannot write clip {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("{path}: authentication tag mismatch (corrupted or tampered)")]
    TagMismatch { path: PathBuf },
    #[error("{path}: truncated encrypted file ({len} bytes, need at least {min})")]
    Truncated { path: PathBuf, len: usize, min: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{backend}: request failed: {reason}")]
    Transport {
        backend: &'static str,
        reason: String,
    },
    #[error("{backend}: provider rejected upload (status {status}): {body}")]
    Rejected {
        backend: &'static str,
        status: u16,
        body: String,
    },
    #[error("{backend}: response did not contain a usable url")]
    MissingUrl { backend: &'static str },
    #[error("{backend}: {reason}")]
    Io {
        backend: &'static str,
        reason: String,
    },
}

/// The final log upload during draining failed. Reported, never blocks exit.
#[derive(Debug, thiserror::Error)]
#[error("final log upload failed: {0}")]
pub struct ShutdownUploadError(#[from] pub UploadError);

/// Errors from encrypting or decrypting a capture file.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encryption failed")]
    Encrypt,
}

impl VaultError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Io {
            path: path.into(),
            source,
        }
    }
}
