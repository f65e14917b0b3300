//! Intruder Watch
//!
//! Motion-triggered capture daemon. Watches a camera, records a short clip when
//! something moves, encrypts the clip at rest, and ships it to remote storage.
//!
//! # Data flow
//!
//! frame source -> `MotionDetector` (dark-mode gate, foreground detection, clip
//! recording) -> bounded hand-off -> upload worker (`Encryptor`, then an
//! `UploadBackend`) -> remote URL in the log.
//!
//! # Module Structure
//!
//! - `frame`: packed RGB24 frames
//! - `ingest`: frame sources (synthetic, scripted, V4L2)
//! - `detect`: foreground extraction and the motion/dark-mode decision
//! - `clip`: clip naming and the AVI container
//! - `vault`: authenticated file encryption (`nonce || ciphertext || tag`)
//! - `upload`: Cloudinary, Dropbox and local-directory backends
//! - `pipeline`: lifecycle, hand-off channel, draining and the final log upload
//! - `config`, `logging`, `error`, `shutdown`: process plumbing

pub mod clip;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod shutdown;
pub mod upload;
pub mod vault;

pub use clip::Clip;
pub use config::{BackendConfig, BackendKind, PipelineConfig};
pub use detect::{DarkModeState, ForegroundExtractor, MotionDetector, Region};
pub use error::{
    ConfigError, DeviceError, IntegrityError, RecordError, ShutdownUploadError, StartupError,
    UploadError, VaultError,
};
pub use frame::Frame;
pub use ingest::FrameSource;
pub use pipeline::{Pipeline, PipelineState, RunSummary, StopReason, UploadTask};
pub use shutdown::ShutdownToken;
pub use upload::UploadBackend;
pub use vault::{EncryptionKey, Encryptor};
