//! Startup configuration.
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults
//! 2. optional JSON file named by `INTRUDER_CONFIG`
//! 3. environment (optionally seeded from `tokens.env` via dotenvy)
//!
//! Secrets (encryption key, provider credentials) are only read from the environment.
//! Every problem found is collected into a single `ConfigError`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::upload::cloudinary::upload_endpoint;
use crate::vault::EncryptionKey;

const DEFAULT_ENV_PATH: &str = "tokens.env";
const DEFAULT_CAMERA: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_DIR: &str = "motion_captures";
const DEFAULT_UPLOAD_FOLDER: &str = "webcam_captures";
const DEFAULT_LOG_FILE: &str = "intruder.log";
const DEFAULT_LOCAL_UPLOAD_DIR: &str = "uploads";
const DEFAULT_CLIP_SECS: u64 = 5;
const DEFAULT_CLIP_FPS: u32 = 20;
const DEFAULT_DARK_THRESHOLD: f64 = 40.0;
const DEFAULT_DARK_INTERVAL_SECS: u64 = 30;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 1000;
const DEFAULT_PRIMING_FRAMES: u32 = 10;
const DEFAULT_PRIMING_INTERVAL_MS: u64 = 500;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 120;
const DEFAULT_UPLOAD_ATTEMPTS: u32 = 3;
const DEFAULT_UPLOAD_BACKOFF_SECS: u64 = 2;

// ----------------------------------------------------------------------------
// File layer
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    camera: Option<CameraFile>,
    detector: Option<DetectorFile>,
    storage: Option<StorageFile>,
    upload: Option<UploadFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorFile {
    dark_threshold: Option<f64>,
    dark_interval_secs: Option<u64>,
    frame_interval_ms: Option<u64>,
    priming_frames: Option<u32>,
    priming_interval_ms: Option<u64>,
    clip_secs: Option<u64>,
    clip_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageFile {
    capture_dir: Option<PathBuf>,
    upload_folder: Option<String>,
    log_file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadFile {
    service: Option<String>,
    timeout_secs: Option<u64>,
    attempts: Option<u32>,
    backoff_secs: Option<u64>,
    local_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::new(format!("invalid config file {}: {}", path.display(), e)))
    }
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Device path (`/dev/video0`) or `stub://<name>` for the synthetic scene.
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_CAMERA.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Mean intensity (0-255) below which the scene counts as dark.
    pub dark_threshold: f64,
    /// Wait between brightness re-checks while dark.
    pub dark_interval: Duration,
    /// Pause between detection cycles.
    pub frame_interval: Duration,
    pub priming_frames: u32,
    pub priming_interval: Duration,
    pub clip_duration: Duration,
    pub clip_fps: u32,
    pub capture_dir: PathBuf,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            dark_threshold: DEFAULT_DARK_THRESHOLD,
            dark_interval: Duration::from_secs(DEFAULT_DARK_INTERVAL_SECS),
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
            priming_frames: DEFAULT_PRIMING_FRAMES,
            priming_interval: Duration::from_millis(DEFAULT_PRIMING_INTERVAL_MS),
            clip_duration: Duration::from_secs(DEFAULT_CLIP_SECS),
            clip_fps: DEFAULT_CLIP_FPS,
            capture_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub capture_dir: PathBuf,
    /// Remote folder prepended to every remote key.
    pub upload_folder: String,
    pub log_file_name: String,
}

impl StorageSettings {
    pub fn log_path(&self) -> PathBuf {
        self.capture_dir.join(&self.log_file_name)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
            upload_folder: DEFAULT_UPLOAD_FOLDER.to_string(),
            log_file_name: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Deadline for a single provider request.
    pub timeout: Duration,
    /// Total attempts per file, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            attempts: DEFAULT_UPLOAD_ATTEMPTS,
            backoff: Duration::from_secs(DEFAULT_UPLOAD_BACKOFF_SECS),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Cloudinary,
    Dropbox,
    Local,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloudinary" => Ok(BackendKind::Cloudinary),
            "dropbox" => Ok(BackendKind::Dropbox),
            "local" => Ok(BackendKind::Local),
            other => Err(format!(
                "unknown CLOUD_SERVICE '{}' (expected cloudinary, dropbox or local)",
                other
            )),
        }
    }
}

#[derive(Clone)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct DropboxCredentials {
    pub access_token: String,
}

impl std::fmt::Debug for DropboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DropboxCredentials(<redacted>)")
    }
}

/// The selected upload backend and its credentials. Chosen once at startup.
#[derive(Clone, Debug)]
pub enum BackendConfig {
    Cloudinary(CloudinaryCredentials),
    Dropbox(DropboxCredentials),
    Local { root: PathBuf },
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Cloudinary(_) => BackendKind::Cloudinary,
            BackendConfig::Dropbox(_) => BackendKind::Dropbox,
            BackendConfig::Local { .. } => BackendKind::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub storage: StorageSettings,
    pub upload: UploadSettings,
    pub backend: BackendConfig,
    pub key: EncryptionKey,
}

impl PipelineConfig {
    /// Load from `tokens.env`, the optional JSON file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut problems = Vec::new();
        if let Err(err) = load_env_file() {
            problems.extend(err.problems);
        }
        let file = match std::env::var("INTRUDER_CONFIG").ok() {
            Some(path) if !path.trim().is_empty() => match ConfigFile::read(Path::new(&path)) {
                Ok(file) => Some(file),
                Err(err) => {
                    problems.extend(err.problems);
                    None
                }
            },
            _ => None,
        };
        Self::resolve(file, |key| std::env::var(key).ok(), problems)
    }

    /// Resolve configuration from a file layer and an environment lookup.
    pub fn load_with<F>(file: Option<ConfigFile>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::resolve(file, lookup, Vec::new())
    }

    /// `problems` carries earlier failures (env file, config file) so they are
    /// reported together with everything found here.
    fn resolve<F>(
        file: Option<ConfigFile>,
        lookup: F,
        problems: Vec<String>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        let mut env = EnvLayer { lookup, problems };

        let camera_file = file.camera.unwrap_or_default();
        let camera_default = CameraSettings::default();
        let camera = CameraSettings {
            device: env
                .string("INTRUDER_CAMERA")
                .or(camera_file.device)
                .unwrap_or(camera_default.device),
            width: env
                .parsed("INTRUDER_FRAME_WIDTH", "a positive integer")
                .or(camera_file.width)
                .unwrap_or(camera_default.width),
            height: env
                .parsed("INTRUDER_FRAME_HEIGHT", "a positive integer")
                .or(camera_file.height)
                .unwrap_or(camera_default.height),
        };

        let storage_file = file.storage.unwrap_or_default();
        let storage_default = StorageSettings::default();
        let storage = StorageSettings {
            capture_dir: env
                .string("INTRUDER_CAPTURE_DIR")
                .map(PathBuf::from)
                .or(storage_file.capture_dir)
                .unwrap_or(storage_default.capture_dir),
            upload_folder: env
                .string("INTRUDER_UPLOAD_FOLDER")
                .or(storage_file.upload_folder)
                .unwrap_or(storage_default.upload_folder),
            log_file_name: env
                .string("INTRUDER_LOG_FILE")
                .or(storage_file.log_file)
                .unwrap_or(storage_default.log_file_name),
        };

        let det_file = file.detector.unwrap_or_default();
        let det_default = DetectorSettings::default();
        let detector = DetectorSettings {
            dark_threshold: env
                .parsed("INTRUDER_DARK_THRESHOLD", "a number")
                .or(det_file.dark_threshold)
                .unwrap_or(det_default.dark_threshold),
            dark_interval: env
                .parsed("INTRUDER_DARK_INTERVAL_SECS", "an integer number of seconds")
                .or(det_file.dark_interval_secs)
                .map(Duration::from_secs)
                .unwrap_or(det_default.dark_interval),
            frame_interval: env
                .parsed("INTRUDER_FRAME_INTERVAL_MS", "an integer number of milliseconds")
                .or(det_file.frame_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(det_default.frame_interval),
            priming_frames: det_file
                .priming_frames
                .unwrap_or(det_default.priming_frames),
            priming_interval: det_file
                .priming_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(det_default.priming_interval),
            clip_duration: env
                .parsed("INTRUDER_CLIP_SECS", "an integer number of seconds")
                .or(det_file.clip_secs)
                .map(Duration::from_secs)
                .unwrap_or(det_default.clip_duration),
            clip_fps: env
                .parsed("INTRUDER_CLIP_FPS", "a positive integer")
                .or(det_file.clip_fps)
                .unwrap_or(det_default.clip_fps),
            capture_dir: storage.capture_dir.clone(),
        };

        let upload_file = file.upload.unwrap_or_default();
        let upload_default = UploadSettings::default();
        let upload = UploadSettings {
            timeout: env
                .parsed("INTRUDER_UPLOAD_TIMEOUT_SECS", "an integer number of seconds")
                .or(upload_file.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(upload_default.timeout),
            attempts: env
                .parsed("INTRUDER_UPLOAD_ATTEMPTS", "a positive integer")
                .or(upload_file.attempts)
                .unwrap_or(upload_default.attempts),
            backoff: upload_file
                .backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(upload_default.backoff),
        };

        let service = env
            .string("CLOUD_SERVICE")
            .or(upload_file.service)
            .unwrap_or_else(|| "cloudinary".to_string());
        let backend = match service.parse::<BackendKind>() {
            Ok(BackendKind::Cloudinary) => {
                let cloud_name = env.required("CLOUDINARY_CLOUD_NAME");
                let api_key = env.required("CLOUDINARY_API_KEY");
                let api_secret = env.required("CLOUDINARY_API_SECRET");
                if let Some(Err(err)) = cloud_name.as_deref().map(upload_endpoint) {
                    env.problems.extend(err.problems);
                }
                match (cloud_name, api_key, api_secret) {
                    (Some(cloud_name), Some(api_key), Some(api_secret)) => {
                        Some(BackendConfig::Cloudinary(CloudinaryCredentials {
                            cloud_name,
                            api_key,
                            api_secret,
                        }))
                    }
                    _ => None,
                }
            }
            Ok(BackendKind::Dropbox) => env.required("DROPBOX_API_KEY").map(|access_token| {
                BackendConfig::Dropbox(DropboxCredentials { access_token })
            }),
            Ok(BackendKind::Local) => Some(BackendConfig::Local {
                root: env
                    .string("INTRUDER_LOCAL_UPLOAD_DIR")
                    .map(PathBuf::from)
                    .or(upload_file.local_dir)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_UPLOAD_DIR)),
            }),
            Err(problem) => {
                env.problems.push(problem);
                None
            }
        };

        let key = env
            .required("ENCRYPTION_KEY")
            .and_then(|hex_key| match EncryptionKey::from_hex(&hex_key) {
                Ok(key) => Some(key),
                Err(err) => {
                    env.problems.extend(err.problems);
                    None
                }
            });

        let mut problems = env.problems;
        validate(&camera, &detector, &storage, &upload, &mut problems);

        let (Some(key), Some(backend)) = (key, backend) else {
            return Err(ConfigError::from_problems(problems));
        };
        if !problems.is_empty() {
            return Err(ConfigError::from_problems(problems));
        }
        Ok(Self {
            camera,
            detector,
            storage,
            upload,
            backend,
            key,
        })
    }
}

fn validate(
    camera: &CameraSettings,
    detector: &DetectorSettings,
    storage: &StorageSettings,
    upload: &UploadSettings,
    problems: &mut Vec<String>,
) {
    if camera.width == 0 || camera.height == 0 {
        problems.push("frame width and height must be greater than zero".to_string());
    }
    if !(0.0..=255.0).contains(&detector.dark_threshold) {
        problems.push("dark threshold must be between 0 and 255".to_string());
    }
    if detector.clip_duration.is_zero() {
        problems.push("clip duration must be greater than zero".to_string());
    }
    if detector.clip_fps == 0 {
        problems.push("clip fps must be greater than zero".to_string());
    }
    let folder = storage.upload_folder.trim();
    if folder.is_empty() || folder.starts_with('/') || folder.ends_with('/') {
        problems.push("upload folder must be a non-empty relative path without a trailing '/'".to_string());
    }
    if storage.log_file_name.contains('/') || storage.log_file_name.trim().is_empty() {
        problems.push("log file must be a plain file name".to_string());
    }
    if upload.attempts == 0 {
        problems.push("upload attempts must be at least 1".to_string());
    }
    if upload.timeout.is_zero() {
        problems.push("upload timeout must be greater than zero".to_string());
    }
}

fn load_env_file() -> Result<(), ConfigError> {
    let path = std::env::var("INTRUDER_ENV_PATH").unwrap_or_else(|_| DEFAULT_ENV_PATH.into());
    match dotenvy::from_path(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::new(format!(
            "failed to load env file {}: {}",
            path, err
        ))),
    }
}

struct EnvLayer<F> {
    lookup: F,
    problems: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> EnvLayer<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: FromStr>(&mut self, key: &str, expected: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.problems.push(format!("{} must be {}", key, expected));
                None
            }
        }
    }

    fn required(&mut self, key: &str) -> Option<String> {
        let value = self.string(key);
        if value.is_none() {
            self.problems.push(format!("{} must be set", key));
        }
        value
    }
}
