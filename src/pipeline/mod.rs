//! Capture pipeline.
//!
//! The calling thread runs the detection loop and owns the camera. A worker
//! thread encrypts and uploads clips, one at a time, in the order they were
//! recorded. On shutdown or end-of-stream the detection loop stops, the worker
//! drains the queue, and the log file is uploaded once.
//!
//! Uploads are best-effort: a failed clip is retried a bounded number of times,
//! then dropped. Its `.enc` file is left in the capture directory.

pub mod handoff;

pub use handoff::{UploadTask, HANDOFF_CAPACITY};

use std::sync::Arc;
use std::time::Duration;

use crate::clip::Clip;
use crate::config::{PipelineConfig, StorageSettings, UploadSettings};
use crate::detect::{FrameDifferencer, MotionDetector};
use crate::error::{RecordError, ShutdownUploadError, StartupError, UploadError};
use crate::ingest::open_source;
use crate::shutdown::ShutdownToken;
use crate::upload::{build_backend, remote_key, UploadBackend};
use crate::vault::Encryptor;

use handoff::{ClipReceiver, ClipSender};

/// Exit status when the final log upload failed.
pub const EXIT_LOG_UPLOAD_FAILED: i32 = 2;
/// Exit status when the camera failed mid-run.
pub const EXIT_DEVICE_FAILURE: i32 = 1;
/// Exit status when the upload worker died before the queue was drained.
pub const EXIT_WORKER_LOST: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Priming,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Starting => "starting",
            PipelineState::Priming => "priming",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    EndOfStream,
    DeviceFailure,
    /// The upload worker exited or panicked while clips were still queued.
    WorkerLost,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub clips_recorded: u64,
    pub clips_uploaded: u64,
    pub clips_failed: u64,
    pub dark_transitions: u64,
    pub log_upload: Result<String, ShutdownUploadError>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.log_upload.is_err() {
            EXIT_LOG_UPLOAD_FAILED
        } else {
            match self.stop_reason {
                StopReason::DeviceFailure => EXIT_DEVICE_FAILURE,
                StopReason::WorkerLost => EXIT_WORKER_LOST,
                StopReason::Shutdown | StopReason::EndOfStream => 0,
            }
        }
    }
}

#[derive(Default)]
struct UploadStats {
    uploaded: u64,
    failed: u64,
}

pub struct Pipeline {
    detector: MotionDetector,
    encryptor: Arc<Encryptor>,
    backend: Arc<dyn UploadBackend>,
    storage: StorageSettings,
    upload: UploadSettings,
    shutdown: ShutdownToken,
}

impl Pipeline {
    pub fn new(
        detector: MotionDetector,
        encryptor: Encryptor,
        backend: Arc<dyn UploadBackend>,
        storage: StorageSettings,
        upload: UploadSettings,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            detector,
            encryptor: Arc::new(encryptor),
            backend,
            storage,
            upload,
            shutdown,
        }
    }

    /// Open the camera and the upload backend named by the configuration.
    pub fn from_config(
        config: &PipelineConfig,
        shutdown: ShutdownToken,
    ) -> Result<Self, StartupError> {
        enter(PipelineState::Starting);
        let source = open_source(&config.camera)?;
        let detector = MotionDetector::new(
            source,
            Box::new(FrameDifferencer::new()),
            config.detector.clone(),
        )?;
        let backend = build_backend(&config.backend, &config.upload)?;
        Ok(Self::new(
            detector,
            Encryptor::new(config.key.clone()),
            backend,
            config.storage.clone(),
            config.upload.clone(),
            shutdown,
        ))
    }

    /// Run until shutdown is requested or the frame source ends.
    pub fn run(self) -> Result<RunSummary, StartupError> {
        let Pipeline {
            mut detector,
            encryptor,
            backend,
            storage,
            upload,
            shutdown,
        } = self;

        let (tx, rx) = handoff::channel(HANDOFF_CAPACITY);
        let worker = Uploader {
            encryptor,
            backend: Arc::clone(&backend),
            upload_folder: storage.upload_folder.clone(),
            settings: upload,
            shutdown: shutdown.clone(),
        };
        let worker = std::thread::Builder::new()
            .name("uploader".to_string())
            .spawn(move || worker.run(rx))
            .map_err(StartupError::Worker)?;

        enter(PipelineState::Priming);
        let mut clips_recorded = 0;
        let stop_reason = match detector.priming_loop(&shutdown) {
            Ok(_) => {
                enter(PipelineState::Running);
                detection_loop(&mut detector, &tx, &shutdown, &mut clips_recorded)
            }
            Err(err) => {
                log::error!("{}", err);
                StopReason::DeviceFailure
            }
        };

        enter(PipelineState::Draining);
        log::info!("stopping ({:?}), draining upload queue", stop_reason);
        drop(tx);
        let (stats, stop_reason) = match worker.join() {
            Ok(stats) => (stats, stop_reason),
            Err(_) => {
                log::error!("upload worker panicked");
                let reason = match stop_reason {
                    StopReason::DeviceFailure => StopReason::DeviceFailure,
                    _ => StopReason::WorkerLost,
                };
                (UploadStats::default(), reason)
            }
        };

        // Has to reach the log file before it is uploaded.
        log::info!(
            "summary ({:?}): {} clips recorded, {} uploaded, {} failed, {} dark/light transitions",
            stop_reason,
            clips_recorded,
            stats.uploaded,
            stats.failed,
            detector.dark_transitions()
        );
        let log_upload = upload_log(backend.as_ref(), &storage);
        enter(PipelineState::Stopped);
        Ok(RunSummary {
            stop_reason,
            clips_recorded,
            clips_uploaded: stats.uploaded,
            clips_failed: stats.failed,
            dark_transitions: detector.dark_transitions(),
            log_upload,
        })
    }
}

fn enter(state: PipelineState) {
    log::info!("pipeline {}", state);
}

fn detection_loop(
    detector: &mut MotionDetector,
    tx: &ClipSender,
    shutdown: &ShutdownToken,
    clips_recorded: &mut u64,
) -> StopReason {
    let dark_interval = detector.settings().dark_interval;
    let frame_interval = detector.settings().frame_interval;
    loop {
        if shutdown.is_cancelled() {
            return StopReason::Shutdown;
        }
        let frame = match detector.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return StopReason::EndOfStream,
            Err(err) => {
                log::error!("{}", err);
                return StopReason::DeviceFailure;
            }
        };
        if detector.is_dark(&frame) {
            shutdown.wait_timeout(dark_interval);
            continue;
        }
        if detector.detect(&frame) {
            match detector.record() {
                Ok(clip) => {
                    *clips_recorded += 1;
                    if let Err(clip) = tx.send(clip) {
                        log::error!(
                            "upload worker stopped; {} left in place",
                            clip.path.display()
                        );
                        return StopReason::WorkerLost;
                    }
                }
                Err(RecordError::Device(err)) => {
                    log::error!("{}", err);
                    return StopReason::DeviceFailure;
                }
                Err(err) => log::error!("{}", err),
            }
        }
        shutdown.wait_timeout(frame_interval);
    }
}

/// Upload the log file once. No retry: this runs on the way out.
fn upload_log(
    backend: &dyn UploadBackend,
    storage: &StorageSettings,
) -> Result<String, ShutdownUploadError> {
    log::logger().flush();
    let path = storage.log_path();
    let key = remote_key(&storage.upload_folder, &path);
    match backend.upload(&path, &key) {
        Ok(url) => {
            log::info!("uploaded log to {}", url);
            Ok(url)
        }
        Err(err) => {
            let err = ShutdownUploadError::from(err);
            log::error!("{}", err);
            Err(err)
        }
    }
}

/// Encrypts and uploads queued clips.
struct Uploader {
    encryptor: Arc<Encryptor>,
    backend: Arc<dyn UploadBackend>,
    upload_folder: String,
    settings: UploadSettings,
    shutdown: ShutdownToken,
}

impl Uploader {
    fn run(self, rx: ClipReceiver) -> UploadStats {
        let mut stats = UploadStats::default();
        for clip in rx {
            if self.process(&clip) {
                stats.uploaded += 1;
            } else {
                stats.failed += 1;
            }
        }
        stats
    }

    fn process(&self, clip: &Clip) -> bool {
        let encrypted = match self.encryptor.encrypt(&clip.path) {
            Ok(path) => path,
            Err(err) => {
                log::error!("error encrypting {}: {}", clip.path.display(), err);
                return false;
            }
        };
        let task = UploadTask {
            remote_key: remote_key(&self.upload_folder, &encrypted),
            local_path: encrypted,
        };
        match self.upload_with_retry(&task) {
            Ok(url) => {
                log::info!("uploaded {} to {}", task.local_path.display(), url);
                true
            }
            Err(err) => {
                log::error!(
                    "dropping {} after failed upload: {}",
                    task.local_path.display(),
                    err
                );
                false
            }
        }
    }

    fn upload_with_retry(&self, task: &UploadTask) -> Result<String, UploadError> {
        let attempts = self.settings.attempts.max(1);
        let mut delay = self.settings.backoff;
        let mut attempt = 1;
        loop {
            match self.backend.upload(&task.local_path, &task.remote_key) {
                Ok(url) => return Ok(url),
                Err(err) if attempt < attempts => {
                    log::warn!(
                        "upload attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt,
                        attempts,
                        task.remote_key,
                        err,
                        delay
                    );
                    // Pending shutdown cancels the remaining retries.
                    if self.shutdown.wait_timeout(delay) {
                        return Err(err);
                    }
                    delay = delay.saturating_mul(2).min(Duration::from_secs(300));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
