//! Frame sources.
//!
//! - `stub://<name>`: synthetic scene with periodic motion (no hardware needed)
//! - device paths (e.g. `/dev/video0`): V4L2 capture (feature: ingest-v4l2)
//! - `ScriptedSource`: fixed frame sequence, for tests and replay
//!
//! A source hands out one frame per call. `Ok(None)` is end-of-stream.

pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::{ScriptedSource, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use crate::config::CameraSettings;
use crate::error::DeviceError;
use crate::frame::Frame;

pub trait FrameSource: Send {
    /// Device path or stub URL, for logs.
    fn name(&self) -> &str;

    /// Open the underlying device. Called once before the first frame.
    fn connect(&mut self) -> Result<(), DeviceError>;

    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError>;

    /// Active `(width, height)`. May change during `connect` if the device
    /// rejects the requested format.
    fn resolution(&self) -> (u32, u32);
}

/// Build the source named by the camera settings. Does not connect.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>, DeviceError> {
    if settings.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(settings.clone())))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(DeviceError::Unsupported(format!(
            "camera {} requires the ingest-v4l2 feature",
            settings.device
        )))
    }
}
