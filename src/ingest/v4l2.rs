//! V4L2 capture device source (USB webcams on Linux).

use ouroboros::self_referencing;

use super::FrameSource;
use crate::config::CameraSettings;
use crate::error::DeviceError;
use crate::frame::Frame;

/// Frames requested from the device per second; the detection loop decimates further.
const CAPTURE_FPS: u32 = 20;

pub struct V4l2Source {
    settings: CameraSettings,
    state: Option<DeviceState>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            settings,
            state: None,
        }
    }

    fn open_error(&self, reason: impl std::fmt::Display) -> DeviceError {
        DeviceError::Open {
            device: self.settings.device.clone(),
            reason: reason.to_string(),
        }
    }

    fn capture_error(&self, reason: impl std::fmt::Display) -> DeviceError {
        DeviceError::Capture {
            device: self.settings.device.clone(),
            reason: reason.to_string(),
        }
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.settings.device
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device =
            v4l::Device::with_path(&self.settings.device).map_err(|e| self.open_error(e))?;
        let mut format = device.format().map_err(|e| self.open_error(e))?;
        format.width = self.settings.width;
        format.height = self.settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.settings.device,
                    err
                );
                device.format().map_err(|e| self.open_error(e))?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(self.open_error(format!(
                "device does not deliver RGB3 (got {})",
                format.fourcc
            )));
        }

        let params = v4l::video::capture::Parameters::with_fps(CAPTURE_FPS);
        if let Err(err) = device.set_params(&params) {
            log::warn!(
                "V4l2Source: failed to set fps on {}: {}",
                self.settings.device,
                err
            );
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|e| self.open_error(e))?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{})",
            self.settings.device,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        use v4l::io::traits::CaptureStream;

        let device = self.settings.device.clone();
        let (width, height) = (self.active_width, self.active_height);
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| DeviceError::Capture {
                device: device.clone(),
                reason: "not connected".to_string(),
            })?;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|e| DeviceError::Capture {
                device: device.clone(),
                reason: e.to_string(),
            })?;

        let expected = width as usize * height as usize * crate::frame::CHANNELS;
        if pixels.len() < expected {
            return Err(self.capture_error(format!(
                "short frame: {} bytes, expected {}",
                pixels.len(),
                expected
            )));
        }
        let mut pixels = pixels;
        pixels.truncate(expected);
        Ok(Frame::from_rgb(pixels, width, height))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.active_width, self.active_height)
    }
}
