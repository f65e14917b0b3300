//! Hardware-free frame sources.

use std::collections::VecDeque;

use super::FrameSource;
use crate::config::CameraSettings;
use crate::error::DeviceError;
use crate::frame::Frame;

const BACKGROUND_LEVEL: u8 = 120;
const INTRUDER_RGB: [u8; 3] = [240, 230, 220];
/// Frames per scene phase; every other phase has an object crossing the view.
const SCENE_PHASE_FRAMES: u64 = 50;

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// Endless synthetic scene: a static background with an object that crosses
/// the frame during every other phase.
pub struct SyntheticSource {
    settings: CameraSettings,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
            connected: false,
        }
    }

    fn render(&self) -> Frame {
        let (width, height) = (self.settings.width, self.settings.height);
        let mut frame = Frame::filled(width, height, BACKGROUND_LEVEL);
        let phase = self.frame_count / SCENE_PHASE_FRAMES;
        if phase % 2 == 1 {
            let step = self.frame_count % SCENE_PHASE_FRAMES;
            let block_w = (width / 4).max(1);
            let block_h = (height / 4).max(1);
            let travel = width.saturating_sub(block_w) as u64;
            let x = (travel * step / SCENE_PHASE_FRAMES) as u32;
            frame.fill_rect(x, height / 3, block_w, block_h, INTRUDER_RGB);
        }
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.settings.device
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        log::info!("SyntheticSource: connected to {}", self.settings.device);
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        if !self.connected {
            return Err(DeviceError::Capture {
                device: self.settings.device.clone(),
                reason: "not connected".to_string(),
            });
        }
        self.frame_count += 1;
        Ok(Some(self.render()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.settings.width, self.settings.height)
    }
}

// ----------------------------------------------------------------------------
// Scripted source
// ----------------------------------------------------------------------------

/// Plays back a fixed list of frames, then reports end-of-stream.
pub struct ScriptedSource {
    frames: VecDeque<Frame>,
    width: u32,
    height: u32,
}

impl ScriptedSource {
    pub fn new(width: u32, height: u32, frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            width,
            height,
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        Ok(self.frames.pop_front())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_settings() -> CameraSettings {
        CameraSettings {
            device: "stub://test".to_string(),
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn synthetic_source_requires_connect() {
        let mut source = SyntheticSource::new(stub_settings());
        assert!(source.next_frame().is_err());
        source.connect().unwrap();
        let frame = source.next_frame().unwrap().expect("frame");
        assert_eq!((frame.width, frame.height), (64, 48));
    }

    #[test]
    fn synthetic_scene_alternates_between_still_and_motion() {
        let mut source = SyntheticSource::new(stub_settings());
        source.connect().unwrap();
        let mut frames = Vec::new();
        for _ in 0..(SCENE_PHASE_FRAMES * 2) {
            frames.push(source.next_frame().unwrap().expect("frame"));
        }
        let still = &frames[10];
        let moving = &frames[(SCENE_PHASE_FRAMES + 10) as usize];
        assert!(still.gray().all(|g| g == BACKGROUND_LEVEL));
        assert!(moving.gray().any(|g| g != BACKGROUND_LEVEL));
    }

    #[test]
    fn scripted_source_ends_after_last_frame() {
        let mut source = ScriptedSource::new(4, 4, vec![Frame::filled(4, 4, 1)]);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.remaining(), 0);
    }
}
