use chrono::Local;
use std::time::{Duration, Instant};

use crate::clip::{new_clip_path, AviWriter, Clip};
use crate::config::DetectorSettings;
use crate::detect::backend::ForegroundExtractor;
use crate::error::{DeviceError, RecordError};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::shutdown::ShutdownToken;

/// Smallest foreground region that counts as motion: 1/64 of the frame area.
/// 4800 px at 640x480.
pub fn min_area(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 / 64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DarkTransition {
    Entered,
    Left,
}

/// Dark/light hysteresis: reports only the edges, so a run of dark frames logs
/// one transition, not one per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DarkModeState {
    #[default]
    Light,
    Dark,
}

impl DarkModeState {
    pub fn observe(&mut self, dark: bool) -> Option<DarkTransition> {
        match (*self, dark) {
            (DarkModeState::Light, true) => {
                *self = DarkModeState::Dark;
                Some(DarkTransition::Entered)
            }
            (DarkModeState::Dark, false) => {
                *self = DarkModeState::Light;
                Some(DarkTransition::Left)
            }
            _ => None,
        }
    }

    pub fn is_dark(&self) -> bool {
        *self == DarkModeState::Dark
    }
}

/// Owns the camera and the foreground extractor. Runs on the producer thread only.
pub struct MotionDetector {
    source: Box<dyn FrameSource>,
    extractor: Box<dyn ForegroundExtractor>,
    settings: DetectorSettings,
    width: u32,
    height: u32,
    dark: DarkModeState,
    dark_transitions: u64,
}

impl MotionDetector {
    /// Connects the source. Fails if the camera cannot be opened.
    pub fn new(
        mut source: Box<dyn FrameSource>,
        extractor: Box<dyn ForegroundExtractor>,
        settings: DetectorSettings,
    ) -> Result<Self, DeviceError> {
        source.connect()?;
        let (width, height) = source.resolution();
        log::info!(
            "camera {} connected at {}x{} (extractor: {}, min area {} px)",
            source.name(),
            width,
            height,
            extractor.name(),
            min_area(width, height)
        );
        Ok(Self {
            source,
            extractor,
            settings,
            width,
            height,
            dark: DarkModeState::default(),
            dark_transitions: 0,
        })
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn min_area(&self) -> u64 {
        min_area(self.width, self.height)
    }

    pub fn dark_mode(&self) -> DarkModeState {
        self.dark
    }

    /// Dark/light edges seen so far.
    pub fn dark_transitions(&self) -> u64 {
        self.dark_transitions
    }

    /// `Ok(None)` means the stream ended.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        self.source.next_frame()
    }

    /// Mean intensity below the dark threshold. Logs once on each dark/light edge.
    pub fn is_dark(&mut self, frame: &Frame) -> bool {
        let brightness = frame.mean_intensity();
        let dark = brightness < self.settings.dark_threshold;
        if let Some(transition) = self.dark.observe(dark) {
            self.dark_transitions += 1;
            match transition {
                DarkTransition::Entered => log::info!(
                    "entering dark mode (brightness {:.1} < {:.1}), detection paused",
                    brightness,
                    self.settings.dark_threshold
                ),
                DarkTransition::Left => log::info!(
                    "leaving dark mode (brightness {:.1}), detection resumed",
                    brightness
                ),
            }
        }
        dark
    }

    /// Feeds the extractor and reports whether any region reaches `min_area`.
    pub fn detect(&mut self, frame: &Frame) -> bool {
        let threshold = self.min_area();
        let regions = self.extractor.foreground_regions(frame);
        match regions.iter().max_by_key(|region| region.area) {
            Some(largest) if largest.area >= threshold => {
                log::info!(
                    "motion detected: region {}x{} at ({}, {}), area {} px",
                    largest.width,
                    largest.height,
                    largest.x,
                    largest.y,
                    largest.area
                );
                true
            }
            _ => false,
        }
    }

    /// Feed the first frames to the extractor so its background settles.
    /// Detections during priming are discarded. Returns the number of frames used,
    /// which is short if the stream ends or shutdown is requested.
    pub fn priming_loop(&mut self, shutdown: &ShutdownToken) -> Result<u32, DeviceError> {
        let mut primed = 0;
        while primed < self.settings.priming_frames {
            if shutdown.is_cancelled() {
                break;
            }
            let Some(frame) = self.read_frame()? else {
                log::info!("stream ended during priming after {} frames", primed);
                break;
            };
            let _ = self.extractor.foreground_regions(&frame);
            primed += 1;
            if shutdown.wait_timeout(self.settings.priming_interval) {
                break;
            }
        }
        log::debug!("priming done ({} frames)", primed);
        Ok(primed)
    }

    /// Record a clip of `clip_duration` at `clip_fps` into the capture directory.
    /// End-of-stream closes the clip early; the partial clip is still valid.
    pub fn record(&mut self) -> Result<Clip, RecordError> {
        let dir = self.settings.capture_dir.clone();
        std::fs::create_dir_all(&dir).map_err(|source| RecordError::Io {
            path: dir.clone(),
            source,
        })?;
        let created_at = Local::now();
        let path = new_clip_path(&dir, &created_at);
        let io_err = |source| RecordError::Io {
            path: path.clone(),
            source,
        };

        let fps = self.settings.clip_fps.max(1);
        let mut writer = AviWriter::create(&path, self.width, self.height, fps).map_err(io_err)?;
        let frame_period = Duration::from_secs_f64(1.0 / fps as f64);
        let started = Instant::now();
        let mut next_due = started;
        while started.elapsed() < self.settings.clip_duration {
            if !writer.has_room() {
                log::warn!(
                    "{} reached the AVI size limit after {} frames; ending clip early",
                    path.display(),
                    writer.frames()
                );
                break;
            }
            let Some(frame) = self.source.next_frame()? else {
                log::info!("stream ended while recording {}", path.display());
                break;
            };
            writer.write_frame(&frame).map_err(io_err)?;
            next_due += frame_period;
            let now = Instant::now();
            if next_due > now {
                std::thread::sleep(next_due - now);
            }
        }
        let frames = writer.finish().map_err(io_err)?;
        log::info!("recorded {} ({} frames)", path.display(), frames);
        Ok(Clip {
            path,
            created_at,
            duration: self.settings.clip_duration,
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubExtractor;
    use crate::detect::result::Region;
    use crate::ingest::ScriptedSource;

    fn settings(dir: &std::path::Path) -> DetectorSettings {
        DetectorSettings {
            priming_interval: Duration::ZERO,
            frame_interval: Duration::ZERO,
            clip_duration: Duration::from_millis(200),
            clip_fps: 50,
            capture_dir: dir.to_path_buf(),
            ..DetectorSettings::default()
        }
    }

    fn detector(
        frames: Vec<Frame>,
        script: Vec<Vec<Region>>,
        dir: &std::path::Path,
    ) -> MotionDetector {
        MotionDetector::new(
            Box::new(ScriptedSource::new(640, 480, frames)),
            Box::new(StubExtractor::new(script)),
            settings(dir),
        )
        .unwrap()
    }

    #[test]
    fn min_area_scales_with_resolution() {
        assert_eq!(min_area(640, 480), 4800);
        assert_eq!(min_area(1280, 480), 9600);
        assert_eq!(min_area(1280, 960), 19200);
    }

    #[test]
    fn region_must_reach_min_area() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(
            Vec::new(),
            vec![
                vec![Region::rect(0, 0, 10, 10)],
                vec![Region {
                    area: 4799,
                    ..Region::rect(0, 0, 100, 48)
                }],
                vec![Region::rect(0, 0, 10, 10), Region::rect(10, 10, 100, 48)],
                vec![],
            ],
            dir.path(),
        );
        let frame = Frame::filled(640, 480, 120);
        assert!(!det.detect(&frame));
        assert!(!det.detect(&frame));
        assert!(det.detect(&frame));
        assert!(!det.detect(&frame));
    }

    #[test]
    fn dark_mode_logs_each_edge_once() {
        let mut state = DarkModeState::default();
        let edges: Vec<_> = [true, true, true, false, false, true]
            .into_iter()
            .filter_map(|dark| state.observe(dark))
            .collect();
        assert_eq!(
            edges,
            vec![
                DarkTransition::Entered,
                DarkTransition::Left,
                DarkTransition::Entered
            ]
        );
    }

    #[test]
    fn is_dark_tracks_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(Vec::new(), Vec::new(), dir.path());
        let black = Frame::filled(640, 480, 5);
        let lit = Frame::filled(640, 480, 120);
        for _ in 0..3 {
            assert!(det.is_dark(&black));
        }
        assert_eq!(det.dark_transitions(), 1);
        assert!(det.dark_mode().is_dark());
        assert!(!det.is_dark(&lit));
        assert_eq!(det.dark_transitions(), 2);
    }

    #[test]
    fn priming_consumes_frames_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let frames = (0..12).map(|_| Frame::filled(640, 480, 120)).collect();
        let mut det = detector(frames, Vec::new(), dir.path());
        let primed = det.priming_loop(&ShutdownToken::new()).unwrap();
        assert_eq!(primed, 10);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(det.read_frame().unwrap().is_some());
    }

    #[test]
    fn priming_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let frames = (0..12).map(|_| Frame::filled(640, 480, 120)).collect();
        let mut det = detector(frames, Vec::new(), dir.path());
        let token = ShutdownToken::new();
        token.cancel();
        assert_eq!(det.priming_loop(&token).unwrap(), 0);
    }

    #[test]
    fn record_stops_at_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let frames = (0..3).map(|_| Frame::filled(640, 480, 120)).collect();
        let mut det = detector(frames, Vec::new(), dir.path());
        let clip = det.record().unwrap();
        assert_eq!(clip.frames, 3);
        assert!(clip.path.starts_with(dir.path()));
        assert!(clip.path.extension().is_some_and(|ext| ext == "avi"));
        let bytes = std::fs::read(&clip.path).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
    }

    #[test]
    fn record_creates_missing_capture_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("captures");
        let mut det = detector(Vec::new(), Vec::new(), &nested);
        let clip = det.record().unwrap();
        assert_eq!(clip.frames, 0);
        assert!(clip.path.starts_with(&nested));
    }
}
