//! Captured video frames.
//!
//! A `Frame` is a packed RGB24 buffer (`width * height * 3` bytes, row-major, top-down).
//! Frames are produced by a `FrameSource`, examined once by the detector, and either
//! dropped or appended to a clip.

/// Bytes per pixel for packed RGB24.
pub const CHANNELS: usize = 3;

pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap a packed RGB24 buffer. Returns `None` when the buffer length does not
    /// match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != rgb_len(width, height) {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }

    /// Uniform frame with every channel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: vec![value; rgb_len(width, height)],
            width,
            height,
        }
    }

    /// Mean intensity across all channels of all pixels, in `0.0..=255.0`.
    pub fn mean_intensity(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&b| b as u64).sum();
        sum as f64 / self.data.len() as f64
    }

    /// Per-pixel gray level (channel average), row-major.
    pub fn gray(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.chunks_exact(CHANNELS).map(|px| {
            let sum = px[0] as u16 + px[1] as u16 + px[2] as u16;
            (sum / CHANNELS as u16) as u8
        })
    }

    /// Paint an axis-aligned rectangle, clipped to the frame bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for row in y.min(self.height)..y_end {
            for col in x.min(self.width)..x_end {
                let offset = (row as usize * self.width as usize + col as usize) * CHANNELS;
                self.data[offset..offset + CHANNELS].copy_from_slice(&rgb);
            }
        }
    }

    /// One row of packed RGB pixels.
    pub(crate) fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::from_rgb(vec![0u8; 10], 4, 4).is_none());
        assert!(Frame::from_rgb(vec![0u8; 48], 4, 4).is_some());
        assert!(Frame::from_rgb(Vec::new(), 0, 0).is_none());
    }

    #[test]
    fn mean_intensity_covers_all_channels() {
        let mut frame = Frame::filled(2, 1, 0);
        frame.fill_rect(0, 0, 1, 1, [255, 255, 255]);
        assert!((frame.mean_intensity() - 127.5).abs() < f64::EPSILON);
    }

    #[test]
    fn fill_rect_clips_to_bounds() {
        let mut frame = Frame::filled(4, 4, 0);
        frame.fill_rect(2, 2, 10, 10, [9, 9, 9]);
        let painted = frame.gray().filter(|&g| g == 9).count();
        assert_eq!(painted, 4);
    }
}
