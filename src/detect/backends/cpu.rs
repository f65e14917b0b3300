use crate::detect::backend::ForegroundExtractor;
use crate::detect::result::Region;
use crate::frame::Frame;

/// Frames of history the running background average roughly spans.
const DEFAULT_HISTORY: u32 = 30;
/// Gray-level difference from the background that counts as foreground.
const DEFAULT_DIFF_THRESHOLD: u8 = 25;

/// CPU foreground extractor: running-average background, absolute difference
/// threshold, 4-connected components.
pub struct FrameDifferencer {
    background: Vec<f32>,
    width: u32,
    height: u32,
    learning_rate: f32,
    diff_threshold: f32,
    mask: Vec<bool>,
}

impl FrameDifferencer {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_HISTORY, DEFAULT_DIFF_THRESHOLD)
    }

    pub fn with_params(history: u32, diff_threshold: u8) -> Self {
        Self {
            background: Vec::new(),
            width: 0,
            height: 0,
            learning_rate: 1.0 / history.max(1) as f32,
            diff_threshold: diff_threshold as f32,
            mask: Vec::new(),
        }
    }

    fn reset(&mut self, frame: &Frame) {
        self.width = frame.width;
        self.height = frame.height;
        self.background = frame.gray().map(f32::from).collect();
        self.mask = vec![false; self.background.len()];
    }

    fn update_mask(&mut self, frame: &Frame) {
        let rate = self.learning_rate;
        for ((bg, fg), gray) in self
            .background
            .iter_mut()
            .zip(self.mask.iter_mut())
            .zip(frame.gray())
        {
            let gray = f32::from(gray);
            *fg = (gray - *bg).abs() > self.diff_threshold;
            *bg += rate * (gray - *bg);
        }
    }

    fn components(&mut self) -> Vec<Region> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut regions = Vec::new();
        let mut stack = Vec::new();
        for start in 0..self.mask.len() {
            if !self.mask[start] {
                continue;
            }
            self.mask[start] = false;
            stack.push(start);
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0usize, 0usize);
            let mut area = 0u64;
            while let Some(idx) = stack.pop() {
                let (x, y) = (idx % w, idx / w);
                area += 1;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                let mut visit = |n: usize| {
                    if self.mask[n] {
                        self.mask[n] = false;
                        stack.push(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < w {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - w);
                }
                if y + 1 < h {
                    visit(idx + w);
                }
            }
            regions.push(Region {
                x: min_x as u32,
                y: min_y as u32,
                width: (max_x - min_x + 1) as u32,
                height: (max_y - min_y + 1) as u32,
                area,
            });
        }
        regions
    }
}

impl Default for FrameDifferencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundExtractor for FrameDifferencer {
    fn name(&self) -> &'static str {
        "frame-diff"
    }

    fn foreground_regions(&mut self, frame: &Frame) -> Vec<Region> {
        if self.background.is_empty() || frame.width != self.width || frame.height != self.height
        {
            self.reset(frame);
            return Vec::new();
        }
        self.update_mask(frame);
        self.components()
    }
}
