/// A connected foreground blob found by an extractor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Foreground pixel count (not the bounding-box area).
    pub area: u64,
}

impl Region {
    /// Solid rectangular blob.
    pub fn rect(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            area: width as u64 * height as u64,
        }
    }
}
