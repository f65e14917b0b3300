use crate::detect::result::Region;
use crate::frame::Frame;

/// Foreground extraction: the detector's view of a background-subtraction algorithm.
///
/// Implementations keep their own background model and update it on every call,
/// so the priming loop can stabilise them before live detection begins.
pub trait ForegroundExtractor: Send {
    /// Extractor identifier, for logs.
    fn name(&self) -> &'static str;

    /// Feed one frame and return the foreground regions it contains.
    fn foreground_regions(&mut self, frame: &Frame) -> Vec<Region>;
}
