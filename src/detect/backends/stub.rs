use std::collections::VecDeque;

use crate::detect::backend::ForegroundExtractor;
use crate::detect::result::Region;
use crate::frame::Frame;

/// Stub extractor for testing. Replays queued region lists, one per frame, and
/// reports an empty scene once the queue runs out.
#[derive(Default)]
pub struct StubExtractor {
    script: VecDeque<Vec<Region>>,
}

impl StubExtractor {
    pub fn new(script: impl IntoIterator<Item = Vec<Region>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl ForegroundExtractor for StubExtractor {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn foreground_regions(&mut self, _frame: &Frame) -> Vec<Region> {
        self.script.pop_front().unwrap_or_default()
    }
}
