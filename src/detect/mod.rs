mod backend;
pub mod backends;
mod motion;
mod result;

pub use backend::ForegroundExtractor;
pub use backends::{FrameDifferencer, StubExtractor};
pub use motion::{min_area, DarkModeState, DarkTransition, MotionDetector};
pub use result::Region;
