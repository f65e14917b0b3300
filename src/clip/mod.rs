//! Locally recorded motion clips.

pub mod avi;

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use avi::AviWriter;

pub const CLIP_PREFIX: &str = "motion_";
pub const CLIP_EXTENSION: &str = "avi";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// A finished clip on local disk, waiting to be encrypted and shipped.
#[derive(Clone, Debug)]
pub struct Clip {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub duration: Duration,
    pub frames: u32,
}

/// `motion_<YYYYmmdd-HHMMSS>.avi`
pub fn clip_file_name(created_at: &DateTime<Local>) -> String {
    format!(
        "{}{}.{}",
        CLIP_PREFIX,
        created_at.format(TIMESTAMP_FORMAT),
        CLIP_EXTENSION
    )
}

/// Path for a new clip in `dir`. Two clips started within the same second get a
/// numeric suffix so an existing clip is never overwritten.
pub fn new_clip_path(dir: &Path, created_at: &DateTime<Local>) -> PathBuf {
    let candidate = dir.join(clip_file_name(created_at));
    if !candidate.exists() {
        return candidate;
    }
    let stamp = created_at.format(TIMESTAMP_FORMAT);
    (1u32..)
        .map(|n| dir.join(format!("{}{}-{}.{}", CLIP_PREFIX, stamp, n, CLIP_EXTENSION)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
