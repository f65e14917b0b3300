//! Bounded FIFO between the detection loop and the upload worker.
//!
//! A full channel blocks the sender, which stalls frame reads until the worker
//! catches up. Dropping the sender ends the worker's iteration once the queue is
//! empty.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use crate::clip::Clip;

pub const HANDOFF_CAPACITY: usize = 10;

/// An encrypted file and the remote key it is stored under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub remote_key: String,
}

pub struct ClipSender {
    tx: SyncSender<Clip>,
}

pub struct ClipReceiver {
    rx: Receiver<Clip>,
}

pub fn channel(capacity: usize) -> (ClipSender, ClipReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (ClipSender { tx }, ClipReceiver { rx })
}

impl ClipSender {
    /// Blocks while the queue is full. Gives the clip back if the worker is gone.
    pub fn send(&self, clip: Clip) -> Result<(), Clip> {
        self.tx.send(clip).map_err(|err| err.0)
    }

    pub fn try_send(&self, clip: Clip) -> Result<(), TrySendError<Clip>> {
        self.tx.try_send(clip)
    }
}

impl IntoIterator for ClipReceiver {
    type Item = Clip;
    type IntoIter = mpsc::IntoIter<Clip>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}
