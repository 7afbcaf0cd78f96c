//! One-shot notifications emitted by the capture controller.
//!
//! State transitions and non-fatal failures (capture and capability errors)
//! are published on a [`NoticeBus`], a thin wrapper over a
//! [`tokio::sync::broadcast`] channel.  Subscribers receive every notice
//! published after they subscribed; a slow subscriber loses the oldest ones
//! rather than blocking the controller.
//!
//! Publishing never blocks and works outside a Tokio runtime, so the
//! controller stays single-threaded and synchronous.

use platecam_types::{AttemptId, CameraError, CaptureState};
use tokio::sync::broadcast;

/// Default number of buffered notices per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// A notification published by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The session moved from one state to another.
    StateChanged {
        attempt: AttemptId,
        from: CaptureState,
        to: CaptureState,
    },
    /// A capture or capability operation failed without affecting the
    /// session.
    Warning(CameraError),
}

/// Broadcast channel for [`Notice`]s. Clones share the same channel.
#[derive(Clone, Debug)]
pub struct NoticeBus {
    sender: broadcast::Sender<Notice>,
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `notice` and return how many subscribers received it.
    ///
    /// Having no subscribers is normal and yields `0`.
    pub fn publish(&self, notice: Notice) -> usize {
        self.sender.send(notice).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}
