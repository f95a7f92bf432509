//! Bounded framed queue between workers and the record consumer.
//!
//! Workers post packed record frames; the consumer drains them from the
//! receiving side. A zero-length frame is the end-of-stream sentinel and is
//! posted exactly once per pipeline, by the last worker to complete.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded as channel_bounded, Receiver, SendTimeoutError, Sender};

/// One packed record on the queue. Empty means end-of-stream.
pub type Frame = Vec<u8>;

/// Timeout for one bounded-blocking post attempt.
pub const SYS_TIMEOUT: Duration = Duration::from_secs(1);

/// True when a frame is the end-of-stream sentinel.
#[must_use]
pub fn is_eos(frame: &[u8]) -> bool {
    frame.is_empty()
}

/// Why a post attempt did not deliver its frame.
#[derive(Debug)]
pub enum PostFailure {
    /// The queue stayed full for the whole timeout; retryable
    Timeout(Frame),
    /// The consumer is gone; not retryable
    Closed(Frame),
}

impl PostFailure {
    /// Recover the undelivered frame.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        match self {
            PostFailure::Timeout(frame) | PostFailure::Closed(frame) => frame,
        }
    }

    /// Whether retrying the post can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PostFailure::Timeout(_))
    }
}

/// Posting side of the outbound record queue.
#[derive(Debug, Clone)]
pub struct RecordQueue {
    tx: Sender<Frame>,
}

/// Create a queue bounded to `depth` in-flight frames.
#[must_use]
pub fn bounded(depth: usize) -> (RecordQueue, Receiver<Frame>) {
    let (tx, rx) = channel_bounded(depth);
    (RecordQueue { tx }, rx)
}

impl RecordQueue {
    /// Post one frame, blocking up to [`SYS_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns the frame back inside [`PostFailure`] when the queue stayed
    /// full ([`PostFailure::Timeout`]) or the consumer disconnected
    /// ([`PostFailure::Closed`]).
    pub fn post(&self, frame: Frame) -> std::result::Result<(), PostFailure> {
        match self.tx.send_timeout(frame, SYS_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(frame)) => Err(PostFailure::Timeout(frame)),
            Err(SendTimeoutError::Disconnected(frame)) => Err(PostFailure::Closed(frame)),
        }
    }

    /// Post the end-of-stream sentinel, retrying while `active` holds.
    ///
    /// Best effort: if the pipeline is being shut down or the consumer is
    /// gone the sentinel is abandoned, since nobody is left to read it.
    pub fn post_eos(&self, active: &AtomicBool) {
        let mut frame = Frame::new();
        loop {
            match self.post(frame) {
                Ok(()) => return,
                Err(failure) => {
                    if !failure.is_retryable() || !active.load(Ordering::Relaxed) {
                        return;
                    }
                    frame = failure.into_frame();
                }
            }
        }
    }
}
