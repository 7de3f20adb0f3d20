// SPDX-License-Identifier: GPL-3.0-only

//! Downstream frame consumers

use super::types::CorrelationHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Consumer of validated frames
///
/// Called on the device's frame thread while the frame lock is held, so an
/// implementation must return promptly and must not call back into the
/// capture session.
pub trait FrameSink: Send + Sync {
    fn deliver_frame(&self, data: &[u8], length: usize, handle: CorrelationHandle);
}

impl<F> FrameSink for F
where
    F: Fn(&[u8], usize, CorrelationHandle) + Send + Sync,
{
    fn deliver_frame(&self, data: &[u8], length: usize, handle: CorrelationHandle) {
        self(data, length, handle)
    }
}

/// Owned copy of a delivered frame
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub data: Arc<[u8]>,
    pub length: usize,
    pub handle: CorrelationHandle,
    /// Position in the sink's delivery order, starting at 0
    pub sequence: u64,
    pub captured_at: Instant,
}

/// Sink that copies frames into a bounded channel
///
/// Uses `try_send`, so a slow receiver costs dropped frames rather than a
/// stalled device callback.
pub struct ChannelSink {
    sender: mpsc::Sender<CapturedFrame>,
    sequence: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CapturedFrame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                sequence: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Frames discarded because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for ChannelSink {
    fn deliver_frame(&self, data: &[u8], length: usize, handle: CorrelationHandle) {
        let frame = CapturedFrame {
            data: Arc::from(&data[..length.min(data.len())]),
            length,
            handle,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            captured_at: Instant::now(),
        };

        if let Err(e) = self.sender.try_send(frame) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(dropped, error = %e, "Sink channel unavailable, dropping frame");
        }
    }
}
