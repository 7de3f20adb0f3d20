// SPDX-License-Identifier: GPL-3.0-only

//! Frame relay: validation and forwarding of device frames
//!
//! Every frame path runs under the frame lock, the same lock a transition
//! takes to flip the running flag. A frame therefore either sees Running and
//! is fully forwarded before the flag can change, or sees the stopped state
//! and is dropped. Once a stop has flipped the flag no frame reaches the sink.

use super::buffer_pool::{BufferOwner, BufferPool, FrameBuffer};
use super::diagnostics::CaptureDiagnostics;
use super::sink::FrameSink;
use super::types::CorrelationHandle;
use crate::constants::LOG_EVERY_N_FRAMES;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// What happened to a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Handed to the sink
    Forwarded,
    /// Session not running (normal shutdown race)
    DroppedNotRunning,
    /// Length differs from the negotiated frame size
    SizeMismatch { expected: usize, actual: usize },
    /// Buffer from an older allocation
    StaleBuffer,
}

impl FrameOutcome {
    /// Size mismatches as an error, for devices that surface them to their own callers
    pub fn into_result(self) -> CaptureResult<()> {
        match self {
            FrameOutcome::SizeMismatch { expected, actual } => {
                Err(CaptureError::FrameSizeMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

/// Result of delivering a pool-owned buffer
#[derive(Debug)]
pub struct Delivery {
    pub outcome: FrameOutcome,
    /// Buffer returned to the device as its next receive target, if any
    pub recycled: Option<FrameBuffer>,
}

/// State guarded by the frame lock
pub(crate) struct FrameGate {
    pub(crate) running: bool,
    pub(crate) expected_frame_size: usize,
    pub(crate) owns_buffers: bool,
    pub(crate) handle: CorrelationHandle,
    pub(crate) pool: BufferPool,
}

pub(crate) struct FrameRelay {
    gate: Mutex<FrameGate>,
    sink: Arc<dyn FrameSink>,
    diagnostics: Arc<CaptureDiagnostics>,
}

impl FrameRelay {
    pub(crate) fn new(
        sink: Arc<dyn FrameSink>,
        handle: CorrelationHandle,
        diagnostics: Arc<CaptureDiagnostics>,
    ) -> Self {
        Self {
            gate: Mutex::new(FrameGate {
                running: false,
                expected_frame_size: 0,
                owns_buffers: false,
                handle,
                pool: BufferPool::new(),
            }),
            sink,
            diagnostics,
        }
    }

    /// Acquire the frame lock. A panic elsewhere never wedges the frame path.
    pub(crate) fn gate(&self) -> MutexGuard<'_, FrameGate> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the gate for a new streaming session
    pub(crate) fn arm(&self, expected_frame_size: usize, owns_buffers: bool) {
        let mut gate = self.gate();
        gate.expected_frame_size = expected_frame_size;
        gate.owns_buffers = owns_buffers;
        gate.running = true;
    }

    /// Close the gate. Returns whether it was open.
    pub(crate) fn disarm(&self) -> bool {
        let mut gate = self.gate();
        std::mem::replace(&mut gate.running, false)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.gate().running
    }

    pub(crate) fn set_handle(&self, handle: CorrelationHandle) {
        self.gate().handle = handle;
    }

    pub(crate) fn handle(&self) -> CorrelationHandle {
        self.gate().handle
    }

    /// Loan `count` buffers of `size` bytes to the device.
    ///
    /// A complete idle set of the right size from the previous run is lent
    /// again; anything else is reallocated.
    pub(crate) fn lend_buffers(&self, count: usize, size: usize) -> Vec<FrameBuffer> {
        let mut gate = self.gate();
        let pool = &mut gate.pool;
        if count > 0
            && pool.len() == count
            && pool.buffer_size() == size
            && pool.count_owned_by(BufferOwner::Pool) == count
        {
            debug!(count, size, "Reusing idle preview buffers");
            return pool.lend_idle();
        }
        pool.allocate(count, size)
    }

    pub(crate) fn reclaim_buffers(&self, buffers: Vec<FrameBuffer>) -> usize {
        self.gate().pool.reclaim(buffers)
    }

    pub(crate) fn release_buffers(&self) {
        self.gate().pool.release();
    }

    #[cfg(test)]
    pub(crate) fn with_pool<R>(&self, f: impl FnOnce(&BufferPool) -> R) -> R {
        f(&self.gate().pool)
    }

    /// A device wrote a frame into a pool-owned buffer
    pub(crate) fn on_frame_delivered(&self, buffer: FrameBuffer, reported_len: usize) -> Delivery {
        let mut gate = self.gate();

        if let Err(e) = gate.pool.check_in(&buffer) {
            self.diagnostics.record_stale_buffer();
            debug!(error = %e, "Discarding buffer not loaned by the current allocation");
            return Delivery {
                outcome: FrameOutcome::StaleBuffer,
                recycled: None,
            };
        }

        if !gate.running {
            self.diagnostics.record_dropped_not_running();
            if let Err(e) = gate.pool.park(buffer) {
                debug!(error = %e, "Failed to park buffer");
            }
            return Delivery {
                outcome: FrameOutcome::DroppedNotRunning,
                recycled: None,
            };
        }

        let outcome = match buffer.as_slice().get(..reported_len) {
            Some(data) if reported_len == gate.expected_frame_size => {
                self.forward(&gate, data, reported_len);
                FrameOutcome::Forwarded
            }
            _ => self.mismatch(gate.expected_frame_size, reported_len),
        };

        // Owned buffers go straight back to the device, only after forwarding returned
        let recycled = if gate.owns_buffers {
            match gate.pool.recycle(buffer) {
                Ok(buffer) => {
                    self.diagnostics.record_recycled();
                    Some(buffer)
                }
                Err(e) => {
                    debug!(error = %e, "Failed to recycle buffer");
                    None
                }
            }
        } else {
            if let Err(e) = gate.pool.park(buffer) {
                debug!(error = %e, "Failed to park buffer");
            }
            None
        };

        Delivery { outcome, recycled }
    }

    /// A device delivered a frame from memory it manages itself
    pub(crate) fn on_borrowed_frame(&self, data: &[u8], reported_len: usize) -> FrameOutcome {
        let gate = self.gate();

        if !gate.running {
            self.diagnostics.record_dropped_not_running();
            return FrameOutcome::DroppedNotRunning;
        }

        match data.get(..reported_len) {
            Some(frame) if reported_len == gate.expected_frame_size => {
                self.forward(&gate, frame, reported_len);
                FrameOutcome::Forwarded
            }
            _ => self.mismatch(gate.expected_frame_size, reported_len),
        }
    }

    /// A filter renderer produced an already-processed frame. No size check.
    pub(crate) fn on_filtered_frame(&self, data: &[u8], width: u32, height: u32) -> FrameOutcome {
        let gate = self.gate();

        if !gate.running {
            self.diagnostics.record_dropped_not_running();
            return FrameOutcome::DroppedNotRunning;
        }

        self.sink.deliver_frame(data, data.len(), gate.handle);
        let count = self.diagnostics.record_filtered_forwarded();
        if count % LOG_EVERY_N_FRAMES == 1 {
            debug!(count, width, height, bytes = data.len(), "Forwarded filtered frame");
        }
        FrameOutcome::Forwarded
    }

    fn forward(&self, gate: &FrameGate, data: &[u8], length: usize) {
        self.sink.deliver_frame(data, length, gate.handle);
        let count = self.diagnostics.record_forwarded();
        if count % LOG_EVERY_N_FRAMES == 1 {
            debug!(count, length, "Forwarded frame");
        }
    }

    fn mismatch(&self, expected: usize, actual: usize) -> FrameOutcome {
        let count = self.diagnostics.record_size_mismatch();
        let outcome = FrameOutcome::SizeMismatch { expected, actual };
        if count % LOG_EVERY_N_FRAMES == 1
            && let Err(e) = outcome.into_result()
        {
            warn!(count, error = %e, "Dropping frame");
        }
        outcome
    }
}

/// Entry points a device uses to hand frames to the session
///
/// Cheap to clone; devices keep one per registered callback.
#[derive(Clone)]
pub struct FrameCallback {
    relay: Arc<FrameRelay>,
}

impl FrameCallback {
    pub(crate) fn new(relay: Arc<FrameRelay>) -> Self {
        Self { relay }
    }

    /// Deliver a frame written into a loaned buffer.
    ///
    /// The returned [`Delivery::recycled`] buffer, if any, is the device's
    /// again and should be queued as a receive target.
    pub fn deliver(&self, buffer: FrameBuffer, reported_len: usize) -> Delivery {
        self.relay.on_frame_delivered(buffer, reported_len)
    }

    /// Deliver a frame from device-managed memory. Nothing is recycled.
    pub fn deliver_borrowed(&self, data: &[u8], reported_len: usize) -> FrameOutcome {
        self.relay.on_borrowed_frame(data, reported_len)
    }

    /// Deliver a pre-rendered frame from a filter renderer
    pub fn deliver_filtered(&self, data: &[u8], width: u32, height: u32) -> FrameOutcome {
        self.relay.on_filtered_frame(data, width, height)
    }
}

impl std::fmt::Debug for FrameCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCallback").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Seen = Arc<Mutex<Vec<(usize, CorrelationHandle)>>>;

    fn relay_with_recorder() -> (Arc<FrameRelay>, Seen, Arc<CaptureDiagnostics>) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = move |_data: &[u8], length: usize, handle: CorrelationHandle| {
            seen_clone.lock().unwrap().push((length, handle));
        };
        let diagnostics = Arc::new(CaptureDiagnostics::new());
        let relay = Arc::new(FrameRelay::new(
            Arc::new(sink),
            CorrelationHandle(42),
            Arc::clone(&diagnostics),
        ));
        (relay, seen, diagnostics)
    }

    #[test]
    fn test_forward_and_recycle() {
        let (relay, seen, diagnostics) = relay_with_recorder();
        let mut buffers = relay.lend_buffers(3, 12);
        relay.arm(12, true);

        let delivery = relay.on_frame_delivered(buffers.remove(0), 12);
        assert_eq!(delivery.outcome, FrameOutcome::Forwarded);
        let recycled = delivery.recycled.expect("buffer should be recycled");
        assert_eq!(
            relay.with_pool(|pool| pool.owner(recycled.slot())),
            Some(BufferOwner::Device)
        );
        assert_eq!(*seen.lock().unwrap(), vec![(12, CorrelationHandle(42))]);
        assert_eq!(diagnostics.snapshot().recycled, 1);
    }

    #[test]
    fn test_drop_when_not_running() {
        let (relay, seen, diagnostics) = relay_with_recorder();
        let mut buffers = relay.lend_buffers(1, 12);

        let delivery = relay.on_frame_delivered(buffers.remove(0), 12);
        assert_eq!(delivery.outcome, FrameOutcome::DroppedNotRunning);
        assert!(delivery.recycled.is_none());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(relay.with_pool(|p| p.count_owned_by(BufferOwner::Pool)), 1);
        assert_eq!(diagnostics.snapshot().dropped_not_running, 1);
    }

    #[test]
    fn test_mismatch_not_forwarded_but_recycled() {
        let (relay, seen, diagnostics) = relay_with_recorder();
        let mut buffers = relay.lend_buffers(1, 12);
        relay.arm(12, true);

        let delivery = relay.on_frame_delivered(buffers.remove(0), 8);
        assert_eq!(
            delivery.outcome,
            FrameOutcome::SizeMismatch {
                expected: 12,
                actual: 8
            }
        );
        assert!(delivery.recycled.is_some());
        assert!(seen.lock().unwrap().is_empty());
        assert!(relay.is_running());
        assert_eq!(diagnostics.snapshot().size_mismatches, 1);
        assert_eq!(
            delivery.outcome.into_result(),
            Err(CaptureError::FrameSizeMismatch {
                expected: 12,
                actual: 8
            })
        );
    }

    #[test]
    fn test_reported_length_beyond_buffer() {
        let (relay, seen, _) = relay_with_recorder();
        let mut buffers = relay.lend_buffers(1, 12);
        relay.arm(16, true);

        let delivery = relay.on_frame_delivered(buffers.remove(0), 16);
        assert!(matches!(delivery.outcome, FrameOutcome::SizeMismatch { .. }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stale_buffer_discarded() {
        let (relay, seen, diagnostics) = relay_with_recorder();
        let mut old = relay.lend_buffers(1, 12);
        let _current = relay.lend_buffers(1, 12);
        relay.arm(12, true);

        let delivery = relay.on_frame_delivered(old.remove(0), 12);
        assert_eq!(delivery.outcome, FrameOutcome::StaleBuffer);
        assert!(delivery.recycled.is_none());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(diagnostics.snapshot().stale_buffers, 1);
    }

    #[test]
    fn test_borrowed_frames_validate_size() {
        let (relay, seen, _) = relay_with_recorder();
        relay.arm(4, false);

        assert_eq!(relay.on_borrowed_frame(&[0; 4], 4), FrameOutcome::Forwarded);
        assert!(matches!(
            relay.on_borrowed_frame(&[0; 6], 6),
            FrameOutcome::SizeMismatch { .. }
        ));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_filtered_frames_skip_validation() {
        let (relay, seen, diagnostics) = relay_with_recorder();
        assert_eq!(
            relay.on_filtered_frame(&[0; 16], 2, 2),
            FrameOutcome::DroppedNotRunning
        );

        relay.arm(100, false);
        assert_eq!(relay.on_filtered_frame(&[0; 16], 2, 2), FrameOutcome::Forwarded);
        assert_eq!(*seen.lock().unwrap(), vec![(16, CorrelationHandle(42))]);
        assert_eq!(diagnostics.snapshot().filtered_forwarded, 1);
    }

    #[test]
    fn test_disarm_reports_previous_state() {
        let (relay, _, _) = relay_with_recorder();
        assert!(!relay.disarm());
        relay.arm(1, true);
        assert!(relay.disarm());
        assert!(!relay.is_running());
    }

    #[test]
    fn test_idle_set_lent_again() {
        let (relay, _seen, _diagnostics) = relay_with_recorder();
        let first = relay.lend_buffers(2, 12);
        let slots: Vec<_> = first.iter().map(FrameBuffer::slot).collect();
        assert_eq!(relay.reclaim_buffers(first), 2);

        let again = relay.lend_buffers(2, 12);
        assert_eq!(again.iter().map(FrameBuffer::slot).collect::<Vec<_>>(), slots);
        assert_eq!(relay.reclaim_buffers(again), 2);

        let resized = relay.lend_buffers(2, 16);
        assert!(resized.iter().all(|buffer| buffer.len() == 16));
        assert_eq!(relay.with_pool(|pool| pool.owner(slots[0])), None);
    }

    #[test]
    fn test_partial_idle_set_reallocated() {
        let (relay, _seen, _diagnostics) = relay_with_recorder();
        let mut first = relay.lend_buffers(2, 12);
        let kept = first.pop().unwrap();
        relay.reclaim_buffers(first);

        let fresh = relay.lend_buffers(2, 12);
        assert_eq!(fresh.len(), 2);
        assert_eq!(relay.with_pool(|pool| pool.owner(kept.slot())), None);
    }
}
