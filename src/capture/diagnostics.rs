// SPDX-License-Identifier: GPL-3.0-only

//! Per-session counters for the frame path and transitions.
//!
//! Frame-path failures never reach a caller synchronously, so these counters
//! (plus rate-limited logs) are the only place they are observable. High
//! frequency counters are atomics to stay off the frame lock.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CaptureDiagnostics {
    forwarded: AtomicU64,
    dropped_not_running: AtomicU64,
    size_mismatches: AtomicU64,
    filtered_forwarded: AtomicU64,
    recycled: AtomicU64,
    stale_buffers: AtomicU64,
    starts: AtomicU64,
    stops: AtomicU64,
    start_failures: AtomicU64,
}

/// Point-in-time copy of [`CaptureDiagnostics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    /// Raw frames handed to the sink
    pub forwarded: u64,
    /// Frames that arrived while not running
    pub dropped_not_running: u64,
    /// Frames whose length differed from the negotiated size
    pub size_mismatches: u64,
    /// Pre-rendered frames handed to the sink
    pub filtered_forwarded: u64,
    /// Buffers given back to the device after forwarding
    pub recycled: u64,
    /// Buffers from an older allocation that were dropped
    pub stale_buffers: u64,
    /// Successful transitions into Running
    pub starts: u64,
    /// Transitions out of Running
    pub stops: u64,
    /// Aborted transitions into Running
    pub start_failures: u64,
}

impl CaptureDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the new count, so callers can rate-limit logs.
    pub(crate) fn record_forwarded(&self) -> u64 {
        self.forwarded.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_dropped_not_running(&self) -> u64 {
        self.dropped_not_running.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_size_mismatch(&self) -> u64 {
        self.size_mismatches.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_filtered_forwarded(&self) -> u64 {
        self.filtered_forwarded.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_recycled(&self) {
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_buffer(&self) {
        self.stale_buffers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_start(&self) {
        self.starts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stop(&self) {
        self.stops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_start_failure(&self) {
        self.start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped_not_running: self.dropped_not_running.load(Ordering::Relaxed),
            size_mismatches: self.size_mismatches.load(Ordering::Relaxed),
            filtered_forwarded: self.filtered_forwarded.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            stale_buffers: self.stale_buffers.load(Ordering::Relaxed),
            starts: self.starts.load(Ordering::Relaxed),
            stops: self.stops.load(Ordering::Relaxed),
            start_failures: self.start_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.forwarded,
            &self.dropped_not_running,
            &self.size_mismatches,
            &self.filtered_forwarded,
            &self.recycled,
            &self.stale_buffers,
            &self.starts,
            &self.stops,
            &self.start_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Display for DiagnosticsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "forwarded={} filtered={} recycled={} dropped={} mismatched={} stale={} starts={} stops={} failed_starts={}",
            self.forwarded,
            self.filtered_forwarded,
            self.recycled,
            self.dropped_not_running,
            self.size_mismatches,
            self.stale_buffers,
            self.starts,
            self.stops,
            self.start_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let diagnostics = CaptureDiagnostics::new();
        assert_eq!(diagnostics.record_size_mismatch(), 1);
        assert_eq!(diagnostics.record_size_mismatch(), 2);
        diagnostics.record_start();

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.size_mismatches, 2);
        assert_eq!(snapshot.starts, 1);

        diagnostics.reset();
        assert_eq!(diagnostics.snapshot(), DiagnosticsSnapshot::default());
    }
}
