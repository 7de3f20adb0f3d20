// SPDX-License-Identifier: GPL-3.0-only

//! Readiness tracking
//!
//! Start requests and render-target readiness arrive in either order. The
//! tracker records both conditions so the state machine can decide from a
//! single predicate whether the device may start.

use super::types::RenderTarget;

#[derive(Debug, Clone, Default)]
pub struct ReadinessTracker {
    capture_requested: bool,
    surface_ready: bool,
    target: Option<RenderTarget>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_capture_requested(&mut self, requested: bool) {
        self.capture_requested = requested;
    }

    /// Record a ready render target
    pub fn set_surface_ready(&mut self, target: RenderTarget) {
        self.surface_ready = true;
        self.target = Some(target);
    }

    /// The render target went away. Can happen at any time, including while streaming.
    pub fn set_surface_lost(&mut self) {
        self.surface_ready = false;
        self.target = None;
    }

    pub fn capture_requested(&self) -> bool {
        self.capture_requested
    }

    pub fn surface_ready(&self) -> bool {
        self.surface_ready
    }

    pub fn target(&self) -> Option<RenderTarget> {
        self.target
    }

    /// Whether a transition into Running is allowed right now
    pub fn may_run(&self, already_running: bool) -> bool {
        self.capture_requested && self.surface_ready && !already_running
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blocks_start() {
        let tracker = ReadinessTracker::new();
        assert!(!tracker.may_run(false));
    }

    #[test]
    fn test_request_then_ready() {
        let mut tracker = ReadinessTracker::new();
        tracker.set_capture_requested(true);
        assert!(!tracker.may_run(false));
        tracker.set_surface_ready(RenderTarget::Surface(1));
        assert!(tracker.may_run(false));
        assert!(!tracker.may_run(true));
    }

    #[test]
    fn test_ready_then_request() {
        let mut tracker = ReadinessTracker::new();
        tracker.set_surface_ready(RenderTarget::Texture(7));
        assert!(!tracker.may_run(false));
        tracker.set_capture_requested(true);
        assert!(tracker.may_run(false));
        assert_eq!(tracker.target(), Some(RenderTarget::Texture(7)));
    }

    #[test]
    fn test_lost_blocks_start() {
        let mut tracker = ReadinessTracker::new();
        tracker.set_capture_requested(true);
        tracker.set_surface_ready(RenderTarget::Surface(1));
        tracker.set_surface_lost();
        assert!(!tracker.may_run(false));
        assert!(tracker.target().is_none());
        assert!(tracker.capture_requested());
    }
}
