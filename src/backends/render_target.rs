// SPDX-License-Identifier: GPL-3.0-only

//! Render-target readiness
//!
//! The owner of the preview surface (or the filter renderer's texture)
//! announces when it becomes usable and when it goes away. Sessions learn
//! about it two ways: they query [`RenderTargetProvider`] when a start is
//! requested, and [`SharedRenderTarget`] pushes ready/lost events to every
//! attached session.

use crate::capture::{CaptureSession, RenderTarget};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};

/// Synchronous readiness query
pub trait RenderTargetProvider: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Current target, if ready
    fn target(&self) -> Option<RenderTarget>;
}

#[derive(Default)]
struct TargetState {
    target: Option<RenderTarget>,
    listeners: Vec<Weak<CaptureSession>>,
}

/// Render target whose readiness is driven by its owner
///
/// # Example
///
/// ```ignore
/// let target = Arc::new(SharedRenderTarget::new());
/// let session = Arc::new(CaptureSession::builder(sink)
///     .device(device)
///     .render_target_provider(target.clone())
///     .build());
/// target.attach(&session);
///
/// target.mark_ready(RenderTarget::Surface(1)); // pending start proceeds
/// ```
#[derive(Default)]
pub struct SharedRenderTarget {
    state: Mutex<TargetState>,
    /// Serialises ready/lost so sessions see events in state order
    events: Mutex<()>,
}

impl SharedRenderTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver future ready/lost events to `session`
    pub fn attach(&self, session: &Arc<CaptureSession>) {
        let mut state = self.lock();
        state.listeners.retain(|l| l.strong_count() > 0);
        state.listeners.push(Arc::downgrade(session));
    }

    fn lock_events(&self) -> MutexGuard<'_, ()> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The target is usable. Notifies attached sessions, which may start.
    pub fn mark_ready(&self, target: RenderTarget) {
        let _events = self.lock_events();
        let listeners = {
            let mut state = self.lock();
            state.target = Some(target);
            Self::live_listeners(&mut state)
        };

        debug!(target = %target, listeners = listeners.len(), "Render target ready");
        // Provider lock is released here: sessions query it under their own lock
        for session in listeners {
            if let Err(e) = session.notify_surface_ready(target) {
                warn!(target = %target, error = %e, "Session failed to start on ready target");
            }
        }
    }

    /// The target went away
    pub fn mark_lost(&self) {
        let _events = self.lock_events();
        let listeners = {
            let mut state = self.lock();
            state.target = None;
            Self::live_listeners(&mut state)
        };

        debug!(listeners = listeners.len(), "Render target lost");
        for session in listeners {
            session.notify_surface_lost();
        }
    }

    fn live_listeners(state: &mut TargetState) -> Vec<Arc<CaptureSession>> {
        state.listeners.retain(|l| l.strong_count() > 0);
        state.listeners.iter().filter_map(Weak::upgrade).collect()
    }
}

impl RenderTargetProvider for SharedRenderTarget {
    fn is_ready(&self) -> bool {
        self.lock().target.is_some()
    }

    fn target(&self) -> Option<RenderTarget> {
        self.lock().target
    }
}
