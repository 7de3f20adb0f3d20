// SPDX-License-Identifier: GPL-3.0-only

//! Capture lifecycle state machine
//!
//! ```text
//!            start (target not ready)
//!   Idle ─────────────────────────────▶ Pending
//!    │  ▲                                  │ surface ready
//!    │  │ stop                             ▼
//!    │  └─────────────────────────────── Running
//!    │        start (target ready)          ▲
//!    └──────────────────────────────────────┘
//!
//!   any state ── teardown ──▶ Stopped
//! ```
//!
//! # Locking
//!
//! Two locks, always taken in this order:
//!
//! - the **session lock** (`inner`) serializes start/stop/reconfigure/
//!   surface events and is held across device negotiation;
//! - the **frame lock** (inside [`FrameRelay`]) guards the running flag,
//!   the expected frame size and buffer recycling. Transitions take it only
//!   for the instant they flip the flag, never across a device call.
//!
//! Every public operation takes the session lock exactly once and then works
//! on `&mut SessionInner` through [`CaptureSession::apply`]; nothing below
//! that point re-acquires it.

use super::config_holder::ConfigHolder;
use super::diagnostics::{CaptureDiagnostics, DiagnosticsSnapshot};
use super::readiness::ReadinessTracker;
use super::relay::{FrameCallback, FrameRelay};
use super::sink::FrameSink;
use super::types::*;
use crate::backends::RenderTargetProvider;
use crate::backends::camera::{CaptureDevice, DeviceError, negotiate};
use crate::constants::NUM_CAPTURE_BUFFERS;
use crate::errors::{CaptureError, CaptureResult, Status};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Transition requests handled by [`CaptureSession::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Enter Running if the readiness predicate allows it
    TryRun,
    /// Leave Running (or Pending) for Idle
    Halt,
    /// Halt and run again with the current config and orientation
    Restart,
}

struct SessionInner {
    state: CaptureState,
    device: Option<Box<dyn CaptureDevice>>,
    readiness: ReadinessTracker,
    config: ConfigHolder,
    provider: Option<Arc<dyn RenderTargetProvider>>,
    pixel_format: PixelFormat,
    buffer_count: usize,
}

/// Builder for [`CaptureSession`]
pub struct SessionBuilder {
    sink: Arc<dyn FrameSink>,
    device: Option<Box<dyn CaptureDevice>>,
    provider: Option<Arc<dyn RenderTargetProvider>>,
    handle: CorrelationHandle,
    delivery_mode: DeliveryMode,
    mirror_mode: MirrorMode,
    pixel_format: PixelFormat,
    buffer_count: usize,
}

impl SessionBuilder {
    pub fn device(mut self, device: Box<dyn CaptureDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn render_target_provider(mut self, provider: Arc<dyn RenderTargetProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Opaque value passed to the sink with every frame
    pub fn correlation_handle(mut self, handle: CorrelationHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn mirror_mode(mut self, mode: MirrorMode) -> Self {
        self.mirror_mode = mode;
        self
    }

    /// Pixel format used by [`CaptureSession::start`]
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    pub fn buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count.max(1);
        self
    }

    pub fn build(self) -> CaptureSession {
        let diagnostics = Arc::new(CaptureDiagnostics::new());
        let relay = Arc::new(FrameRelay::new(
            self.sink,
            self.handle,
            Arc::clone(&diagnostics),
        ));

        CaptureSession {
            inner: Mutex::new(SessionInner {
                state: CaptureState::Idle,
                device: self.device,
                readiness: ReadinessTracker::new(),
                config: ConfigHolder::new(self.delivery_mode, self.mirror_mode),
                provider: self.provider,
                pixel_format: self.pixel_format,
                buffer_count: self.buffer_count,
            }),
            relay,
            diagnostics,
        }
    }
}

/// One capture device binding and its streaming lifecycle
///
/// Thread-safe; share it behind an `Arc` between the threads issuing
/// requests and the render-target event source.
pub struct CaptureSession {
    inner: Mutex<SessionInner>,
    relay: Arc<FrameRelay>,
    diagnostics: Arc<CaptureDiagnostics>,
}

impl CaptureSession {
    /// Start building a session that forwards frames to `sink`
    pub fn builder(sink: Arc<dyn FrameSink>) -> SessionBuilder {
        SessionBuilder {
            sink,
            device: None,
            provider: None,
            handle: CorrelationHandle::default(),
            delivery_mode: DeliveryMode::default(),
            mirror_mode: MirrorMode::default(),
            pixel_format: PixelFormat::default(),
            buffer_count: NUM_CAPTURE_BUFFERS,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ===== Caller-facing API =====

    /// Request capture at `width x height @ frame_rate` in the session's pixel format
    pub fn start(&self, width: u32, height: u32, frame_rate: u32) -> Status {
        let pixel_format = self.lock().pixel_format;
        let result = CaptureConfig::new(width, height, frame_rate, pixel_format)
            .and_then(|config| self.request_start(config));

        match result {
            Ok(StartOutcome::Started | StartOutcome::Pending) => Status::Success,
            Ok(StartOutcome::AlreadyRunning) => Status::AlreadyRunning,
            Err(e) => Status::from(&e),
        }
    }

    /// Stop capture
    pub fn stop(&self) -> Status {
        match self.request_stop() {
            Ok(()) => Status::Success,
            Err(e) => Status::from(&e),
        }
    }

    /// Change the display rotation in degrees, restarting the stream if running
    pub fn set_rotation(&self, degrees: i32) -> Status {
        match self.rotate(Rotation::from_degrees_int(degrees)) {
            Ok(()) => Status::Success,
            Err(e) => Status::from(&e),
        }
    }

    // ===== State machine operations =====

    /// Record `config` and try to start streaming.
    ///
    /// Succeeds with [`StartOutcome::Pending`] when the render target is not
    /// ready yet; the start then happens on [`notify_surface_ready`](Self::notify_surface_ready).
    pub fn request_start(&self, config: CaptureConfig) -> CaptureResult<StartOutcome> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        match inner.state {
            CaptureState::Stopped => return Err(CaptureError::Closed),
            _ if inner.device.is_none() => {
                warn!("Start requested with no device bound");
                return Err(CaptureError::DeviceUnavailable);
            }
            _ => {}
        }

        info!(config = %config, state = %inner.state, "Capture start requested");

        inner.config.record(config);
        inner.readiness.set_capture_requested(true);
        Self::poll_provider(inner);

        if inner.state == CaptureState::Running {
            debug!("Already running, new config kept for the next restart");
            return Ok(StartOutcome::AlreadyRunning);
        }

        inner.state = CaptureState::Pending;
        self.apply(inner, Transition::TryRun)?;

        Ok(match inner.state {
            CaptureState::Running => StartOutcome::Started,
            _ => StartOutcome::Pending,
        })
    }

    /// Stop streaming and clear the capture request. No-op when idle.
    pub fn request_stop(&self) -> CaptureResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        match inner.state {
            CaptureState::Idle | CaptureState::Stopped => {
                debug!(state = %inner.state, "Stop requested, nothing to do");
                Ok(())
            }
            CaptureState::Pending | CaptureState::Running => {
                info!(state = %inner.state, "Capture stop requested");
                self.apply(inner, Transition::Halt)
            }
        }
    }

    /// The render target became ready. May start a pending capture.
    pub fn notify_surface_ready(&self, target: RenderTarget) -> CaptureResult<CaptureState> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.state == CaptureState::Stopped {
            return Ok(CaptureState::Stopped);
        }

        info!(target = %target, state = %inner.state, "Render target ready");
        inner.readiness.set_surface_ready(target);
        self.apply(inner, Transition::TryRun)?;
        Ok(inner.state)
    }

    /// The render target went away.
    ///
    /// A running device is deliberately left streaming; only an explicit stop
    /// or reconfigure halts it. Future starts wait for readiness again.
    pub fn notify_surface_lost(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;

        inner.readiness.set_surface_lost();
        if inner.state == CaptureState::Running {
            warn!("Render target lost while streaming; device keeps running");
        } else {
            info!(state = %inner.state, "Render target lost");
        }
    }

    /// Replace the capture config. A running stream is stopped and restarted
    /// with the new parameters without releasing the session lock.
    pub fn reconfigure(&self, config: CaptureConfig) -> CaptureResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.state == CaptureState::Stopped {
            return Err(CaptureError::Closed);
        }

        info!(config = %config, state = %inner.state, "Reconfiguring capture");
        inner.config.record(config);
        self.apply(inner, Transition::Restart)
    }

    /// Change the display rotation; restarts the stream if running
    pub fn rotate(&self, rotation: Rotation) -> CaptureResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.state == CaptureState::Stopped {
            return Err(CaptureError::Closed);
        }

        info!(rotation = %rotation, state = %inner.state, "Setting rotation");
        inner.config.set_rotation(rotation);
        self.apply(inner, Transition::Restart)
    }

    /// Switch between owned-buffer preview and filter delivery.
    /// Takes effect at the next transition into Running.
    pub fn set_delivery_mode(&self, mode: DeliveryMode) {
        self.lock().config.set_delivery_mode(mode);
    }

    pub fn set_mirror_mode(&self, mode: MirrorMode) {
        self.lock().config.set_mirror_mode(mode);
    }

    pub fn set_render_target_provider(&self, provider: Arc<dyn RenderTargetProvider>) {
        self.lock().provider = Some(provider);
    }

    /// Bind a device to an unbound (or idle) session
    pub fn bind_device(&self, device: Box<dyn CaptureDevice>) -> CaptureResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        match inner.state {
            CaptureState::Stopped => return Err(CaptureError::Closed),
            CaptureState::Running => {
                return Err(CaptureError::CaptureStartFailed(
                    "cannot rebind a device while streaming".to_string(),
                ));
            }
            _ => {}
        }

        let info = device.info();
        info!(device = %info.name, path = %info.path, "Binding capture device");

        if let Some(mut previous) = inner.device.replace(device) {
            previous.release();
        }
        Self::apply_orientation(inner);
        Ok(())
    }

    /// Stop capture, release the device and close the session for good
    pub fn teardown(&self) -> CaptureResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.state == CaptureState::Stopped {
            return Ok(());
        }

        info!(state = %inner.state, "Tearing down capture session");

        let result = match inner.state {
            CaptureState::Running | CaptureState::Pending => self.apply(inner, Transition::Halt),
            _ => Ok(()),
        };

        if let Some(mut device) = inner.device.take() {
            device.release();
        }
        self.relay.release_buffers();
        self.relay.set_handle(CorrelationHandle::default());
        inner.readiness.reset();
        inner.state = CaptureState::Stopped;

        result
    }

    // ===== Queries =====

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.relay.is_running()
    }

    /// Last requested capture config
    pub fn config(&self) -> Option<CaptureConfig> {
        self.lock().config.capture()
    }

    pub fn rotation(&self) -> Rotation {
        self.lock().config.rotation()
    }

    pub fn has_device(&self) -> bool {
        self.lock().device.is_some()
    }

    /// Negotiated frame size while running
    pub fn expected_frame_size(&self) -> Option<usize> {
        let gate = self.relay.gate();
        gate.running.then_some(gate.expected_frame_size)
    }

    pub fn correlation_handle(&self) -> CorrelationHandle {
        self.relay.handle()
    }

    /// Frame entry points, e.g. for a filter renderer feeding processed frames
    pub fn frame_callback(&self) -> FrameCallback {
        FrameCallback::new(Arc::clone(&self.relay))
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ===== Transitions =====

    /// Single entry point for every state change. Runs with the session lock held.
    fn apply(&self, inner: &mut SessionInner, transition: Transition) -> CaptureResult<()> {
        debug!(?transition, state = %inner.state, "Applying transition");

        match transition {
            Transition::TryRun => {
                let running = inner.state == CaptureState::Running;
                if !inner.readiness.may_run(running) {
                    debug!(
                        requested = inner.readiness.capture_requested(),
                        surface_ready = inner.readiness.surface_ready(),
                        running,
                        "Not starting capture yet"
                    );
                    return Ok(());
                }
                self.enter_running(inner)
            }
            Transition::Halt => {
                let result = self.leave_running(inner);
                inner.readiness.set_capture_requested(false);
                inner.state = CaptureState::Idle;
                result
            }
            Transition::Restart => {
                if inner.state != CaptureState::Running {
                    // Nothing streaming: the new orientation/config apply at the next start
                    Self::apply_orientation(inner);
                    return Ok(());
                }

                let stop_result = self.leave_running(inner);
                if let Err(e) = &stop_result {
                    warn!(error = %e, "Stop during restart failed, starting anyway");
                }
                inner.state = CaptureState::Pending;
                Self::apply_orientation(inner);

                if !inner.readiness.may_run(false) {
                    info!("Restart deferred until the render target is ready");
                    return stop_result;
                }
                self.enter_running(inner).and(stop_result)
            }
        }
    }

    /// The only path into Running. On failure the state stays Pending.
    fn enter_running(&self, inner: &mut SessionInner) -> CaptureResult<()> {
        let Some(config) = inner.config.capture() else {
            return Ok(());
        };
        let Some(target) = inner.readiness.target() else {
            return Ok(());
        };
        let Some(device) = inner.device.as_mut() else {
            return Err(CaptureError::DeviceUnavailable);
        };

        let fail = |stage: &str, e: DeviceError| {
            self.diagnostics.record_start_failure();
            warn!(stage, error = %e, "Failed to start capture");
            CaptureError::CaptureStartFailed(format!("{}: {}", stage, e))
        };

        // Negotiate without the frame lock; this may take a while
        let info = device.info();
        let capabilities = device
            .query_capabilities()
            .map_err(|e| fail("query capabilities", e))?;
        let params = negotiate(&config, &capabilities, &info);
        let frame_size = frame_size(params.width, params.height, params.pixel_format)
            .ok_or_else(|| {
                fail(
                    "negotiate",
                    DeviceError::Negotiation(format!("{} frames do not fit in memory", params)),
                )
            })?;
        device
            .set_parameters(&params)
            .map_err(|e| fail("set parameters", e))?;
        device
            .set_render_target(target)
            .map_err(|e| fail("set render target", e))?;

        let owns_buffers = inner.config.delivery_mode().owns_buffers() && device.accepts_buffers();
        let buffers = if owns_buffers {
            self.relay.lend_buffers(inner.buffer_count, frame_size)
        } else {
            Vec::new()
        };

        if let Err(e) = device.register_frame_callback(self.frame_callback(), buffers) {
            self.relay.release_buffers();
            return Err(fail("register frame callback", e));
        }

        // Open the gate before streaming so the first frame is not lost
        self.relay.arm(frame_size, owns_buffers);

        if let Err(e) = device.start_streaming() {
            self.relay.disarm();
            match device.unregister_frame_callback() {
                Ok(buffers) => {
                    self.relay.reclaim_buffers(buffers);
                }
                Err(e) => debug!(error = %e, "Unregister after failed start also failed"),
            }
            self.relay.release_buffers();
            return Err(fail("start streaming", e));
        }

        inner.state = CaptureState::Running;
        self.diagnostics.record_start();
        info!(
            params = %params,
            frame_size,
            owns_buffers,
            target = %target,
            "Capture running"
        );
        Ok(())
    }

    /// Halt a running device. The state is left to the caller.
    ///
    /// The frame gate closes first, so no frame is forwarded once this
    /// returns even if the device refuses to stop.
    fn leave_running(&self, inner: &mut SessionInner) -> CaptureResult<()> {
        if inner.state != CaptureState::Running {
            return Ok(());
        }

        self.relay.disarm();
        self.diagnostics.record_stop();

        let Some(device) = inner.device.as_mut() else {
            return Ok(());
        };

        let mut failure: Option<DeviceError> = None;
        if let Err(e) = device.stop_streaming() {
            warn!(error = %e, "Device refused to stop streaming");
            failure = Some(e);
        }
        match device.unregister_frame_callback() {
            Ok(buffers) => {
                let reclaimed = self.relay.reclaim_buffers(buffers);
                debug!(reclaimed, "Reclaimed preview buffers");
            }
            Err(e) => {
                warn!(error = %e, "Failed to unregister frame callback");
                failure.get_or_insert(e);
            }
        }

        info!("Capture stopped");
        match failure {
            Some(e) => Err(CaptureError::StopFailed(e.to_string())),
            None => Ok(()),
        }
    }

    /// Pick up readiness that arrived before the start request
    fn poll_provider(inner: &mut SessionInner) {
        let Some(provider) = inner.provider.as_ref() else {
            return;
        };
        if provider.is_ready()
            && let Some(target) = provider.target()
        {
            debug!(target = %target, "Render target already ready");
            inner.readiness.set_surface_ready(target);
        }
    }

    fn apply_orientation(inner: &mut SessionInner) {
        let orientation = inner.config.display_orientation();
        if let Some(device) = inner.device.as_mut()
            && let Err(e) = device.set_display_orientation(orientation)
        {
            warn!(orientation = %orientation, error = %e, "Failed to set display orientation");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "Capture session teardown on drop failed");
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CaptureSession")
            .field("state", &inner.state)
            .field("config", &inner.config.capture())
            .field("surface_ready", &inner.readiness.surface_ready())
            .field("has_device", &inner.device.is_some())
            .finish()
    }
}
