// SPDX-License-Identifier: GPL-3.0-only

//! Shared fixtures: a scripted capture device and a recording sink

#![allow(dead_code)]

use capture_coordinator::backends::camera::{
    CaptureDevice, DeviceCapabilities, DeviceError, DeviceInfo, DeviceMode, DeviceParameters,
    DeviceResult, FocusMode,
};
use capture_coordinator::capture::{
    CaptureConfig, CaptureSession, CorrelationHandle, DeliveryMode, FrameBuffer, FrameCallback,
    FrameOutcome, FrameSink, PixelFormat, RenderTarget, Rotation,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

pub const HANDLE: CorrelationHandle = CorrelationHandle(0xC0FFEE);

/// VGA NV21 frame size
pub const VGA_FRAME: usize = 640 * 480 * 12 / 8;

/// Every call the session made on the device, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    QueryCapabilities,
    SetParameters(DeviceParameters),
    SetRenderTarget(RenderTarget),
    SetDisplayOrientation(Rotation),
    Register { buffers: usize },
    Unregister,
    StartStreaming,
    StopStreaming,
    Release,
}

#[derive(Default)]
struct MockState {
    calls: Vec<DeviceCall>,
    callback: Option<FrameCallback>,
    buffers: VecDeque<FrameBuffer>,
    streaming: bool,
    modes: Vec<DeviceMode>,
    fail_parameters: bool,
    fail_start: bool,
    fail_stop: bool,
}

/// Device with no thread of its own; tests push frames through [`MockHandle`]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    accepts_buffers: bool,
}

/// Test-side view of a [`MockDevice`] owned by a session
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    accepts_buffers: bool,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockDevice {
    pub fn new() -> (Self, MockHandle) {
        Self::with_buffers(true)
    }

    /// Device that manages its own frame memory
    pub fn self_managed() -> (Self, MockHandle) {
        Self::with_buffers(false)
    }

    fn with_buffers(accepts_buffers: bool) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            modes: vec![
                DeviceMode::new(320, 240, vec![15, 30], PixelFormat::NV21),
                DeviceMode::new(640, 480, vec![15, 30], PixelFormat::NV21),
                DeviceMode::new(1280, 720, vec![30], PixelFormat::NV21),
            ],
            ..MockState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
                accepts_buffers,
            },
            MockHandle {
                state,
                accepts_buffers,
            },
        )
    }
}

impl CaptureDevice for MockDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "mock".to_string(),
            path: "mock:0".to_string(),
            ..DeviceInfo::default()
        }
    }

    fn accepts_buffers(&self) -> bool {
        self.accepts_buffers
    }

    fn query_capabilities(&mut self) -> DeviceResult<DeviceCapabilities> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::QueryCapabilities);
        Ok(DeviceCapabilities {
            modes: state.modes.clone(),
            focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousVideo],
        })
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> DeviceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::SetParameters(*params));
        if state.fail_parameters {
            return Err(DeviceError::Negotiation("scripted failure".to_string()));
        }
        Ok(())
    }

    fn set_render_target(&mut self, target: RenderTarget) -> DeviceResult<()> {
        lock(&self.state).calls.push(DeviceCall::SetRenderTarget(target));
        Ok(())
    }

    fn set_display_orientation(&mut self, rotation: Rotation) -> DeviceResult<()> {
        lock(&self.state)
            .calls
            .push(DeviceCall::SetDisplayOrientation(rotation));
        Ok(())
    }

    fn register_frame_callback(
        &mut self,
        callback: FrameCallback,
        buffers: Vec<FrameBuffer>,
    ) -> DeviceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Register {
            buffers: buffers.len(),
        });
        state.callback = Some(callback);
        state.buffers = buffers.into();
        Ok(())
    }

    fn unregister_frame_callback(&mut self) -> DeviceResult<Vec<FrameBuffer>> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Unregister);
        state.callback = None;
        Ok(state.buffers.drain(..).collect())
    }

    fn start_streaming(&mut self) -> DeviceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::StartStreaming);
        if state.streaming {
            return Err(DeviceError::Busy("double start".to_string()));
        }
        if state.fail_start {
            return Err(DeviceError::Busy("scripted failure".to_string()));
        }
        state.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) -> DeviceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::StopStreaming);
        state.streaming = false;
        if state.fail_stop {
            return Err(DeviceError::Io("scripted failure".to_string()));
        }
        Ok(())
    }

    fn release(&mut self) {
        lock(&self.state).calls.push(DeviceCall::Release);
    }
}

impl MockHandle {
    pub fn calls(&self) -> Vec<DeviceCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn count(&self, call: &DeviceCall) -> usize {
        lock(&self.state).calls.iter().filter(|c| *c == call).count()
    }

    pub fn last_parameters(&self) -> Option<DeviceParameters> {
        lock(&self.state).calls.iter().rev().find_map(|c| match c {
            DeviceCall::SetParameters(params) => Some(*params),
            _ => None,
        })
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    /// Buffers currently queued as receive targets
    pub fn queued_buffers(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    pub fn callback(&self) -> Option<FrameCallback> {
        lock(&self.state).callback.clone()
    }

    pub fn set_fail_parameters(&self, fail: bool) {
        lock(&self.state).fail_parameters = fail;
    }

    pub fn set_fail_start(&self, fail: bool) {
        lock(&self.state).fail_start = fail;
    }

    pub fn set_fail_stop(&self, fail: bool) {
        lock(&self.state).fail_stop = fail;
    }

    pub fn set_modes(&self, modes: Vec<DeviceMode>) {
        lock(&self.state).modes = modes;
    }

    /// Deliver one frame of `len` bytes the way the driver would.
    ///
    /// Returns `None` when no callback is registered or no receive buffer is queued.
    pub fn push_frame(&self, len: usize) -> Option<FrameOutcome> {
        if !self.accepts_buffers {
            let callback = self.callback()?;
            return Some(callback.deliver_borrowed(&vec![0xAB; len], len));
        }

        let (callback, mut buffer) = {
            let mut state = lock(&self.state);
            let callback = state.callback.clone()?;
            let buffer = state.buffers.pop_front()?;
            (callback, buffer)
        };

        let fill = len.min(buffer.len());
        buffer.as_mut_slice()[..fill].fill(0xAB);
        let delivery = callback.deliver(buffer, len);
        if let Some(buffer) = delivery.recycled {
            lock(&self.state).buffers.push_back(buffer);
        }
        Some(delivery.outcome)
    }
}

/// Sink that records every forwarded frame
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<(usize, CorrelationHandle)>>,
    count: AtomicU64,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sink that takes `delay` to consume each frame
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn frames(&self) -> Vec<(usize, CorrelationHandle)> {
        self.frames.lock().unwrap().clone()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl FrameSink for RecordingSink {
    fn deliver_frame(&self, _data: &[u8], length: usize, handle: CorrelationHandle) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.frames.lock().unwrap().push((length, handle));
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn vga() -> CaptureConfig {
    CaptureConfig::new(640, 480, 30, PixelFormat::NV21).unwrap()
}

/// Bound session in the given delivery mode with a fresh mock device
pub fn session_with(
    mode: DeliveryMode,
    sink: Arc<RecordingSink>,
) -> (CaptureSession, MockHandle) {
    let (device, handle) = MockDevice::new();
    let session = CaptureSession::builder(sink)
        .device(Box::new(device))
        .correlation_handle(HANDLE)
        .delivery_mode(mode)
        .build();
    (session, handle)
}

pub fn preview_session() -> (CaptureSession, MockHandle, Arc<RecordingSink>) {
    let sink = RecordingSink::new();
    let (session, handle) = session_with(DeliveryMode::Preview, Arc::clone(&sink));
    (session, handle, sink)
}
