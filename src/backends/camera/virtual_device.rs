// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture device
//!
//! Produces solid-colour frames at the negotiated rate on its own thread.
//! Used by the `simulate` command, by tests, and anywhere real hardware is
//! not available. A [`VirtualDeviceControl`] handle observes the device and
//! injects failures while the session owns it.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use super::CaptureDevice;
use crate::capture::{FrameBuffer, FrameCallback, PixelFormat, RenderTarget, Rotation, frame_size};
use crate::constants::MAX_FRAME_INTERVAL;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Device calls seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub parameter_sets: u32,
    pub orientation_sets: u32,
    pub starts: u32,
    pub stops: u32,
}

#[derive(Debug, Default)]
struct Observed {
    counts: CallCounts,
    parameters: Option<DeviceParameters>,
    orientation: Rotation,
    target: Option<RenderTarget>,
    streaming: bool,
}

#[derive(Debug, Default)]
struct ControlState {
    fail_parameters: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    truncate_frames: AtomicBool,
    frames_produced: AtomicU64,
    observed: Mutex<Observed>,
}

impl ControlState {
    fn observed(&self) -> MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Remote control for a [`VirtualDevice`] owned by a session
#[derive(Debug, Clone)]
pub struct VirtualDeviceControl {
    state: Arc<ControlState>,
}

impl VirtualDeviceControl {
    /// Reject the next parameter commits
    pub fn set_fail_parameters(&self, fail: bool) {
        self.state.fail_parameters.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Report stop failures (the delivery thread still halts)
    pub fn set_fail_stop(&self, fail: bool) {
        self.state.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Report half the real length for every frame
    pub fn set_truncate_frames(&self, truncate: bool) {
        self.state.truncate_frames.store(truncate, Ordering::SeqCst);
    }

    pub fn counts(&self) -> CallCounts {
        self.state.observed().counts
    }

    pub fn frames_produced(&self) -> u64 {
        self.state.frames_produced.load(Ordering::SeqCst)
    }

    pub fn parameters(&self) -> Option<DeviceParameters> {
        self.state.observed().parameters
    }

    pub fn orientation(&self) -> Rotation {
        self.state.observed().orientation
    }

    pub fn render_target(&self) -> Option<RenderTarget> {
        self.state.observed().target
    }

    pub fn is_streaming(&self) -> bool {
        self.state.observed().streaming
    }
}

/// Per-thread frame generator
struct Producer {
    callback: FrameCallback,
    queue: Arc<Mutex<VecDeque<FrameBuffer>>>,
    /// Device-managed frame memory when no buffers are loaned
    scratch: Vec<u8>,
    interval: Duration,
    next_frame: Instant,
    sequence: u64,
    control: Arc<ControlState>,
}

impl Producer {
    fn tick(&mut self) -> LoopAction {
        let now = Instant::now();
        if now < self.next_frame {
            // Sleep in slices so a stop request is seen promptly
            thread::sleep((self.next_frame - now).min(MAX_FRAME_INTERVAL));
            return LoopAction::Continue;
        }

        self.next_frame += self.interval;
        if self.next_frame < now {
            self.next_frame = now + self.interval;
        }

        self.produce();
        LoopAction::Continue
    }

    fn produce(&mut self) {
        let shade = (self.sequence % 256) as u8;
        self.sequence += 1;
        let truncate = self.control.truncate_frames.load(Ordering::Relaxed);
        let reported = |len: usize| if truncate { len / 2 } else { len };

        if self.scratch.is_empty() {
            let next = self
                .queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            let Some(mut buffer) = next else {
                debug!("No receive buffer queued, skipping frame");
                return;
            };

            buffer.as_mut_slice().fill(shade);
            let len = reported(buffer.len());
            let delivery = self.callback.deliver(buffer, len);
            if let Some(buffer) = delivery.recycled {
                self.queue
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_back(buffer);
            }
        } else {
            self.scratch.fill(shade);
            let len = reported(self.scratch.len());
            self.callback.deliver_borrowed(&self.scratch, len);
        }

        self.control.frames_produced.fetch_add(1, Ordering::Relaxed);
    }
}

/// Software camera
pub struct VirtualDevice {
    info: DeviceInfo,
    modes: Vec<DeviceMode>,
    accepts_buffers: bool,
    control: Arc<ControlState>,
    callback: Option<FrameCallback>,
    queue: Arc<Mutex<VecDeque<FrameBuffer>>>,
    frame_loop: Option<CaptureLoopController>,
}

impl VirtualDevice {
    /// Device with a typical webcam mode list
    pub fn new(name: &str) -> Self {
        let mut modes = Vec::new();
        for format in [PixelFormat::NV21, PixelFormat::YUYV] {
            for (width, height) in [(320, 240), (640, 480), (1280, 720)] {
                modes.push(DeviceMode::new(width, height, vec![15, 30], format));
            }
        }

        Self {
            info: DeviceInfo {
                name: name.to_string(),
                path: format!("virtual:{}", name),
                facing: Facing::External,
            },
            modes,
            accepts_buffers: true,
            control: Arc::new(ControlState::default()),
            callback: None,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            frame_loop: None,
        }
    }

    pub fn with_modes(mut self, modes: Vec<DeviceMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.info.facing = facing;
        self
    }

    /// Manage frame memory internally instead of writing into loaned buffers
    pub fn self_managed(mut self) -> Self {
        self.accepts_buffers = false;
        self
    }

    pub fn control(&self) -> VirtualDeviceControl {
        VirtualDeviceControl {
            state: Arc::clone(&self.control),
        }
    }

    fn halt_loop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop();
        }
        self.control.observed().streaming = false;
    }
}

impl CaptureDevice for VirtualDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn accepts_buffers(&self) -> bool {
        self.accepts_buffers
    }

    fn query_capabilities(&mut self) -> DeviceResult<DeviceCapabilities> {
        Ok(DeviceCapabilities {
            modes: self.modes.clone(),
            focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousVideo],
        })
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> DeviceResult<()> {
        let mut observed = self.control.observed();
        observed.counts.parameter_sets += 1;

        if self.control.fail_parameters.load(Ordering::SeqCst) {
            return Err(DeviceError::Negotiation(format!("rejected {}", params)));
        }
        if observed.streaming {
            return Err(DeviceError::Busy("cannot change parameters while streaming".into()));
        }

        debug!(params = %params, "Virtual device parameters set");
        observed.parameters = Some(*params);
        Ok(())
    }

    fn set_render_target(&mut self, target: RenderTarget) -> DeviceResult<()> {
        self.control.observed().target = Some(target);
        Ok(())
    }

    fn set_display_orientation(&mut self, rotation: Rotation) -> DeviceResult<()> {
        let mut observed = self.control.observed();
        observed.counts.orientation_sets += 1;
        observed.orientation = rotation;
        Ok(())
    }

    fn register_frame_callback(
        &mut self,
        callback: FrameCallback,
        buffers: Vec<FrameBuffer>,
    ) -> DeviceResult<()> {
        if self.frame_loop.is_some() {
            return Err(DeviceError::Busy("streaming".into()));
        }
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.clear();
        queue.extend(buffers);
        self.callback = Some(callback);
        Ok(())
    }

    fn unregister_frame_callback(&mut self) -> DeviceResult<Vec<FrameBuffer>> {
        if self.frame_loop.is_some() {
            return Err(DeviceError::Busy("still streaming".into()));
        }
        self.callback = None;
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queue.drain(..).collect())
    }

    fn start_streaming(&mut self) -> DeviceResult<()> {
        if self.frame_loop.is_some() {
            return Err(DeviceError::Busy("already streaming".into()));
        }
        self.control.observed().counts.starts += 1;

        let params = self
            .control
            .observed()
            .parameters
            .ok_or_else(|| DeviceError::Other("parameters not set".into()))?;
        let callback = self
            .callback
            .clone()
            .ok_or_else(|| DeviceError::Other("no frame callback registered".into()))?;

        let scratch = if self.accepts_buffers {
            Vec::new()
        } else {
            let size = frame_size(params.width, params.height, params.pixel_format)
                .ok_or_else(|| DeviceError::Negotiation(format!("{} is too large", params)))?;
            vec![0u8; size]
        };
        let interval = Duration::from_secs(1) / params.frame_rate.max(1);
        let queue = Arc::clone(&self.queue);
        let control = Arc::clone(&self.control);

        let frame_loop = CaptureLoopController::spawn_with_init(
            &format!("virtual-{}", self.info.name),
            move || {
                // Fails on the loop thread, where a real device opens its node
                if control.fail_start.load(Ordering::SeqCst) {
                    return Err(DeviceError::Busy("start rejected".into()));
                }
                Ok(Producer {
                    callback,
                    queue,
                    scratch,
                    interval,
                    next_frame: Instant::now(),
                    sequence: 0,
                    control,
                })
            },
            |producer: &mut Producer| producer.tick(),
        )?;

        self.frame_loop = Some(frame_loop);
        self.control.observed().streaming = true;
        info!(device = %self.info.name, params = %params, "Virtual device streaming");
        Ok(())
    }

    fn stop_streaming(&mut self) -> DeviceResult<()> {
        self.control.observed().counts.stops += 1;
        self.halt_loop();

        if self.control.fail_stop.load(Ordering::SeqCst) {
            return Err(DeviceError::Io("stop reported failure".into()));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.halt_loop();
        self.callback = None;
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
        debug!(device = %self.info.name, "Virtual device released");
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        self.halt_loop();
    }
}
