// SPDX-License-Identifier: GPL-3.0-only

//! Capture device abstraction
//!
//! ```text
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← State machine, the only caller of the trait
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureDevice Trait │  ← Common interface
//! └──────────┬──────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌───────┐  ┌───────┐
//!   │Virtual│  │ V4L2  │  ← Concrete implementations
//!   └───────┘  └───────┘
//! ```

pub mod frame_loop;
pub mod negotiation;
pub mod types;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2;
pub mod virtual_device;

pub use frame_loop::{CaptureLoopController, LoopAction};
pub use negotiation::negotiate;
pub use types::*;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use v4l2::V4l2Device;
pub use virtual_device::{CallCounts, VirtualDevice, VirtualDeviceControl};

use crate::capture::{FrameBuffer, FrameCallback, RenderTarget, Rotation};

/// A camera that can stream preview frames
///
/// The capture session serializes every call under its session lock, so
/// implementations see one call at a time. Calls may block (parameter
/// negotiation can take tens of milliseconds) but must never call back into
/// the session other than through the registered [`FrameCallback`].
pub trait CaptureDevice: Send {
    // ===== Metadata =====

    /// Static description of the device
    fn info(&self) -> DeviceInfo;

    /// Whether the device writes into buffers loaned by the session.
    ///
    /// Devices that manage their own memory (kernel mmap buffers, textures)
    /// return false and deliver through [`FrameCallback::deliver_borrowed`].
    fn accepts_buffers(&self) -> bool {
        true
    }

    // ===== Negotiation =====

    /// Report supported modes and focus behaviours
    fn query_capabilities(&mut self) -> DeviceResult<DeviceCapabilities>;

    /// Commit streaming parameters
    fn set_parameters(&mut self, params: &DeviceParameters) -> DeviceResult<()>;

    /// Point the preview at a render target
    fn set_render_target(&mut self, target: RenderTarget) -> DeviceResult<()>;

    /// Orientation of the preview on screen. Does not affect captured frames.
    fn set_display_orientation(&mut self, rotation: Rotation) -> DeviceResult<()>;

    // ===== Frame delivery =====

    /// Install the frame callback and take ownership of the receive buffers
    /// (empty when [`accepts_buffers`](Self::accepts_buffers) is false)
    fn register_frame_callback(
        &mut self,
        callback: FrameCallback,
        buffers: Vec<FrameBuffer>,
    ) -> DeviceResult<()>;

    /// Remove the frame callback and hand back every buffer still held
    fn unregister_frame_callback(&mut self) -> DeviceResult<Vec<FrameBuffer>>;

    // ===== Streaming =====

    fn start_streaming(&mut self) -> DeviceResult<()>;

    /// Halt streaming and join any delivery thread
    fn stop_streaming(&mut self) -> DeviceResult<()>;

    // ===== Lifecycle =====

    /// Release the underlying hardware. Called once at session teardown.
    fn release(&mut self) {}
}
