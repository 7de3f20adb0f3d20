// SPDX-License-Identifier: GPL-3.0-only

//! Capture Coordinator - lifecycle and frame delivery for preview cameras
//!
//! Brokers between a caller that wants preview frames, a capture device that
//! produces them, and a render target that must be ready before the device
//! may stream.
//!
//! # Architecture
//!
//! - [`capture`]: Session state machine, buffer pool, frame relay and sinks
//! - [`backends`]: Capture device trait, negotiation, virtual and V4L2 devices,
//!   render-target readiness
//! - [`config`]: Persisted user settings
//! - [`errors`]: Error types and caller-facing status codes
//!
//! # Example
//!
//! ```ignore
//! use capture_coordinator::backends::camera::VirtualDevice;
//! use capture_coordinator::capture::{CaptureSession, RenderTarget};
//!
//! let sink = |data: &[u8], len: usize, _handle| println!("{} bytes", len);
//! let session = CaptureSession::builder(Arc::new(sink))
//!     .device(Box::new(VirtualDevice::new("demo")))
//!     .build();
//!
//! session.start(640, 480, 30);                                // Pending
//! session.notify_surface_ready(RenderTarget::Surface(1))?;    // Running
//! ```

pub mod backends;
pub mod capture;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types
pub use capture::{
    CaptureConfig, CaptureSession, CaptureState, ChannelSink, FrameCallback, FrameSink,
    PixelFormat, RenderTarget, Rotation,
};
pub use config::Config;
pub use errors::{AppError, AppResult, CaptureError, CaptureResult, Status};
