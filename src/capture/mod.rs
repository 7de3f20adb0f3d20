// SPDX-License-Identifier: GPL-3.0-only

//! Capture core
//!
//! ```text
//!   caller ── start/stop/reconfigure ──▶ CaptureSession ──▶ CaptureDevice
//!                                            │   ▲
//!   render target ── ready/lost ─────────────┘   │ FrameCallback
//!                                                │
//!                                     FrameRelay (frame lock)
//!                                                │
//!                                                ▼
//!                                           FrameSink
//! ```
//!
//! [`CaptureSession`] owns the lifecycle. Devices hand frames to a
//! [`FrameCallback`], which validates them against the negotiated frame size
//! and forwards them to the [`FrameSink`] while the session is running.

mod buffer_pool;
mod config_holder;
mod diagnostics;
mod readiness;
mod relay;
mod session;
mod sink;
mod types;

pub use buffer_pool::{BufferOwner, BufferPool, BufferSlot, FrameBuffer, PoolError};
pub use config_holder::ConfigHolder;
pub use diagnostics::{CaptureDiagnostics, DiagnosticsSnapshot};
pub use readiness::ReadinessTracker;
pub use relay::{Delivery, FrameCallback, FrameOutcome};
pub use session::{CaptureSession, SessionBuilder};
pub use sink::{CapturedFrame, ChannelSink, FrameSink};
pub use types::*;
