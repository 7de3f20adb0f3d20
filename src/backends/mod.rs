// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Capture core                 │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────┴──────────┐ ┌─────────┴───────────┐
//! │  Camera devices     │ │   Render targets    │
//! │  (virtual, V4L2)    │ │ (surface, texture)  │
//! └─────────────────────┘ └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Device trait, negotiation and concrete devices
//! - [`render_target`]: Readiness of the surface frames are previewed into

pub mod camera;
pub mod render_target;

pub use render_target::{RenderTargetProvider, SharedRenderTarget};
