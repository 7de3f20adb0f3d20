// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the capture device abstraction

//! Shared types for capture devices

use crate::capture::PixelFormat;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Error types for device operations
///
/// The capture core does not interpret these; any failure during a start
/// becomes `CaptureStartFailed` and any failure during a stop becomes
/// `StopFailed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Device is not present or was released
    NotAvailable(String),
    /// Parameters rejected
    Negotiation(String),
    /// Device is in use or in the wrong state for the call
    Busy(String),
    /// I/O error from the driver
    Io(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::NotAvailable(msg) => write!(f, "Device not available: {}", msg),
            DeviceError::Negotiation(msg) => write!(f, "Parameter negotiation failed: {}", msg),
            DeviceError::Busy(msg) => write!(f, "Device busy: {}", msg),
            DeviceError::Io(msg) => write!(f, "I/O error: {}", msg),
            DeviceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::Io(err.to_string())
    }
}

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Facing {
    #[default]
    Back,
    Front,
    External,
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Back => write!(f, "back"),
            Facing::Front => write!(f, "front"),
            Facing::External => write!(f, "external"),
        }
    }
}

/// Static description of a device
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub name: String,
    /// Device node or synthetic identifier
    pub path: String,
    pub facing: Facing,
}

/// One supported streaming mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMode {
    pub width: u32,
    pub height: u32,
    /// Supported integer frame rates (empty means "whatever was requested")
    pub frame_rates: Vec<u32>,
    pub pixel_format: PixelFormat,
}

impl DeviceMode {
    pub fn new(width: u32, height: u32, frame_rates: Vec<u32>, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            frame_rates,
            pixel_format,
        }
    }
}

impl std::fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rates: Vec<String> = self.frame_rates.iter().map(|r| r.to_string()).collect();
        write!(
            f,
            "{}x{} {} @ [{}]fps",
            self.width,
            self.height,
            self.pixel_format,
            rates.join(", ")
        )
    }
}

/// Focus behaviour requested from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FocusMode {
    #[default]
    Auto,
    /// Continuous autofocus tuned for video
    ContinuousVideo,
    Fixed,
}

/// What a device reports it can do
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    pub modes: Vec<DeviceMode>,
    pub focus_modes: Vec<FocusMode>,
}

/// Parameters committed to the device before streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParameters {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub pixel_format: PixelFormat,
    pub focus_mode: FocusMode,
    pub auto_white_balance: bool,
    pub auto_scene: bool,
}

impl std::fmt::Display for DeviceParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps {} focus={:?}",
            self.width, self.height, self.frame_rate, self.pixel_format, self.focus_mode
        )
    }
}
