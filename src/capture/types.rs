// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the capture core

use crate::errors::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};

/// Pixel layout of raw preview frames
///
/// Only the storage cost matters to the core: it sizes buffers and validates
/// delivered frames against `width * height * bits_per_pixel / 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// NV21 - Semi-planar 4:2:0, VU interleaved (classic preview format)
    #[default]
    NV21,
    /// NV12 - Semi-planar 4:2:0, UV interleaved
    NV12,
    /// I420 - Planar 4:2:0
    I420,
    /// YUYV - Packed 4:2:2
    YUYV,
    /// UYVY - Packed 4:2:2
    UYVY,
    /// RGB24 - 3 bytes per pixel
    RGB24,
    /// RGBA - 4 bytes per pixel (filter output)
    RGBA,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::NV21,
        PixelFormat::NV12,
        PixelFormat::I420,
        PixelFormat::YUYV,
        PixelFormat::UYVY,
        PixelFormat::RGB24,
        PixelFormat::RGBA,
    ];

    /// Storage bits per pixel, accounting for chroma subsampling
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::NV21 | Self::NV12 | Self::I420 => 12,
            Self::YUYV | Self::UYVY => 16,
            Self::RGB24 => 24,
            Self::RGBA => 32,
        }
    }

    /// FourCC code as used by V4L2
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::NV21 => *b"NV21",
            Self::NV12 => *b"NV12",
            Self::I420 => *b"YU12",
            Self::YUYV => *b"YUYV",
            Self::UYVY => *b"UYVY",
            Self::RGB24 => *b"RGB3",
            Self::RGBA => *b"AB24",
        }
    }

    /// Parse a FourCC code
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"NV21" => Some(Self::NV21),
            b"NV12" => Some(Self::NV12),
            b"YU12" | b"I420" => Some(Self::I420),
            b"YUYV" | b"YUY2" => Some(Self::YUYV),
            b"UYVY" => Some(Self::UYVY),
            b"RGB3" => Some(Self::RGB24),
            b"AB24" | b"RGBA" => Some(Self::RGBA),
            _ => None,
        }
    }

    /// Parse a user-supplied format name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "NV21" => Some(Self::NV21),
            "NV12" => Some(Self::NV12),
            "I420" | "YU12" => Some(Self::I420),
            "YUYV" | "YUY2" => Some(Self::YUYV),
            "UYVY" => Some(Self::UYVY),
            "RGB24" | "RGB3" => Some(Self::RGB24),
            "RGBA" => Some(Self::RGBA),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NV21 => "NV21",
            Self::NV12 => "NV12",
            Self::I420 => "I420",
            Self::YUYV => "YUYV",
            Self::UYVY => "UYVY",
            Self::RGB24 => "RGB24",
            Self::RGBA => "RGBA",
        };
        write!(f, "{}", name)
    }
}

/// Immutable snapshot of one capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub pixel_format: PixelFormat,
}

impl CaptureConfig {
    /// Validate and build a capture config
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: u32,
        pixel_format: PixelFormat,
    ) -> CaptureResult<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "resolution {}x{} must be non-zero",
                width, height
            )));
        }
        if frame_rate == 0 {
            return Err(CaptureError::InvalidConfig(
                "frame rate must be non-zero".to_string(),
            ));
        }
        if frame_size(width, height, pixel_format).is_none() {
            return Err(CaptureError::InvalidConfig(format!(
                "{}x{} {} frames do not fit in memory",
                width, height, pixel_format
            )));
        }
        Ok(Self {
            width,
            height,
            frame_rate,
            pixel_format,
        })
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.pixel_format.bits_per_pixel()
    }

    /// Size in bytes of one frame of this configuration
    pub fn frame_size(&self) -> Option<usize> {
        frame_size(self.width, self.height, self.pixel_format)
    }
}

impl std::fmt::Display for CaptureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps {}",
            self.width, self.height, self.frame_rate, self.pixel_format
        )
    }
}

/// Bytes needed for one `width x height` frame in `format`, `None` on overflow
pub fn frame_size(width: u32, height: u32, format: PixelFormat) -> Option<usize> {
    let bits = usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(format.bits_per_pixel() as usize)?;
    Some(bits / 8)
}

/// Display rotation in degrees (clockwise)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Create rotation from an integer degree value (normalised to 0-360).
    /// Values that are not a multiple of 90 snap to the nearest quarter turn.
    pub fn from_degrees_int(degrees: i32) -> Self {
        let normalized = degrees.rem_euclid(360);
        match ((normalized + 45) / 90) % 4 {
            1 => Rotation::Rotate90,
            2 => Rotation::Rotate180,
            3 => Rotation::Rotate270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// Rotation that undoes a horizontal mirror applied before rotating
    pub fn mirrored(&self) -> Self {
        Self::from_degrees_int((360 - self.degrees() as i32) % 360)
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// How the display orientation is derived from the requested rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MirrorMode {
    /// Hand the rotation to the device unchanged
    #[default]
    None,
    /// The device mirrors before rotating (front cameras); compensate
    CompensateFrontMirror,
}

/// Where preview frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Raw device callbacks into pool-owned buffers that are recycled after forwarding
    #[default]
    Preview,
    /// The render target delivers pre-processed frames; the device manages its
    /// own memory and nothing is recycled
    Filter,
}

impl DeliveryMode {
    pub fn owns_buffers(&self) -> bool {
        matches!(self, DeliveryMode::Preview)
    }
}

/// Opaque handle of a render target (display surface or filter texture)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// On-screen surface the device previews into
    Surface(u64),
    /// Texture consumed by a filter renderer
    Texture(u64),
}

impl std::fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderTarget::Surface(id) => write!(f, "surface#{}", id),
            RenderTarget::Texture(id) => write!(f, "texture#{}", id),
        }
    }
}

/// Opaque value handed back to the sink with every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CorrelationHandle(pub u64);

impl std::fmt::Display for CorrelationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureState {
    /// No capture requested
    #[default]
    Idle,
    /// Capture requested, waiting for the render target or a retry
    Pending,
    /// Device is streaming
    Running,
    /// Session torn down, device released
    Stopped,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Pending => write!(f, "Pending"),
            CaptureState::Running => write!(f, "Running"),
            CaptureState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Result of a successful start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The device is now streaming
    Started,
    /// Queued until the render target becomes ready
    Pending,
    /// Already streaming; the new config is stored for later restarts
    AlreadyRunning,
}
