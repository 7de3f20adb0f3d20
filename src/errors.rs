// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture coordinator
//!
//! Three layers report errors:
//! - device adapters return [`DeviceError`](crate::backends::camera::DeviceError)
//! - the capture core returns [`CaptureError`]
//! - the application (config files, CLI) returns [`AppError`]
//!
//! Callers that only want a small result code convert into [`Status`].

use std::fmt;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Errors reported by the capture core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No device is bound to the session
    DeviceUnavailable,
    /// Parameter negotiation, callback registration or streaming start failed.
    /// The session stays Pending and the request may be retried.
    CaptureStartFailed(String),
    /// The device refused to halt. The session is Idle regardless.
    StopFailed(String),
    /// A delivered frame did not match the negotiated size
    FrameSizeMismatch { expected: usize, actual: usize },
    /// Requested capture parameters are invalid (zero dimension, etc.)
    InvalidConfig(String),
    /// The session was torn down
    Closed,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceUnavailable => write!(f, "No capture device bound"),
            CaptureError::CaptureStartFailed(msg) => write!(f, "Failed to start capture: {}", msg),
            CaptureError::StopFailed(msg) => write!(f, "Failed to stop capture: {}", msg),
            CaptureError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "Frame size mismatch: expected {} bytes, got {}",
                expected, actual
            ),
            CaptureError::InvalidConfig(msg) => write!(f, "Invalid capture config: {}", msg),
            CaptureError::Closed => write!(f, "Capture session closed"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Caller-facing result code
///
/// The integer codes are stable and meant for foreign callers that only
/// understand a status number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    AlreadyRunning,
    DeviceUnavailable,
    StartFailed,
    StopFailed,
}

impl Status {
    /// Stable integer code (0 on success, positive for benign, negative for failures)
    pub fn code(&self) -> i32 {
        match self {
            Status::Success => 0,
            Status::AlreadyRunning => 1,
            Status::DeviceUnavailable => -1,
            Status::StartFailed => -2,
            Status::StopFailed => -3,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code() >= 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::AlreadyRunning => write!(f, "already running"),
            Status::DeviceUnavailable => write!(f, "device unavailable"),
            Status::StartFailed => write!(f, "start failed"),
            Status::StopFailed => write!(f, "stop failed"),
        }
    }
}

impl From<&CaptureError> for Status {
    fn from(err: &CaptureError) -> Self {
        match err {
            CaptureError::DeviceUnavailable | CaptureError::Closed => Status::DeviceUnavailable,
            CaptureError::StopFailed(_) => Status::StopFailed,
            CaptureError::CaptureStartFailed(_)
            | CaptureError::InvalidConfig(_)
            | CaptureError::FrameSizeMismatch { .. } => Status::StartFailed,
        }
    }
}

/// Application-level errors (configuration files, command line)
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture core errors
    Capture(CaptureError),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
    /// Generic error with message
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::AlreadyRunning.code(), 1);
        assert!(Status::AlreadyRunning.is_ok());
        assert!(!Status::DeviceUnavailable.is_ok());
        assert!(!Status::StartFailed.is_ok());
    }

    #[test]
    fn test_status_from_error() {
        assert_eq!(
            Status::from(&CaptureError::DeviceUnavailable),
            Status::DeviceUnavailable
        );
        assert_eq!(Status::from(&CaptureError::Closed), Status::DeviceUnavailable);
        assert_eq!(
            Status::from(&CaptureError::CaptureStartFailed("busy".into())),
            Status::StartFailed
        );
        assert_eq!(
            Status::from(&CaptureError::StopFailed("ioctl".into())),
            Status::StopFailed
        );
    }

    #[test]
    fn test_display_mentions_sizes() {
        let err = CaptureError::FrameSizeMismatch {
            expected: 460800,
            actual: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("460800"));
        assert!(msg.contains("100"));
    }
}
