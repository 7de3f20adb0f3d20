// SPDX-License-Identifier: GPL-3.0-only

//! Persisted settings

use crate::capture::{CaptureConfig, DeliveryMode, MirrorMode, PixelFormat, Rotation};
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_WIDTH,
    NUM_CAPTURE_BUFFERS,
};
use crate::errors::{AppError, AppResult, CaptureResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default capture width
    pub width: u32,
    /// Default capture height
    pub height: u32,
    /// Default frame rate
    pub frame_rate: u32,
    /// Pixel format requested from the device
    pub pixel_format: PixelFormat,
    /// Preview buffers loaned to the device per stream
    pub buffer_count: usize,
    /// Owned-buffer preview or filter input
    pub delivery_mode: DeliveryMode,
    /// Front-camera mirror compensation
    pub mirror_mode: MirrorMode,
    /// Initial display rotation
    pub rotation: Rotation,
    /// V4L2 node used by `capture` when none is given (e.g. "/dev/video0")
    pub device_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            pixel_format: PixelFormat::default(),
            buffer_count: NUM_CAPTURE_BUFFERS,
            delivery_mode: DeliveryMode::default(),
            mirror_mode: MirrorMode::default(),
            rotation: Rotation::default(),
            device_path: None,
        }
    }
}

impl Config {
    /// Default location: `<config_dir>/capture-coordinator/config.json`
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> AppResult<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file missing, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = Self::path()
            .ok_or_else(|| AppError::Config("no config directory on this system".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Validated capture request from the stored defaults
    pub fn capture_config(&self) -> CaptureResult<CaptureConfig> {
        CaptureConfig::new(self.width, self.height, self.frame_rate, self.pixel_format)
    }
}
