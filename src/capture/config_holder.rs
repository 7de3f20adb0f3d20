// SPDX-License-Identifier: GPL-3.0-only

//! Last requested capture parameters
//!
//! Restarts caused by rotation changes replay exactly what was last
//! requested, so the holder outlives individual streaming sessions.

use super::types::{CaptureConfig, DeliveryMode, MirrorMode, Rotation};

#[derive(Debug, Clone, Default)]
pub struct ConfigHolder {
    capture: Option<CaptureConfig>,
    delivery_mode: DeliveryMode,
    rotation: Rotation,
    mirror_mode: MirrorMode,
}

impl ConfigHolder {
    pub fn new(delivery_mode: DeliveryMode, mirror_mode: MirrorMode) -> Self {
        Self {
            capture: None,
            delivery_mode,
            rotation: Rotation::None,
            mirror_mode,
        }
    }

    /// Replace the capture request, returning the previous one
    pub fn record(&mut self, config: CaptureConfig) -> Option<CaptureConfig> {
        self.capture.replace(config)
    }

    pub fn capture(&self) -> Option<CaptureConfig> {
        self.capture
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    pub fn set_delivery_mode(&mut self, mode: DeliveryMode) {
        self.delivery_mode = mode;
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn mirror_mode(&self) -> MirrorMode {
        self.mirror_mode
    }

    pub fn set_mirror_mode(&mut self, mode: MirrorMode) {
        self.mirror_mode = mode;
    }

    /// Orientation to hand to the device for the requested rotation
    pub fn display_orientation(&self) -> Rotation {
        match self.mirror_mode {
            MirrorMode::None => self.rotation,
            MirrorMode::CompensateFrontMirror => self.rotation.mirrored(),
        }
    }
}
