// SPDX-License-Identifier: GPL-3.0-only

//! Capability negotiation
//!
//! query supported modes → pick the best match → commit. Only the selection
//! lives here; the query and commit are device calls made by the session.

use super::types::{DeviceCapabilities, DeviceInfo, DeviceMode, DeviceParameters, Facing, FocusMode};
use crate::capture::CaptureConfig;
use tracing::debug;

/// Pick device parameters for a capture request.
///
/// The best mode has the requested pixel format and the smallest resolution
/// distance, then the smallest frame-rate distance. With no usable mode the
/// request is passed through unchanged and the device gets the final say.
pub fn negotiate(
    config: &CaptureConfig,
    capabilities: &DeviceCapabilities,
    info: &DeviceInfo,
) -> DeviceParameters {
    let (width, height, frame_rate) = match best_mode(config, &capabilities.modes) {
        Some((mode, rate)) => (mode.width, mode.height, rate),
        None => {
            debug!(requested = %config, "No matching device mode, using request as-is");
            (config.width, config.height, config.frame_rate)
        }
    };

    DeviceParameters {
        width,
        height,
        frame_rate,
        pixel_format: config.pixel_format,
        focus_mode: select_focus_mode(capabilities, info),
        auto_white_balance: true,
        auto_scene: true,
    }
}

/// Continuous video focus when supported, never on front cameras
fn select_focus_mode(capabilities: &DeviceCapabilities, info: &DeviceInfo) -> FocusMode {
    if info.facing != Facing::Front
        && capabilities
            .focus_modes
            .contains(&FocusMode::ContinuousVideo)
    {
        FocusMode::ContinuousVideo
    } else {
        FocusMode::Auto
    }
}

fn best_mode<'a>(config: &CaptureConfig, modes: &'a [DeviceMode]) -> Option<(&'a DeviceMode, u32)> {
    modes
        .iter()
        .filter(|mode| mode.pixel_format == config.pixel_format)
        .map(|mode| {
            let rate = closest_rate(config.frame_rate, &mode.frame_rates);
            (mode, rate)
        })
        .min_by_key(|(mode, rate)| {
            (
                resolution_distance(config, mode),
                rate.abs_diff(config.frame_rate),
            )
        })
}

/// Axis distance first; area distance breaks ties such as 640x480 vs 480x640
fn resolution_distance(config: &CaptureConfig, mode: &DeviceMode) -> (u64, u64) {
    let area = |w: u32, h: u32| w as u64 * h as u64;
    (
        config.width.abs_diff(mode.width) as u64 + config.height.abs_diff(mode.height) as u64,
        area(config.width, config.height).abs_diff(area(mode.width, mode.height)),
    )
}

fn closest_rate(requested: u32, rates: &[u32]) -> u32 {
    rates
        .iter()
        .copied()
        .min_by_key(|rate| rate.abs_diff(requested))
        .unwrap_or(requested)
}
