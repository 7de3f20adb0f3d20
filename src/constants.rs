// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Number of preview buffers loaned to the device per streaming session
pub const NUM_CAPTURE_BUFFERS: usize = 3;

/// Default capture width when neither the caller nor the config specifies one
pub const DEFAULT_WIDTH: u32 = 640;

/// Default capture height
pub const DEFAULT_HEIGHT: u32 = 480;

/// Default capture frame rate
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// How often to emit per-frame anomaly log messages (every Nth occurrence)
pub const LOG_EVERY_N_FRAMES: u64 = 30;

/// Capacity of the bounded channel behind [`ChannelSink`](crate::capture::ChannelSink)
pub const SINK_CHANNEL_CAPACITY: usize = 8;

/// Buffers requested from the kernel for V4L2 mmap streaming
pub const V4L2_STREAM_BUFFERS: u32 = 4;

/// Upper bound on a single synthetic frame interval, so stop requests are
/// noticed promptly even at very low frame rates
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_millis(250);

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "capture-coordinator";

/// Settings file name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Application version (git describe, or the package version)
pub const APP_VERSION: &str = env!("GIT_VERSION");
