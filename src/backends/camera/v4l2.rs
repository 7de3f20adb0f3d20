// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture device
//!
//! Streams through kernel mmap buffers. The kernel owns that memory, so this
//! device does not take loaned buffers and delivers every frame through
//! [`FrameCallback::deliver_borrowed`]. The stream is opened on the delivery
//! thread and lives there until streaming stops.

use std::path::Path;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

use super::CaptureDevice;
use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use crate::capture::{FrameBuffer, FrameCallback, PixelFormat, RenderTarget, Rotation};
use crate::constants::V4L2_STREAM_BUFFERS;

/// Resolutions offered for stepwise/continuous frame size ranges
const STEPWISE_CANDIDATES: [(u32, u32); 4] = [(320, 240), (640, 480), (1280, 720), (1920, 1080)];

/// List V4L2 nodes that support video capture
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    let Ok(entries) = std::fs::read_dir("/dev") else {
        return devices;
    };

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("video"))
        })
        .collect();
    paths.sort();

    for path in paths {
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            continue;
        }

        debug!(card = %caps.card, driver = %caps.driver, path = %path.display(), "Found V4L2 capture node");
        devices.push(DeviceInfo {
            name: caps.card.clone(),
            path: path.to_string_lossy().to_string(),
            facing: Facing::External,
        });
    }

    devices
}

/// Camera behind a `/dev/videoN` node
pub struct V4l2Device {
    info: DeviceInfo,
    parameters: Option<DeviceParameters>,
    callback: Option<FrameCallback>,
    frame_loop: Option<CaptureLoopController>,
}

impl V4l2Device {
    /// Open `path` and read its card name
    pub fn open(path: impl AsRef<Path>) -> DeviceResult<Self> {
        let path = path.as_ref();
        let dev = Device::with_path(path).map_err(|e| {
            DeviceError::NotAvailable(format!("{}: {}", path.display(), e))
        })?;
        let caps = dev.query_caps()?;

        info!(card = %caps.card, driver = %caps.driver, path = %path.display(), "Opened V4L2 device");

        Ok(Self {
            info: DeviceInfo {
                name: caps.card,
                path: path.to_string_lossy().to_string(),
                facing: Facing::External,
            },
            parameters: None,
            callback: None,
            frame_loop: None,
        })
    }

    fn device(&self) -> DeviceResult<Device> {
        Device::with_path(&self.info.path)
            .map_err(|e| DeviceError::NotAvailable(format!("{}: {}", self.info.path, e)))
    }

    fn halt_loop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop();
        }
    }
}

fn frame_rates(dev: &Device, fourcc: FourCC, width: u32, height: u32) -> Vec<u32> {
    let Ok(intervals) = dev.enum_frameintervals(fourcc, width, height) else {
        return Vec::new();
    };

    let mut rates: Vec<u32> = intervals
        .into_iter()
        .filter_map(|interval| match interval.interval {
            FrameIntervalEnum::Discrete(frac) if frac.numerator > 0 => {
                Some(frac.denominator / frac.numerator)
            }
            _ => None,
        })
        .collect();
    rates.sort_unstable();
    rates.dedup();
    rates
}

/// Apply format and frame rate, returning what the driver accepted
fn configure(dev: &Device, params: &DeviceParameters) -> DeviceResult<Format> {
    let requested = Format::new(
        params.width,
        params.height,
        FourCC::new(&params.pixel_format.fourcc()),
    );
    let actual = dev
        .set_format(&requested)
        .map_err(|e| DeviceError::Negotiation(format!("set format: {}", e)))?;

    if actual.fourcc != requested.fourcc
        || actual.width != params.width
        || actual.height != params.height
    {
        return Err(DeviceError::Negotiation(format!(
            "driver chose {}x{} {:?} instead of {}",
            actual.width, actual.height, actual.fourcc, params
        )));
    }

    if let Err(e) = dev.set_params(&Parameters::with_fps(params.frame_rate)) {
        warn!(fps = params.frame_rate, error = %e, "Driver rejected frame rate, keeping default");
    }

    Ok(actual)
}

impl CaptureDevice for V4l2Device {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn accepts_buffers(&self) -> bool {
        false
    }

    fn query_capabilities(&mut self) -> DeviceResult<DeviceCapabilities> {
        let dev = self.device()?;
        let mut modes = Vec::new();

        for description in dev.enum_formats()? {
            let Some(pixel_format) = PixelFormat::from_fourcc(&description.fourcc.repr) else {
                debug!(fourcc = ?description.fourcc, "Skipping unsupported format");
                continue;
            };

            for size in dev.enum_framesizes(description.fourcc)? {
                match size.size {
                    FrameSizeEnum::Discrete(discrete) => {
                        let rates =
                            frame_rates(&dev, description.fourcc, discrete.width, discrete.height);
                        modes.push(DeviceMode::new(
                            discrete.width,
                            discrete.height,
                            rates,
                            pixel_format,
                        ));
                    }
                    FrameSizeEnum::Stepwise(step) => {
                        for (width, height) in STEPWISE_CANDIDATES {
                            if (step.min_width..=step.max_width).contains(&width)
                                && (step.min_height..=step.max_height).contains(&height)
                            {
                                let rates = frame_rates(&dev, description.fourcc, width, height);
                                modes.push(DeviceMode::new(width, height, rates, pixel_format));
                            }
                        }
                    }
                }
            }
        }

        debug!(device = %self.info.name, modes = modes.len(), "Queried V4L2 modes");
        Ok(DeviceCapabilities {
            modes,
            focus_modes: vec![FocusMode::Auto],
        })
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> DeviceResult<()> {
        if self.frame_loop.is_some() {
            return Err(DeviceError::Busy("cannot change parameters while streaming".into()));
        }
        let dev = self.device()?;
        let format = configure(&dev, params)?;
        info!(
            width = format.width,
            height = format.height,
            fourcc = ?format.fourcc,
            "V4L2 format configured"
        );
        self.parameters = Some(*params);
        Ok(())
    }

    fn set_render_target(&mut self, target: RenderTarget) -> DeviceResult<()> {
        // Frames are presented by the sink; the node itself has no preview output
        debug!(target = %target, "V4L2 render target noted");
        Ok(())
    }

    fn set_display_orientation(&mut self, rotation: Rotation) -> DeviceResult<()> {
        debug!(rotation = %rotation, "V4L2 devices do not rotate; orientation left to the display");
        Ok(())
    }

    fn register_frame_callback(
        &mut self,
        callback: FrameCallback,
        buffers: Vec<FrameBuffer>,
    ) -> DeviceResult<()> {
        if !buffers.is_empty() {
            return Err(DeviceError::Other(
                "V4L2 device streams from kernel buffers".into(),
            ));
        }
        self.callback = Some(callback);
        Ok(())
    }

    fn unregister_frame_callback(&mut self) -> DeviceResult<Vec<FrameBuffer>> {
        if self.frame_loop.is_some() {
            return Err(DeviceError::Busy("still streaming".into()));
        }
        self.callback = None;
        Ok(Vec::new())
    }

    fn start_streaming(&mut self) -> DeviceResult<()> {
        if self.frame_loop.is_some() {
            return Err(DeviceError::Busy("already streaming".into()));
        }
        let params = self
            .parameters
            .ok_or_else(|| DeviceError::Other("parameters not set".into()))?;
        let callback = self
            .callback
            .clone()
            .ok_or_else(|| DeviceError::Other("no frame callback registered".into()))?;
        let path = self.info.path.clone();

        let frame_loop = CaptureLoopController::spawn_with_init(
            &format!("v4l2-{}", self.info.name),
            move || {
                let dev = Device::with_path(&path).map_err(|e| {
                    DeviceError::NotAvailable(format!("open {}: {}", path, e))
                })?;
                configure(&dev, &params)?;
                Stream::with_buffers(&dev, Type::VideoCapture, V4L2_STREAM_BUFFERS)
                    .map_err(|e| DeviceError::Io(format!("create stream: {}", e)))
            },
            move |stream| {
                match stream.next() {
                    Ok((buf, meta)) => {
                        callback.deliver_borrowed(buf, meta.bytesused as usize);
                    }
                    Err(e) => warn!(error = %e, "Failed to dequeue V4L2 frame"),
                }
                LoopAction::Continue
            },
        )?;

        self.frame_loop = Some(frame_loop);
        info!(device = %self.info.name, params = %params, "V4L2 streaming started");
        Ok(())
    }

    fn stop_streaming(&mut self) -> DeviceResult<()> {
        self.halt_loop();
        Ok(())
    }

    fn release(&mut self) {
        self.halt_loop();
        self.callback = None;
        self.parameters = None;
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        self.halt_loop();
    }
}
