// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Listing V4L2 capture devices
//! - Streaming from a synthetic device
//! - Streaming from a V4L2 device
//! - Showing the persisted settings

use capture_coordinator::backends::SharedRenderTarget;
use capture_coordinator::backends::camera::VirtualDevice;
use capture_coordinator::capture::{
    CaptureConfig, CaptureSession, CapturedFrame, ChannelSink, CorrelationHandle,
    DiagnosticsSnapshot, PixelFormat, RenderTarget, StartOutcome,
};
use capture_coordinator::constants::SINK_CHANNEL_CAPACITY;
use capture_coordinator::{AppError, AppResult, Config};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Mode overrides from the command line
pub struct ModeArgs {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

impl ModeArgs {
    fn resolve(&self, config: &Config, format: Option<PixelFormat>) -> AppResult<CaptureConfig> {
        Ok(CaptureConfig::new(
            self.width.unwrap_or(config.width),
            self.height.unwrap_or(config.height),
            self.fps.unwrap_or(config.frame_rate),
            format.unwrap_or(config.pixel_format),
        )?)
    }
}

/// What the consumer thread saw
#[derive(Debug, Default)]
struct ConsumerStats {
    frames: u64,
    bytes: u64,
    first_at: Option<Instant>,
    last_at: Option<Instant>,
    last_sequence: Option<u64>,
}

impl ConsumerStats {
    fn record(&mut self, frame: &CapturedFrame) {
        self.frames += 1;
        self.bytes += frame.length as u64;
        self.first_at.get_or_insert(frame.captured_at);
        self.last_at = Some(frame.captured_at);
        self.last_sequence = Some(frame.sequence);
    }

    fn fps(&self) -> f64 {
        match (self.first_at, self.last_at) {
            (Some(first), Some(last)) if self.frames > 1 => {
                let secs = last.duration_since(first).as_secs_f64();
                if secs > 0.0 {
                    (self.frames - 1) as f64 / secs
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

/// Drain the sink channel on its own thread until every sender is gone
fn spawn_consumer(mut receiver: mpsc::Receiver<CapturedFrame>) -> JoinHandle<ConsumerStats> {
    thread::spawn(move || {
        let mut stats = ConsumerStats::default();
        while let Some(frame) = receiver.blocking_recv() {
            stats.record(&frame);
        }
        stats
    })
}

fn print_report(stats: &ConsumerStats, diagnostics: &DiagnosticsSnapshot, channel_dropped: u64) {
    println!();
    println!("Frames received: {}", stats.frames);
    println!("Bytes received:  {}", stats.bytes);
    println!("Average rate:    {:.1} fps", stats.fps());
    if let Some(sequence) = stats.last_sequence {
        println!("Last sequence:   {}", sequence);
    }
    println!("Channel drops:   {}", channel_dropped);
    println!();
    println!("Session diagnostics:");
    println!("  {}", diagnostics);
}

/// List V4L2 capture devices and their modes
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    use capture_coordinator::backends::camera::{CaptureDevice, V4l2Device, v4l2};

    let devices = v4l2::list_devices();
    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Available devices:");
    println!();
    for (index, info) in devices.iter().enumerate() {
        println!("  [{}] {} ({})", index, info.name, info.path);

        let modes = V4l2Device::open(&info.path)
            .and_then(|mut device| device.query_capabilities())
            .map(|caps| caps.modes)
            .unwrap_or_default();
        for mode in &modes {
            println!("      {}", mode);
        }
        println!();
    }

    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "v4l2")))]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    Err(Box::new(AppError::Other(
        "built without V4L2 support".to_string(),
    )))
}

/// Stream from a synthetic device through the full session lifecycle
pub fn simulate(
    mode: ModeArgs,
    duration: u64,
    rotate: Option<i32>,
    truncate: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let request = mode.resolve(&config, None)?;

    let device = VirtualDevice::new("simulated");
    let control = device.control();
    control.set_truncate_frames(truncate);

    let (sink, receiver) = ChannelSink::new(SINK_CHANNEL_CAPACITY);
    let sink = Arc::new(sink);
    let target = Arc::new(SharedRenderTarget::new());

    let session = Arc::new(
        CaptureSession::builder(sink.clone())
            .device(Box::new(device))
            .render_target_provider(target.clone())
            .correlation_handle(CorrelationHandle(u64::from(std::process::id())))
            .delivery_mode(config.delivery_mode)
            .mirror_mode(config.mirror_mode)
            .pixel_format(request.pixel_format)
            .buffer_count(config.buffer_count)
            .build(),
    );
    target.attach(&session);
    session.rotate(config.rotation)?;

    let consumer = spawn_consumer(receiver);

    println!("Requesting {}", request);
    match session.request_start(request)? {
        StartOutcome::Pending => println!("Waiting for render target..."),
        outcome => println!("Start: {:?}", outcome),
    }

    target.mark_ready(RenderTarget::Surface(1));
    println!("State: {}", session.state());

    let total = Duration::from_secs(duration);
    match rotate {
        Some(degrees) => {
            thread::sleep(total / 2);
            let status = session.set_rotation(degrees);
            println!(
                "Rotate to {}: {} (device orientation {})",
                degrees,
                status,
                control.orientation()
            );
            thread::sleep(total - total / 2);
        }
        None => thread::sleep(total),
    }

    let status = session.stop();
    println!("Stop: {}", status);

    let diagnostics = session.diagnostics();
    let counts = control.counts();
    session.teardown()?;
    let channel_dropped = sink.dropped();
    drop(session);
    drop(sink);

    let stats = consumer
        .join()
        .map_err(|_| AppError::Other("consumer thread panicked".to_string()))?;
    print_report(&stats, &diagnostics, channel_dropped);
    println!(
        "  device: {} starts, {} stops, {} frames produced",
        counts.starts,
        counts.stops,
        control.frames_produced()
    );

    Ok(())
}

/// Stream from a V4L2 device until the duration elapses or Ctrl+C
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub fn capture(
    device_path: Option<String>,
    mode: ModeArgs,
    format: Option<String>,
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    use capture_coordinator::backends::camera::V4l2Device;

    let config = Config::load()?;
    let format = match format {
        Some(name) => Some(
            PixelFormat::from_name(&name)
                .ok_or_else(|| AppError::Config(format!("unknown pixel format '{}'", name)))?,
        ),
        None => None,
    };
    let request = mode.resolve(&config, format)?;
    let path = device_path
        .or(config.device_path.clone())
        .unwrap_or_else(|| "/dev/video0".to_string());

    let device = V4l2Device::open(&path)?;
    println!("Using device: {}", path);

    let (sink, receiver) = ChannelSink::new(SINK_CHANNEL_CAPACITY);
    let sink = Arc::new(sink);
    let session = CaptureSession::builder(sink.clone())
        .device(Box::new(device))
        .pixel_format(request.pixel_format)
        .build();
    let consumer = spawn_consumer(receiver);

    // Headless: frames go to the sink only, so the target is ready immediately
    session.notify_surface_ready(RenderTarget::Surface(0))?;
    match session.request_start(request) {
        Ok(_) => println!("Capturing {} (press Ctrl+C to stop early)", request),
        Err(e) => {
            drop(session);
            drop(sink);
            let _ = consumer.join();
            return Err(Box::new(e));
        }
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let start = Instant::now();
    let target_duration = Duration::from_secs(duration);
    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        let elapsed = start.elapsed().as_secs();
        print!("\rCapturing: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;
        thread::sleep(Duration::from_millis(100));
    }
    println!();

    println!("Stop: {}", session.stop());
    let diagnostics = session.diagnostics();
    session.teardown()?;
    let channel_dropped = sink.dropped();
    drop(session);
    drop(sink);

    let stats = consumer
        .join()
        .map_err(|_| AppError::Other("consumer thread panicked".to_string()))?;
    print_report(&stats, &diagnostics, channel_dropped);

    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "v4l2")))]
pub fn capture(
    _device_path: Option<String>,
    _mode: ModeArgs,
    _format: Option<String>,
    _duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    Err(Box::new(AppError::Other(
        "built without V4L2 support".to_string(),
    )))
}

/// Print the persisted settings, optionally resetting them first
pub fn show_config(reset: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = if reset {
        let config = Config::default();
        let path = config.save()?;
        println!("Reset settings at {}", path.display());
        config
    } else {
        Config::load()?
    };

    match Config::path() {
        Some(path) => println!("Settings file: {}", path.display()),
        None => println!("Settings file: (no config directory)"),
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
