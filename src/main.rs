// SPDX-License-Identifier: GPL-3.0-only

use capture_coordinator::constants::APP_VERSION;
use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "capture-coordinator")]
#[command(about = "Preview capture lifecycle and frame delivery")]
#[command(version = APP_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices and their modes
    List,

    /// Stream from a synthetic device
    Simulate {
        /// Frame width (default from config)
        #[arg(long)]
        width: Option<u32>,

        /// Frame height (default from config)
        #[arg(long)]
        height: Option<u32>,

        /// Frame rate (default from config)
        #[arg(long)]
        fps: Option<u32>,

        /// Run time in seconds
        #[arg(short, long, default_value = "3")]
        duration: u64,

        /// Rotate the display by this many degrees halfway through
        #[arg(short, long)]
        rotate: Option<i32>,

        /// Report half-length frames to exercise size validation
        #[arg(long)]
        truncate: bool,
    },

    /// Stream from a V4L2 device
    Capture {
        /// Device node (default from config, then /dev/video0)
        #[arg(short = 'D', long)]
        device: Option<String>,

        /// Frame width (default from config)
        #[arg(long)]
        width: Option<u32>,

        /// Frame height (default from config)
        #[arg(long)]
        height: Option<u32>,

        /// Frame rate (default from config)
        #[arg(long)]
        fps: Option<u32>,

        /// Pixel format, e.g. YUYV or NV12 (default from config)
        #[arg(short, long)]
        format: Option<String>,

        /// Capture duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },

    /// Show or reset persisted settings
    Config {
        /// Overwrite the settings file with defaults
        #[arg(long)]
        reset: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=capture_coordinator=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cli::list_devices(),
        Commands::Simulate {
            width,
            height,
            fps,
            duration,
            rotate,
            truncate,
        } => cli::simulate(
            cli::ModeArgs { width, height, fps },
            duration,
            rotate,
            truncate,
        ),
        Commands::Capture {
            device,
            width,
            height,
            fps,
            format,
            duration,
        } => cli::capture(
            device,
            cli::ModeArgs { width, height, fps },
            format,
            duration,
        ),
        Commands::Config { reset } => cli::show_config(reset),
    }
}
