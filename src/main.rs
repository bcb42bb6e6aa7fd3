// SPDX-License-Identifier: GPL-3.0-only

use camera_capture::backends::camera::{CameraBackendType, get_backend_for_type};
use camera_capture::config::EngineConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-capture")]
#[command(about = "Open a camera, grab frames and watch for disconnection")]
#[command(version)]
struct Cli {
    /// Capture backend to drive
    #[arg(long, value_enum, default_value_t = BackendArg::Virtual, global = true)]
    backend: BackendArg,

    /// Engine configuration file (default: ~/.config/camera-capture/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Built-in test-pattern devices
    Virtual,
    /// Video4Linux2 devices (needs the v4l2 feature)
    V4l2,
}

impl From<BackendArg> for CameraBackendType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Virtual => CameraBackendType::Virtual,
            BackendArg::V4l2 => CameraBackendType::V4l2,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras and their formats
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Open a camera and print its format catalog
    Formats {
        /// Camera index to use (from 'camera-capture list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Capture and report frame versions and FPS
    Watch {
        /// Camera index to use (from 'camera-capture list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Catalog index of the format to capture in (from 'formats')
        #[arg(short, long)]
        format: Option<usize>,

        /// Ask the grabber for RGB24 when the format allows it
        #[arg(long)]
        rgb24: bool,

        /// Stop after this many seconds (default: run until Ctrl+C)
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_capture=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load(),
    }
    .validated();
    let backend = get_backend_for_type(cli.backend.into(), config.frame_pump_buffers)?;

    match cli.command {
        Commands::List { json } => cli::list_devices(backend, json),
        Commands::Formats { device, json } => cli::show_formats(backend, config, device, json),
        Commands::Watch {
            device,
            format,
            rgb24,
            seconds,
        } => cli::watch(
            backend,
            config,
            cli::WatchOptions {
                device,
                format,
                rgb24,
                seconds,
            },
        ),
    }
}
