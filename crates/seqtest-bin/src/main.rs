//! CLI Entry Point for the sequence tester
//!
//! Drives the tester devices without an acquisition engine:
//! - Listing the hub roster with kinds, capabilities and properties as
//!   JSON lines
//! - Running one sequence acquisition against the in-memory recording
//!   pipeline and printing every decoded frame as a JSON line
//!
//! # Usage
//!
//! ```bash
//! seqtest devices
//! seqtest run --camera TCamera-0 --count 5 --exposure 20
//! seqtest --config seqtest.toml --verbose run --camera TCamera-1 --count 3 --interval-ms 10
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use seqtest_core::capabilities::{Device, Sequenceable};
use seqtest_core::config::HarnessConfig;
use seqtest_core::encoding::DecodedFrame;
use seqtest_core::logging::{self, TracingConfig};
use seqtest_core::{Capability, DeviceKind, SettingLogger};
use seqtest_driver_tester::{DeviceContext, DeviceRegistry, RecordingPipeline};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "seqtest")]
#[command(about = "Drive simulated devices and decode the setting log from camera frames", long_about = None)]
struct Cli {
    /// Harness configuration file (TOML)
    #[arg(long, global = true, default_value = "seqtest.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the devices the hub installs
    Devices,

    /// Run one finite sequence acquisition and print the decoded frames
    Run(RunArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct RunArgs {
    /// Camera to acquire from
    #[arg(long, default_value = "TCamera-0")]
    camera: String,

    /// Number of frames
    #[arg(long, default_value_t = 5)]
    count: i64,

    /// Minimum delay between frames
    #[arg(long, default_value_t = 0.0)]
    interval_ms: f64,

    /// Treat a full image buffer as fatal instead of clearing it
    #[arg(long)]
    stop_on_overflow: bool,

    /// Exposure to set before starting, in milliseconds
    #[arg(long)]
    exposure: Option<f64>,
}

#[derive(Debug, Serialize)]
struct DeviceRow {
    name: String,
    kind: DeviceKind,
    capabilities: Vec<Capability>,
    properties: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HarnessConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let mut tracing_config = TracingConfig::from_harness_config(&config).map_err(|e| anyhow!(e))?;
    if cli.verbose {
        tracing_config.level = Level::DEBUG;
    }
    logging::init(tracing_config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Devices => {
            for row in list_devices(&config)? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
        Commands::Run(args) => {
            for frame in run_sequence(&config, &args)? {
                println!("{}", serde_json::to_string(&frame)?);
            }
        }
    }

    Ok(())
}

fn registry(config: &HarnessConfig, pipeline: Arc<RecordingPipeline>) -> DeviceRegistry {
    let context = DeviceContext::from_config(config, SettingLogger::shared(), pipeline);
    DeviceRegistry::with_tester_devices(context)
}

/// Detect the hub roster and describe each device.
fn list_devices(config: &HarnessConfig) -> Result<Vec<DeviceRow>> {
    let registry = registry(config, Arc::new(RecordingPipeline::new()));
    let hub = registry.create_device(DeviceKind::Hub.prefix())?;
    let hub = hub
        .as_hub()
        .ok_or_else(|| anyhow!("{} is not a hub", DeviceKind::Hub.prefix()))?;
    hub.detect_installed_devices()?;

    Ok(hub
        .installed_devices()
        .iter()
        .map(|device| DeviceRow {
            name: device.name().to_string(),
            kind: device.kind(),
            capabilities: device.capabilities().to_vec(),
            properties: device.as_settable().property_names(),
        })
        .collect())
}

/// Run one sequence to completion and decode what the pipeline received.
fn run_sequence(config: &HarnessConfig, args: &RunArgs) -> Result<Vec<DecodedFrame>> {
    let pipeline = Arc::new(RecordingPipeline::new());
    let registry = registry(config, pipeline.clone());
    let device = registry.create_device(&args.camera)?;
    let camera = device
        .as_camera()
        .ok_or_else(|| anyhow!("{} is not a camera", args.camera))?;

    camera.initialize()?;
    if let Some(exposure) = args.exposure {
        camera.set_exposure(exposure)?;
    }

    info!(camera = %args.camera, count = args.count, "Running sequence");
    camera.start_sequence_acquisition(args.count, args.interval_ms, args.stop_on_overflow)?;
    while !camera.capture_loop_exited() {
        thread::sleep(Duration::from_millis(1));
    }
    let outcome = camera.stop_sequence_acquisition();
    camera.shutdown()?;
    outcome.with_context(|| format!("Sequence on {} failed", args.camera))?;

    Ok(pipeline.decoded_frames(&args.camera)?)
}
