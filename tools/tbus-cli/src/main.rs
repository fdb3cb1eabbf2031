//! T-Bus CLI tool
//!
//! A command-line interface for encoding T-Bus frames and driving an
//! NK-IPS from the shell.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tbus_core::{encode_crosspoint, CrosspointFrame, Level};
use tbus_driver::{
    Command, DeviceStatus, DispatchOutcome, DriverConfig, RouterDriver, RouterDriverBuilder,
    StatusUpdate, REGISTRATION,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tbus")]
#[command(about = "T-Bus CLI - Encode frames and control Ross NK-IPS routers")]
#[command(version)]
struct Cli {
    /// NK-IPS hostname or IP address
    #[arg(long, default_value = "localhost")]
    host: String,

    /// T-Bus TCP port
    #[arg(short, long, default_value_t = tbus_core::DEFAULT_PORT)]
    port: u16,

    /// NK-IPS bus address
    #[arg(short, long, default_value_t = tbus_core::DEFAULT_BUS_ADDRESS)]
    address: u8,

    /// JSON driver configuration; overrides host, port and address
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bytes of a crosspoint frame
    Encode {
        /// Level label or bitmask value (e.g. "SDI Video" or 2)
        level: Level,
        /// Destination (1-based)
        dst: u16,
        /// Source (1-based)
        src: u16,
    },

    /// Decode a crosspoint frame given as hex
    Decode {
        /// Frame bytes, e.g. 5041533200124e4b3200fe...
        hex: String,
    },

    /// Connect, take one crosspoint and disconnect
    Xpt {
        level: Level,
        dst: u16,
        src: u16,
        /// Seconds to wait for the connection
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },

    /// Hold a session open and print status changes
    Monitor,

    /// List routing levels
    Levels,

    /// Show driver registration info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Encode { level, dst, src } => {
            let frame = encode_crosspoint(cli.address, *level, *dst, *src)?;
            println!("{}", to_hex(&frame));
        }

        Commands::Decode { hex } => {
            let bytes = from_hex(hex)?;
            let frame = CrosspointFrame::decode(&bytes)?;
            println!("address {}: {}", frame.address, frame.command);
        }

        Commands::Xpt {
            level,
            dst,
            src,
            timeout,
        } => {
            let (driver, mut status) = connect(&cli)?;
            driver.start()?;

            tokio::time::timeout(Duration::from_secs(*timeout), wait_connected(&mut status))
                .await
                .context("timed out waiting for the router")??;

            let command = tbus_core::CrosspointCommand::new(*level, *dst, *src);
            match driver.dispatch(Command::DirectCrosspoint(command))? {
                DispatchOutcome::Sent(command) => println!("Sent {}", command),
                other => bail!("crosspoint not sent: {:?}", other),
            }

            driver.stop().await;
        }

        Commands::Monitor => {
            let (driver, mut status) = connect(&cli)?;
            driver.start()?;
            println!(
                "Holding session to {}... (Ctrl+C to stop)\n",
                driver.config().target()
            );

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    update = status.recv() => match update {
                        Some(update) => println!("{} {}", update.device_id, update.status),
                        None => break,
                    },
                }
            }

            driver.stop().await;
        }

        Commands::Levels => {
            for level in Level::ALL {
                println!("{:>4}  {}", level.bits(), level);
            }
        }

        Commands::Info => {
            println!("{}", serde_json::to_string_pretty(&REGISTRATION)?);
        }
    }

    Ok(())
}

/// Build a TCP driver from the command line, reporting status to a channel
fn connect(cli: &Cli) -> Result<(RouterDriver, mpsc::UnboundedReceiver<StatusUpdate>)> {
    let builder = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            RouterDriverBuilder::from_config(DriverConfig::from_json(&json)?)
        }
        None => RouterDriver::builder(&cli.host)
            .port(cli.port)
            .address(cli.address),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let driver = builder.status_sink(Arc::new(tx)).build()?;
    Ok((driver, rx))
}

async fn wait_connected(status: &mut mpsc::UnboundedReceiver<StatusUpdate>) -> Result<()> {
    while let Some(update) = status.recv().await {
        match update.status {
            DeviceStatus::Connected => return Ok(()),
            DeviceStatus::Error(e) => bail!("connection failed: {}", e),
            DeviceStatus::Closed => {}
        }
    }
    bail!("driver stopped")
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn from_hex(s: &str) -> Result<Vec<u8>> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if !s.is_ascii() || s.len() % 2 != 0 {
        bail!("expected an even number of hex digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).context("invalid hex"))
        .collect()
}
