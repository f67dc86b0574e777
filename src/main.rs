//! `vmcd`: a small CLI around the VMC driver library. `serve` runs the
//! driver as a long-lived process; `dispense`/`check-aisle` are one-shot
//! diagnostic commands that open their own serial connection, issue a
//! single operation, print the JSON result, and exit.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vmc_driver::{Config, VendingMachineController};

#[derive(Parser)]
#[command(name = "vmcd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "VMC (Vending Machine Controller) protocol engine driver")]
struct Cli {
    /// Path to a JSON config file. Missing file falls back to defaults.
    #[arg(long, global = true, default_value = "vmc-config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the serial port and run the protocol engine until interrupted.
    Serve,
    /// Issue a single dispense against `aisle` and print the result.
    Dispense {
        /// Aisle number to vend (>= 1).
        aisle: u16,
        /// Bypass normal selection via DRIVE_AISLE_DIRECT.
        #[arg(long)]
        force: bool,
        /// Use the drop sensor when forcing (only meaningful with --force).
        #[arg(long)]
        drop_sensor: bool,
        /// Use the elevator when forcing (only meaningful with --force).
        #[arg(long)]
        elevator: bool,
        /// Completion timeout in seconds.
        #[arg(long, default_value_t = 30.0)]
        timeout_s: f64,
    },
    /// Issue a single aisle status check and print the result.
    CheckAisle {
        /// Aisle number to query (>= 1).
        aisle: u16,
        /// Completion timeout in seconds.
        #[arg(long, default_value_t = 10.0)]
        timeout_s: f64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("loading configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    match cli.command {
        Commands::Serve => runtime.block_on(serve(config)),
        Commands::Dispense { aisle, force, drop_sensor, elevator, timeout_s } => {
            runtime.block_on(dispense(config, aisle, force, drop_sensor, elevator, timeout_s))
        }
        Commands::CheckAisle { aisle, timeout_s } => runtime.block_on(check_aisle(config, aisle, timeout_s)),
    }
}

async fn serve(config: Config) -> Result<()> {
    let mut controller = VendingMachineController::new(config);
    controller.connect().context("opening serial port")?;
    let facade = controller.facade();

    log::info!("vmcd serving, health = {:?}", facade.health());
    loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        log::info!("health check: {:?}", facade.health());
    }
}

async fn dispense(config: Config, aisle: u16, force: bool, drop_sensor: bool, elevator: bool, timeout_s: f64) -> Result<()> {
    let mut controller = VendingMachineController::new(config);
    controller.connect().context("opening serial port")?;
    let facade = controller.facade();

    let response = facade
        .dispense(aisle, drop_sensor, elevator, force, Duration::from_secs_f64(timeout_s))
        .await
        .context("invalid aisle number")?;

    println!("{}", serde_json::to_string_pretty(&DispenseJson::from(response))?);
    controller.disconnect();
    Ok(())
}

async fn check_aisle(config: Config, aisle: u16, timeout_s: f64) -> Result<()> {
    let mut controller = VendingMachineController::new(config);
    controller.connect().context("opening serial port")?;
    let facade = controller.facade();

    let response = facade
        .check_aisle_status(aisle, Duration::from_secs_f64(timeout_s))
        .await
        .context("invalid aisle number")?;

    println!("{}", serde_json::to_string_pretty(&AisleStatusJson::from(response))?);
    controller.disconnect();
    Ok(())
}

#[derive(serde::Serialize)]
struct DispenseJson {
    success: bool,
    aisle: u16,
    status: String,
    message: String,
    transaction_id: String,
}

impl From<vmc_driver::DispenseResponse> for DispenseJson {
    fn from(r: vmc_driver::DispenseResponse) -> Self {
        Self {
            success: r.success,
            aisle: r.aisle,
            status: r.status.to_string(),
            message: r.message,
            transaction_id: r.transaction_id,
        }
    }
}

#[derive(serde::Serialize)]
struct AisleStatusJson {
    aisle: u16,
    status: String,
    message: String,
    transaction_id: String,
}

impl From<vmc_driver::AisleStatusResponse> for AisleStatusJson {
    fn from(r: vmc_driver::AisleStatusResponse) -> Self {
        Self {
            aisle: r.aisle,
            status: r.status.to_string(),
            message: r.message,
            transaction_id: r.transaction_id,
        }
    }
}
