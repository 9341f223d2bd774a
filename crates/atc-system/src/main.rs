//! ATC system driver: load aircraft, start the kernel, run until
//! shutdown.

use anyhow::{Context, Result};
use atc_system::{Config, Controller};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Air traffic control surveillance and separation kernel.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Aircraft ingest file (CSV: Time,ID,X,Y,Z,SpeedX,SpeedY,SpeedZ)
    aircraft_data_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("atc_system=info".parse()?),
        )
        .init();

    let args = Args::parse();
    tracing::info!("starting ATC system");

    let config = Config::from_env();
    let controller = Controller::new(config);

    controller
        .ingest_file(&args.aircraft_data_file)
        .with_context(|| {
            format!(
                "failed to load aircraft data from {}",
                args.aircraft_data_file.display()
            )
        })?;

    controller.start();
    controller.start_console();
    controller.run_until_shutdown().await;
    controller.shutdown().await;

    Ok(())
}
