mod scan;

use anyhow::{Context, Result};
use clap::Parser;
use gpiow::log::LogLevel;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connection string, e.g. `pigpiod://raspberrypi/1`. Without one the
    /// first backend that finds a default bus is used.
    uri: Option<String>,

    /// error, warn, info, debug or verbose
    #[arg(long, default_value = "warn")]
    log_level: LogLevel,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    gpiow::log::install(cli.log_level)?;

    let registry = gpiow::initialize();
    let mut bus = registry.create_bus(cli.uri.as_deref()).with_context(|| {
        match &cli.uri {
            Some(uri) => format!("can't open {uri}"),
            None => "no backend found a default bus".to_owned(),
        }
    })?;
    info!(backend = bus.backend(), "scanning");

    let found = scan::scan(&mut bus, &mut std::io::stdout().lock())?;
    info!(devices = found.len(), "scan complete");
    bus.release()?;
    Ok(())
}
