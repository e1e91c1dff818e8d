//! Temperature Monitor Example
//!
//! Polls the remote modem's temperature at a fixed interval and reports the
//! derived range metrics. Every sample is appended to the CSV file named in
//! the configuration.
//!
//! Usage:
//!   cargo run --example temperature_monitor -- /dev/ttyUSB0
//!   cargo run --example temperature_monitor -- /dev/ttyUSB0 uwave.toml
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example temperature_monitor -- COM3

use inquire::CustomType;
use log::{error, info};
use std::time::Duration;
use uwave_modem::{ModemConfig, Motion, Result, Session};

fn prompt_number(message: &str, default: u64) -> u64 {
    CustomType::<u64>::new(message)
        .with_default(default)
        .prompt()
        .unwrap_or(default)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let port_name = args.next();
    let config = match args.next() {
        Some(path) => ModemConfig::load(path)?,
        None => ModemConfig::default(),
    };

    let session = Session::with_serial(config)?;
    let port = session.connect(port_name.as_deref())?;
    info!("Monitoring remote temperature via {}", port);

    // Salinity reported by the device replaces the configured default
    session.device_info()?;

    let interval = prompt_number("Interval in seconds:", 5);
    let count = prompt_number("Number of readings:", 10);

    match session.monitor_remote_temperature(Duration::from_secs(interval), count as usize) {
        Ok(exchanges) => {
            for sample in exchanges.iter().flat_map(|e| e.samples.iter()) {
                let motion = match sample.motion() {
                    Motion::Receding => "moving away",
                    Motion::Approaching => "approaching",
                    Motion::Stationary => "stationary",
                };
                println!(
                    "{}  {:6.1}°C  slant {:8.2} m  horizontal {:8.2} m  {:+.3} m/s ({})",
                    sample.timestamp.format("%H:%M:%S"),
                    sample.value,
                    sample.slant_range,
                    sample.horizontal_distance,
                    sample.velocity,
                    motion
                );
            }
        }
        Err(e) => error!("Monitoring stopped: {}", e),
    }

    session.disconnect()
}
