//! Basic Usage Example
//!
//! This example demonstrates the core functionality of the uWave modem library:
//! - Listing and selecting serial ports
//! - Querying device information and packet mode settings
//! - Requesting ping, depth, temperature and battery readings from a remote modem
//!
//! Usage:
//!   cargo run --example basic_usage                  # Interactive mode
//!   cargo run --example basic_usage -- COM3          # Specify port
//!   cargo run --example basic_usage -- /dev/ttyUSB0
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example basic_usage
//!   RUST_LOG=info cargo run --example basic_usage

use inquire::Select;
use log::{info, warn};
use uwave_modem::{ModemConfig, ModemError, RemoteCommandId, Result, Session};

/// Interactive serial port selection using inquire
fn select_port(session: &Session) -> Result<String> {
    let ports = session.list_ports()?;

    if ports.is_empty() {
        return Err(ModemError::NoPortAvailable);
    }

    let selection = Select::new("Select a serial port:", ports)
        .prompt()
        .map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Selection cancelled: {}", e),
            )
        })?;

    Ok(selection)
}

fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let session = Session::with_serial(ModemConfig::default())?;

    // Get port name from command line argument or interactive selection
    let port_name = std::env::args()
        .nth(1)
        .map(Ok)
        .unwrap_or_else(|| select_port(&session))?;

    info!("Connecting to uWave modem on {}...", port_name);
    session.connect(Some(&port_name))?;

    info!("=== Local Modem ===");
    if session.device_info()?.is_none() {
        warn!("No device information received");
    }
    session.packet_settings()?;

    info!("=== Remote Modem ===");
    for command_id in [
        RemoteCommandId::Ping,
        RemoteCommandId::Depth,
        RemoteCommandId::Temperature,
        RemoteCommandId::Battery,
    ] {
        let exchange = session.remote_query(0, 0, command_id)?;
        match exchange.remote_response() {
            Some(response) => info!(
                "{}",
                uwave_modem::Sentence::RemoteResponse(response.clone())
            ),
            None => warn!("No reply from remote modem"),
        }
    }

    session.disconnect()?;
    info!("=== Basic Usage Complete ===");

    Ok(())
}
