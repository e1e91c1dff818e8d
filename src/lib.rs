//! # uWave Modem Library
//!
//! A Rust library for driving uWave underwater acoustic modems over a serial
//! link. It frames NMEA-style commands, correlates the modem's replies with
//! the delayed replies of a remote station, and derives range metrics from
//! acoustic propagation time.
//!
//! ## Features
//!
//! - Checksummed command encoding and typed decoding of modem sentences
//! - Two-phase exchanges: primary acknowledgment, then remote-station reply
//! - Sound velocity (Mackenzie), slant range, horizontal distance and
//!   relative velocity from remote temperature readings
//! - Append-only TX/RX log and CSV metric rows
//!
//! ## Example
//!
//! ```no_run
//! use uwave_modem::{ModemConfig, RemoteCommandId, Session};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::with_serial(ModemConfig::default())?;
//!     session.connect(Some("/dev/ttyUSB0"))?;
//!     let exchange = session.remote_query(0, 0, RemoteCommandId::Temperature)?;
//!     for sample in &exchange.samples {
//!         println!("Slant range: {:.2} m", sample.slant_range);
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

pub use config::ModemConfig;
pub use error::{FieldError, ModemError, PersistError, Result, TransportError};
pub use metrics::MetricsEngine;
pub use persistence::{FileSink, MemorySink, PersistenceSink};
pub use protocol::{CommandExchange, Exchange, ExchangeSettings, ExchangeState};
pub use session::Session;
pub use transport::{AbortHandle, Connector, SerialConnector, Transport};
pub use types::*;
