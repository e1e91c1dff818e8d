//! Error types for uWave modem operations.

use thiserror::Error;

/// Result type alias for modem operations.
pub type Result<T> = std::result::Result<T, ModemError>;

/// Error types for modem communication.
#[derive(Error, Debug)]
pub enum ModemError {
    /// Serial port enumeration or configuration error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure on the serial link; the session is disconnected afterwards
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Log or metrics sink could not be written
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistError),

    /// Operation needs an open connection
    #[error("Not connected")]
    NotConnected,

    /// Port auto-selection found nothing to connect to
    #[error("No serial port available")]
    NoPortAvailable,

    /// Another command is already in flight on this session
    #[error("A command is already in flight")]
    Busy,

    /// Configuration value rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Errors raised at the serial I/O layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port could not be opened
    #[error("Failed to open {port}: {source}")]
    Open {
        /// Port that was being opened
        port: String,
        /// Underlying serial port error
        source: serialport::Error,
    },

    /// Writing a command failed
    #[error("Write failed: {0}")]
    Write(std::io::Error),

    /// Reading a line failed for a reason other than timeout
    #[error("Read failed: {0}")]
    Read(std::io::Error),

    /// The transport has already been closed
    #[error("Transport closed")]
    Closed,
}

/// Errors raised by a persistence sink.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Log file I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or write failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A field that was expected to be numeric (or otherwise typed) but wasn't.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid value for {field}: {value:?}")]
pub struct FieldError {
    /// Name of the offending field
    pub field: &'static str,
    /// Raw text found in the field
    pub value: String,
}

impl FieldError {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}
