//! Serial transport abstraction.
//!
//! The session talks to the modem only through [`Transport`], and opens
//! transports only through a [`Connector`]. The serial implementation lives
//! in [`serial`]; [`mock`] provides a scripted stand-in.

pub mod mock;
pub mod serial;

pub use mock::{MockConnector, MockLink, MockTransport};
pub use serial::{SerialConnector, SerialTransport};

use crate::error::{Result, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Line-oriented channel to the modem
pub trait Transport: Send {
    /// Write raw bytes
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError>;

    /// Read one line, without its terminator.
    ///
    /// Returns `Ok(None)` when `timeout` passes without a complete line or
    /// when the read is aborted; a timeout is never an error.
    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, TransportError>;

    /// Release the channel. Later calls fail with [`TransportError::Closed`].
    fn close(&mut self) -> std::result::Result<(), TransportError>;

    /// Handle that makes a pending [`Transport::read_line`] return early
    fn abort_handle(&self) -> AbortHandle;
}

/// Opens transports and lists candidate ports
pub trait Connector: Send {
    fn list_ports(&self) -> Result<Vec<String>>;

    fn open(
        &mut self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> std::result::Result<Box<dyn Transport>, TransportError>;
}

/// Cross-thread request to abandon the current read
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the next or current read return without a line
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume a pending abort request
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}
