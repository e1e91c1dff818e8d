use crate::constants::READ_SLICE;
use crate::error::{Result, TransportError};
use crate::transport::{AbortHandle, Connector, Transport};
use log::{debug, info, trace};
use serialport::{DataBits, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Transport over a real serial port
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
    abort: AbortHandle,
}

impl SerialTransport {
    /// Open `port_name` as 8N1 at `baud_rate`
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> std::result::Result<Self, TransportError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: port_name.to_string(),
                source,
            })?;

        info!("Connected to {} at {} baud", port_name, baud_rate);

        Ok(SerialTransport {
            name: port_name.to_string(),
            port: Some(port),
            pending: Vec::new(),
            abort: AbortHandle::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pop the first complete line out of the receive buffer.
    /// Non-ASCII bytes are dropped and surrounding whitespace trimmed.
    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: String = self
            .pending
            .drain(..=end)
            .filter(u8::is_ascii)
            .map(char::from)
            .collect();
        Some(line.trim().to_string())
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::Write(e.into()))?;
        self.pending.clear();
        port.write_all(bytes).map_err(TransportError::Write)?;
        port.flush().map_err(TransportError::Write)
    }

    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 64];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.abort.take() {
                debug!("Read on {} aborted", self.name);
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                trace!("No line from {} within {:?}", self.name, timeout);
                return Ok(None);
            }

            let port = self.port.as_mut().ok_or(TransportError::Closed)?;
            port.set_timeout((deadline - now).min(READ_SLICE))
                .map_err(|e| TransportError::Read(e.into()))?;

            match port.read(&mut chunk) {
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(TransportError::Read(e)),
            }
        }
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        if self.port.take().is_some() {
            info!("Disconnected from {}", self.name);
        }
        self.pending.clear();
        Ok(())
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

/// Opens [`SerialTransport`]s and lists USB serial adapters
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn list_ports(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        let mut usb_ports = Vec::new();

        for port in ports {
            match &port.port_type {
                SerialPortType::UsbPort(usb) => {
                    debug!(
                        "  * {} - {}",
                        port.port_name,
                        usb.product.as_deref().unwrap_or("USB serial")
                    );
                    usb_ports.push(port.port_name);
                }
                other => debug!("    {} - {:?}", port.port_name, other),
            }
        }

        Ok(usb_ports)
    }

    fn open(
        &mut self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> std::result::Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SerialTransport::open(port, baud_rate, timeout)?))
    }
}
