use crate::codec;
use crate::config::ModemConfig;
use crate::error::{ModemError, Result};
use crate::metrics::{MetricsEngine, RangeHistory};
use crate::persistence::{FileSink, PersistenceSink};
use crate::protocol::{CommandExchange, Exchange, ExchangeSettings};
use crate::transport::{AbortHandle, Connector, SerialConnector, Transport};
use crate::types::*;
use log::{info, warn};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

struct Inner {
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    port: Option<String>,
    engine: MetricsEngine,
    sink: Box<dyn PersistenceSink>,
}

/// Connection to one modem.
///
/// Owns at most one open transport, the metrics engine with its range
/// history, and the persistence sink. Only one operation runs at a time:
/// a call made while another is in flight fails with [`ModemError::Busy`]
/// instead of waiting, so a `Session` can be shared between threads.
pub struct Session {
    config: ModemConfig,
    settings: ExchangeSettings,
    inner: Mutex<Inner>,
    abort: Mutex<Option<AbortHandle>>,
}

impl Session {
    /// Create a disconnected session
    pub fn new(
        config: ModemConfig,
        connector: Box<dyn Connector>,
        sink: Box<dyn PersistenceSink>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = MetricsEngine::new(
            config.salinity_psu,
            config.depth_m,
            config.depth_difference_m,
        );
        Ok(Session {
            settings: ExchangeSettings::from(&config),
            config,
            inner: Mutex::new(Inner {
                connector,
                transport: None,
                port: None,
                engine,
                sink,
            }),
            abort: Mutex::new(None),
        })
    }

    /// Session on real serial ports, persisting to the configured files
    pub fn with_serial(config: ModemConfig) -> Result<Self> {
        let sink = FileSink::open(&config.log_path, &config.csv_path)?;
        Self::new(config, Box::new(SerialConnector), Box::new(sink))
    }

    /// Configuration the session was built with
    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(ModemError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    fn abort_slot(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.abort.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Candidate ports, as reported by the connector
    pub fn list_ports(&self) -> Result<Vec<String>> {
        self.inner()?.connector.list_ports()
    }

    /// Open a transport and return the port name used.
    ///
    /// Without an explicit port the configured one is used, then the first
    /// listed port. Any previous transport is closed first and the range
    /// history starts fresh.
    pub fn connect(&self, port: Option<&str>) -> Result<String> {
        let mut inner = self.inner()?;

        let port = match port.map(str::to_string).or_else(|| self.config.port.clone()) {
            Some(port) => port,
            None => {
                let port = inner
                    .connector
                    .list_ports()?
                    .into_iter()
                    .next()
                    .ok_or(ModemError::NoPortAvailable)?;
                info!("Auto-selected port: {}", port);
                port
            }
        };

        self.close_transport(&mut inner);

        let transport = inner
            .connector
            .open(&port, self.config.baud_rate, self.settings.line_timeout)?;
        *self.abort_slot() = Some(transport.abort_handle());
        inner.transport = Some(transport);
        inner.port = Some(port.clone());
        inner.engine.reset_history();
        Ok(port)
    }

    /// Close the transport; does nothing when already disconnected
    pub fn disconnect(&self) -> Result<()> {
        let mut inner = self.inner()?;
        self.close_transport(&mut inner);
        Ok(())
    }

    fn close_transport(&self, inner: &mut Inner) {
        if let Some(mut transport) = inner.transport.take() {
            if let Err(e) = transport.close() {
                warn!("Error closing transport: {}", e);
            }
        }
        if let Some(port) = inner.port.take() {
            info!("Disconnected from {}", port);
        }
        *self.abort_slot() = None;
    }

    /// Whether a transport is open
    pub fn is_connected(&self) -> Result<bool> {
        Ok(self.inner()?.transport.is_some())
    }

    /// Name of the connected port
    pub fn port(&self) -> Result<Option<String>> {
        Ok(self.inner()?.port.clone())
    }

    /// Make the read currently blocking this session return early.
    /// Returns false when there is no open transport. A request made while
    /// no command is running is dropped when the next command starts.
    pub fn abort_pending_read(&self) -> bool {
        match self.abort_slot().as_ref() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Encode `text` and run it as one exchange
    pub fn send(
        &self,
        text: &str,
        add_checksum: bool,
        wait_for_primary: bool,
        wait_for_followup: bool,
    ) -> Result<Exchange> {
        self.send_command(
            codec::encode(text, add_checksum),
            wait_for_primary,
            wait_for_followup,
        )
    }

    /// Run one exchange.
    ///
    /// A transport failure closes the transport; the session must be
    /// reconnected before the next command.
    pub fn send_command(
        &self,
        command: Command,
        wait_for_primary: bool,
        wait_for_followup: bool,
    ) -> Result<Exchange> {
        let mut guard = self.inner()?;
        let inner = &mut *guard;
        let transport = inner.transport.as_mut().ok_or(ModemError::NotConnected)?;

        let result = CommandExchange::new(
            &mut **transport,
            &mut inner.engine,
            &mut *inner.sink,
            self.settings,
        )
        .run(command, wait_for_primary, wait_for_followup);

        if let Err(ModemError::Transport(e)) = &result {
            warn!("Transport failure, disconnecting: {}", e);
            self.close_transport(inner);
        }
        result
    }

    /// Query device information. The reported salinity becomes the
    /// salinity used for sound velocity.
    pub fn device_info(&self) -> Result<Option<DeviceInfo>> {
        let exchange = self.send_command(codec::device_info_query(), true, false)?;
        match exchange.primary.map(|r| r.sentence) {
            Some(Sentence::DeviceInfo(info)) => {
                info!("{}", Sentence::DeviceInfo(info.clone()));
                Ok(Some(info))
            }
            _ => Ok(None),
        }
    }

    /// Query packet mode settings
    pub fn packet_settings(&self) -> Result<Option<PacketSettings>> {
        let exchange = self.send_command(codec::packet_settings_query(), true, false)?;
        match exchange.primary.map(|r| r.sentence) {
            Some(Sentence::PacketSettings(settings)) => {
                info!("{}", Sentence::PacketSettings(settings.clone()));
                Ok(Some(settings))
            }
            _ => Ok(None),
        }
    }

    /// Ask a remote station for a reading and wait for its reply
    pub fn remote_query(
        &self,
        address: u16,
        sub_address: u16,
        command_id: RemoteCommandId,
    ) -> Result<Exchange> {
        info!("Requesting remote {}...", command_id.description());
        self.send_command(
            codec::remote_command(address, sub_address, command_id),
            true,
            true,
        )
    }

    /// Query remote temperature `count` times, `interval` apart
    pub fn monitor_remote_temperature(
        &self,
        interval: Duration,
        count: usize,
    ) -> Result<Vec<Exchange>> {
        info!(
            "Starting remote temperature monitoring ({} readings every {:?})",
            count, interval
        );
        let mut exchanges = Vec::with_capacity(count);
        for i in 0..count {
            info!("Reading {}/{}", i + 1, count);
            exchanges.push(self.remote_query(0, 0, RemoteCommandId::Temperature)?);
            if i + 1 < count {
                thread::sleep(interval);
            }
        }
        info!("Monitoring complete");
        Ok(exchanges)
    }

    /// Salinity currently used for sound velocity (PSU)
    pub fn salinity(&self) -> Result<f64> {
        Ok(self.inner()?.engine.salinity())
    }

    /// Override the salinity used for sound velocity (PSU)
    pub fn set_salinity(&self, salinity: f64) -> Result<()> {
        self.inner()?.engine.set_salinity(salinity);
        Ok(())
    }

    /// Last range and when it was measured
    pub fn range_history(&self) -> Result<Option<RangeHistory>> {
        Ok(self.inner()?.engine.history())
    }

    /// Forget the last range so the next temperature reply seeds velocity
    pub fn reset_range_history(&self) -> Result<()> {
        self.inner()?.engine.reset_history();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut transport) = inner.transport.take() {
            if let Err(e) = transport.close() {
                warn!("Error closing transport: {}", e);
            }
        }
    }
}
