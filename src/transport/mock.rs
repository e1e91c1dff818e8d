//! Scripted transport for testing and development.
//!
//! A [`MockLink`] holds the script of what the "modem" will answer and
//! records everything written to it. Transports and connectors built from
//! the same link share that state, so a test can keep the link and inspect
//! it after handing the transport to a session.

use crate::error::{Result, TransportError};
use crate::transport::{AbortHandle, Connector, Transport};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// One scripted answer to a `read_line` call
#[derive(Debug, Clone)]
enum Reply {
    Line(String),
    Silence,
    /// Block until aborted or the read timeout expires
    Stall,
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<Reply>,
    written: Vec<String>,
    opened: Vec<(String, u32)>,
    reads: usize,
    closed: bool,
    fail_writes: bool,
    fail_open: bool,
}

/// Shared script and recording for mock transports
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    abort: AbortHandle,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a line for a future read
    pub fn push_line(&self, line: impl Into<String>) {
        self.state().script.push_back(Reply::Line(line.into()));
    }

    /// Queue a read that times out
    pub fn push_silence(&self) {
        self.state().script.push_back(Reply::Silence);
    }

    /// Queue a read that blocks until aborted or timed out
    pub fn push_stall(&self) {
        self.state().script.push_back(Reply::Stall);
    }

    /// Queue a read that fails at the I/O layer
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.state().script.push_back(Reply::Error(kind));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Everything written so far, one entry per write
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    /// Ports opened through a connector on this link
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.state().opened.clone()
    }

    /// Number of `read_line` calls made so far
    pub fn reads(&self) -> usize {
        self.state().reads
    }

    /// Scripted replies not yet consumed
    pub fn remaining(&self) -> usize {
        self.state().script.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn transport(&self) -> MockTransport {
        self.state().closed = false;
        MockTransport { link: self.clone() }
    }
}

/// Transport answering from a [`MockLink`] script
#[derive(Debug)]
pub struct MockTransport {
    link: MockLink,
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        let mut state = self.link.state();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_writes {
            return Err(TransportError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        state.written.push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, TransportError> {
        let reply = {
            let mut state = self.link.state();
            if state.closed {
                return Err(TransportError::Closed);
            }
            state.reads += 1;
            // nothing buffered yet, so a pending abort wins over the next reply
            if self.link.abort.take() {
                return Ok(None);
            }
            state.script.pop_front().unwrap_or(Reply::Silence)
        };

        match reply {
            Reply::Line(line) => Ok(Some(line)),
            Reply::Silence => Ok(None),
            Reply::Error(kind) => Err(TransportError::Read(io::Error::new(
                kind,
                "scripted read failure",
            ))),
            Reply::Stall => {
                let started = Instant::now();
                while started.elapsed() < timeout {
                    if self.link.abort.take() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.link.state().closed = true;
        Ok(())
    }

    fn abort_handle(&self) -> AbortHandle {
        self.link.abort.clone()
    }
}

/// Connector handing out [`MockTransport`]s for a fixed port list
#[derive(Debug, Clone)]
pub struct MockConnector {
    link: MockLink,
    ports: Vec<String>,
}

impl MockConnector {
    pub fn new(link: MockLink, ports: Vec<String>) -> Self {
        Self { link, ports }
    }
}

impl Connector for MockConnector {
    fn list_ports(&self) -> Result<Vec<String>> {
        Ok(self.ports.clone())
    }

    fn open(
        &mut self,
        port: &str,
        baud_rate: u32,
        _timeout: Duration,
    ) -> std::result::Result<Box<dyn Transport>, TransportError> {
        if self.link.state().fail_open {
            return Err(TransportError::Open {
                port: port.to_string(),
                source: serialport::Error::new(
                    serialport::ErrorKind::NoDevice,
                    "scripted open failure",
                ),
            });
        }
        self.link
            .state()
            .opened
            .push((port.to_string(), baud_rate));
        Ok(Box::new(self.link.transport()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_in_order() {
        let link = MockLink::new();
        link.push_line("$PUWV0");
        link.push_silence();
        let mut transport = link.transport();

        let timeout = Duration::from_millis(10);
        assert_eq!(transport.read_line(timeout).unwrap().as_deref(), Some("$PUWV0"));
        assert_eq!(transport.read_line(timeout).unwrap(), None);
        assert_eq!(transport.read_line(timeout).unwrap(), None);
        assert_eq!(link.reads(), 3);
    }

    #[test]
    fn records_writes_and_close() {
        let link = MockLink::new();
        let mut transport = link.transport();
        transport.write(b"$PUWV?,0*27\n").unwrap();
        assert_eq!(link.written(), vec!["$PUWV?,0*27\n".to_string()]);

        transport.close().unwrap();
        assert!(link.is_closed());
        assert!(matches!(transport.write(b"x"), Err(TransportError::Closed)));
    }

    #[test]
    fn aborted_read_keeps_queued_line() {
        let link = MockLink::new();
        link.push_line("$PUWV0,2,0");
        let mut transport = link.transport();
        transport.abort_handle().abort();

        let timeout = Duration::from_millis(10);
        assert_eq!(transport.read_line(timeout).unwrap(), None);
        assert_eq!(link.remaining(), 1);
        assert_eq!(
            transport.read_line(timeout).unwrap().as_deref(),
            Some("$PUWV0,2,0")
        );
    }

    #[test]
    fn stall_ends_on_abort() {
        let link = MockLink::new();
        link.push_stall();
        let mut transport = link.transport();
        let handle = transport.abort_handle();
        let aborter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.abort();
        });

        let started = Instant::now();
        assert_eq!(transport.read_line(Duration::from_secs(5)).unwrap(), None);
        assert!(started.elapsed() < Duration::from_secs(5));
        aborter.join().unwrap();
    }
}
