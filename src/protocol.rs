use crate::codec;
use crate::config::ModemConfig;
use crate::constants::TAG_REMOTE_RESPONSE;
use crate::error::Result;
use crate::metrics::{slant_range, MetricsEngine};
use crate::persistence::{Direction, PersistenceSink};
use crate::transport::Transport;
use crate::types::*;
use chrono::{DateTime, Local};
use log::{debug, info, trace, warn};
use std::thread;
use std::time::Duration;

/// Timeouts and budgets bounding one exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeSettings {
    /// Timeout of every single line read
    pub line_timeout: Duration,
    /// Empty reads tolerated while waiting for a remote response
    pub max_followup_attempts: u32,
    /// Pause after each empty follow-up read
    pub followup_poll_interval: Duration,
}

impl From<&ModemConfig> for ExchangeSettings {
    fn from(config: &ModemConfig) -> Self {
        ExchangeSettings {
            line_timeout: config.line_timeout(),
            max_followup_attempts: config.max_followup_attempts,
            followup_poll_interval: config.followup_poll_interval(),
        }
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self::from(&ModemConfig::default())
    }
}

/// Where an exchange is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Sent,
    AwaitingPrimary,
    AwaitingFollowup { empty_reads: u32 },
    Done,
}

/// Everything one command produced
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub command: Command,
    pub sent_at: DateTime<Local>,
    /// First line after the command; `None` when nothing arrived in time
    pub primary: Option<Response>,
    /// Lines collected while waiting for a remote station
    pub additional: Vec<Response>,
    /// Metrics derived from temperature replies, already persisted
    pub samples: Vec<MetricSample>,
    /// The follow-up budget ran out before a remote response arrived
    pub followup_timed_out: bool,
}

impl Exchange {
    /// Decoded primary line, if one arrived
    pub fn primary_sentence(&self) -> Option<&Sentence> {
        self.primary.as_ref().map(|r| &r.sentence)
    }

    /// Decoded follow-up lines, in arrival order
    pub fn additional_sentences(&self) -> impl Iterator<Item = &Sentence> {
        self.additional.iter().map(|r| &r.sentence)
    }

    /// First remote response seen, primary line included
    pub fn remote_response(&self) -> Option<&RemoteResponse> {
        self.primary
            .iter()
            .chain(self.additional.iter())
            .find_map(|r| r.sentence.as_remote_response())
    }
}

/// One command in flight: write it, await the primary reply, then, for
/// remote commands, poll for the delayed remote-station reply.
pub struct CommandExchange<'a> {
    transport: &'a mut dyn Transport,
    engine: &'a mut MetricsEngine,
    sink: &'a mut dyn PersistenceSink,
    settings: ExchangeSettings,
    state: ExchangeState,
}

impl<'a> CommandExchange<'a> {
    /// Borrow the session state for one exchange
    pub fn new(
        transport: &'a mut dyn Transport,
        engine: &'a mut MetricsEngine,
        sink: &'a mut dyn PersistenceSink,
        settings: ExchangeSettings,
    ) -> Self {
        CommandExchange {
            transport,
            engine,
            sink,
            settings,
            state: ExchangeState::Idle,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn transition(&mut self, next: ExchangeState) {
        trace!("Exchange {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the exchange to completion.
    ///
    /// Timeouts are outcomes, not errors: a silent modem yields an
    /// [`Exchange`] with no primary and `followup_timed_out` set. Only
    /// transport and persistence failures are returned as errors.
    pub fn run(
        mut self,
        command: Command,
        wait_for_primary: bool,
        wait_for_followup: bool,
    ) -> Result<Exchange> {
        if self.transport.abort_handle().take() {
            debug!("Dropping abort request made while idle");
        }

        let sent_at = Local::now();
        debug!("Sending: {}", command);
        self.transport.write(&command.to_wire())?;
        self.sink.log_line(Direction::Tx, command.as_str(), sent_at)?;
        self.transition(ExchangeState::Sent);

        let mut exchange = Exchange {
            command,
            sent_at,
            primary: None,
            additional: Vec::new(),
            samples: Vec::new(),
            followup_timed_out: false,
        };

        if wait_for_primary {
            self.transition(ExchangeState::AwaitingPrimary);
            match self.read_line()? {
                Some(line) => {
                    debug!("Initial response: {}", line);
                    let response = self.receive(line, &mut exchange)?;
                    exchange.primary = Some(response);
                }
                None => warn!(
                    "No response to {} within {:?}",
                    exchange.command, self.settings.line_timeout
                ),
            }
        }

        let already_answered = exchange
            .primary
            .as_ref()
            .is_some_and(|r| r.sentence.is_remote_class());
        if wait_for_followup && exchange.command.is_remote() && !already_answered {
            self.await_followup(&mut exchange)?;
        }

        self.transition(ExchangeState::Done);
        Ok(exchange)
    }

    fn await_followup(&mut self, exchange: &mut Exchange) -> Result<()> {
        let mut empty_reads = 0;
        self.transition(ExchangeState::AwaitingFollowup { empty_reads });

        while empty_reads < self.settings.max_followup_attempts {
            match self.read_line()? {
                Some(line) => {
                    debug!("Additional response: {}", line);
                    let response = self.receive(line, exchange)?;
                    let done = response.sentence.is_remote_class();
                    exchange.additional.push(response);
                    if done {
                        return Ok(());
                    }
                }
                None => {
                    empty_reads += 1;
                    self.transition(ExchangeState::AwaitingFollowup { empty_reads });
                    if !self.settings.followup_poll_interval.is_zero() {
                        thread::sleep(self.settings.followup_poll_interval);
                    }
                }
            }
        }

        warn!(
            "No remote response to {} after {} empty reads",
            exchange.command, empty_reads
        );
        exchange.followup_timed_out = true;
        Ok(())
    }

    /// One bounded read; blank lines count as silence
    fn read_line(&mut self) -> Result<Option<String>> {
        let line = self.transport.read_line(self.settings.line_timeout)?;
        Ok(line.filter(|l| !l.trim().is_empty()))
    }

    /// Decode, log and act on one received line
    fn receive(&mut self, line: String, exchange: &mut Exchange) -> Result<Response> {
        let received_at = Local::now();
        self.sink.log_line(Direction::Rx, &line, received_at)?;

        let sentence = codec::decode(&line);
        match &sentence {
            Sentence::DeviceInfo(info) => {
                debug!("Applying device salinity {} PSU", info.salinity);
                self.engine.set_salinity(info.salinity);
            }
            Sentence::RemoteResponse(response) => {
                if let Some(sample) = self.derive_metrics(exchange, response) {
                    self.sink.append_metric(&sample)?;
                    exchange.samples.push(sample);
                }
            }
            Sentence::Malformed { reason, .. } => {
                warn!("Malformed sentence ({}): {}", reason, line)
            }
            Sentence::Unknown(_) => debug!("Unrecognised sentence: {}", line),
            _ => {}
        }

        Ok(Response {
            raw: line,
            sentence,
            received_at,
        })
    }

    /// Only temperature replies feed the metrics pipeline: the temperature
    /// is the one input sound velocity needs from the remote station.
    fn derive_metrics(
        &mut self,
        exchange: &Exchange,
        response: &RemoteResponse,
    ) -> Option<MetricSample> {
        if response.command_id != RemoteCommandId::Temperature {
            return None;
        }
        let temperature = response.value?;

        let sound_velocity = self.engine.sound_velocity(temperature);
        let slant = slant_range(response.propagation_time, sound_velocity);
        let horizontal = self.engine.horizontal_distance(slant);
        let velocity = self.engine.velocity(slant, Local::now());

        info!("Temperature: {:.1}°C", temperature);
        info!("Sound velocity: {:.1} m/s", sound_velocity);
        info!(
            "Propagation time: {:.2} ms",
            response.propagation_time.abs() * 1000.0
        );
        info!("Slant range: {:.2} m", slant);
        info!("Horizontal distance: {:.2} m", horizontal);

        let sample = MetricSample {
            timestamp: exchange.sent_at,
            command: exchange.command.as_str().to_string(),
            response_type: TAG_REMOTE_RESPONSE.to_string(),
            remote_address: response.remote_address,
            command_id: response.command_id,
            propagation_time: response.propagation_time,
            signal_quality: response.signal_quality,
            value: temperature,
            sound_velocity,
            slant_range: slant,
            horizontal_distance: horizontal,
            velocity,
        };

        match sample.motion() {
            Motion::Stationary => {}
            motion => info!("Relative velocity: {:.3} m/s ({:?})", velocity, motion),
        }

        Some(sample)
    }
}
