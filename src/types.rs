use crate::constants::*;
use crate::error::FieldError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An encoded command ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    add_checksum: bool,
}

impl Command {
    pub(crate) fn from_parts(text: String, add_checksum: bool) -> Self {
        Self { text, add_checksum }
    }

    /// Full command text, checksum included when one was requested
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn add_checksum(&self) -> bool {
        self.add_checksum
    }

    /// Checksum carried after the delimiter, if any
    pub fn checksum(&self) -> Option<u8> {
        let (_, hex) = self.text.split_once(CHECKSUM_DELIMITER)?;
        u8::from_str_radix(hex.get(..2)?, 16).ok()
    }

    /// Five-character sentence tag following the sentinel
    pub fn tag(&self) -> Option<&str> {
        let body = self.text.strip_prefix(SENTENCE_START).unwrap_or(&self.text);
        body.get(..TAG_LEN)
    }

    /// Whether the command is relayed to a remote station
    pub fn is_remote(&self) -> bool {
        self.tag() == Some(TAG_REMOTE_REQUEST)
    }

    /// Bytes written to the serial line
    pub fn to_wire(&self) -> Vec<u8> {
        let mut bytes = self.text.clone().into_bytes();
        bytes.extend_from_slice(LINE_TERMINATOR.as_bytes());
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Command identifiers understood by a remote station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteCommandId {
    Ping,
    Depth,
    Temperature,
    Battery,
    Unknown(u8),
}

impl RemoteCommandId {
    pub fn code(self) -> u8 {
        match self {
            RemoteCommandId::Ping => 0,
            RemoteCommandId::Depth => 2,
            RemoteCommandId::Temperature => 3,
            RemoteCommandId::Battery => 4,
            RemoteCommandId::Unknown(code) => code,
        }
    }

    pub fn description(self) -> String {
        match self {
            RemoteCommandId::Ping => "Ping".to_string(),
            RemoteCommandId::Depth => "Depth".to_string(),
            RemoteCommandId::Temperature => "Temperature".to_string(),
            RemoteCommandId::Battery => "Battery Voltage".to_string(),
            RemoteCommandId::Unknown(code) => format!("Command {}", code),
        }
    }

    /// Unit of the value a remote station returns for this command
    pub fn unit(self) -> &'static str {
        match self {
            RemoteCommandId::Depth => "m",
            RemoteCommandId::Temperature => "°C",
            RemoteCommandId::Battery => "V",
            RemoteCommandId::Ping | RemoteCommandId::Unknown(_) => "",
        }
    }
}

impl From<u8> for RemoteCommandId {
    fn from(code: u8) -> Self {
        match code {
            0 => RemoteCommandId::Ping,
            2 => RemoteCommandId::Depth,
            3 => RemoteCommandId::Temperature,
            4 => RemoteCommandId::Battery,
            other => RemoteCommandId::Unknown(other),
        }
    }
}

/// Device information reply (`PUWV!`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub system_name: String,
    pub system_version: String,
    pub core_name: String,
    pub core_version: String,
    /// Acoustic baud rate (bit/s)
    pub baudrate: f64,
    pub rx_channel: u8,
    pub tx_channel: u8,
    pub max_channels: u8,
    /// Salinity configured on the device (PSU)
    pub salinity: f64,
    pub has_pressure_temp_sensor: bool,
    pub default_command_mode: bool,
}

/// Packet mode settings reply (`PUWVE`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketSettings {
    pub packet_mode_enabled: bool,
    pub local_address: u16,
}

/// Reply relayed from a remote station (`PUWV3`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub remote_address: u16,
    pub command_id: RemoteCommandId,
    /// Acoustic propagation time in seconds, sign as reported
    pub propagation_time: f64,
    /// Signal quality in dB
    pub signal_quality: f64,
    /// Reading whose meaning depends on `command_id`; `None` when empty
    pub value: Option<f64>,
    pub azimuth: Option<f64>,
}

/// Command acknowledgment (`PUWV0`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ack {
    /// Identifier of the acknowledged sentence
    pub sentence_id: Option<String>,
    pub error_code: Option<String>,
}

/// Why a line with a known tag could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub enum MalformedReason {
    /// Too few fields for the tag
    Incomplete {
        tag: &'static str,
        required: usize,
        found: usize,
    },
    /// A typed field failed to parse
    InvalidField(FieldError),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::Incomplete {
                tag,
                required,
                found,
            } => write!(f, "incomplete {}: {} of {} fields", tag, found, required),
            MalformedReason::InvalidField(err) => write!(f, "{}", err),
        }
    }
}

/// A decoded incoming line
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    DeviceInfo(DeviceInfo),
    PacketSettings(PacketSettings),
    RemoteResponse(RemoteResponse),
    Ack(Ack),
    /// Unrecognised tag; the original line is preserved exactly
    Unknown(String),
    Malformed { raw: String, reason: MalformedReason },
}

impl Sentence {
    pub fn as_remote_response(&self) -> Option<&RemoteResponse> {
        match self {
            Sentence::RemoteResponse(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_remote_response(&self) -> bool {
        self.as_remote_response().is_some()
    }

    /// Whether the line came from a remote station, decoded or not.
    /// A malformed `PUWV3` still ends the wait for the remote reply.
    pub fn is_remote_class(&self) -> bool {
        match self {
            Sentence::RemoteResponse(_) => true,
            Sentence::Malformed { raw, .. } => {
                let head = raw.trim_start();
                head.strip_prefix(SENTENCE_START)
                    .unwrap_or(head)
                    .starts_with(TAG_REMOTE_RESPONSE)
            }
            _ => false,
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentence::DeviceInfo(info) => write!(
                f,
                "Device Info: SN {}, System {} v{}, Core {} v{}, Baudrate {}, RX/TX Ch {}/{} (max {}), Salinity {} PSU, Pressure/Temp Sensor: {}, Command Mode by Default: {}",
                info.serial_number,
                info.system_name,
                info.system_version,
                info.core_name,
                info.core_version,
                info.baudrate,
                info.rx_channel,
                info.tx_channel,
                info.max_channels,
                info.salinity,
                yes_no(info.has_pressure_temp_sensor),
                yes_no(info.default_command_mode),
            ),
            Sentence::PacketSettings(settings) => write!(
                f,
                "Packet Mode Settings: Enabled: {}, Local Address: {}",
                yes_no(settings.packet_mode_enabled),
                settings.local_address
            ),
            Sentence::RemoteResponse(response) => {
                let value = match response.value {
                    Some(v) => format!("{}{}", v, response.command_id.unit()),
                    None => "N/A".to_string(),
                };
                write!(
                    f,
                    "Remote Response: {} from addr {}, Prop time {:.2}ms, Signal {}dB, Value: {}",
                    response.command_id.description(),
                    response.remote_address,
                    response.propagation_time.abs() * 1000.0,
                    response.signal_quality,
                    value
                )
            }
            Sentence::Ack(_) => f.write_str("Command Acknowledged"),
            Sentence::Unknown(raw) => write!(f, "Unrecognised sentence: {}", raw),
            Sentence::Malformed { raw, reason } => write!(f, "Malformed ({}): {}", reason, raw),
        }
    }
}

/// A line received during an exchange, kept next to its decoded form
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub raw: String,
    pub sentence: Sentence,
    pub received_at: DateTime<Local>,
}

/// Direction of relative motion implied by a velocity estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Motion {
    Receding,
    Approaching,
    Stationary,
}

/// Physical metrics derived from one remote temperature reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Local>,
    pub command: String,
    pub response_type: String,
    pub remote_address: u16,
    pub command_id: RemoteCommandId,
    pub propagation_time: f64,
    pub signal_quality: f64,
    /// Temperature reading the metrics were derived from (°C)
    pub value: f64,
    pub sound_velocity: f64,
    pub slant_range: f64,
    pub horizontal_distance: f64,
    pub velocity: f64,
}

impl MetricSample {
    pub fn motion(&self) -> Motion {
        if self.velocity.abs() <= STATIONARY_THRESHOLD {
            Motion::Stationary
        } else if self.velocity > 0.0 {
            Motion::Receding
        } else {
            Motion::Approaching
        }
    }
}
