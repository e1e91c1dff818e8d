//! Protocol constants for uWave modem communication.
//!
//! This module defines the sentence framing characters, the sentence tags
//! understood by the codec, and the default serial and timing parameters.

use std::time::Duration;

/// Leading sentinel of every sentence
pub const SENTENCE_START: char = '$';

/// Separates the payload from the two-digit checksum
pub const CHECKSUM_DELIMITER: char = '*';

/// Field separator inside a sentence
pub const FIELD_SEPARATOR: char = ',';

/// Line terminator appended to every transmitted command
pub const LINE_TERMINATOR: &str = "\n";

/// Number of tag characters used for sentence dispatch
pub const TAG_LEN: usize = 5;

/// Device information reply
pub const TAG_DEVICE_INFO: &str = "PUWV!";

/// Packet mode settings reply
pub const TAG_PACKET_SETTINGS: &str = "PUWVE";

/// Remote station response
pub const TAG_REMOTE_RESPONSE: &str = "PUWV3";

/// Command acknowledgment
pub const TAG_ACK: &str = "PUWV0";

/// Remote command request
pub const TAG_REMOTE_REQUEST: &str = "PUWV2";

/// Device information query
pub const DEVICE_INFO_QUERY: &str = "$PUWV?,0";

/// Packet mode settings query
pub const PACKET_SETTINGS_QUERY: &str = "$PUWVD,0";

/// Minimum field count (tag included) of a device information reply
pub const DEVICE_INFO_FIELDS: usize = 13;

/// Minimum field count of a packet settings reply
pub const PACKET_SETTINGS_FIELDS: usize = 3;

/// Minimum field count of a remote response
pub const REMOTE_RESPONSE_FIELDS: usize = 6;

/// Minimum field count of an acknowledgment
pub const ACK_FIELDS: usize = 1;

/// Baud rate (9600 bps)
pub const BAUD_RATE: u32 = 9600;

/// Per-line read timeout in milliseconds
pub const LINE_TIMEOUT_MS: u64 = 8000;

/// Empty reads tolerated while waiting for a remote response
pub const MAX_FOLLOWUP_ATTEMPTS: u32 = 5;

/// Pause after an empty follow-up read
pub const FOLLOWUP_POLL_INTERVAL_MS: u64 = 200;

/// Granularity at which a blocking serial read checks for abort and deadline
pub const READ_SLICE: Duration = Duration::from_millis(100);

/// Default salinity in PSU until the device reports its own
pub const DEFAULT_SALINITY: f64 = 0.0;

/// Default modem depth in meters
pub const DEFAULT_DEPTH: f64 = 0.0;

/// Default communication log file
pub const LOG_FILE: &str = "uwave_log.txt";

/// Default metrics CSV file
pub const CSV_FILE: &str = "uwave_data.csv";

/// Timestamp layout shared by the log and the CSV rows
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Velocities below this magnitude (m/s) count as stationary
pub const STATIONARY_THRESHOLD: f64 = 0.001;
