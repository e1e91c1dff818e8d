//! Sentence encoding and decoding.
//!
//! Outgoing commands follow `$<TAG><,field>*<XX>`, where `XX` is the XOR of
//! every character between the `$` sentinel and the `*` delimiter, written
//! as two uppercase hex digits. Incoming lines are split on commas and
//! dispatched on their five-character tag.
//!
//! The checksum of an incoming line is discarded, not verified: the modem is
//! the only other party on a point-to-point serial line.

use crate::constants::*;
use crate::error::FieldError;
use crate::types::*;
use std::str::FromStr;

/// XOR of the payload's character codes, truncated to eight bits
pub fn checksum(payload: &str) -> u8 {
    payload.chars().fold(0u8, |acc, c| acc ^ (c as u32 as u8))
}

/// Build a command from raw text.
///
/// Text that already carries a checksum delimiter is kept verbatim. Otherwise
/// the sentinel is prefixed when missing and, if requested, the checksum is
/// appended.
pub fn encode(text: &str, add_checksum: bool) -> Command {
    if text.contains(CHECKSUM_DELIMITER) {
        return Command::from_parts(text.to_string(), add_checksum);
    }

    let payload = text.strip_prefix(SENTENCE_START).unwrap_or(text);
    let mut encoded = String::with_capacity(payload.len() + 4);
    encoded.push(SENTENCE_START);
    encoded.push_str(payload);
    if add_checksum {
        encoded.push(CHECKSUM_DELIMITER);
        encoded.push_str(&format!("{:02X}", checksum(payload)));
    }
    Command::from_parts(encoded, add_checksum)
}

/// Device information query
pub fn device_info_query() -> Command {
    encode(DEVICE_INFO_QUERY, true)
}

/// Packet mode settings query
pub fn packet_settings_query() -> Command {
    encode(PACKET_SETTINGS_QUERY, true)
}

/// Command relayed to a remote station
pub fn remote_command(address: u16, sub_address: u16, command_id: RemoteCommandId) -> Command {
    encode(
        &format!(
            "{}{},{},{},{}",
            SENTENCE_START,
            TAG_REMOTE_REQUEST,
            address,
            sub_address,
            command_id.code()
        ),
        true,
    )
}

/// Decode one received line. Never fails: lines that cannot be typed come
/// back as [`Sentence::Unknown`] or [`Sentence::Malformed`].
pub fn decode(line: &str) -> Sentence {
    let body = match line.split_once(CHECKSUM_DELIMITER) {
        Some((body, _)) => body,
        None => line,
    };
    let fields: Vec<&str> = body.split(FIELD_SEPARATOR).map(str::trim).collect();

    let head = fields[0].strip_prefix(SENTENCE_START).unwrap_or(fields[0]);
    let tag = match head.get(..TAG_LEN) {
        Some(tag) => tag,
        None => return Sentence::Unknown(line.to_string()),
    };

    let (tag, required) = match tag {
        TAG_DEVICE_INFO => (TAG_DEVICE_INFO, DEVICE_INFO_FIELDS),
        TAG_PACKET_SETTINGS => (TAG_PACKET_SETTINGS, PACKET_SETTINGS_FIELDS),
        TAG_REMOTE_RESPONSE => (TAG_REMOTE_RESPONSE, REMOTE_RESPONSE_FIELDS),
        TAG_ACK => (TAG_ACK, ACK_FIELDS),
        _ => return Sentence::Unknown(line.to_string()),
    };

    if fields.len() < required {
        return Sentence::Malformed {
            raw: line.to_string(),
            reason: MalformedReason::Incomplete {
                tag,
                required,
                found: fields.len(),
            },
        };
    }

    let decoded = match tag {
        TAG_DEVICE_INFO => decode_device_info(&fields).map(Sentence::DeviceInfo),
        TAG_PACKET_SETTINGS => decode_packet_settings(&fields).map(Sentence::PacketSettings),
        TAG_REMOTE_RESPONSE => decode_remote_response(&fields).map(Sentence::RemoteResponse),
        _ => Ok(Sentence::Ack(decode_ack(&fields))),
    };

    decoded.unwrap_or_else(|err| Sentence::Malformed {
        raw: line.to_string(),
        reason: MalformedReason::InvalidField(err),
    })
}

fn parse<T: FromStr>(value: &str, field: &'static str) -> Result<T, FieldError> {
    value.parse().map_err(|_| FieldError::new(field, value))
}

fn parse_optional(
    fields: &[&str],
    index: usize,
    field: &'static str,
) -> Result<Option<f64>, FieldError> {
    match fields.get(index) {
        Some(value) if !value.is_empty() => parse(value, field).map(Some),
        _ => Ok(None),
    }
}

fn parse_flag(value: &str, field: &'static str) -> Result<bool, FieldError> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(FieldError::new(field, value)),
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn decode_device_info(fields: &[&str]) -> Result<DeviceInfo, FieldError> {
    Ok(DeviceInfo {
        serial_number: fields[1].to_string(),
        system_name: fields[2].to_string(),
        system_version: fields[3].to_string(),
        core_name: fields[4].to_string(),
        core_version: fields[5].to_string(),
        baudrate: parse(fields[6], "baudrate")?,
        rx_channel: parse(fields[7], "rx_channel")?,
        tx_channel: parse(fields[8], "tx_channel")?,
        max_channels: parse(fields[9], "max_channels")?,
        salinity: parse(fields[10], "salinity")?,
        has_pressure_temp_sensor: parse_flag(fields[11], "has_pressure_temp_sensor")?,
        default_command_mode: parse_flag(fields[12], "default_command_mode")?,
    })
}

fn decode_packet_settings(fields: &[&str]) -> Result<PacketSettings, FieldError> {
    Ok(PacketSettings {
        packet_mode_enabled: parse_flag(fields[1], "packet_mode_enabled")?,
        local_address: parse(fields[2], "local_address")?,
    })
}

fn decode_remote_response(fields: &[&str]) -> Result<RemoteResponse, FieldError> {
    let code: u8 = parse(fields[2], "command_id")?;
    Ok(RemoteResponse {
        remote_address: parse(fields[1], "remote_address")?,
        command_id: RemoteCommandId::from(code),
        propagation_time: parse(fields[3], "propagation_time")?,
        signal_quality: parse(fields[4], "signal_quality")?,
        value: parse_optional(fields, 5, "value")?,
        azimuth: parse_optional(fields, 6, "azimuth")?,
    })
}

fn decode_ack(fields: &[&str]) -> Ack {
    Ack {
        sentence_id: fields.get(1).and_then(|v| non_empty(v)),
        error_code: fields.get(2).and_then(|v| non_empty(v)),
    }
}

/// Checksum carried by a line, if it has a well-formed one
pub fn decode_checksum(line: &str) -> Option<u8> {
    let (_, hex) = line.split_once(CHECKSUM_DELIMITER)?;
    let hex = hex.trim_end();
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_query_checksum() {
        assert_eq!(checksum("PUWV?,0"), 0x27);
        let command = encode("PUWV?,0", true);
        assert_eq!(command.as_str(), "$PUWV?,0*27");
        assert_eq!(device_info_query().as_str(), "$PUWV?,0*27");
        assert_eq!(decode_checksum(command.as_str()), Some(0x27));
        assert_eq!(command.checksum(), Some(0x27));
    }

    #[test]
    fn checksum_survives_encoding() {
        for payload in ["PUWVD,0", "PUWV2,0,0,3", "PUWV2,1,0,0", "X"] {
            let command = encode(payload, true);
            assert_eq!(decode_checksum(command.as_str()), Some(checksum(payload)));
        }
    }

    #[test]
    fn existing_checksum_left_alone() {
        let command = encode("$PUWV?,0*FF", true);
        assert_eq!(command.as_str(), "$PUWV?,0*FF");
    }

    #[test]
    fn checksum_can_be_skipped() {
        assert_eq!(encode("$PUWVD,0", false).as_str(), "$PUWVD,0");
    }

    #[test]
    fn remote_command_is_remote() {
        let command = remote_command(0, 0, RemoteCommandId::Temperature);
        assert!(command.as_str().starts_with("$PUWV2,0,0,3*"));
        assert!(command.is_remote());
        assert!(!device_info_query().is_remote());
        assert_eq!(command.to_wire().last(), Some(&b'\n'));
    }

    #[test]
    fn decodes_device_info() {
        let sentence =
            decode("$PUWV!,0012345,uWave,1.2,uCore,3.4,80.0,1,2,12,35.0,1,0*5A");
        let Sentence::DeviceInfo(info) = sentence else {
            panic!("expected device info");
        };
        assert_eq!(info.serial_number, "0012345");
        assert_eq!(info.system_name, "uWave");
        assert_eq!(info.core_version, "3.4");
        assert_eq!(info.baudrate, 80.0);
        assert_eq!((info.rx_channel, info.tx_channel, info.max_channels), (1, 2, 12));
        assert_eq!(info.salinity, 35.0);
        assert!(info.has_pressure_temp_sensor);
        assert!(!info.default_command_mode);
    }

    #[test]
    fn short_device_info_is_malformed() {
        let line = "$PUWV!,0012345,uWave,1.2";
        match decode(line) {
            Sentence::Malformed { raw, reason } => {
                assert_eq!(raw, line);
                assert_eq!(
                    reason,
                    MalformedReason::Incomplete {
                        tag: TAG_DEVICE_INFO,
                        required: 13,
                        found: 4
                    }
                );
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn decodes_packet_settings() {
        assert_eq!(
            decode("$PUWVE,1,7*00"),
            Sentence::PacketSettings(PacketSettings {
                packet_mode_enabled: true,
                local_address: 7
            })
        );
    }

    #[test]
    fn decodes_remote_response_with_optional_azimuth() {
        let Sentence::RemoteResponse(response) = decode("$PUWV3,0,3,0.01,21.5,20.0,187.5*3C")
        else {
            panic!("expected remote response");
        };
        assert_eq!(response.command_id, RemoteCommandId::Temperature);
        assert_eq!(response.propagation_time, 0.01);
        assert_eq!(response.signal_quality, 21.5);
        assert_eq!(response.value, Some(20.0));
        assert_eq!(response.azimuth, Some(187.5));

        let Sentence::RemoteResponse(response) = decode("$PUWV3,0,0,-0.02,18,") else {
            panic!("expected remote response");
        };
        assert_eq!(response.command_id, RemoteCommandId::Ping);
        assert_eq!(response.value, None);
        assert_eq!(response.azimuth, None);
    }

    #[test]
    fn short_remote_response_is_malformed() {
        assert!(matches!(
            decode("$PUWV3,0,3,0.01,21.5*11"),
            Sentence::Malformed {
                reason: MalformedReason::Incomplete { found: 5, .. },
                ..
            }
        ));
    }

    #[test]
    fn non_numeric_field_names_the_field() {
        let line = "$PUWV3,0,3,soon,21.5,20.0";
        match decode(line) {
            Sentence::Malformed {
                raw,
                reason: MalformedReason::InvalidField(err),
            } => {
                assert_eq!(raw, line);
                assert_eq!(err, FieldError::new("propagation_time", "soon"));
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn ack_fields_are_optional() {
        assert_eq!(decode("$PUWV0*23"), Sentence::Ack(Ack::default()));
        assert_eq!(
            decode("$PUWV0,2,0*15"),
            Sentence::Ack(Ack {
                sentence_id: Some("2".to_string()),
                error_code: Some("0".to_string()),
            })
        );
    }

    #[test]
    fn unknown_tag_preserves_text() {
        let line = "$GPGGA,123519,4807.038,N*47";
        assert_eq!(decode(line), Sentence::Unknown(line.to_string()));
        assert_eq!(decode("$PU"), Sentence::Unknown("$PU".to_string()));
        assert_eq!(decode(""), Sentence::Unknown(String::new()));
    }
}
