//! Fixed-layout wire encoding for message envelopes.
//!
//! Layout: 1-byte type tag, length-prefixed sender id, 8-byte
//! millisecond timestamp, then a payload determined by the type tag.
//! Integers and floats are big-endian; strings are u16-length-prefixed
//! UTF-8.

use super::messages::{
    AlertData, AlertLevel, CommandData, Message, MessagePayload, MessageType, StatusResponseData,
};
use atc_core::models::{AircraftState, AircraftStatus};
use atc_core::{AtcError, Position, Velocity};

fn put_string(buf: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

fn put_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], AtcError> {
        if self.pos + n > self.buf.len() {
            return Err(AtcError::InvalidInput(format!(
                "truncated frame: need {n} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, AtcError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, AtcError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u64(&mut self) -> Result<u64, AtcError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    fn f64(&mut self) -> Result<f64, AtcError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(raw))
    }

    fn string(&mut self) -> Result<String, AtcError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| AtcError::InvalidInput("non-UTF-8 string field".into()))
    }

    fn finished(&self) -> bool {
        self.pos == self.buf.len()
    }
}

fn put_aircraft_state(buf: &mut Vec<u8>, state: &AircraftState) {
    put_string(buf, &state.callsign);
    put_f64(buf, state.position.x);
    put_f64(buf, state.position.y);
    put_f64(buf, state.position.z);
    put_f64(buf, state.velocity.vx);
    put_f64(buf, state.velocity.vy);
    put_f64(buf, state.velocity.vz);
    put_f64(buf, state.heading);
    buf.push(state.status.tag());
    put_u64(buf, state.timestamp_ms);
}

fn read_aircraft_state(reader: &mut Reader<'_>) -> Result<AircraftState, AtcError> {
    let callsign = reader.string()?;
    let position = Position::new(reader.f64()?, reader.f64()?, reader.f64()?);
    let velocity = Velocity::new(reader.f64()?, reader.f64()?, reader.f64()?);
    let heading = reader.f64()?;
    let status = AircraftStatus::from_tag(reader.u8()?)
        .ok_or_else(|| AtcError::InvalidInput("unknown aircraft status tag".into()))?;
    let timestamp_ms = reader.u64()?;

    Ok(AircraftState {
        callsign,
        position,
        velocity,
        heading,
        status,
        timestamp_ms,
    })
}

fn put_command(buf: &mut Vec<u8>, data: &CommandData) {
    put_string(buf, &data.target_id);
    put_string(buf, &data.command);
    let count = data.params.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&count.to_be_bytes());
    for param in data.params.iter().take(count as usize) {
        put_string(buf, param);
    }
}

fn read_command(reader: &mut Reader<'_>) -> Result<CommandData, AtcError> {
    let target_id = reader.string()?;
    let command = reader.string()?;
    let count = reader.u16()? as usize;
    let mut params = Vec::with_capacity(count);
    for _ in 0..count {
        params.push(reader.string()?);
    }
    Ok(CommandData {
        target_id,
        command,
        params,
    })
}

/// Encode a message into its wire frame.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.push(msg.message_type.tag());
    put_string(&mut buf, &msg.sender_id);
    put_u64(&mut buf, msg.timestamp_ms);

    match &msg.payload {
        MessagePayload::AircraftState(state) => put_aircraft_state(&mut buf, state),
        MessagePayload::Command(data) => put_command(&mut buf, data),
        MessagePayload::Alert(alert) => {
            buf.push(alert.level.tag());
            put_string(&mut buf, &alert.description);
            put_u64(&mut buf, alert.timestamp_ms);
        }
        MessagePayload::StatusResponse(status) => {
            put_string(&mut buf, &status.target_id);
            put_string(&mut buf, &status.status_text);
            put_u64(&mut buf, status.timestamp_ms);
        }
    }

    buf
}

/// Decode a wire frame back into a message.
pub fn decode(frame: &[u8]) -> Result<Message, AtcError> {
    let mut reader = Reader::new(frame);

    let message_type = MessageType::from_tag(reader.u8()?)
        .ok_or_else(|| AtcError::InvalidInput("unknown message type tag".into()))?;
    let sender_id = reader.string()?;
    let timestamp_ms = reader.u64()?;

    let payload = match message_type {
        MessageType::PositionUpdate => {
            MessagePayload::AircraftState(read_aircraft_state(&mut reader)?)
        }
        MessageType::Command | MessageType::StatusRequest | MessageType::OperatorInput => {
            MessagePayload::Command(read_command(&mut reader)?)
        }
        MessageType::Alert => {
            let level = AlertLevel::from_tag(reader.u8()?)
                .ok_or_else(|| AtcError::InvalidInput("unknown alert level tag".into()))?;
            let description = reader.string()?;
            let alert_ts = reader.u64()?;
            MessagePayload::Alert(AlertData {
                level,
                description,
                timestamp_ms: alert_ts,
            })
        }
        MessageType::StatusResponse | MessageType::OperatorResponse => {
            let target_id = reader.string()?;
            let status_text = reader.string()?;
            let status_ts = reader.u64()?;
            MessagePayload::StatusResponse(StatusResponseData {
                target_id,
                status_text,
                timestamp_ms: status_ts,
            })
        }
    };

    if !reader.finished() {
        return Err(AtcError::InvalidInput("trailing bytes in frame".into()));
    }

    Ok(Message {
        message_type,
        sender_id,
        timestamp_ms,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_update_survives_the_wire() {
        let state = AircraftState::new(
            "AC001",
            Position::new(12_345.5, 67_890.25, 19_500.0),
            Velocity::new(-300.0, 125.5, 2.0),
        );
        let msg = Message::position_update("RADAR", state);

        let decoded = decode(&encode(&msg)).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn command_with_params_survives_the_wire() {
        let data = CommandData::new("AC002", "HEADING").with_param("275.5");
        let msg = Message::command("SEPARATION", data);

        let decoded = decode(&encode(&msg)).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn alert_level_is_preserved() {
        let msg = Message::alert("SEPARATION", AlertLevel::Emergency, "loss of separation");
        let decoded = decode(&encode(&msg)).expect("decode");
        match decoded.payload {
            MessagePayload::Alert(alert) => assert_eq!(alert.level, AlertLevel::Emergency),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let msg = Message::alert("SEPARATION", AlertLevel::Warning, "conflict predicted");
        let frame = encode(&msg);
        let err = decode(&frame[..frame.len() - 3]).unwrap_err();
        assert!(matches!(err, AtcError::InvalidInput(_)));
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let msg = Message::alert("SEPARATION", AlertLevel::Warning, "x");
        let mut frame = encode(&msg);
        frame[0] = 99;
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let msg = Message::status_request("OPERATOR", "AC001");
        let mut frame = encode(&msg);
        frame.push(0);
        assert!(decode(&frame).is_err());
    }
}
