//! Typed message envelopes for advisories, commands, and alerts.

use atc_core::models::AircraftState;
use chrono::Utc;

/// Envelope discriminant. Tags are part of the wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    PositionUpdate,
    Command,
    Alert,
    StatusRequest,
    StatusResponse,
    OperatorInput,
    OperatorResponse,
}

impl MessageType {
    pub fn tag(&self) -> u8 {
        match self {
            MessageType::PositionUpdate => 0,
            MessageType::Command => 1,
            MessageType::Alert => 2,
            MessageType::StatusRequest => 3,
            MessageType::StatusResponse => 4,
            MessageType::OperatorInput => 5,
            MessageType::OperatorResponse => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Option<MessageType> {
        match tag {
            0 => Some(MessageType::PositionUpdate),
            1 => Some(MessageType::Command),
            2 => Some(MessageType::Alert),
            3 => Some(MessageType::StatusRequest),
            4 => Some(MessageType::StatusResponse),
            5 => Some(MessageType::OperatorInput),
            6 => Some(MessageType::OperatorResponse),
            _ => None,
        }
    }
}

/// A command directed at one aircraft (or the system).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandData {
    pub target_id: String,
    pub command: String,
    pub params: Vec<String>,
}

impl CommandData {
    pub fn new(target_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            command: command.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// Alert severity. Tags are part of the wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    pub fn tag(&self) -> u8 {
        match self {
            AlertLevel::Info => 0,
            AlertLevel::Warning => 1,
            AlertLevel::Critical => 2,
            AlertLevel::Emergency => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<AlertLevel> {
        match tag {
            0 => Some(AlertLevel::Info),
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Critical),
            3 => Some(AlertLevel::Emergency),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertData {
    pub level: AlertLevel,
    pub description: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponseData {
    pub target_id: String,
    pub status_text: String,
    pub timestamp_ms: u64,
}

/// Payload union, discriminated by the envelope type.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    AircraftState(AircraftState),
    Command(CommandData),
    Alert(AlertData),
    StatusResponse(StatusResponseData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_type: MessageType,
    pub sender_id: String,
    pub timestamp_ms: u64,
    pub payload: MessagePayload,
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

impl Message {
    pub fn position_update(sender_id: impl Into<String>, state: AircraftState) -> Self {
        Self {
            message_type: MessageType::PositionUpdate,
            sender_id: sender_id.into(),
            timestamp_ms: now_ms(),
            payload: MessagePayload::AircraftState(state),
        }
    }

    pub fn command(sender_id: impl Into<String>, data: CommandData) -> Self {
        Self {
            message_type: MessageType::Command,
            sender_id: sender_id.into(),
            timestamp_ms: now_ms(),
            payload: MessagePayload::Command(data),
        }
    }

    pub fn alert(
        sender_id: impl Into<String>,
        level: AlertLevel,
        description: impl Into<String>,
    ) -> Self {
        let timestamp_ms = now_ms();
        Self {
            message_type: MessageType::Alert,
            sender_id: sender_id.into(),
            timestamp_ms,
            payload: MessagePayload::Alert(AlertData {
                level,
                description: description.into(),
                timestamp_ms,
            }),
        }
    }

    pub fn status_request(sender_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::StatusRequest,
            sender_id: sender_id.into(),
            timestamp_ms: now_ms(),
            payload: MessagePayload::Command(CommandData::new(target_id, "STATUS")),
        }
    }

    pub fn status_response(
        sender_id: impl Into<String>,
        target_id: impl Into<String>,
        status_text: impl Into<String>,
    ) -> Self {
        let timestamp_ms = now_ms();
        Self {
            message_type: MessageType::StatusResponse,
            sender_id: sender_id.into(),
            timestamp_ms,
            payload: MessagePayload::StatusResponse(StatusResponseData {
                target_id: target_id.into(),
                status_text: status_text.into(),
                timestamp_ms,
            }),
        }
    }

    pub fn operator_input(sender_id: impl Into<String>, data: CommandData) -> Self {
        Self {
            message_type: MessageType::OperatorInput,
            sender_id: sender_id.into(),
            timestamp_ms: now_ms(),
            payload: MessagePayload::Command(data),
        }
    }

    pub fn operator_response(
        sender_id: impl Into<String>,
        target_id: impl Into<String>,
        status_text: impl Into<String>,
    ) -> Self {
        let mut msg = Self::status_response(sender_id, target_id, status_text);
        msg.message_type = MessageType::OperatorResponse;
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_tags_round_trip() {
        for tag in 0..=6u8 {
            let mt = MessageType::from_tag(tag).expect("valid tag");
            assert_eq!(mt.tag(), tag);
        }
        assert_eq!(MessageType::from_tag(7), None);
    }

    #[test]
    fn alert_constructor_stamps_payload_and_envelope_together() {
        let msg = Message::alert("SEPARATION", AlertLevel::Critical, "conflict");
        match &msg.payload {
            MessagePayload::Alert(alert) => {
                assert_eq!(alert.timestamp_ms, msg.timestamp_ms);
                assert_eq!(alert.level, AlertLevel::Critical);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn command_builder_collects_params() {
        let data = CommandData::new("AC001", "ALTITUDE").with_param("19000");
        assert_eq!(data.params, vec!["19000"]);
        let msg = Message::command("OPERATOR", data);
        assert_eq!(msg.message_type, MessageType::Command);
    }
}
