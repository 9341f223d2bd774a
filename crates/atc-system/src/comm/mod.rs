//! Message bus: typed envelopes, fixed-layout wire codec, bounded
//! in-process transport.

pub mod channel;
pub mod messages;
pub mod wire;

pub use channel::{message_channel, MessageBus, MessageReceiver, CHANNEL_CAPACITY};
pub use messages::{
    AlertData, AlertLevel, CommandData, Message, MessagePayload, MessageType, StatusResponseData,
};
