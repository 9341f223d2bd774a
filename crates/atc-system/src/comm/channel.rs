//! In-process message transport.
//!
//! Components exchange encoded frames over a bounded queue; the bus
//! never blocks a periodic cycle. A full queue surfaces as
//! `ResourceExhaustion` to the sender and the message is dropped.

use super::messages::Message;
use super::wire;
use atc_core::AtcError;
use tokio::sync::mpsc;

/// Maximum queued frames before senders are refused.
pub const CHANNEL_CAPACITY: usize = 100;

/// Cloneable sending half.
#[derive(Clone)]
pub struct MessageBus {
    tx: mpsc::Sender<Vec<u8>>,
}

impl MessageBus {
    /// Encode and enqueue a message without blocking.
    pub fn send(&self, msg: &Message) -> Result<(), AtcError> {
        let frame = wire::encode(msg);
        self.tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                AtcError::ResourceExhaustion(format!("message queue full ({CHANNEL_CAPACITY})"))
            }
            mpsc::error::TrySendError::Closed(_) => {
                AtcError::TransientIo("message channel closed".into())
            }
        })
    }
}

/// Receiving half, held by the controller's message pump.
pub struct MessageReceiver {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl MessageReceiver {
    /// Await the next frame and decode it. `None` once all senders are
    /// gone.
    pub async fn recv(&mut self) -> Option<Result<Message, AtcError>> {
        let frame = self.rx.recv().await?;
        Some(wire::decode(&frame))
    }

    /// Drain without waiting; used in tests and shutdown.
    pub fn try_recv(&mut self) -> Option<Result<Message, AtcError>> {
        self.rx.try_recv().ok().map(|frame| wire::decode(&frame))
    }
}

/// Create a connected bus/receiver pair.
pub fn message_channel() -> (MessageBus, MessageReceiver) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (MessageBus { tx }, MessageReceiver { rx })
}
