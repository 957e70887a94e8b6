//! Fan-out of tracker messages to peer outboxes
//!
//! Never blocks and never performs socket I/O: each frame is encoded once and
//! offered to every recipient's bounded queue. A full queue drops the frame
//! for that recipient only; a closed queue means the peer's connection is
//! already going away and its own teardown will evict it.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::registry::{Frame, Outbox, Recipient};
use crate::protocol::{encode, Message};

/// Outcome of a fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// Delivers encoded messages to outboxes
#[derive(Debug, Default, Clone, Copy)]
pub struct Broadcaster;

impl Broadcaster {
    pub fn new() -> Self {
        Self
    }

    /// Queue `message` for every recipient
    pub fn notify(&self, recipients: &[Recipient], message: &Message) -> Delivery {
        let mut delivery = Delivery::default();
        if recipients.is_empty() {
            return delivery;
        }

        let frame: Frame = Arc::from(encode(message));
        for recipient in recipients {
            match recipient.outbox.try_send(Arc::clone(&frame)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        conn = %recipient.id,
                        message = message.type_name(),
                        "Outbox full, dropping notification"
                    );
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        conn = %recipient.id,
                        message = message.type_name(),
                        "Outbox closed, skipping notification"
                    );
                    delivery.dropped += 1;
                }
            }
        }

        debug!(
            message = message.type_name(),
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "Notification fan-out"
        );
        delivery
    }

    /// Queue `message` for a single outbox, returning whether it was accepted
    pub fn send(&self, outbox: &Outbox, message: &Message) -> bool {
        let frame: Frame = Arc::from(encode(message));
        match outbox.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    message = message.type_name(),
                    closed = matches!(e, TrySendError::Closed(_)),
                    "Could not queue message"
                );
                false
            }
        }
    }
}
