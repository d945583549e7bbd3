//! Broadcast gateway used by match sessions to reach participants.
//!
//! A session never talks to sockets directly. After every state-changing
//! event it hands a serialized snapshot to a [`BroadcastGateway`], which
//! fans it out to the match's subscribers. Delivery is fire-and-forget:
//! errors are reported back to the caller, never retried here.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::{game::entities::UserId, net::messages::OpCode};

/// Errors raised while broadcasting.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Snapshot could not be serialized
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Some recipients could not take the message right now
    #[error("{dropped} recipient(s) could not be reached")]
    Undeliverable { dropped: usize },
}

/// One message on its way to a participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub op_code: OpCode,
    pub payload: Arc<[u8]>,
    pub reliable: bool,
}

impl Outbound {
    /// Payload as UTF-8 text. All engine payloads are JSON.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Push side of the fixed opcode protocol.
pub trait BroadcastGateway: Send {
    /// Deliver `payload` to `recipients`, or to every participant when
    /// `recipients` is `None`.
    fn broadcast_message(
        &mut self,
        op_code: OpCode,
        payload: &[u8],
        recipients: Option<&[UserId]>,
        reliable: bool,
    ) -> Result<(), GatewayError>;
}

/// In-memory gateway keyed by user id, one bounded channel per
/// subscriber.
#[derive(Debug, Default)]
pub struct SubscriberGateway {
    subscribers: HashMap<UserId, mpsc::Sender<Outbound>>,
}

impl SubscriberGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the channel for `user_id`. Refused while another live
    /// channel is registered for the same user; a closed one is replaced.
    pub fn subscribe(&mut self, user_id: UserId, sender: mpsc::Sender<Outbound>) -> bool {
        if self
            .subscribers
            .get(&user_id)
            .is_some_and(|existing| !existing.is_closed())
        {
            log::debug!("{user_id} already has a live subscription");
            return false;
        }
        log::debug!("{user_id} subscribed to match broadcasts");
        self.subscribers.insert(user_id, sender);
        true
    }

    pub fn unsubscribe(&mut self, user_id: &UserId) {
        if self.subscribers.remove(user_id).is_some() {
            log::debug!("{user_id} unsubscribed from match broadcasts");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, user_id: &UserId) -> bool {
        self.subscribers.contains_key(user_id)
    }
}

impl BroadcastGateway for SubscriberGateway {
    fn broadcast_message(
        &mut self,
        op_code: OpCode,
        payload: &[u8],
        recipients: Option<&[UserId]>,
        reliable: bool,
    ) -> Result<(), GatewayError> {
        let message = Outbound {
            op_code,
            payload: Arc::from(payload),
            reliable,
        };

        let mut dropped = 0;
        self.subscribers.retain(|user_id, sender| {
            if let Some(recipients) = recipients
                && !recipients.contains(user_id)
            {
                return true;
            }

            match sender.try_send(message.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("Subscriber {user_id} channel full, dropping {op_code}");
                    dropped += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("Subscriber {user_id} disconnected, removing");
                    false
                }
            }
        });

        if dropped > 0 {
            return Err(GatewayError::Undeliverable { dropped });
        }
        Ok(())
    }
}

/// A message captured by [`RecordingGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    pub op_code: OpCode,
    pub payload: Vec<u8>,
    pub recipients: Option<Vec<UserId>>,
    pub reliable: bool,
}

impl Recorded {
    /// Decode the payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// Gateway that keeps everything it is asked to send. Handy for driving a
/// session directly, outside any host.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    pub sent: Vec<Recorded>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opcodes in send order.
    pub fn op_codes(&self) -> Vec<OpCode> {
        self.sent.iter().map(|r| r.op_code).collect()
    }

    pub fn last(&self) -> Option<&Recorded> {
        self.sent.last()
    }

    /// Broadcasts addressed to every participant (private notices excluded).
    pub fn broadcasts(&self) -> impl Iterator<Item = &Recorded> {
        self.sent.iter().filter(|r| r.recipients.is_none())
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl BroadcastGateway for RecordingGateway {
    fn broadcast_message(
        &mut self,
        op_code: OpCode,
        payload: &[u8],
        recipients: Option<&[UserId]>,
        reliable: bool,
    ) -> Result<(), GatewayError> {
        self.sent.push(Recorded {
            op_code,
            payload: payload.to_vec(),
            recipients: recipients.map(<[UserId]>::to_vec),
            reliable,
        });
        Ok(())
    }
}
