//! Transport seam between peers.
//!
//! [`ReplicatedChannel`] moves [`NetMessage`]s between a peer and the
//! authority. [`LinkChannel`] implements it over a simulated
//! [`netcube_net`] link.

use netcube_net::{LinkEndpoint, LinkError};

use crate::messages::{MessageError, NetMessage, decode_message, encode_message};
use crate::state::{InputState, Move};

/// Errors returned when sending over a [`ReplicatedChannel`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] MessageError),

    /// The underlying link rejected the datagram.
    #[error("link error: {0}")]
    Link(#[from] LinkError),
}

/// Bidirectional message transport.
pub trait ReplicatedChannel {
    /// Queue `message` using its own reliability class.
    fn send(&mut self, message: &NetMessage) -> Result<(), ChannelError>;

    /// Next delivered message, if any.
    fn receive(&mut self) -> Option<NetMessage>;

    /// Peer -> authority input.
    fn submit_input(&mut self, input: InputState) -> Result<(), ChannelError> {
        self.send(&NetMessage::SubmitInput(input))
    }

    /// Authority -> owner correction.
    fn send_correction(&mut self, correction: Move) -> Result<(), ChannelError> {
        self.send(&NetMessage::CorrectionUpdate(correction))
    }

    /// Peer -> authority ping bounce.
    fn bounce_ping(&mut self, timestamp: f32) -> Result<(), ChannelError> {
        self.send(&NetMessage::BouncePing { timestamp })
    }

    /// Authority -> peer ping echo.
    fn return_ping(&mut self, timestamp: f32) -> Result<(), ChannelError> {
        self.send(&NetMessage::ReturnPing { timestamp })
    }

    /// Peer -> authority ping report.
    fn update_ping(&mut self, exact_ping_ms: f32) -> Result<(), ChannelError> {
        self.send(&NetMessage::UpdatePing { exact_ping_ms })
    }

    /// Peer -> authority prediction window request.
    fn negotiate_prediction_ping(&mut self, desired_ms: f32) -> Result<(), ChannelError> {
        self.send(&NetMessage::NegotiatePredictionPing { desired_ms })
    }

    /// Peer -> authority timestamp request.
    fn request_time_stamp(&mut self) -> Result<(), ChannelError> {
        self.send(&NetMessage::RequestTimeStamp)
    }

    /// Authority -> peer timestamp reply.
    fn server_sent_time_stamp(&mut self, server_time_ms: i32) -> Result<(), ChannelError> {
        self.send(&NetMessage::ServerSentTimeStamp { server_time_ms })
    }
}

/// [`ReplicatedChannel`] over a simulated link endpoint.
///
/// The owner advances link time with [`set_time`](Self::set_time) once per
/// tick; sends are stamped with it and receives deliver whatever is due.
pub struct LinkChannel {
    endpoint: LinkEndpoint,
    now_ms: u64,
    inbox: std::collections::VecDeque<NetMessage>,
    undecodable: u64,
}

impl LinkChannel {
    /// Wrap `endpoint`, starting at link time 0.
    pub fn new(endpoint: LinkEndpoint) -> Self {
        Self {
            endpoint,
            now_ms: 0,
            inbox: std::collections::VecDeque::new(),
            undecodable: 0,
        }
    }

    /// Advance link time and pull in every datagram now due.
    pub fn set_time(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        for payload in self.endpoint.poll(now_ms) {
            match decode_message(&payload) {
                Ok(message) => self.inbox.push_back(message),
                Err(err) => {
                    self.undecodable += 1;
                    tracing::warn!(%err, bytes = payload.len(), "dropping undecodable datagram");
                }
            }
        }
    }

    /// Datagrams that failed to decode.
    pub fn undecodable(&self) -> u64 {
        self.undecodable
    }

    /// The wrapped endpoint.
    pub fn endpoint(&self) -> &LinkEndpoint {
        &self.endpoint
    }

    /// The wrapped endpoint, mutably (raw sends in tests).
    pub fn endpoint_mut(&mut self) -> &mut LinkEndpoint {
        &mut self.endpoint
    }
}

impl ReplicatedChannel for LinkChannel {
    fn send(&mut self, message: &NetMessage) -> Result<(), ChannelError> {
        let payload = encode_message(message)?;
        self.endpoint
            .send(self.now_ms, payload, message.reliability())?;
        Ok(())
    }

    fn receive(&mut self) -> Option<NetMessage> {
        self.inbox.pop_front()
    }
}
