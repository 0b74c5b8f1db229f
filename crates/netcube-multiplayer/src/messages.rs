//! Replicated messages and their wire encoding.
//!
//! Every message is serialized with [`postcard`] and prefixed with a protocol
//! version byte. Use [`encode_message`] and [`decode_message`].

use netcube_net::Reliability;
use serde::{Deserialize, Serialize};

use crate::state::{InputState, Move};

/// Current wire-protocol version. Prepended to every encoded message.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// NetMessage
// ---------------------------------------------------------------------------

/// Everything exchanged between a peer and the authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMessage {
    // --- Pawn ---
    /// Peer -> authority: the input the peer is currently holding.
    SubmitInput(InputState),
    /// Authority -> owning peer: authoritative move for reconciliation.
    CorrectionUpdate(Move),

    // --- Ping ---
    /// Peer -> authority: echo this local timestamp (seconds).
    BouncePing {
        /// Peer's local time when sent.
        timestamp: f32,
    },
    /// Authority -> peer: the echoed timestamp.
    ReturnPing {
        /// Timestamp copied from the matching bounce.
        timestamp: f32,
    },
    /// Peer -> authority: new exact ping estimate.
    UpdatePing {
        /// Estimate in milliseconds.
        exact_ping_ms: f32,
    },
    /// Peer -> authority: requested prediction window.
    NegotiatePredictionPing {
        /// Desired window in milliseconds.
        desired_ms: f32,
    },

    // --- Clock ---
    /// Peer -> authority: reply with your local time.
    RequestTimeStamp,
    /// Authority -> peer: authority local time at the moment of reply.
    ServerSentTimeStamp {
        /// Authority local time (ms).
        server_time_ms: i32,
    },
}

impl NetMessage {
    /// Delivery class used when sending this message.
    pub fn reliability(&self) -> Reliability {
        match self {
            NetMessage::NegotiatePredictionPing { .. }
            | NetMessage::RequestTimeStamp
            | NetMessage::ServerSentTimeStamp { .. } => Reliability::Reliable,
            NetMessage::SubmitInput(_)
            | NetMessage::CorrectionUpdate(_)
            | NetMessage::BouncePing { .. }
            | NetMessage::ReturnPing { .. }
            | NetMessage::UpdatePing { .. } => Reliability::Unreliable,
        }
    }

    /// Whether the message targets the pawn rather than the controller.
    pub fn is_pawn_message(&self) -> bool {
        matches!(
            self,
            NetMessage::SubmitInput(_) | NetMessage::CorrectionUpdate(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard encoding or decoding failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a [`NetMessage`] as `[version: u8][postcard body]`.
pub fn encode_message(msg: &NetMessage) -> Result<Vec<u8>, MessageError> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a versioned payload produced by [`encode_message`].
pub fn decode_message(data: &[u8]) -> Result<NetMessage, MessageError> {
    let (&version, body) = data.split_first().ok_or(MessageError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
