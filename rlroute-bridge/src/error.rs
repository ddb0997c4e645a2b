//! Errors in the library.
use crate::protocol::MessageType;
use thiserror::Error;

/// Errors raised while exchanging messages with the peer.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The peer closed the stream while a message was being read.
    #[error("Connection closed by remote while waiting for {stage}")]
    ConnectionClosed {
        /// Part of the message that was awaited, `"header"` or `"payload"`.
        stage: &'static str,
    },

    /// A message of an unexpected type was received.
    #[error("Protocol violation: expected {expected}, got {actual}")]
    ProtocolViolation {
        /// Message type(s) valid at this point of the exchange.
        expected: &'static str,
        /// Received message type.
        actual: MessageType,
    },

    /// A header of the wrong byte length.
    #[error("Malformed header: expected 12 bytes, got {0}")]
    MalformedHeader(usize),

    /// A header carrying an unknown message type code.
    #[error("Unknown message type code {0}")]
    UnknownMessageType(u32),

    /// A header announcing a payload above the accepted size.
    #[error("Payload of {len} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge {
        /// Announced payload length.
        len: u32,
        /// Accepted maximum.
        max: u32,
    },

    /// A payload that cannot be decoded for its message type.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// I/O error of the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
