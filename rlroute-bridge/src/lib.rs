#![warn(missing_docs)]
//! Message exchange with the external optimization engine.
//!
//! The engine (the *peer*) and this process talk over a byte stream with a
//! strict request/reply discipline. Every message is a fixed 12-byte header
//! followed by a payload:
//!
//! | field          | size | notes                     |
//! |----------------|------|---------------------------|
//! | version        | 4B   | big-endian `u32`          |
//! | payload length | 4B   | big-endian `u32`          |
//! | message type   | 4B   | big-endian `u32`, 0 to 6  |
//! | payload        | var  | depends on the type       |
//!
//! * [`protocol`] - header and message encoding,
//! * [`transport`] - blocking byte streams (TCP loopback, named pipes),
//! * [`Bridge`] - a transport speaking the protocol.
mod bridge;
mod error;
pub mod protocol;
pub mod transport;

pub use bridge::Bridge;
pub use error::BridgeError;
pub use protocol::{Header, Message, MessageType, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
pub use transport::Transport;
