use crate::{BridgeError, Message, Transport};

/// A transport speaking the wire protocol.
///
/// One message is in flight per direction; nothing is buffered or pipelined.
/// The bridge owns the transport, so dropping it releases the connection
/// (and, for named pipes, removes the FIFO files).
pub struct Bridge<T: Transport> {
    transport: T,
}

impl<T: Transport> Bridge<T> {
    /// Wraps a connected transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Blocks until the next message has been received.
    pub fn recv(&mut self) -> Result<Message, BridgeError> {
        let msg = Message::recv(&mut self.transport)?;
        log::trace!("recv {} ({} bytes)", msg.msg_type(), msg.payload.len());
        Ok(msg)
    }

    /// Sends a message in a single write.
    pub fn send(&mut self, msg: &Message) -> Result<(), BridgeError> {
        log::trace!("send {} ({} bytes)", msg.msg_type(), msg.payload.len());
        self.transport.write(&msg.to_bytes())?;
        Ok(())
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Returns the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}
