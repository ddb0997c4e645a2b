//! Header and message encoding.
use crate::{BridgeError, Transport};
use std::fmt;

/// Version written into the header of every outgoing message.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest payload accepted from the peer.
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// Closed set of message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// Acknowledgement, empty payload.
    Ack = 0,
    /// Error report, UTF-8 reason.
    Error = 1,
    /// JSON problem description.
    StaticData = 2,
    /// JSON `{routes, available}` asking for an action.
    ActionRequest = 3,
    /// Big-endian `i32` action index.
    ActionResponse = 4,
    /// Big-endian IEEE-754 `f32` reward.
    Reward = 5,
    /// End of the current episode, empty payload.
    EndEpisode = 6,
}

impl MessageType {
    /// Wire code of the type.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MessageType {
    type Error = BridgeError;

    fn try_from(code: u32) -> Result<Self, BridgeError> {
        match code {
            0 => Ok(MessageType::Ack),
            1 => Ok(MessageType::Error),
            2 => Ok(MessageType::StaticData),
            3 => Ok(MessageType::ActionRequest),
            4 => Ok(MessageType::ActionResponse),
            5 => Ok(MessageType::Reward),
            6 => Ok(MessageType::EndEpisode),
            _ => Err(BridgeError::UnknownMessageType(code)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Ack => "ACK",
            MessageType::Error => "ERROR",
            MessageType::StaticData => "STATIC_DATA",
            MessageType::ActionRequest => "ACTION_REQUEST",
            MessageType::ActionResponse => "ACTION_RESPONSE",
            MessageType::Reward => "REWARD",
            MessageType::EndEpisode => "END_EPISODE",
        };
        write!(f, "{}", name)
    }
}

/// Fixed-size message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version.
    pub version: u32,

    /// Number of payload bytes following the header.
    pub payload_len: u32,

    /// Message type.
    pub msg_type: MessageType,
}

impl Header {
    /// Encoded size in bytes.
    pub const SIZE: usize = 12;

    /// Encodes the three fields as big-endian `u32`s.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.payload_len.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.msg_type.code().to_be_bytes());
        bytes
    }

    /// Decodes a header, failing unless `bytes` is exactly [`Header::SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BridgeError> {
        if bytes.len() != Self::SIZE {
            return Err(BridgeError::MalformedHeader(bytes.len()));
        }
        let field = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Ok(Self {
            version: field(0),
            payload_len: field(4),
            msg_type: MessageType::try_from(field(8))?,
        })
    }
}

/// A header with its payload.
///
/// `payload.len() == header.payload_len` holds for every message built by the
/// constructors of this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Header.
    pub header: Header,

    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds a message of the current protocol version.
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                version: PROTOCOL_VERSION,
                payload_len: payload.len() as u32,
                msg_type,
            },
            payload,
        }
    }

    /// Acknowledgement.
    pub fn ack() -> Self {
        Self::new(MessageType::Ack, vec![])
    }

    /// Error report carrying a UTF-8 reason.
    pub fn error(reason: &str) -> Self {
        Self::new(MessageType::Error, reason.as_bytes().to_vec())
    }

    /// Action chosen by the agent.
    pub fn action_response(action: i32) -> Self {
        Self::new(MessageType::ActionResponse, action.to_be_bytes().to_vec())
    }

    /// Problem description sent by the peer.
    pub fn static_data(json: &[u8]) -> Self {
        Self::new(MessageType::StaticData, json.to_vec())
    }

    /// Action request sent by the peer.
    pub fn action_request(json: &[u8]) -> Self {
        Self::new(MessageType::ActionRequest, json.to_vec())
    }

    /// Reward sent by the peer.
    pub fn reward(reward: f32) -> Self {
        Self::new(MessageType::Reward, reward.to_be_bytes().to_vec())
    }

    /// End of episode sent by the peer.
    pub fn end_episode() -> Self {
        Self::new(MessageType::EndEpisode, vec![])
    }

    /// Message type.
    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }

    /// Header bytes followed by the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Header::SIZE + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Reads one message.
    ///
    /// Zero header bytes mean the peer left before sending anything and give
    /// [`BridgeError::ConnectionClosed`]; a truncated header is malformed. A
    /// zero-length payload is not read at all. A payload cut short by the end
    /// of the stream gives [`BridgeError::ConnectionClosed`] as well. A header
    /// announcing more than [`MAX_PAYLOAD_LEN`] bytes is rejected before the
    /// payload is read.
    pub fn recv<T: Transport + ?Sized>(transport: &mut T) -> Result<Self, BridgeError> {
        let bytes = transport.read(Header::SIZE)?;
        if bytes.is_empty() {
            return Err(BridgeError::ConnectionClosed { stage: "header" });
        }
        let header = Header::from_bytes(&bytes)?;
        if header.payload_len > MAX_PAYLOAD_LEN {
            return Err(BridgeError::PayloadTooLarge {
                len: header.payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        if header.payload_len == 0 {
            return Ok(Self {
                header,
                payload: vec![],
            });
        }

        let payload = transport.read(header.payload_len as usize)?;
        if payload.len() < header.payload_len as usize {
            log::debug!(
                "{} payload truncated at {}/{} bytes",
                header.msg_type,
                payload.len(),
                header.payload_len
            );
            return Err(BridgeError::ConnectionClosed { stage: "payload" });
        }
        Ok(Self { header, payload })
    }

    fn payload_4_bytes(&self) -> Result<[u8; 4], BridgeError> {
        self.payload.as_slice().try_into().map_err(|_| {
            BridgeError::InvalidPayload(format!(
                "{} payload must be 4 bytes, got {}",
                self.msg_type(),
                self.payload.len()
            ))
        })
    }

    /// Decodes the payload of a REWARD message.
    pub fn reward_value(&self) -> Result<f32, BridgeError> {
        Ok(f32::from_be_bytes(self.payload_4_bytes()?))
    }

    /// Decodes the payload of an ACTION_RESPONSE message.
    pub fn action_index(&self) -> Result<i32, BridgeError> {
        Ok(i32::from_be_bytes(self.payload_4_bytes()?))
    }

    /// Decodes the payload of an ERROR message.
    pub fn reason(&self) -> Result<String, BridgeError> {
        String::from_utf8(self.payload.clone())
            .map_err(|e| BridgeError::InvalidPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Serves bytes from a buffer, a few at a time.
    struct Chunked {
        data: Vec<u8>,
        pos: usize,
        largest_read: usize,
    }

    impl Transport for Chunked {
        fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
            self.largest_read = self.largest_read.max(n);
            let end = (self.pos + n).min(self.data.len());
            let out = self.data[self.pos..end].to_vec();
            self.pos = end;
            Ok(out)
        }

        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    fn chunked(data: Vec<u8>) -> Chunked {
        Chunked {
            data,
            pos: 0,
            largest_read: 0,
        }
    }

    #[test]
    fn test_header_round_trip() {
        for code in 0..7u32 {
            for &(version, len) in &[(0u32, 0u32), (1, 4), (u32::MAX, 123_456), (7, u32::MAX)] {
                let header = Header {
                    version,
                    payload_len: len,
                    msg_type: MessageType::try_from(code).unwrap(),
                };
                assert_eq!(Header::from_bytes(&header.to_bytes()).unwrap(), header);
            }
        }
    }

    #[test]
    fn test_header_big_endian() {
        let header = Message::action_response(2).header;
        assert_eq!(
            header.to_bytes(),
            [0, 0, 0, 1, 0, 0, 0, 4, 0, 0, 0, 4]
        );
    }

    #[test]
    fn test_header_errors() {
        assert!(matches!(
            Header::from_bytes(&[0u8; 11]),
            Err(BridgeError::MalformedHeader(11))
        ));
        let mut bytes = Message::ack().header.to_bytes();
        bytes[11] = 9;
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(BridgeError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn test_constructors() {
        let msg = Message::error("bad");
        assert_eq!(msg.header.version, PROTOCOL_VERSION);
        assert_eq!(msg.header.payload_len, 3);
        assert_eq!(msg.reason().unwrap(), "bad");

        assert_eq!(Message::action_response(-3).action_index().unwrap(), -3);
        assert_eq!(Message::reward(1.25).reward_value().unwrap(), 1.25);
        assert_eq!(Message::ack().payload.len(), 0);
        assert!(matches!(
            Message::ack().reward_value(),
            Err(BridgeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_recv() {
        let mut data = Message::end_episode().to_bytes();
        data.extend(Message::reward(-0.5).to_bytes());
        let mut t = chunked(data);

        let msg = Message::recv(&mut t).unwrap();
        assert_eq!(msg.msg_type(), MessageType::EndEpisode);
        assert!(msg.payload.is_empty());
        let msg = Message::recv(&mut t).unwrap();
        assert_eq!(msg.reward_value().unwrap(), -0.5);

        assert!(matches!(
            Message::recv(&mut t),
            Err(BridgeError::ConnectionClosed { stage: "header" })
        ));
    }

    #[test]
    fn test_recv_closed_mid_message() {
        let bytes = Message::static_data(b"{}").to_bytes();

        let mut t = chunked(bytes[..Header::SIZE].to_vec());
        assert!(matches!(
            Message::recv(&mut t),
            Err(BridgeError::ConnectionClosed { stage: "payload" })
        ));

        let mut t = chunked(bytes[..5].to_vec());
        assert!(matches!(
            Message::recv(&mut t),
            Err(BridgeError::MalformedHeader(5))
        ));
    }

    #[test]
    fn test_recv_rejects_oversized_payload() {
        let mut t = chunked(vec![0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 5]);
        assert!(matches!(
            Message::recv(&mut t),
            Err(BridgeError::PayloadTooLarge { len: u32::MAX, max: MAX_PAYLOAD_LEN })
        ));
        assert_eq!(t.largest_read, Header::SIZE);
    }
}
