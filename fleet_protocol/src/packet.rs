//! Fixed-layout binary framing of protocol messages.
//!
//! Every datagram on the fleet link is one [`Packet`]. All multi-byte
//! integers are big-endian:
//!
//! ```text
//! +---------+---------+---------------+---------------+----------+
//! | roverId | msgType |   seq (u16)   |   ack (u16)   | checksum |  + payload
//! +---------+---------+---------------+---------------+----------+
//! ```
//!
//! The header is [`HEADER_LEN`] = 7 bytes. Decoding validates length and the
//! message-type byte only; checksum verification belongs to the ordered
//! receive engine, which decides whether a corrupt packet is silently
//! dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte length of the fixed packet header.
pub const HEADER_LEN: usize = 7;

/// Protocol message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MsgType {
    Mission = 0,
    NoMission = 1,
    Ack = 2,
    Report = 3,
    Request = 4,
}

impl TryFrom<u8> for MsgType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(MsgType::Mission),
            1 => Ok(MsgType::NoMission),
            2 => Ok(MsgType::Ack),
            3 => Ok(MsgType::Report),
            4 => Ok(MsgType::Request),
            other => Err(CodecError::UnknownMsgType(other)),
        }
    }
}

/// Errors raised while decoding wire data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("unknown message type {0}")]
    UnknownMsgType(u8),
    #[error("unknown task type {0}")]
    UnknownTaskType(u8),
}

/// One protocol message. `ack` is cumulative: the next sequence number the
/// sender of this packet expects from the peer; 0 means "no acknowledgment
/// carried".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub rover_id: u8,
    pub msg_type: MsgType,
    pub seq: u16,
    pub ack: u16,
    pub checksum: u8,
    pub payload: Vec<u8>,
}

/// Unsigned sum of all payload bytes, truncated mod 256.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u32, |acc, b| acc + u32::from(*b)) as u8
}

impl Packet {
    pub fn new(rover_id: u8, msg_type: MsgType, seq: u16, ack: u16, payload: Vec<u8>) -> Self {
        let checksum = checksum(&payload);
        Self {
            rover_id,
            msg_type,
            seq,
            ack,
            checksum,
            payload,
        }
    }

    /// Pure acknowledgment carrying `ack` = next expected sequence number.
    /// Pure ACKs are fire-and-forget and occupy no sequence slot.
    pub fn pure_ack(rover_id: u8, ack: u16) -> Self {
        Self::new(rover_id, MsgType::Ack, 0, ack, Vec::new())
    }

    /// True when the stored checksum matches a fresh computation.
    pub fn checksum_ok(&self) -> bool {
        self.checksum == checksum(&self.payload)
    }

    /// Serialise into a newly allocated buffer, recomputing the checksum from
    /// the actual payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.rover_id);
        buf.push(self.msg_type as u8);
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.push(checksum(&self.payload));
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a packet from a raw datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                need: HEADER_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            rover_id: buf[0],
            msg_type: MsgType::try_from(buf[1])?,
            seq: u16::from_be_bytes([buf[2], buf[3]]),
            ack: u16::from_be_bytes([buf[4], buf[5]]),
            checksum: buf[6],
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_payload() {
        let pkt = Packet::new(7, MsgType::Report, 42, 3, vec![1, 2, 3, 250]);
        let back = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(back, pkt);
        assert!(back.checksum_ok());
    }

    #[test]
    fn roundtrip_empty_payload() {
        let pkt = Packet::new(1, MsgType::Request, 0, 0, Vec::new());
        let back = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(back.payload, Vec::<u8>::new());
        assert_eq!(back.checksum, 0);
    }

    #[test]
    fn short_buffer_is_an_error() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(CodecError::Truncated {
                need: HEADER_LEN,
                got: HEADER_LEN - 1
            })
        );
    }

    #[test]
    fn unknown_msg_type_is_an_error() {
        let mut bytes = Packet::new(1, MsgType::Ack, 0, 0, Vec::new()).encode();
        bytes[1] = 9;
        assert_eq!(Packet::decode(&bytes), Err(CodecError::UnknownMsgType(9)));
    }

    #[test]
    fn checksum_is_additive_mod_256() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[255, 1]), 0);
        assert_eq!(checksum(&[100, 100, 100]), 44);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let bytes = Packet::new(2, MsgType::Mission, 5, 0, vec![10, 20, 30]).encode();
        let mut corrupt = bytes.clone();
        *corrupt.last_mut().unwrap() ^= 0xff;
        let pkt = Packet::decode(&corrupt).unwrap();
        assert!(!pkt.checksum_ok());
    }

    #[test]
    fn multibyte_fields_are_big_endian() {
        let bytes = Packet::new(1, MsgType::Ack, 0x0102, 0x0304, Vec::new()).encode();
        assert_eq!(&bytes[2..6], &[0x01, 0x02, 0x03, 0x04]);
    }
}
