//! UFT wire protocol definitions and codecs.
//!
//! The protocol multiplexes half-duplex request/response exchanges over one
//! full-duplex transport connection. Every message is a framed packet:
//!
//! ```text
//! Frame  := Header Payload
//! Header := opcode:u8  payload_size:u64_be
//! ```
//!
//! All multi-byte integers are big-endian; booleans are one byte with any
//! non-zero value reading as true; strings are a one-byte length followed by
//! the raw bytes (so paths are intrinsically bounded at 255 bytes).
//!
//! The opcode set is closed. Within an exchange the two sides strictly
//! alternate, so an unexpected or unknown opcode is always a protocol
//! violation and is fatal to the session.
//!
//! Payload layouts live in [`messages`]; chunk hashing and compression in
//! [`chunk`]; the frame primitives in [`endian`] and [`frame`].

pub mod chunk;
pub mod endian;
pub mod frame;
pub mod messages;

use endian::WireInt;

/// Nominal chunk granularity: the unit of hashing, compression and wire
/// transmission. The last chunk of a file may be shorter.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Longest path the wire format can carry.
pub const MAX_PATH_BYTES: usize = 255;

/// Packet opcodes. Any value outside this set is a fatal protocol error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::FromRepr)]
#[repr(u8)]
pub enum OpCode {
    /// Request a directory enumeration.
    GetFileList = 0,
    /// Enumeration response: success flag plus, on success, the file list.
    GetFileListResult = 1,
    /// Initiate a transfer; exchanged in both directions as
    /// announce + acknowledge.
    TransmitFile = 2,
    /// One chunk's hash with its (offset, size).
    TransmitFileHash = 3,
    /// One chunk's compressed bytes with (offset, size, compressed size).
    TransmitFileChunk = 4,
    /// Acknowledge application of a chunk.
    TransmitFileChunkResult = 5,
}

/// Transfer direction from the initiator's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::FromRepr)]
#[repr(u8)]
pub enum Direction {
    /// The initiator is the sender.
    Up = 0,
    /// The initiator is the receiver.
    Down = 1,
}

/// Fixed packet header preceding every payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Which packet this is.
    pub opcode: OpCode,
    /// Exact length of the payload that follows.
    pub payload_size: u64,
}

impl PacketHeader {
    /// On-wire size of the header itself.
    pub const SIZE: usize = 9;

    /// Serialises the header in wire order.
    pub fn encode(self, out: &mut [u8; Self::SIZE]) {
        out[0] = self.opcode as u8;
        self.payload_size.put(&mut out[1..]);
    }

    /// Parses a header, validating the opcode against the closed set.
    #[must_use]
    pub fn decode(bytes: &[u8; Self::SIZE]) -> Option<Self> {
        let opcode = OpCode::from_repr(bytes[0])?;
        Some(Self {
            opcode,
            payload_size: u64::get(&bytes[1..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, OpCode, PacketHeader};
    use pretty_assertions::assert_eq;

    #[test]
    fn header_round_trip() {
        let header = PacketHeader {
            opcode: OpCode::TransmitFileChunk,
            payload_size: 0x1_0000_0001,
        };
        let mut wire = [0u8; PacketHeader::SIZE];
        header.encode(&mut wire);
        assert_eq!(wire, [4, 0, 0, 0, 1, 0, 0, 0, 1]);
        assert_eq!(PacketHeader::decode(&wire), Some(header));
    }

    #[test]
    fn header_rejects_unknown_opcode() {
        let wire = [17u8, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(PacketHeader::decode(&wire), None);
    }

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(OpCode::GetFileList as u8, 0);
        assert_eq!(OpCode::GetFileListResult as u8, 1);
        assert_eq!(OpCode::TransmitFile as u8, 2);
        assert_eq!(OpCode::TransmitFileHash as u8, 3);
        assert_eq!(OpCode::TransmitFileChunk as u8, 4);
        assert_eq!(OpCode::TransmitFileChunkResult as u8, 5);
        assert_eq!(Direction::Up as u8, 0);
        assert_eq!(Direction::Down as u8, 1);
    }
}
