//! Typed payload codecs for the six-opcode protocol.
//!
//! Each message knows its own wire layout; the packet header is handled by
//! the packet I/O layer. The chunk *data* message is assembled inline by the
//! transfer engine (its bulk bytes never pass through an intermediate
//! struct), but its fixed leader is [`ChunkHeader`].

use super::frame::{FrameBuffer, FrameError};
use super::Direction;
use crate::fs::FileInfo;

/// `GetFileList` payload: the directory to enumerate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileListRequest {
    /// Directory path on the serving side.
    pub path: String,
}

impl FileListRequest {
    pub(crate) fn wire_size(&self) -> usize {
        1 + self.path.len()
    }

    pub(crate) fn encode(&self, frame: &mut FrameBuffer) -> Result<(), FrameError> {
        frame.put_string8(&self.path)
    }

    pub(crate) fn decode(frame: &mut FrameBuffer) -> Result<Self, FrameError> {
        Ok(Self {
            path: frame.take_string8()?,
        })
    }
}

/// `GetFileListResult` payload. `entries: None` is the failure flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileListReply {
    /// The enumeration, when the serving side succeeded.
    pub entries: Option<Vec<FileInfo>>,
}

impl FileListReply {
    pub(crate) fn wire_size(&self) -> usize {
        1 + self.entries.as_ref().map_or(0, |list| {
            4 + list
                .iter()
                .map(|entry| 1 + entry.path.len() + 8 + 4)
                .sum::<usize>()
        })
    }

    pub(crate) fn encode(&self, frame: &mut FrameBuffer) -> Result<(), FrameError> {
        let Some(entries) = &self.entries else {
            return frame.put_bool(false);
        };
        frame.put_bool(true)?;
        let count = u32::try_from(entries.len()).map_err(|_| FrameError::Overflow)?;
        frame.put(count)?;
        for entry in entries {
            frame.put_string8(&entry.path)?;
            frame.put(entry.size)?;
            frame.put(entry.timestamp)?;
        }
        Ok(())
    }

    pub(crate) fn decode(frame: &mut FrameBuffer) -> Result<Self, FrameError> {
        if !frame.take_bool()? {
            return Ok(Self { entries: None });
        }
        let count = frame.take::<u32>()?;
        // Preallocation is bounded; a lying count fails on the first short read.
        let mut entries = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let path = frame.take_string8()?;
            let size = frame.take::<u64>()?;
            let timestamp = frame.take::<u32>()?;
            entries.push(FileInfo {
                path,
                size,
                timestamp,
            });
        }
        Ok(Self {
            entries: Some(entries),
        })
    }
}

/// `TransmitFile` payload: transfer announcement, and its echo.
///
/// The initiator announces the remote path plus its own local observation;
/// the peer echoes back the same shape filled in from its perspective.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    /// Path on the receiving side of the packet.
    pub path: String,
    /// The sender-of-this-packet's local file size.
    pub size: u64,
    /// The sender-of-this-packet's local modification time.
    pub timestamp: u32,
    /// Transfer direction from the initiator's point of view.
    pub direction: Direction,
}

impl TransferRequest {
    pub(crate) fn wire_size(&self) -> usize {
        1 + self.path.len() + 8 + 4 + 1
    }

    pub(crate) fn encode(&self, frame: &mut FrameBuffer) -> Result<(), FrameError> {
        frame.put_string8(&self.path)?;
        frame.put(self.size)?;
        frame.put(self.timestamp)?;
        frame.put(self.direction as u8)
    }

    pub(crate) fn decode(frame: &mut FrameBuffer) -> Result<Self, FrameError> {
        let path = frame.take_string8()?;
        let size = frame.take::<u64>()?;
        let timestamp = frame.take::<u32>()?;
        let direction =
            Direction::from_repr(frame.take::<u8>()?).ok_or(FrameError::Invalid)?;
        Ok(Self {
            path,
            size,
            timestamp,
            direction,
        })
    }
}

/// `TransmitFileHash` payload: one chunk's hash and placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHash {
    /// Absolute byte offset of the chunk within the file.
    pub offset: u64,
    /// Uncompressed chunk length.
    pub size: u64,
    /// FNV-1a 64 over the chunk bytes.
    pub hash: u64,
}

impl ChunkHash {
    pub(crate) const WIRE_SIZE: usize = 24;

    pub(crate) fn encode(self, frame: &mut FrameBuffer) -> Result<(), FrameError> {
        frame.put(self.offset)?;
        frame.put(self.size)?;
        frame.put(self.hash)
    }

    pub(crate) fn decode(frame: &mut FrameBuffer) -> Result<Self, FrameError> {
        Ok(Self {
            offset: frame.take()?,
            size: frame.take()?,
            hash: frame.take()?,
        })
    }
}

/// Fixed leader of a `TransmitFileChunk` payload; `compressed_size` raw bytes
/// follow it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Absolute byte offset the chunk applies at.
    pub offset: u64,
    /// Declared uncompressed length.
    pub size: u64,
    /// Length of the compressed bytes that follow.
    pub compressed_size: u64,
}

impl ChunkHeader {
    pub(crate) const WIRE_SIZE: usize = 24;

    pub(crate) fn encode(self, frame: &mut FrameBuffer) -> Result<(), FrameError> {
        frame.put(self.offset)?;
        frame.put(self.size)?;
        frame.put(self.compressed_size)
    }

    pub(crate) fn decode(frame: &mut FrameBuffer) -> Result<Self, FrameError> {
        Ok(Self {
            offset: frame.take()?,
            size: frame.take()?,
            compressed_size: frame.take()?,
        })
    }
}

/// `TransmitFileChunkResult` payload: did the chunk apply cleanly?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkResult {
    /// Whether the receiving side wrote the chunk successfully.
    pub success: bool,
}

impl ChunkResult {
    pub(crate) const WIRE_SIZE: usize = 1;

    pub(crate) fn encode(self, frame: &mut FrameBuffer) -> Result<(), FrameError> {
        frame.put_bool(self.success)
    }

    pub(crate) fn decode(frame: &mut FrameBuffer) -> Result<Self, FrameError> {
        Ok(Self {
            success: frame.take_bool()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encoded(size: usize, encode: impl FnOnce(&mut FrameBuffer)) -> Vec<u8> {
        let mut frame = FrameBuffer::with_capacity(size);
        encode(&mut frame);
        frame.written().to_vec()
    }

    #[test]
    fn wire_marshalling_file_list_request() {
        let msg = FileListRequest {
            path: "/data".into(),
        };
        let wire = encoded(msg.wire_size(), |f| msg.encode(f).unwrap());
        assert_eq!(wire, b"\x05/data");
        let decoded = FileListRequest::decode(&mut FrameBuffer::from_bytes(&wire)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn wire_marshalling_file_list_reply_failure() {
        let msg = FileListReply { entries: None };
        let wire = encoded(msg.wire_size(), |f| msg.encode(f).unwrap());
        assert_eq!(wire, [0]);
        let decoded = FileListReply::decode(&mut FrameBuffer::from_bytes(&wire)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn wire_marshalling_file_list_reply_success() {
        let msg = FileListReply {
            entries: Some(vec![crate::fs::FileInfo {
                path: "ab".into(),
                size: 7,
                timestamp: 9,
            }]),
        };
        let wire = encoded(msg.wire_size(), |f| msg.encode(f).unwrap());
        assert_eq!(
            wire,
            [
                1, // success
                0, 0, 0, 1, // count
                2, b'a', b'b', // name
                0, 0, 0, 0, 0, 0, 0, 7, // size
                0, 0, 0, 9, // timestamp
            ]
        );
        let decoded = FileListReply::decode(&mut FrameBuffer::from_bytes(&wire)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn wire_marshalling_transfer_request() {
        let msg = TransferRequest {
            path: "f".into(),
            size: 10,
            timestamp: 5,
            direction: Direction::Down,
        };
        let wire = encoded(msg.wire_size(), |f| msg.encode(f).unwrap());
        assert_eq!(wire, [1, b'f', 0, 0, 0, 0, 0, 0, 0, 10, 0, 0, 0, 5, 1]);
        let decoded = TransferRequest::decode(&mut FrameBuffer::from_bytes(&wire)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn transfer_request_rejects_unknown_direction() {
        let wire = [1, b'f', 0, 0, 0, 0, 0, 0, 0, 10, 0, 0, 0, 5, 9];
        assert_eq!(
            TransferRequest::decode(&mut FrameBuffer::from_bytes(&wire)),
            Err(FrameError::Invalid)
        );
    }

    #[test]
    fn wire_marshalling_chunk_hash() {
        let msg = ChunkHash {
            offset: 1,
            size: 2,
            hash: 3,
        };
        let wire = encoded(ChunkHash::WIRE_SIZE, |f| msg.encode(f).unwrap());
        assert_eq!(
            wire,
            [0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 3]
        );
        let decoded = ChunkHash::decode(&mut FrameBuffer::from_bytes(&wire)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn wire_marshalling_chunk_header_and_result() {
        let hdr = ChunkHeader {
            offset: 0x10,
            size: 0x20,
            compressed_size: 0x30,
        };
        let wire = encoded(ChunkHeader::WIRE_SIZE, |f| hdr.encode(f).unwrap());
        assert_eq!(wire[7], 0x10);
        assert_eq!(wire[15], 0x20);
        assert_eq!(wire[23], 0x30);
        assert_eq!(
            ChunkHeader::decode(&mut FrameBuffer::from_bytes(&wire)).unwrap(),
            hdr
        );

        let ok = ChunkResult { success: true };
        let wire = encoded(ChunkResult::WIRE_SIZE, |f| ok.encode(f).unwrap());
        assert_eq!(wire, [1]);
        assert!(ChunkResult::decode(&mut FrameBuffer::from_bytes(&[0xff]))
            .unwrap()
            .success);
        assert!(!ChunkResult::decode(&mut FrameBuffer::from_bytes(&[0]))
            .unwrap()
            .success);
    }

    #[test]
    fn truncated_payloads_fail_cleanly() {
        let mut frame = FrameBuffer::from_bytes(&[1, 0, 0, 0, 1, 2, b'a']);
        assert_eq!(
            FileListReply::decode(&mut frame),
            Err(FrameError::Truncated)
        );
        let mut frame = FrameBuffer::from_bytes(&[0, 0, 0]);
        assert_eq!(ChunkHash::decode(&mut frame), Err(FrameError::Truncated));
    }
}
