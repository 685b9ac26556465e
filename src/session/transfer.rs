//! The chunked transfer engine.
//!
//! Files move as a sequence of fixed-size chunks in ascending offset order.
//! Two paths exist on each side:
//!
//! * **full**: every chunk is compressed and streamed;
//! * **delta**: the peers exchange one hash per chunk, strictly interleaved,
//!   and only chunks whose hashes differ are retransmitted.
//!
//! The sender picks full when the receiver's file is absent or larger than
//! the source; the receiver mirrors the same guard from its own perspective,
//! so both ends of a correctly-configured pair always agree. A hash mismatch
//! is not an error; an offset mismatch is, and disconnects.

use std::fs::File;

use tracing::{debug, trace};

use super::packet_io::PacketIo;
use super::{SessionError, SessionResult, TransferStats};
use crate::config::{Configuration, TransferMode};
use crate::fs::{self, FileInfo};
use crate::protocol::messages::{ChunkHash, ChunkHeader, ChunkResult};
use crate::protocol::{chunk, OpCode};
use crate::transport::Transport;

/// Per-transfer working buffers: one chunk of plain bytes and a doubled
/// buffer for its compressed form.
struct ChunkScratch {
    plain: Vec<u8>,
    packed: Vec<u8>,
}

impl ChunkScratch {
    fn new(chunk_size: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)] // validated configuration
        let chunk_size = chunk_size as usize;
        Self {
            plain: vec![0u8; chunk_size],
            packed: vec![0u8; chunk_size * 2],
        }
    }
}

/// Progress hook: `(bytes_done, total_bytes)` after each chunk.
pub(crate) type Progress<'a> = &'a mut dyn FnMut(u64, u64);

/// Streams `local` to the peer, as announced by the preceding
/// `TransmitFile` exchange. `remote` is the peer's observation of the
/// destination.
pub(crate) fn send_file_chunks<T: Transport>(
    io: &mut PacketIo<T>,
    config: &Configuration,
    local: &FileInfo,
    remote: &FileInfo,
    progress: Progress<'_>,
) -> SessionResult<TransferStats> {
    let delta = config.transfer_mode == TransferMode::Delta
        && !remote.is_absent()
        && remote.size <= local.size;
    let mut file = fs::open_read(&local.path).map_err(|_| SessionError::OpenFailed)?;
    let mut scratch = ChunkScratch::new(config.chunk_size);
    let mut stats = TransferStats::default();
    debug!(
        "sending {:?} ({} bytes, {})",
        local.path,
        local.size,
        if delta { "delta" } else { "full" }
    );

    let mut offset = 0u64;
    while offset < local.size {
        let read = fs::read_chunk(&mut file, offset, &mut scratch.plain)
            .map_err(|_| SessionError::OpenFailed)?;
        if read == 0 {
            // The file shrank underneath us; the announced size is stale.
            return Err(io.fail(SessionError::Protocol));
        }
        let plain = &scratch.plain[..read];

        if delta {
            let ours = ChunkHash {
                offset,
                size: read as u64,
                hash: chunk::hash(plain),
            };
            send_chunk_hash(io, ours)?;
            let theirs = receive_chunk_hash(io)?;
            if theirs.offset != offset {
                return Err(io.fail(SessionError::Protocol));
            }
            if theirs.hash == ours.hash {
                stats.chunks_skipped += 1;
            } else {
                trace!("chunk at {offset} differs, retransmitting");
                send_one_chunk(io, plain, &mut scratch.packed, offset)?;
                stats.chunks_moved += 1;
            }
        } else {
            send_one_chunk(io, plain, &mut scratch.packed, offset)?;
            stats.chunks_moved += 1;
        }

        offset += read as u64;
        stats.payload_bytes = offset;
        progress(offset, local.size);
    }
    Ok(stats)
}

/// Receives the peer's file into `local`, as announced by the preceding
/// `TransmitFile` exchange. `remote` is the peer's observation of the source.
pub(crate) fn receive_file_chunks<T: Transport>(
    io: &mut PacketIo<T>,
    config: &Configuration,
    local: &FileInfo,
    remote: &FileInfo,
    progress: Progress<'_>,
) -> SessionResult<TransferStats> {
    let delta = config.transfer_mode == TransferMode::Delta
        && !local.is_absent()
        && local.size <= remote.size;
    let mut scratch = ChunkScratch::new(config.chunk_size);
    let mut stats = TransferStats::default();
    debug!(
        "receiving {:?} ({} bytes, {})",
        local.path,
        remote.size,
        if delta { "delta" } else { "full" }
    );

    if delta {
        let mut file =
            fs::open_read_write(&local.path).map_err(|_| SessionError::OpenFailed)?;
        let mut offset = 0u64;
        while offset < remote.size {
            let read = fs::read_chunk(&mut file, offset, &mut scratch.plain)
                .map_err(|_| SessionError::OpenFailed)?;
            let theirs = receive_chunk_hash(io)?;
            let ours = ChunkHash {
                offset,
                size: read as u64,
                hash: chunk::hash(&scratch.plain[..read]),
            };
            send_chunk_hash(io, ours)?;
            if theirs.offset != offset {
                return Err(io.fail(SessionError::Protocol));
            }

            let advanced = if theirs.hash == ours.hash {
                trace!("chunk at {offset} already in sync");
                stats.chunks_skipped += 1;
                read as u64
            } else {
                let (_, size) = receive_one_chunk(io, &mut scratch, &mut file)?;
                stats.chunks_moved += 1;
                size
            };
            if advanced == 0 {
                return Err(io.fail(SessionError::Protocol));
            }
            offset += advanced;
            stats.payload_bytes = offset;
            progress(offset, remote.size);
        }
    } else {
        let mut file =
            fs::open_truncate(&local.path).map_err(|_| SessionError::OpenFailed)?;
        let mut done = 0u64;
        while done < remote.size {
            let (_, size) = receive_one_chunk(io, &mut scratch, &mut file)?;
            if size == 0 {
                return Err(io.fail(SessionError::Protocol));
            }
            done += size;
            stats.chunks_moved += 1;
            stats.payload_bytes = done;
            progress(done, remote.size);
        }
    }
    Ok(stats)
}

/// Compresses and sends one chunk, then waits for its acknowledgement.
fn send_one_chunk<T: Transport>(
    io: &mut PacketIo<T>,
    plain: &[u8],
    packed: &mut [u8],
    offset: u64,
) -> SessionResult<()> {
    let packed_len =
        chunk::compress(plain, packed).map_err(|_| SessionError::Protocol)?;
    let header = ChunkHeader {
        offset,
        size: plain.len() as u64,
        compressed_size: packed_len as u64,
    };
    let mut frame =
        PacketIo::<T>::packet(OpCode::TransmitFileChunk, ChunkHeader::WIRE_SIZE + packed_len);
    header.encode(&mut frame).map_err(|_| SessionError::Protocol)?;
    frame
        .put_bytes(&packed[..packed_len])
        .map_err(|_| SessionError::Protocol)?;
    io.send_packet(OpCode::TransmitFileChunk, frame)?;

    let mut reply = io.receive_expected(OpCode::TransmitFileChunkResult, true)?;
    let result = ChunkResult::decode(&mut reply).map_err(|_| io.fail(SessionError::Protocol))?;
    if result.success {
        Ok(())
    } else {
        Err(SessionError::Remote)
    }
}

/// Receives one chunk, applies it to `file` at the carried offset, and
/// acknowledges. Returns the chunk's (offset, declared size).
fn receive_one_chunk<T: Transport>(
    io: &mut PacketIo<T>,
    scratch: &mut ChunkScratch,
    file: &mut File,
) -> SessionResult<(u64, u64)> {
    let mut frame = io.receive_expected(OpCode::TransmitFileChunk, true)?;
    let header = ChunkHeader::decode(&mut frame).map_err(|_| io.fail(SessionError::Protocol))?;
    if header.compressed_size > scratch.packed.len() as u64
        || header.size > scratch.plain.len() as u64
    {
        return Err(io.fail(SessionError::Protocol));
    }
    #[allow(clippy::cast_possible_truncation)] // bounded above
    let packed = frame
        .take_bytes(header.compressed_size as usize)
        .map_err(|_| io.fail(SessionError::Protocol))?;
    let produced = chunk::decompress(packed, &mut scratch.plain)
        .map_err(|_| io.fail(SessionError::Protocol))?;
    if produced as u64 != header.size {
        return Err(io.fail(SessionError::Protocol));
    }

    let applied = fs::write_chunk(file, header.offset, &scratch.plain[..produced]).is_ok();
    let mut reply =
        PacketIo::<T>::packet(OpCode::TransmitFileChunkResult, ChunkResult::WIRE_SIZE);
    ChunkResult { success: applied }
        .encode(&mut reply)
        .map_err(|_| SessionError::Protocol)?;
    io.send_packet(OpCode::TransmitFileChunkResult, reply)?;

    Ok((header.offset, header.size))
}

fn send_chunk_hash<T: Transport>(io: &mut PacketIo<T>, hash: ChunkHash) -> SessionResult<()> {
    let mut frame = PacketIo::<T>::packet(OpCode::TransmitFileHash, ChunkHash::WIRE_SIZE);
    hash.encode(&mut frame).map_err(|_| SessionError::Protocol)?;
    io.send_packet(OpCode::TransmitFileHash, frame)
}

fn receive_chunk_hash<T: Transport>(io: &mut PacketIo<T>) -> SessionResult<ChunkHash> {
    let mut frame = io.receive_expected(OpCode::TransmitFileHash, true)?;
    ChunkHash::decode(&mut frame).map_err(|_| io.fail(SessionError::Protocol))
}
