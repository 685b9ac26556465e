//! Server-side dispatch for unsolicited inbound packets.
//!
//! Only two opcodes may open an exchange: `GetFileList` (serve an
//! enumeration) and `TransmitFile` (mirror a transfer). Anything else
//! arriving unsolicited is a protocol violation.

use tracing::debug;

use super::packet_io::PacketIo;
use super::{transfer, SessionError, SessionResult};
use crate::config::Configuration;
use crate::fs::{self, FileInfo};
use crate::protocol::frame::FrameBuffer;
use crate::protocol::messages::{FileListReply, FileListRequest, TransferRequest};
use crate::protocol::{Direction, OpCode, PacketHeader};
use crate::transport::Transport;

pub(crate) fn handle_packet<T: Transport>(
    io: &mut PacketIo<T>,
    config: &Configuration,
    header: PacketHeader,
    payload: &mut FrameBuffer,
) -> SessionResult<()> {
    match header.opcode {
        OpCode::GetFileList => {
            let request = FileListRequest::decode(payload)
                .map_err(|_| io.fail(SessionError::Protocol))?;
            serve_file_list(io, &request.path)
        }
        OpCode::TransmitFile => {
            let request =
                TransferRequest::decode(payload).map_err(|_| io.fail(SessionError::Protocol))?;
            mirror_transfer(io, config, &request)
        }
        OpCode::GetFileListResult
        | OpCode::TransmitFileHash
        | OpCode::TransmitFileChunk
        | OpCode::TransmitFileChunkResult => Err(io.fail(SessionError::Protocol)),
    }
}

/// Enumerates `path` locally and answers with `GetFileListResult`.
/// Enumeration failure travels as the in-band failure flag, not as a session
/// error.
fn serve_file_list<T: Transport>(io: &mut PacketIo<T>, path: &str) -> SessionResult<()> {
    let entries = fs::list_dir(path).ok();
    match &entries {
        Some(list) => debug!("serving file list for {path:?}: {} entries", list.len()),
        None => debug!("file list for {path:?} failed"),
    }
    let reply = FileListReply { entries };
    let mut frame = PacketIo::<T>::packet(OpCode::GetFileListResult, reply.wire_size());
    reply
        .encode(&mut frame)
        .map_err(|_| SessionError::Protocol)?;
    io.send_packet(OpCode::GetFileListResult, frame)
}

/// Answers a `TransmitFile` announcement with our own observation of the
/// named file, then runs the counter-direction chunk engine.
fn mirror_transfer<T: Transport>(
    io: &mut PacketIo<T>,
    config: &Configuration,
    request: &TransferRequest,
) -> SessionResult<()> {
    let local = match fs::file_info(&request.path).ok().flatten() {
        Some(info) => info,
        // The peer wants to download a file we do not have. There is no
        // in-band way to refuse a transfer; drop the session.
        None if request.direction == Direction::Down => {
            return Err(io.fail(SessionError::FileNotFound));
        }
        None => FileInfo::absent(&request.path),
    };
    debug!(
        "mirroring {} transfer of {:?} (local: {} bytes)",
        request.direction, request.path, local.size
    );

    let echo = TransferRequest {
        path: local.path.clone(),
        size: local.size,
        timestamp: local.timestamp,
        direction: request.direction,
    };
    let mut frame = PacketIo::<T>::packet(OpCode::TransmitFile, echo.wire_size());
    echo.encode(&mut frame)
        .map_err(|_| SessionError::Protocol)?;
    io.send_packet(OpCode::TransmitFile, frame)?;

    let remote = FileInfo {
        path: request.path.clone(),
        size: request.size,
        timestamp: request.timestamp,
    };
    let mut progress = |_done: u64, _total: u64| {};
    let stats = match request.direction {
        Direction::Up => {
            transfer::receive_file_chunks(io, config, &local, &remote, &mut progress)?
        }
        Direction::Down => transfer::send_file_chunks(io, config, &local, &remote, &mut progress)?,
    };
    debug!(
        "mirror complete: {} bytes, {} chunks moved, {} in sync",
        stats.payload_bytes, stats.chunks_moved, stats.chunks_skipped
    );
    Ok(())
}
