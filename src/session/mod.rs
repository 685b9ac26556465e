//! The stateful protocol engine: one session per transport connection.
//!
//! A [`Session`] multiplexes half-duplex request/response exchanges over a
//! single full-duplex transport. Outgoing operations build a frame, send it,
//! and (usually) read a matching reply; the server-side [`Session::update`]
//! reads whatever arrives and dispatches on opcode. An I/O mutex is held for
//! the whole of every exchange, so two exchanges on one session can never
//! interleave.
//!
//! All protocol-level faults are fatal: the session disconnects and every
//! later call reports [`SessionError::NotConnected`]. Remote-reported
//! failures ([`SessionError::Remote`], [`SessionError::FileNotFound`], ...)
//! leave the session usable.

mod handler;
mod packet_io;
mod transfer;

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::config::Configuration;
use crate::fs::{self, FileInfo};
use crate::protocol::messages::{FileListReply, FileListRequest, TransferRequest};
use crate::protocol::{Direction, OpCode, MAX_PATH_BYTES};
use crate::transport::Transport;
use packet_io::PacketIo;

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// The closed set of session error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The peer signalled failure in a result packet. The session stays
    /// usable.
    #[error("the remote peer reported a failure")]
    Remote,
    /// Reserved for a future authentication layer; never currently produced.
    #[error("access denied")]
    AccessDenied,
    /// Protocol violation: malformed frame, unexpected or unknown opcode,
    /// out-of-order offset. The session has disconnected.
    #[error("protocol violation")]
    Protocol,
    /// No packet was available in non-blocking mode. Not a fault; poll again.
    #[error("no packet available")]
    WouldBlock,
    /// The operation needs a connected session.
    #[error("session is not connected")]
    NotConnected,
    /// The transport reported closure mid-operation. The session has
    /// disconnected.
    #[error("connection lost")]
    ConnectionLost,
    /// The local source of a transfer does not exist. The session stays
    /// usable.
    #[error("local file not found")]
    FileNotFound,
    /// A local file could not be opened in the required mode. The session
    /// stays usable.
    #[error("could not open local file")]
    OpenFailed,
}

/// What a completed transfer moved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// File bytes accounted for: sent, received, or verified in place.
    pub payload_bytes: u64,
    /// Chunks that crossed the wire.
    pub chunks_moved: u64,
    /// Chunks the delta path proved already in sync.
    pub chunks_skipped: u64,
}

/// One endpoint of a UFT protocol conversation.
///
/// Born from a connected transport (via `client::connect` or
/// [`Listener::accept`](crate::Listener::accept)), or from a disconnected one
/// for later use. Methods take `&self`; the internal I/O mutex serialises
/// complete exchanges.
#[derive(Debug)]
pub struct Session<T: Transport> {
    io: Mutex<PacketIo<T>>,
    config: Configuration,
    remote: Option<SocketAddr>,
}

impl<T: Transport> Session<T> {
    /// Wraps a transport (connected or not) as a session.
    #[must_use]
    pub fn new(transport: T, config: Configuration) -> Self {
        let remote = transport.remote_addr();
        let max_payload = config.max_payload();
        Self {
            io: Mutex::new(PacketIo::new(transport, max_payload)),
            config,
            remote,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PacketIo<T>> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the underlying transport holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.lock().is_connected()
    }

    /// The peer's address, captured at connect/accept time.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Applies a per-operation timeout to the transport, symmetrically for
    /// send and receive.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> SessionResult<()> {
        self.lock()
            .transport_mut()
            .set_timeout(timeout)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Switches the transport between blocking and non-blocking mode.
    /// [`Session::update`] needs non-blocking mode to make progress without
    /// stalling.
    pub fn set_blocking(&self, blocking: bool) -> SessionResult<()> {
        self.lock()
            .transport_mut()
            .set_blocking(blocking)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Drops the connection. Idempotent.
    pub fn disconnect(&self) {
        self.lock().disconnect();
    }

    /// Asks the peer to enumerate the regular files in `path`.
    pub fn get_file_list(&self, path: &str) -> SessionResult<Vec<FileInfo>> {
        let mut io = self.lock();
        if !io.is_connected() {
            return Err(SessionError::NotConnected);
        }
        check_path(path)?;

        let request = FileListRequest { path: path.into() };
        let mut frame = PacketIo::<T>::packet(OpCode::GetFileList, request.wire_size());
        request
            .encode(&mut frame)
            .map_err(|_| SessionError::Protocol)?;
        io.send_packet(OpCode::GetFileList, frame)?;

        let mut reply_frame = io.receive_expected(OpCode::GetFileListResult, true)?;
        let reply = FileListReply::decode(&mut reply_frame)
            .map_err(|_| io.fail(SessionError::Protocol))?;
        reply.entries.ok_or(SessionError::Remote)
    }

    /// Uploads the local file `source` to the remote path `destination`.
    ///
    /// `progress` is invoked with `(bytes_done, total)` after each chunk.
    pub fn send_file(
        &self,
        source: &str,
        destination: &str,
        mut progress: impl FnMut(u64, u64),
    ) -> SessionResult<TransferStats> {
        self.transmit(source, destination, Direction::Up, &mut progress)
    }

    /// Downloads the remote file `source` into the local path `destination`.
    ///
    /// `progress` is invoked with `(bytes_done, total)` after each chunk.
    pub fn receive_file(
        &self,
        source: &str,
        destination: &str,
        mut progress: impl FnMut(u64, u64),
    ) -> SessionResult<TransferStats> {
        self.transmit(source, destination, Direction::Down, &mut progress)
    }

    fn transmit(
        &self,
        source: &str,
        destination: &str,
        direction: Direction,
        progress: &mut dyn FnMut(u64, u64),
    ) -> SessionResult<TransferStats> {
        let mut io = self.lock();
        if !io.is_connected() {
            return Err(SessionError::NotConnected);
        }

        let (local, remote_path) = match direction {
            Direction::Up => {
                let local = fs::file_info(source)
                    .ok()
                    .flatten()
                    .ok_or(SessionError::FileNotFound)?;
                (local, destination)
            }
            Direction::Down => {
                let local = fs::file_info(destination)
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| FileInfo::absent(destination));
                (local, source)
            }
        };
        check_path(remote_path)?;
        debug!("transmit {direction}: {source:?} -> {destination:?}");

        let request = TransferRequest {
            path: remote_path.into(),
            size: local.size,
            timestamp: local.timestamp,
            direction,
        };
        let mut frame = PacketIo::<T>::packet(OpCode::TransmitFile, request.wire_size());
        request
            .encode(&mut frame)
            .map_err(|_| SessionError::Protocol)?;
        io.send_packet(OpCode::TransmitFile, frame)?;

        // The peer answers with the same shape, filled in from its side.
        let mut echo_frame = io.receive_expected(OpCode::TransmitFile, true)?;
        let echo = TransferRequest::decode(&mut echo_frame)
            .map_err(|_| io.fail(SessionError::Protocol))?;
        let remote = FileInfo {
            path: echo.path,
            size: echo.size,
            timestamp: echo.timestamp,
        };

        match direction {
            Direction::Up => {
                transfer::send_file_chunks(&mut io, &self.config, &local, &remote, progress)
            }
            Direction::Down => {
                transfer::receive_file_chunks(&mut io, &self.config, &local, &remote, progress)
            }
        }
    }

    /// Cooperative server-side poll: handles every packet already waiting,
    /// then returns. Requires non-blocking mode to make progress without
    /// stalling; "nothing pending" is success.
    pub fn update(&self) -> SessionResult<()> {
        let mut io = self.lock();
        if !io.is_connected() {
            return Err(SessionError::NotConnected);
        }
        loop {
            match io.receive_next(false) {
                Ok((header, mut payload)) => {
                    handler::handle_packet(&mut io, &self.config, header, &mut payload)?;
                }
                Err(SessionError::WouldBlock) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Paths must fit the one-byte length prefix; anything longer is rejected
/// before a single byte is transmitted, leaving the session connected.
fn check_path(path: &str) -> SessionResult<()> {
    if path.len() > MAX_PATH_BYTES {
        return Err(SessionError::Protocol);
    }
    Ok(())
}
