//! The reliable-datagram stream transport abstraction.
//!
//! The session engine runs over any connection-oriented, reliable, ordered
//! byte stream that offers blocking-mode and timeout knobs. The original
//! system used a UDT-style congestion-controlled transport; that library is
//! out of scope here, so [`TcpTransport`] stands in for real use and
//! [`MemoryTransport`] provides an in-process loopback.
//!
//! Implementations supply the single-attempt [`send`](Transport::send) and
//! [`receive`](Transport::receive) primitives; the looping combinators
//! (`send_all`, `receive_all`, `try_receive_all`) are provided on top of them
//! and embody the contract's semantics: zero-byte outcomes only on connection
//! loss, and a "peek, then block to completion" non-blocking read.

pub mod memory;
pub mod tcp;

pub use memory::MemoryTransport;
pub use tcp::TcpTransport;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::trace;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The operation requires a connected transport.
    #[error("transport is not connected")]
    NotConnected,
    /// The peer closed the connection (or it broke underneath us).
    #[error("connection closed by peer")]
    ConnectionLost,
    /// The configured per-operation timeout elapsed.
    #[error("transport operation timed out")]
    TimedOut,
    /// Any other operating-system level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of a single send or receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStep {
    /// This many bytes moved (possibly fewer than requested).
    Transferred(usize),
    /// Nothing available right now (non-blocking mode only).
    WouldBlock,
    /// The connection is closed.
    Closed,
}

/// Outcome of a non-blocking exact-length read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryReceive {
    /// The buffer was filled completely.
    Filled,
    /// No bytes were available; nothing was consumed.
    WouldBlock,
}

/// A connected reliable-datagram stream endpoint.
pub trait Transport: Send {
    /// Whether the endpoint currently holds a live connection.
    fn is_connected(&self) -> bool;

    /// Whether I/O currently blocks.
    fn is_blocking(&self) -> bool;

    /// Switches between blocking and non-blocking I/O.
    fn set_blocking(&mut self, blocking: bool) -> TransportResult<()>;

    /// The per-operation timeout, if any.
    fn timeout(&self) -> Option<Duration>;

    /// Sets the per-operation timeout, applied symmetrically to send and
    /// receive. `None` waits indefinitely.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> TransportResult<()>;

    /// The peer's address, captured at connect/accept time.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Drops the connection. Idempotent.
    fn disconnect(&mut self);

    /// Attempts to send some of `buf`.
    fn send(&mut self, buf: &[u8]) -> TransportResult<IoStep>;

    /// Attempts to receive into `buf`.
    fn receive(&mut self, buf: &mut [u8]) -> TransportResult<IoStep>;

    /// Sends all of `buf`, looping on partial writes.
    fn send_all(&mut self, buf: &[u8]) -> TransportResult<()> {
        let mut sent = 0;
        let mut waited = None;
        while sent < buf.len() {
            if !self.is_connected() {
                return Err(TransportError::ConnectionLost);
            }
            match self.send(&buf[sent..])? {
                IoStep::Transferred(n) => sent += n,
                IoStep::WouldBlock => wait_for_readiness(&mut waited, self.timeout())?,
                IoStep::Closed => return Err(TransportError::ConnectionLost),
            }
        }
        Ok(())
    }

    /// Receives exactly `buf.len()` bytes, looping on partial reads.
    fn receive_all(&mut self, buf: &mut [u8]) -> TransportResult<()> {
        let mut filled = 0;
        let mut waited = None;
        while filled < buf.len() {
            if !self.is_connected() {
                return Err(TransportError::ConnectionLost);
            }
            match self.receive(&mut buf[filled..])? {
                IoStep::Transferred(n) => filled += n,
                IoStep::WouldBlock => wait_for_readiness(&mut waited, self.timeout())?,
                IoStep::Closed => return Err(TransportError::ConnectionLost),
            }
        }
        Ok(())
    }

    /// Non-blocking exact-length read: if no bytes are immediately available
    /// returns [`TryReceive::WouldBlock`] without consuming anything;
    /// otherwise waits for the full buffer.
    fn try_receive_all(&mut self, buf: &mut [u8]) -> TransportResult<TryReceive> {
        if buf.is_empty() {
            return Ok(TryReceive::Filled);
        }
        if !self.is_connected() {
            return Err(TransportError::ConnectionLost);
        }
        match self.receive(buf)? {
            IoStep::WouldBlock => Ok(TryReceive::WouldBlock),
            IoStep::Closed => Err(TransportError::ConnectionLost),
            IoStep::Transferred(n) => {
                self.receive_all(&mut buf[n..])?;
                Ok(TryReceive::Filled)
            }
        }
    }
}

/// Backoff for would-block loops in the provided combinators, bounded by the
/// transport's own timeout.
fn wait_for_readiness(
    started: &mut Option<Instant>,
    timeout: Option<Duration>,
) -> TransportResult<()> {
    let start = started.get_or_insert_with(Instant::now);
    if let Some(limit) = timeout {
        if start.elapsed() >= limit {
            return Err(TransportError::TimedOut);
        }
    }
    std::thread::sleep(Duration::from_millis(1));
    Ok(())
}

static STACK_REFS: AtomicUsize = AtomicUsize::new(0);

/// Reference-counted handle on the process-wide transport stack.
///
/// The first handle initialises the stack before any endpoint exists; the
/// last one to drop tears it down. TCP needs no real global state, but
/// transports that do get their ordering guarantee from this.
#[derive(Debug)]
pub(crate) struct StackGuard(());

impl StackGuard {
    pub(crate) fn acquire() -> Self {
        if STACK_REFS.fetch_add(1, Ordering::AcqRel) == 0 {
            trace!("transport stack initialised");
        }
        Self(())
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        if STACK_REFS.fetch_sub(1, Ordering::AcqRel) == 1 {
            trace!("transport stack torn down");
        }
    }
}
