//! In-process loopback transport.
//!
//! [`pair`] yields two connected endpoints backed by shared byte queues,
//! honouring the same blocking/non-blocking and timeout semantics as a real
//! transport. Useful for tests and for driving two sessions inside one
//! process.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{IoStep, StackGuard, Transport, TransportError, TransportResult};

#[derive(Debug, Default)]
struct ChannelState {
    bytes: VecDeque<u8>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Channel {
    state: Mutex<ChannelState>,
    readable: Condvar,
}

impl Channel {
    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_all();
    }
}

static NEXT_PORT: AtomicU16 = AtomicU16::new(1);

/// One endpoint of an in-process loopback connection.
#[derive(Debug)]
pub struct MemoryTransport {
    rx: Arc<Channel>,
    tx: Arc<Channel>,
    peer: SocketAddr,
    blocking: bool,
    timeout: Option<Duration>,
    connected: bool,
    _stack: StackGuard,
}

/// Creates a connected pair of loopback endpoints, both blocking with no
/// timeout.
#[must_use]
pub fn pair() -> (MemoryTransport, MemoryTransport) {
    let a_to_b = Arc::new(Channel::default());
    let b_to_a = Arc::new(Channel::default());
    let port = NEXT_PORT.fetch_add(2, Ordering::Relaxed);
    let make = |rx: &Arc<Channel>, tx: &Arc<Channel>, port: u16| MemoryTransport {
        rx: Arc::clone(rx),
        tx: Arc::clone(tx),
        peer: SocketAddr::from(([127, 0, 0, 1], port)),
        blocking: true,
        timeout: None,
        connected: true,
        _stack: StackGuard::acquire(),
    };
    (
        make(&b_to_a, &a_to_b, port),
        make(&a_to_b, &b_to_a, port.wrapping_add(1)),
    )
}

impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn set_blocking(&mut self, blocking: bool) -> TransportResult<()> {
        self.blocking = blocking;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> TransportResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.connected.then_some(self.peer)
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.tx.close();
            self.rx.close();
        }
    }

    fn send(&mut self, buf: &[u8]) -> TransportResult<IoStep> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let mut state = self.tx.lock();
        if state.closed {
            return Ok(IoStep::Closed);
        }
        state.bytes.extend(buf);
        self.tx.readable.notify_all();
        Ok(IoStep::Transferred(buf.len()))
    }

    fn receive(&mut self, buf: &mut [u8]) -> TransportResult<IoStep> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let deadline = self.timeout.map(|limit| Instant::now() + limit);
        let mut state = self.rx.lock();
        loop {
            if !state.bytes.is_empty() {
                let count = buf.len().min(state.bytes.len());
                for slot in &mut buf[..count] {
                    *slot = state.bytes.pop_front().unwrap_or_default();
                }
                return Ok(IoStep::Transferred(count));
            }
            if state.closed {
                return Ok(IoStep::Closed);
            }
            if !self.blocking {
                return Ok(IoStep::WouldBlock);
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TransportError::TimedOut);
                    }
                    let (guard, _) = self
                        .rx
                        .readable
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
                None => self
                    .rx
                    .readable
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}
