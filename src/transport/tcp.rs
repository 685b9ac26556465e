//! TCP as the stand-in reliable ordered stream transport.
//!
//! The endpoint is born open-but-disconnected and becomes connected via
//! [`TcpTransport::connect`] or by being produced from an accepted stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::{debug, trace};

use super::{IoStep, StackGuard, Transport, TransportError, TransportResult};

/// A transport endpoint over one TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    blocking: bool,
    timeout: Option<Duration>,
    _stack: StackGuard,
}

impl TcpTransport {
    /// An open but disconnected endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stream: None,
            peer: None,
            blocking: true,
            timeout: None,
            _stack: StackGuard::acquire(),
        }
    }

    /// Connects to a remote endpoint, in blocking mode, with the given
    /// per-operation timeout applied to the connect itself and to subsequent
    /// I/O.
    pub fn connect(addr: SocketAddr, timeout: Option<Duration>) -> TransportResult<Self> {
        let stream = match timeout {
            Some(limit) => TcpStream::connect_timeout(&addr, limit)?,
            None => TcpStream::connect(addr)?,
        };
        debug!("connected to {addr}");
        Self::from_stream(stream, true, timeout)
    }

    /// Wraps an already-established stream (an accepted connection).
    pub(crate) fn from_stream(
        stream: TcpStream,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> TransportResult<Self> {
        let _ = stream.set_nodelay(true);
        stream.set_nonblocking(!blocking)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        let peer = stream.peer_addr().ok();
        Ok(Self {
            stream: Some(stream),
            peer,
            blocking,
            timeout,
            _stack: StackGuard::acquire(),
        })
    }

    /// Classifies an I/O error from a single read/write attempt.
    fn classify(&mut self, error: &io::Error) -> Option<TransportResult<IoStep>> {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                if self.blocking {
                    // A blocking socket only reports these when its own
                    // timeout elapsed.
                    Some(Err(TransportError::TimedOut))
                } else {
                    Some(Ok(IoStep::WouldBlock))
                }
            }
            io::ErrorKind::Interrupted => Some(Ok(IoStep::Transferred(0))),
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => {
                self.disconnect();
                Some(Ok(IoStep::Closed))
            }
            _ => None,
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn set_blocking(&mut self, blocking: bool) -> TransportResult<()> {
        if let Some(stream) = &self.stream {
            stream.set_nonblocking(!blocking)?;
        }
        self.blocking = blocking;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> TransportResult<()> {
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(timeout)?;
            stream.set_write_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            trace!("disconnecting from {:?}", self.peer);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn send(&mut self, buf: &[u8]) -> TransportResult<IoStep> {
        let Some(mut handle) = self.stream.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        let result = handle.write(buf);
        match result {
            Ok(0) => {
                self.disconnect();
                Ok(IoStep::Closed)
            }
            Ok(n) => Ok(IoStep::Transferred(n)),
            Err(e) => self.classify(&e).unwrap_or(Err(TransportError::Io(e))),
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> TransportResult<IoStep> {
        let Some(mut handle) = self.stream.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        let result = handle.read(buf);
        match result {
            Ok(0) => {
                self.disconnect();
                Ok(IoStep::Closed)
            }
            Ok(n) => Ok(IoStep::Transferred(n)),
            Err(e) => self.classify(&e).unwrap_or(Err(TransportError::Io(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TcpTransport;
    use crate::transport::{Transport, TransportError, TryReceive};
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn disconnected_endpoint_rejects_io() {
        let mut t = TcpTransport::new();
        assert!(!t.is_connected());
        assert!(matches!(
            t.send(b"hi"),
            Err(TransportError::NotConnected)
        ));
        let mut buf = [0u8; 2];
        assert!(matches!(
            t.receive(&mut buf),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn loopback_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut t = TcpTransport::from_stream(stream, true, None).unwrap();
            let mut buf = [0u8; 5];
            t.receive_all(&mut buf).unwrap();
            t.send_all(&buf).unwrap();
        });

        let mut client =
            TcpTransport::connect(addr, Some(Duration::from_secs(5))).unwrap();
        assert!(client.is_connected());
        assert_eq!(client.remote_addr(), Some(addr));
        client.send_all(b"hello").unwrap();
        let mut echo = [0u8; 5];
        client.receive_all(&mut echo).unwrap();
        assert_eq!(&echo, b"hello");
        server.join().unwrap();
    }

    #[test]
    fn non_blocking_read_would_block() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpTransport::connect(addr, None).unwrap();
        let (_held_open, _) = listener.accept().unwrap();

        client.set_blocking(false).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            client.try_receive_all(&mut buf),
            Ok(TryReceive::WouldBlock)
        ));
    }

    #[test]
    fn peer_close_is_connection_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpTransport::connect(addr, Some(Duration::from_secs(5))).unwrap();
        {
            let (_dropped, _) = listener.accept().unwrap();
        }
        let mut buf = [0u8; 4];
        assert!(matches!(
            client.receive_all(&mut buf),
            Err(TransportError::ConnectionLost)
        ));
        assert!(!client.is_connected());
    }
}
