//! Accepts inbound transport connections and hands each off as a session.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use tracing::{debug, info};

use crate::config::Configuration;
use crate::session::Session;
use crate::transport::{TcpTransport, TransportResult};

/// Owns one listening transport endpoint.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    blocking: bool,
    config: Configuration,
}

impl Listener {
    /// Binds and listens on `host:port`, in blocking mode.
    pub fn bind(config: &Configuration, host: Ipv4Addr, port: u16) -> TransportResult<Self> {
        let inner = TcpListener::bind(SocketAddr::from((host, port)))?;
        // The OS applies its own backlog; the configured value is a hint.
        debug!("listen backlog hint: {}", config.listen_backlog);
        info!("listening on {}", inner.local_addr()?);
        Ok(Self {
            inner,
            blocking: true,
            config: config.clone(),
        })
    }

    /// The bound local address (useful with port 0).
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Switches the accepting socket between blocking and non-blocking mode.
    pub fn set_blocking(&mut self, blocking: bool) -> TransportResult<()> {
        self.inner.set_nonblocking(!blocking)?;
        self.blocking = blocking;
        Ok(())
    }

    /// Accepts one inbound connection as a new session whose blocking mode is
    /// inherited from the listener. In non-blocking mode, `Ok(None)` means no
    /// connection was waiting.
    pub fn accept(&self) -> TransportResult<Option<Session<TcpTransport>>> {
        match self.inner.accept() {
            Ok((stream, peer)) => {
                let transport = TcpTransport::from_stream(
                    stream,
                    self.blocking,
                    self.config.timeout_duration(),
                )?;
                info!("accepted connection from {peer}");
                Ok(Some(Session::new(transport, self.config.clone())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Listener;
    use crate::config::Configuration;
    use crate::transport::TcpTransport;
    use crate::Session;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    #[test]
    fn accepted_session_is_connected() {
        let config = Configuration::default();
        let listener = Listener::bind(&config, Ipv4Addr::LOCALHOST, 0).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = std::thread::spawn(move || {
            let transport =
                TcpTransport::connect(addr, Some(Duration::from_secs(5))).unwrap();
            Session::new(transport, Configuration::default())
        });

        let session = listener.accept().unwrap().unwrap();
        assert!(session.is_connected());
        assert!(session.remote_addr().is_some());

        let peer = client.join().unwrap();
        assert!(peer.is_connected());
        assert_eq!(peer.remote_addr(), Some(addr));
    }

    #[test]
    fn non_blocking_accept_reports_empty() {
        let config = Configuration::default();
        let mut listener = Listener::bind(&config, Ipv4Addr::LOCALHOST, 0).unwrap();
        listener.set_blocking(false).unwrap();
        assert!(listener.accept().unwrap().is_none());
    }
}
