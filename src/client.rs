//! Outbound connection establishment.

use std::net::{Ipv4Addr, SocketAddr};

use tracing::info;

use crate::config::Configuration;
use crate::session::Session;
use crate::transport::{TcpTransport, Transport as _, TransportResult};

/// Connects to a remote endpoint and wraps the connection as a session.
///
/// After connecting, the transport is switched to non-blocking so the
/// session can also be driven server-style via
/// [`Session::update`](crate::Session::update); the blocking one-shot
/// operations work in either mode, bounded by the configured timeout.
pub fn connect(
    config: &Configuration,
    host: Ipv4Addr,
    port: u16,
) -> TransportResult<Session<TcpTransport>> {
    let addr = SocketAddr::from((host, port));
    let mut transport = TcpTransport::connect(addr, config.timeout_duration())?;
    transport.set_blocking(false)?;
    info!("connected to {addr}");
    Ok(Session::new(transport, config.clone()))
}

#[cfg(test)]
mod tests {
    use crate::config::Configuration;
    use crate::listener::Listener;
    use std::net::Ipv4Addr;

    #[test]
    fn connect_yields_a_live_session() {
        let config = Configuration::default();
        let listener = Listener::bind(&config, Ipv4Addr::LOCALHOST, 0).unwrap();
        let port = listener.local_addr().unwrap().port();

        let accepted = std::thread::spawn(move || listener.accept().unwrap().unwrap());
        let session = super::connect(&config, Ipv4Addr::LOCALHOST, port).unwrap();
        assert!(session.is_connected());
        let server_side = accepted.join().unwrap();
        assert!(server_side.is_connected());
    }
}
