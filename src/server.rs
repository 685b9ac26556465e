//! Server driver: accepts connections and drives every session's
//! cooperative update loop until it disconnects.
//!
//! One acceptor thread blocks on the listener and pushes fresh sessions onto
//! a mutex-guarded handoff queue; the polling loop adopts them, switches them
//! to non-blocking, and calls [`Session::update`] on each in turn.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{info, warn};

use crate::config::Configuration;
use crate::listener::Listener;
use crate::session::{Session, SessionError};
use crate::transport::{TcpTransport, Transport};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The set of live sessions being polled.
#[derive(Debug, Default)]
pub(crate) struct SessionPool<T: Transport> {
    sessions: Vec<Session<T>>,
}

impl<T: Transport> SessionPool<T> {
    pub(crate) fn new() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }

    pub(crate) fn adopt(&mut self, session: Session<T>) {
        self.sessions.push(session);
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Polls every session once, dropping the ones that have finished or
    /// failed.
    pub(crate) fn poll_once(&mut self) {
        self.sessions.retain(|session| match session.update() {
            Ok(()) => true,
            Err(SessionError::NotConnected | SessionError::ConnectionLost) => {
                info!("session with {:?} closed", session.remote_addr());
                false
            }
            Err(e) => {
                warn!("session with {:?} failed: {e}", session.remote_addr());
                session.disconnect();
                false
            }
        });
    }
}

/// Runs the server until the process is terminated.
pub fn server_main(config: &Configuration, host: Ipv4Addr, port: u16) -> anyhow::Result<()> {
    let listener =
        Listener::bind(config, host, port).context("could not bind the listening socket")?;

    let handoff: Arc<Mutex<Vec<Session<TcpTransport>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let handoff = Arc::clone(&handoff);
        thread::Builder::new()
            .name("uft-accept".into())
            .spawn(move || accept_loop(&listener, &handoff))
            .context("could not start the acceptor thread")?;
    }

    let mut pool = SessionPool::new();
    loop {
        {
            let mut queue = handoff.lock().unwrap_or_else(PoisonError::into_inner);
            for session in queue.drain(..) {
                pool.adopt(session);
            }
        }
        pool.poll_once();
        thread::sleep(POLL_INTERVAL);
    }
}

fn accept_loop(listener: &Listener, handoff: &Mutex<Vec<Session<TcpTransport>>>) {
    loop {
        match listener.accept() {
            Ok(Some(session)) => {
                if let Err(e) = session.set_blocking(false) {
                    warn!("could not prepare accepted session: {e}");
                    continue;
                }
                handoff
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(session);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                warn!("accept failed: {e}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionPool;
    use crate::config::Configuration;
    use crate::session::Session;
    use crate::transport::{memory, Transport as _};

    #[test]
    fn pool_drops_dead_sessions() {
        let (mut a, b) = memory::pair();
        a.set_blocking(false).unwrap();
        let server = Session::new(a, Configuration::default());
        let peer = Session::new(b, Configuration::default());

        let mut pool = SessionPool::new();
        pool.adopt(server);
        pool.poll_once();
        assert_eq!(pool.len(), 1);

        peer.disconnect();
        pool.poll_once();
        assert_eq!(pool.len(), 0);
    }
}
