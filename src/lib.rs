//! `uft` transfers whole files and content-addressed file deltas between two
//! peers over a reliable-datagram stream transport, using a framed,
//! length-delimited binary session protocol.
//!
//! ## Overview
//!
//! * Directory listing, whole-file upload and download, and delta
//!   resynchronisation of partially-present files.
//! * Files move as fixed-size chunks (10 MiB nominal), each hashed with
//!   FNV-1a 64 and compressed individually with best-speed deflate.
//! * In delta mode, the peers exchange one hash per chunk and retransmit
//!   only the chunks that differ.
//! * A [`Session`] owns one transport connection and multiplexes half-duplex
//!   request/response exchanges over it under an I/O lock. Servers drive
//!   sessions with the cooperative, non-blocking [`Session::update`].
//!
//! The transport itself is abstract (see [`transport::Transport`]): any
//! connection-oriented, reliable, ordered byte stream with blocking-mode and
//! timeout knobs will do. [`transport::TcpTransport`] is the bundled
//! stand-in; [`transport::memory::pair`] gives an in-process loopback.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use uft::{client, Configuration};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Configuration::default();
//! let session = client::connect(&config, Ipv4Addr::LOCALHOST, config.port)?;
//! for entry in session.get_file_list("/srv/data")? {
//!     println!("{} ({} bytes)", entry.path, entry.size);
//! }
//! session.send_file("local.bin", "remote.bin", |done, total| {
//!     eprintln!("{done}/{total}");
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! The wire format is documented in [`protocol`].

pub(crate) mod cli;
pub use cli::cli as main;

pub mod client;
pub mod config;
pub use config::{Configuration, TransferMode};

pub mod fs;
pub use fs::FileInfo;

pub mod listener;
pub use listener::Listener;

pub mod protocol;

pub mod server;
pub use server::server_main;

pub mod session;
pub use session::{Session, SessionError, SessionResult, TransferStats};

pub mod transport;
pub use transport::{Transport, TransportError};

mod util;
