//! Runtime configuration.
//!
//! Hard-wired defaults, overlaid by an optional `uft.toml` in the working
//! directory, overlaid by `UFT_*` environment variables, overlaid by whatever
//! the CLI passes in explicitly.

use std::time::Duration;

use anyhow::ensure;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_CHUNK_SIZE;

/// Which chunk engine a transfer uses when the peer already holds data.
///
/// The wire carries no negotiation, so both peers must be configured alike.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransferMode {
    /// Exchange per-chunk hashes and retransmit only differing chunks,
    /// whenever the file on the far side is present and no larger.
    #[default]
    Delta,
    /// Stream every chunk unconditionally.
    Full,
}

/// The set of configurable options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Transport port the server listens on and the client dials by default.
    pub port: u16,
    /// Per-operation send/receive timeout in milliseconds. Zero disables.
    pub timeout: u32,
    /// Listen backlog hint for the accepting socket.
    pub listen_backlog: u32,
    /// Transfer chunk granularity in bytes. Peers must agree.
    pub chunk_size: u64,
    /// Chunk engine selection. Peers must agree.
    pub transfer_mode: TransferMode,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            port: 9000,
            timeout: 15_000,
            listen_backlog: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            transfer_mode: TransferMode::default(),
        }
    }
}

impl Configuration {
    /// Merges defaults, `uft.toml` and `UFT_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("uft.toml"))
            .merge(Env::prefixed("UFT_"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-checks field values.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.chunk_size > 0, "chunk_size must be positive");
        ensure!(
            self.listen_backlog > 0,
            "listen_backlog must be positive"
        );
        Ok(())
    }

    /// The timeout as a [`Duration`]; `None` when disabled.
    #[must_use]
    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(u64::from(self.timeout)))
    }

    /// Largest packet payload a well-behaved peer can produce: a chunk
    /// compressed into its doubled worst-case buffer, plus the chunk leader.
    pub(crate) fn max_payload(&self) -> u64 {
        2 * self.chunk_size + 64
    }
}
