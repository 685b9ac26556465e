//! Argument parsing and command dispatch.

use std::net::Ipv4Addr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use human_repr::HumanCount as _;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::config::{Configuration, TransferMode};
use crate::util::tracing::{setup, trace_level};
use crate::{client, server};

#[derive(Debug, Parser)]
#[command(
    name = "uft",
    version,
    about = "File transfer over a reliable-datagram stream transport",
    after_help = "Defaults come from uft.toml and UFT_* environment variables."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Per-operation timeout in milliseconds (0 disables)
    #[arg(long, global = true, value_name = "ms")]
    timeout: Option<u32>,

    /// Chunk engine selection; both peers must agree
    #[arg(long, global = true, value_enum, value_name = "mode")]
    transfer_mode: Option<TransferMode>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print errors only
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Accept inbound sessions and serve them until terminated
    Server {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1")]
        local_host: Ipv4Addr,
        /// Port to listen on
        #[arg(long)]
        local_port: Option<u16>,
    },
    /// List the regular files in a remote directory
    GetFileList {
        /// Server address
        #[arg(long)]
        remote_host: Ipv4Addr,
        /// Server port
        #[arg(long)]
        remote_port: Option<u16>,
        /// Remote directory to enumerate
        #[arg(long)]
        path: String,
    },
    /// Send a local file to the remote
    SendFile {
        /// Server address
        #[arg(long)]
        remote_host: Ipv4Addr,
        /// Server port
        #[arg(long)]
        remote_port: Option<u16>,
        /// Local source file
        #[arg(long)]
        source: String,
        /// Remote destination path
        #[arg(long)]
        destination: String,
    },
    /// Fetch a remote file
    ReceiveFile {
        /// Server address
        #[arg(long)]
        remote_host: Ipv4Addr,
        /// Server port
        #[arg(long)]
        remote_port: Option<u16>,
        /// Remote source path
        #[arg(long)]
        source: String,
        /// Local destination file
        #[arg(long)]
        destination: String,
    },
}

/// Main CLI entrypoint. Call this from `main`; it reads argv.
#[must_use]
pub fn cli() -> ExitCode {
    let args = Cli::parse();
    setup(trace_level(args.debug, args.quiet));
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> anyhow::Result<()> {
    let mut config = Configuration::load()?;
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(mode) = args.transfer_mode {
        config.transfer_mode = mode;
    }

    match args.command {
        Command::Server {
            local_host,
            local_port,
        } => server::server_main(&config, local_host, local_port.unwrap_or(config.port)),

        Command::GetFileList {
            remote_host,
            remote_port,
            path,
        } => {
            let session =
                client::connect(&config, remote_host, remote_port.unwrap_or(config.port))?;
            let files = session.get_file_list(&path)?;
            for file in &files {
                println!(
                    "{:>10}  mtime {:>10}  {}",
                    file.size.human_count_bytes().to_string(),
                    file.timestamp,
                    file.path
                );
            }
            info!("{} entries in {path:?}", files.len());
            session.disconnect();
            Ok(())
        }

        Command::SendFile {
            remote_host,
            remote_port,
            source,
            destination,
        } => {
            let session =
                client::connect(&config, remote_host, remote_port.unwrap_or(config.port))?;
            let bar = transfer_bar(args.quiet);
            let stats = session.send_file(&source, &destination, |done, total| {
                bar.set_length(total);
                bar.set_position(done);
            })?;
            bar.finish_and_clear();
            info!(
                "sent {source:?} to {destination:?}: {}, {} chunks moved, {} already in sync",
                stats.payload_bytes.human_count_bytes(),
                stats.chunks_moved,
                stats.chunks_skipped
            );
            session.disconnect();
            Ok(())
        }

        Command::ReceiveFile {
            remote_host,
            remote_port,
            source,
            destination,
        } => {
            let session =
                client::connect(&config, remote_host, remote_port.unwrap_or(config.port))?;
            let bar = transfer_bar(args.quiet);
            let stats = session.receive_file(&source, &destination, |done, total| {
                bar.set_length(total);
                bar.set_position(done);
            })?;
            bar.finish_and_clear();
            info!(
                "received {source:?} into {destination:?}: {}, {} chunks moved, {} already in sync",
                stats.payload_bytes.human_count_bytes(),
                stats.chunks_moved,
                stats.chunks_skipped
            );
            session.disconnect();
            Ok(())
        }
    }
}

fn transfer_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(
        "{bar:40} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(0).with_style(style)
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::CommandFactory as _;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
