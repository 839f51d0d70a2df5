//! Command line interface for the `msrp-echo` binary.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `msrp-echo` binary.
#[derive(Debug, Parser)]
#[command(
    name = "msrp-echo",
    version,
    about = "Accept sessions and echo every message back"
)]
pub struct Cli {
    /// Address to accept connections on.
    #[arg(short, long, default_value = "127.0.0.1:2855")]
    pub listen: SocketAddr,
    /// URI peers address their messages to.
    #[arg(long, default_value = "msrp://127.0.0.1:2855/echo;tcp")]
    pub local_path: String,
    /// URI echoed messages are addressed to.
    #[arg(long)]
    pub remote_path: String,
    /// Serve Prometheus metrics on this address.
    #[cfg(feature = "metrics")]
    #[arg(long)]
    pub metrics: Option<SocketAddr>,
}
