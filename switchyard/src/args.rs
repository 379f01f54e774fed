use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// The Switchyard chat-completions gateway.
#[derive(Debug, Parser)]
#[command(name = "switchyard", version)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "SWITCHYARD_CONFIG", default_value = "switchyard.toml")]
    pub config: PathBuf,

    /// Listen address, overriding the configuration file.
    #[arg(short, long, env = "SWITCHYARD_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "llm=debug,server=debug".
    #[arg(long, env = "SWITCHYARD_LOG", default_value = "info")]
    pub log_filter: String,
}
