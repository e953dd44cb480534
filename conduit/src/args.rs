use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Conduit model router
#[derive(Debug, Parser)]
#[command(name = "conduit", about = "Routes LLM requests across providers with health-aware fallback")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "CONDUIT_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directive, e.g. `info` or `conduit_llm=debug`
    #[arg(long, default_value = "info", env = "CONDUIT_LOG")]
    pub log: String,
}
