//! Command-line arguments of the node binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "dealdesk-node", version, about = "DealDesk settlement node")]
pub struct Args {
    /// JSON engine config; defaults apply to omitted fields.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address the webhook endpoint binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}
