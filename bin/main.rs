#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use clap::Parser;
use smtp_bridge::{config::Config, controller::Controller};

#[derive(Parser, Debug)]
#[command(name = "smtp-bridge")]
#[command(about = "Relay plaintext local SMTP to a TLS/authenticated upstream", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file. Defaults to $SMTP_BRIDGE_CONFIG, then
    /// ./smtp-bridge.config.ron, then /etc/smtp-bridge/smtp-bridge.config.ron
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    Controller::new(config)?.run().await
}
