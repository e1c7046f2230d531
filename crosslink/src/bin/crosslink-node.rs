//! Run one crosslink node against a Redis broker.
//!
//! Lines typed on stdin are sent as console staff chat. Operator commands:
//!
//! - `/lookup <name>`: which node holds `name`
//! - `/who [prefix]`: names known across the network
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use crosslink::{ConfigError, CrosslinkConfig, InMemorySessions, LookupResult, Node, NodeBuilder};
use crosslink_transport::{Broker, RedisBroker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "crosslink-node", version, about = "Run a crosslink node")]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `node_id` from the config file.
    #[arg(long)]
    node_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "crosslink-node failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ConfigError> {
    let mut config = match &args.config {
        Some(path) => CrosslinkConfig::load(path)?,
        None => CrosslinkConfig::default(),
    };
    if let Some(node_id) = args.node_id {
        config.node_id = node_id;
    }

    let sessions = Arc::new(InMemorySessions::new());
    let broker = RedisBroker::new(config.broker.clone());
    let node = NodeBuilder::new(config, sessions).build(broker)?;

    if node.start().await {
        info!(node = %node.node_id(), "connected, type to chat");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&node, line.trim()).await,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    break;
                }
            },
        }
    }

    node.shutdown();
    Ok(())
}

async fn handle_line<B: Broker>(node: &Node<B>, line: &str) {
    if line.is_empty() {
        return;
    }
    if let Some(name) = line.strip_prefix("/lookup ") {
        let name = name.trim();
        match node.lookup(name).await {
            LookupResult::Found { node: owner, name, .. } => println!("{name} is on {owner}"),
            LookupResult::NotFound => println!("{name} is not online"),
        }
    } else if let Some(prefix) = line.strip_prefix("/who") {
        println!("{}", node.complete_names(prefix.trim()).join(", "));
    } else if !node.broadcast_console_chat(line).await {
        warn!("chat line did not reach other nodes");
    }
}
