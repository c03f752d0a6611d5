//! nimbus: provision compute clusters and bootstrap a parallel engine.
//!
//! # Usage
//!
//! ```text
//! nimbus --config nimbus.toml start
//! nimbus stop [--workers-only]
//! nimbus list --format json
//! nimbus engine add-node i-0000000a
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(
    name = "nimbus",
    about = "nimbus: cloud cluster provisioning with a parallel engine",
    version,
    propagate_version = true
)]
struct Cli {
    /// Cluster configuration file.
    #[arg(short, long, global = true, default_value = "nimbus.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch the cluster, wait for every node, and bootstrap the master.
    Start,
    /// Terminate the cluster's running instances.
    Stop {
        /// Keep the master; terminate workers without asking.
        #[arg(long)]
        workers_only: bool,
    },
    /// Print every instance the provider reports.
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Open an interactive shell on the master node.
    Sshmaster {
        /// Login user (default: cluster.login_user)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Manage the parallel engine on a running cluster.
    Engine {
        #[command(subcommand)]
        action: EngineAction,
    },
}

#[derive(Subcommand)]
enum EngineAction {
    /// Start the controller and engines across all nodes.
    Start,
    /// Stop the controller and every engine.
    Stop,
    /// Start engines on a node and add it to the engine config.
    AddNode {
        /// Instance id of a running cluster node
        instance_id: String,
    },
    /// Drop a node from the engine config and stop its engines.
    RemoveNode {
        /// Instance id of a running cluster node
        instance_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let (cancel_tx, cancel) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let mut ctx = commands::Context::load(&cli.config)?;

    match cli.command {
        Command::Start => commands::cluster::start(&mut ctx, cancel).await,
        Command::Stop { workers_only } => commands::cluster::stop(&mut ctx, workers_only, cancel).await,
        Command::List { format } => commands::cluster::list(&ctx, &format).await,
        Command::Sshmaster { user } => commands::cluster::sshmaster(&ctx, user.as_deref()).await,
        Command::Engine { action } => match action {
            EngineAction::Start => commands::engine::start(&ctx, cancel).await,
            EngineAction::Stop => commands::engine::stop(&ctx, cancel).await,
            EngineAction::AddNode { instance_id } => {
                commands::engine::add_node(&ctx, &instance_id, cancel).await
            }
            EngineAction::RemoveNode { instance_id } => {
                commands::engine::remove_node(&ctx, &instance_id, cancel).await
            }
        },
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nimbus=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_engine_add_node() {
        let cli = Cli::parse_from(["nimbus", "-c", "demo.toml", "engine", "add-node", "i-0000000a"]);
        assert_eq!(cli.config, PathBuf::from("demo.toml"));
        assert!(matches!(
            cli.command,
            Command::Engine { action: EngineAction::AddNode { ref instance_id } } if instance_id == "i-0000000a"
        ));
    }

    #[test]
    fn stop_defaults_to_whole_cluster() {
        let cli = Cli::parse_from(["nimbus", "stop"]);
        assert_eq!(cli.config, PathBuf::from("nimbus.toml"));
        assert!(matches!(cli.command, Command::Stop { workers_only: false }));

        let cli = Cli::parse_from(["nimbus", "stop", "--workers-only"]);
        assert!(matches!(cli.command, Command::Stop { workers_only: true }));
    }
}
