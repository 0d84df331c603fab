//! CLI command definitions and subcommands

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// swarmnode - task coordination node for a peer-to-peer compute swarm
#[derive(Parser)]
#[command(
    name = "sn",
    about = "Task coordination node for a peer-to-peer compute swarm",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one node on TCP until Ctrl-C
    Run {
        /// Proposal config (YAML) to create once the node is up
        #[arg(short, long, value_name = "FILE")]
        task: Option<PathBuf>,

        /// Override node.peer-id from the config
        #[arg(long)]
        peer_id: Option<String>,

        /// Override node.listen from the config
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Run an in-process swarm and trace one proposal through it
    Simulate {
        /// Number of nodes; node 0 proposes
        #[arg(short, long, default_value_t = 3)]
        nodes: usize,

        /// CPU the proposal requires
        #[arg(long, default_value_t = 1.0)]
        cpu_requirement: f64,

        /// Give up waiting for a terminal state after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },

    /// Print the effective configuration
    Config,
}
