//! swarmnode - task coordination node
//!
//! CLI entry point: run a node over TCP, simulate a small swarm in process,
//! or print the effective configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use swarmnode::cli::{Cli, Command};
use swarmnode::config::Config;
use swarmnode::domain::{ContainerConfig, ProposalConfig, Requirements, new_lock_id};
use swarmnode::events::NodeEvent;
use swarmnode::node::SwarmNode;
use swarmnode::transport::{MemoryNetwork, TcpTransport, Transport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_stderr: bool) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = if let Some(s) = level_str {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        }
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("swarmnode")
            .join("logs");
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(log_dir.join("sn.log")).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), cli.stderr)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run { task, peer_id, listen }) => {
            debug!(?task, ?peer_id, ?listen, "main: matched Run command");
            cmd_run(config, task, peer_id, listen).await
        }
        Some(Command::Simulate {
            nodes,
            cpu_requirement,
            timeout_secs,
        }) => {
            debug!(nodes, cpu_requirement, timeout_secs, "main: matched Simulate command");
            cmd_simulate(&config, nodes, cpu_requirement, Duration::from_secs(timeout_secs)).await
        }
        Some(Command::Config) => {
            debug!("main: matched Config command");
            cmd_config(&config)
        }
        None => {
            debug!("main: no command, showing effective config");
            cmd_config(&config)
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

fn load_proposal_config(path: &Path) -> Result<ProposalConfig> {
    let content = fs::read_to_string(path).context(format!("Failed to read task file {}", path.display()))?;
    let config: ProposalConfig = serde_yaml::from_str(&content).context("Failed to parse task file")?;
    Ok(config)
}

async fn cmd_run(
    mut config: Config,
    task: Option<PathBuf>,
    peer_id: Option<String>,
    listen: Option<std::net::SocketAddr>,
) -> Result<()> {
    let peer_id = peer_id
        .or(config.node.peer_id.take())
        .unwrap_or_else(|| format!("node-{}", &new_lock_id()[..8]));
    let listen = listen.unwrap_or(config.node.listen);

    let transport = Arc::new(TcpTransport::new(
        peer_id.clone(),
        listen,
        config.node.peers.clone(),
        config.health.probe_timeout(),
    ));
    let node = SwarmNode::start(transport.clone(), config.node_options())
        .await
        .context("Failed to start node")?;
    let (addr, listener) = transport.listen().await.context("Failed to bind listen address")?;
    println!("{} {} listening on {}", "✓".green(), peer_id.cyan(), addr);

    let printer = tokio::spawn(print_events(peer_id.clone(), node.subscribe()));

    if let Some(path) = task {
        let proposal_config = load_proposal_config(&path)?;
        match node.coordinator().create_proposal(proposal_config).await {
            Ok(proposal) => println!("{} Created proposal {}", "✓".green(), proposal.id.cyan()),
            Err(e) => println!("{} Proposal not created: {}", "✗".red(), e),
        }
    }

    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;
    info!("Ctrl-C received, stopping node");
    listener.abort();
    printer.abort();
    node.shutdown().await;
    Ok(())
}

async fn cmd_simulate(config: &Config, nodes: usize, cpu_requirement: f64, timeout: Duration) -> Result<()> {
    if nodes < 2 {
        bail!("A simulation needs at least 2 nodes, got {}", nodes);
    }

    let network = MemoryNetwork::new();
    let mut swarm = Vec::with_capacity(nodes);
    let (trace_tx, mut trace_rx) = mpsc::unbounded_channel();
    for i in 0..nodes {
        let transport: Arc<dyn Transport> = Arc::new(network.join(format!("node-{}", i)).await);
        let node = SwarmNode::start(transport, config.node_options())
            .await
            .context("Failed to start node")?;
        tokio::spawn(forward_events(node.peer_id().to_string(), node.subscribe(), trace_tx.clone()));
        swarm.push(node);
    }
    drop(trace_tx);
    println!("{} Started {} nodes", "✓".green(), nodes);

    let proposal_config = ProposalConfig {
        requirements: Requirements {
            cpu: cpu_requirement,
            ..Requirements::default()
        },
        container_config: ContainerConfig {
            image: "alpine:3".to_string(),
            command: "echo hello from the swarm".to_string(),
            ..ContainerConfig::default()
        },
        ..ProposalConfig::default()
    };
    let proposer = &swarm[0];
    let proposal = proposer
        .coordinator()
        .create_proposal(proposal_config)
        .await
        .context("Failed to create proposal")?;
    println!("{} {} proposed {}", "→".cyan(), proposer.peer_id().cyan(), proposal.id);

    let finished = tokio::time::timeout(timeout, async {
        while let Some((node, event)) = trace_rx.recv().await {
            print_event(&node, &event);
            let terminal = matches!(
                &event,
                NodeEvent::ProposalStateChanged { proposal_id, to, .. }
                    if node == proposer.peer_id() && *proposal_id == proposal.id && to.is_terminal()
            );
            if terminal {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    if !finished {
        warn!(proposal_id = %proposal.id, "Simulation timed out");
        println!("{} Timed out waiting for proposal {}", "✗".red(), proposal.id);
    }

    if let Some(final_state) = proposer.coordinator().proposal(&proposal.id).await? {
        println!("{}", serde_json::to_string_pretty(&final_state)?);
    }

    for node in swarm {
        node.shutdown().await;
    }
    Ok(())
}

async fn forward_events(
    node: String,
    mut rx: broadcast::Receiver<NodeEvent>,
    tx: mpsc::UnboundedSender<(String, NodeEvent)>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if tx.send((node.clone(), event)).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(%node, missed = n, "Event trace lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn print_events(node: String, mut rx: broadcast::Receiver<NodeEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&node, &event),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(node: &str, event: &NodeEvent) {
    let detail = match event {
        NodeEvent::ProposalStateChanged { from, to, .. } => format!("{} → {}", from, to),
        NodeEvent::ProposalAccepted { accepted_by, .. } => format!("accepted by {}", accepted_by),
        NodeEvent::TaskStarted { executor_id, .. } => format!("executor {}", executor_id),
        NodeEvent::TaskCompleted { result, .. } => result.to_string(),
        NodeEvent::TaskFailed { error, .. } => error.red().to_string(),
        NodeEvent::PeerDisconnected { attempts, .. } => format!("attempts {}", attempts),
        NodeEvent::ReconnectFailed { error, .. } => error.clone(),
        NodeEvent::FileReceived { file_name, bytes, .. } => format!("{} ({} bytes)", file_name, bytes),
        _ => String::new(),
    };
    let subject = event.proposal_id().or(event.peer_id()).unwrap_or("");
    println!(
        "[{}] {} {} {}",
        node.cyan(),
        event.event_type().yellow(),
        subject.dimmed(),
        detail
    );
}
