//! SDN controller entry point.
//!
//! Without a device channel the controller runs in simulation mode: the
//! static topology from the configuration file is loaded, flow programming
//! and packet emission are logged, and the event loop runs until Ctrl-C.

use clap::Parser;
use log::{error, info, warn};
use sdn_controller::config::ControllerConfig;
use sdn_controller::daemon::ControllerDaemon;
use sdn_controller::l3routing::L3RoutingOrch;
use sdn_controller::loadbalancer::{build_instances, LoadBalancerCollaborators, LoadBalancerOrch};
use sdn_controller::sim::{LoggingFlowProgrammer, LoggingPacketEmitter, StaticHostTracker, StaticTopology};
use sdn_types::TableId;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// SDN controller: shortest-path routing and transparent TCP load balancing
#[derive(Parser, Debug)]
#[command(name = "sdn-controller")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Override the routing table id
    #[arg(long)]
    routing_table: Option<u8>,

    /// Override the load balancer table id
    #[arg(long)]
    loadbalancer_table: Option<u8>,

    /// Override the event queue depth
    #[arg(long)]
    event_queue_depth: Option<usize>,
}

fn load_config(args: &Args) -> Result<ControllerConfig, sdn_controller::ConfigError> {
    let mut config = match &args.config {
        Some(path) => ControllerConfig::load(path)?,
        None => {
            warn!("No configuration file given, using defaults");
            ControllerConfig::default()
        }
    };
    if let Some(table) = args.routing_table {
        config.routing_table = TableId::new(table);
    }
    if let Some(table) = args.loadbalancer_table {
        config.loadbalancer_table = TableId::new(table);
    }
    if let Some(depth) = args.event_queue_depth {
        config.event_queue_depth = depth;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("Starting SDN controller");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let instances = build_instances(config.instance_configs());
    let virtual_ips = instances.keys().copied().collect();
    info!("Load balancing {} virtual IPs", instances.len());

    let routing_config = match config.routing_config(virtual_ips) {
        Ok(routing_config) => routing_config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Tables: load balancer {}, routing {}, next {}",
        config.loadbalancer_table, routing_config.table, routing_config.next_table
    );

    let static_topology = config.topology.clone().unwrap_or_default();
    let hosts = Arc::new(StaticHostTracker::from_config(&static_topology));
    let programmer = Arc::new(LoggingFlowProgrammer::new());
    let emitter = Arc::new(LoggingPacketEmitter::new());

    let routing = L3RoutingOrch::new(routing_config, programmer.clone());
    let loadbalancer = LoadBalancerOrch::new(
        config.loadbalancer_config(),
        instances,
        LoadBalancerCollaborators {
            programmer: programmer.clone(),
            emitter: emitter.clone(),
            resolver: hosts.clone(),
        },
    );

    let (mut daemon, handle) =
        ControllerDaemon::new(config.daemon_config(), routing, loadbalancer, hosts.clone());
    daemon
        .bootstrap_from(&StaticTopology::from_config(&static_topology))
        .await;

    let shutdown_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                if let Err(e) = handle.shutdown().await {
                    error!("Failed to stop event loop: {}", e);
                }
            }
            Err(err) => {
                error!("Failed to listen for ctrl-c: {}", err);
            }
        }
    });

    let daemon = daemon.run().await;
    shutdown_handle.abort();

    for line in daemon.dump_status() {
        info!("{}", line);
    }
    info!(
        "{} flow-mods installed, {} removed, {} packets sent",
        programmer.installs(),
        programmer.removals(),
        emitter.sent()
    );
    info!("SDN controller shutdown complete");

    ExitCode::SUCCESS
}
