//! ControllerDaemon implementation.
//!
//! The ControllerDaemon is the single writer of all controller state. It
//! consumes events from a bounded channel, applies topology changes to the
//! graph, queues work on the orchestrators, and runs them in priority order
//! (lower value first) after every event.

use log::{debug, info, warn};
use sdn_orch_common::Orch;
use sdn_types::DeviceId;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::flow::{HostTracker, TopologyProvider};
use crate::l3routing::{L3RoutingOrch, RoutingTask};
use crate::loadbalancer::{LoadBalancerOrch, LoadBalancerTask};
use crate::packet::PacketIn;
use crate::topology::{HostChange, TopologyChange, TopologyGraph};

/// Error type for submitting events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DaemonError {
    #[error("Controller event loop has stopped")]
    Closed,

    #[error("Controller event queue is full")]
    QueueFull,
}

/// Result type for event submission.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Input to the controller event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Topology(TopologyChange),
    Host(HostChange),
    PacketIn(PacketIn),
    Shutdown,
}

/// Configuration for the ControllerDaemon.
#[derive(Debug, Clone)]
pub struct ControllerDaemonConfig {
    /// Capacity of the event channel
    pub event_queue_depth: usize,
}

impl Default for ControllerDaemonConfig {
    fn default() -> Self {
        Self {
            event_queue_depth: 1024,
        }
    }
}

/// Cloneable sender side of the event loop.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerEvent>,
}

impl ControllerHandle {
    /// Submits an event, waiting for queue space.
    pub async fn send(&self, event: ControllerEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| DaemonError::Closed)
    }

    /// Submits an event without waiting.
    pub fn try_send(&self, event: ControllerEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DaemonError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DaemonError::Closed,
        })
    }

    /// Asks the event loop to stop after draining earlier events.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(ControllerEvent::Shutdown).await
    }
}

/// The controller event loop.
pub struct ControllerDaemon {
    topology: TopologyGraph,
    hosts: Arc<dyn HostTracker>,
    routing: L3RoutingOrch,
    loadbalancer: LoadBalancerOrch,
    rx: mpsc::Receiver<ControllerEvent>,
    events_handled: u64,
}

impl ControllerDaemon {
    /// Creates the daemon and the handle used to feed it.
    pub fn new(
        config: ControllerDaemonConfig,
        routing: L3RoutingOrch,
        loadbalancer: LoadBalancerOrch,
        hosts: Arc<dyn HostTracker>,
    ) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::channel(config.event_queue_depth.max(1));
        info!(
            "Registering {} with priority {}",
            routing.name(),
            routing.priority()
        );
        info!(
            "Registering {} with priority {}",
            loadbalancer.name(),
            loadbalancer.priority()
        );
        let daemon = Self {
            topology: TopologyGraph::new(),
            hosts,
            routing,
            loadbalancer,
            rx,
            events_handled: 0,
        };
        (daemon, ControllerHandle { tx })
    }

    pub fn topology(&self) -> &TopologyGraph {
        &self.topology
    }

    pub fn routing(&self) -> &L3RoutingOrch {
        &self.routing
    }

    pub fn loadbalancer(&self) -> &LoadBalancerOrch {
        &self.loadbalancer
    }

    pub fn events_handled(&self) -> u64 {
        self.events_handled
    }

    /// Loads the provider's current devices and links, bootstraps every
    /// device, and performs one full resync.
    pub async fn bootstrap_from(&mut self, provider: &dyn TopologyProvider) {
        for device in provider.devices() {
            let id = device.id;
            if let Err(e) = self.topology.apply(TopologyChange::DeviceAdded(device)) {
                warn!("Ignoring device {}: {}", id, e);
                continue;
            }
            self.queue_device_joined(id);
        }
        for link in provider.links() {
            if let Err(e) = self.topology.apply(TopologyChange::LinkAdded(link)) {
                warn!("Ignoring link {}: {}", link, e);
            }
        }
        info!(
            "Loaded {} devices and {} links",
            self.topology.device_count(),
            self.topology.link_count()
        );
        self.queue_resync();
        self.run_orchs().await;
    }

    fn queue_device_joined(&mut self, device: DeviceId) {
        self.loadbalancer.enqueue(LoadBalancerTask::DeviceJoined(device));
        self.routing.enqueue(RoutingTask::DeviceJoined(device));
    }

    fn queue_resync(&mut self) {
        self.routing.enqueue(RoutingTask::Resync {
            topology: self.topology.snapshot(),
            hosts: self.hosts.hosts(),
        });
    }

    fn on_topology_change(&mut self, change: TopologyChange) {
        let joined = match &change {
            TopologyChange::DeviceAdded(device) => Some(device.id),
            _ => None,
        };
        let removed = match &change {
            TopologyChange::DeviceRemoved(id) => Some(*id),
            _ => None,
        };

        match self.topology.apply(change) {
            Ok(changed) => {
                // A rejoining device gets its bootstrap rules even when the
                // graph already knew it
                if let Some(device) = joined {
                    self.queue_device_joined(device);
                }
                if let Some(device) = removed {
                    self.routing.enqueue(RoutingTask::DeviceRemoved(device));
                }
                // A reconnecting device may have lost its whole table, so
                // every join rebuilds routes even when the graph is unchanged
                if changed || joined.is_some() {
                    self.queue_resync();
                } else {
                    debug!("Topology change had no effect");
                }
            }
            Err(e) => warn!("Rejected topology change: {}", e),
        }
    }

    fn on_host_change(&mut self, change: HostChange) {
        self.hosts.record_change(&change);
        let task = match change {
            HostChange::Attached(host) => RoutingTask::HostAttached(host),
            HostChange::Detached(host) => RoutingTask::HostDetached(host),
            HostChange::Moved { previous, current } => RoutingTask::HostMoved { previous, current },
        };
        self.routing.enqueue(task);
    }

    /// Applies one event and runs the orchestrators.
    ///
    /// Returns false once the event loop should stop.
    pub async fn handle_event(&mut self, event: ControllerEvent) -> bool {
        self.events_handled += 1;
        match event {
            ControllerEvent::Topology(change) => self.on_topology_change(change),
            ControllerEvent::Host(change) => self.on_host_change(change),
            ControllerEvent::PacketIn(packet) => {
                self.loadbalancer.enqueue(LoadBalancerTask::PacketIn(packet))
            }
            ControllerEvent::Shutdown => return false,
        }
        self.run_orchs().await;
        true
    }

    /// Runs every orchestrator with pending work, in priority order.
    async fn run_orchs(&mut self) {
        let mut orchs: [&mut dyn Orch; 2] = [&mut self.loadbalancer, &mut self.routing];
        orchs.sort_by_key(|orch| orch.priority());
        for orch in orchs {
            if orch.has_pending_tasks() {
                debug!("Processing tasks for {}", orch.name());
                orch.do_task().await;
            }
        }
    }

    /// Runs until a shutdown event arrives or every handle is dropped.
    pub async fn run(mut self) -> Self {
        info!("Starting controller event loop");
        while let Some(event) = self.rx.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        info!(
            "Controller event loop stopped after {} events",
            self.events_handled
        );
        self
    }

    /// Status lines for the orchestrators and published state.
    pub fn dump_status(&self) -> Vec<String> {
        let counters = self.routing.counters();
        let mut lines = vec![
            format!(
                "topology: {} devices, {} links, version {}",
                self.topology.device_count(),
                self.topology.link_count(),
                self.topology.version()
            ),
            format!(
                "{}: generation {}, {} routes, {} ok / {} skipped / {} failed",
                self.routing.name(),
                self.routing.path_store().generation(),
                self.routing.installed_route_count(),
                counters.success,
                counters.skipped,
                counters.failed
            ),
        ];
        lines.extend(
            self.loadbalancer
                .dump_instances()
                .into_iter()
                .map(|line| format!("{}: {}", self.loadbalancer.name(), line)),
        );
        lines
    }
}
