//! L3RoutingOrch implementation.
//!
//! Installs one destination-IP rule per attached host on every device,
//! pointing at the egress port of the shortest path towards the host.
//! Topology changes are handled by reconstruction: recompute paths, reset
//! every device, and re-add every attached host.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use sdn_orch_common::{Orch, QueueConfig, TaskCounters, TaskQueue, TaskStatus};
use sdn_types::{DeviceId, PortNo};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use super::types::{InstalledRuleRecord, RoutingConfig, RoutingTask};
use crate::flow::{
    bootstrap_rules, FlowAction, FlowError, FlowMatch, FlowProgrammer, FlowRule, DEFAULT_PRIORITY,
};
use crate::paths::{PathEngine, PathLookupError, PathStore};
use crate::topology::{Host, TopologySnapshot};

/// Error type for L3RoutingOrch operations.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("No path tree rooted at {0}")]
    NoPathTree(DeviceId),

    #[error("Path lookup failed: {0}")]
    Lookup(#[from] PathLookupError),

    #[error("No link from {device} towards {peer}")]
    NoLink { device: DeviceId, peer: DeviceId },

    #[error("Flow programming failed: {0}")]
    Flow(#[from] FlowError),
}

impl RoutingError {
    /// Topology inconsistencies are skips; programming failures are failures.
    pub fn to_status(&self) -> TaskStatus {
        match self {
            RoutingError::Flow(_) => TaskStatus::Failed,
            _ => TaskStatus::Skipped,
        }
    }
}

/// Result type for L3RoutingOrch operations.
pub type Result<T> = std::result::Result<T, RoutingError>;

/// L3RoutingOrch - shortest-path host routing.
pub struct L3RoutingOrch {
    config: RoutingConfig,
    queue: TaskQueue<RoutingTask>,
    programmer: Arc<dyn FlowProgrammer>,
    engine: PathEngine,
    paths: Arc<PathStore>,
    /// Topology the published path table was computed from.
    topology: TopologySnapshot,
    installed: BTreeMap<DeviceId, InstalledRuleRecord>,
    counters: TaskCounters,
}

impl L3RoutingOrch {
    pub fn new(config: RoutingConfig, programmer: Arc<dyn FlowProgrammer>) -> Self {
        Self {
            config,
            queue: TaskQueue::new(QueueConfig::new("ROUTING_TASKS")),
            programmer,
            engine: PathEngine::new(),
            paths: Arc::new(PathStore::new()),
            topology: TopologySnapshot::default(),
            installed: BTreeMap::new(),
            counters: TaskCounters::default(),
        }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Shared handle to the published path table.
    pub fn path_store(&self) -> Arc<PathStore> {
        Arc::clone(&self.paths)
    }

    pub fn counters(&self) -> TaskCounters {
        self.counters
    }

    /// Returns the routes recorded for `device`.
    pub fn installed(&self, device: DeviceId) -> Option<&InstalledRuleRecord> {
        self.installed.get(&device)
    }

    pub fn installed_route_count(&self) -> usize {
        self.installed.values().map(InstalledRuleRecord::len).sum()
    }

    /// Queues a task. A resync replaces any resync still pending.
    pub fn enqueue(&mut self, task: RoutingTask) {
        if task.is_resync() {
            self.queue.push_coalescing(task, RoutingTask::is_resync);
        } else {
            self.queue.push(task);
        }
    }

    /// Installs the bootstrap rules on a (re)joining device.
    pub fn bootstrap_device(&mut self, device: DeviceId) -> Result<()> {
        let rules = bootstrap_rules(self.config.table, self.config.next_table, &self.config.virtual_ips);
        for rule in &rules {
            self.programmer.install(device, rule)?;
        }
        info!(
            "L3RoutingOrch: Installed {} bootstrap rules on {}",
            rules.len(),
            device
        );
        Ok(())
    }

    /// Installs the route to `host` on `device`.
    ///
    /// Returns the egress port, or `None` when the host is not attached.
    pub fn add_route(&mut self, device: DeviceId, host: &Host) -> Result<Option<PortNo>> {
        let (Some(ip), Some(attachment)) = (host.ipv4, host.attachment) else {
            return Ok(None);
        };

        let port = if attachment.device == device {
            attachment.port
        } else {
            self.egress_port(device, attachment.device)?
        };

        let rule = FlowRule::new(self.config.table, DEFAULT_PRIORITY, FlowMatch::ipv4_dst(ip))
            .apply(vec![FlowAction::Output(port)]);
        self.programmer.install(device, &rule)?;
        self.installed.entry(device).or_default().insert(ip);

        debug!("L3RoutingOrch: Route to {} on {} via port {}", ip, device, port);
        Ok(Some(port))
    }

    /// Resolves `device`'s port on the first hop towards `target`.
    fn egress_port(&self, device: DeviceId, target: DeviceId) -> Result<PortNo> {
        let table = self.paths.snapshot();
        let tree = table.tree(device).ok_or(RoutingError::NoPathTree(device))?;
        let hop = tree.first_hop(target)?;
        self.topology
            .port_towards(device, hop)
            .ok_or(RoutingError::NoLink { device, peer: hop })
    }

    /// Removes the route to `host` from `device`.
    ///
    /// Returns true if the route was recorded as installed. The removal is
    /// requested either way; removing an absent rule is a no-op.
    pub fn remove_route(&mut self, device: DeviceId, host: &Host) -> bool {
        let Some(ip) = host.ipv4 else {
            return false;
        };
        self.request_removal(device, ip);
        self.installed
            .get_mut(&device)
            .map_or(false, |record| record.remove(ip))
    }

    /// Removes every recorded route from `device` and clears its record.
    ///
    /// Returns the number of routes removed.
    pub fn reset_device(&mut self, device: DeviceId) -> usize {
        let destinations = match self.installed.get_mut(&device) {
            Some(record) => record.take(),
            None => return 0,
        };
        for ip in &destinations {
            self.request_removal(device, *ip);
        }
        destinations.len()
    }

    fn request_removal(&self, device: DeviceId, ip: Ipv4Addr) {
        if let Err(e) = self
            .programmer
            .remove(device, self.config.table, &FlowMatch::ipv4_dst(ip))
        {
            warn!("L3RoutingOrch: Failed to remove route to {} on {}: {}", ip, device, e);
        }
    }

    /// Recomputes paths for `topology` and rebuilds every device's routes.
    ///
    /// When the computation fails the previous table and rules stay in place.
    pub fn resync(&mut self, topology: TopologySnapshot, hosts: &[Host]) -> TaskStatus {
        let table = match self.engine.compute(&topology) {
            Ok(table) => table,
            Err(e) => {
                error!("L3RoutingOrch: Keeping previous paths: {}", e);
                return TaskStatus::InvalidEntry;
            }
        };
        let generation = table.generation();
        self.paths.publish(table);
        self.topology = topology;

        // Devices no longer present lost their rules along with them
        let present: Vec<DeviceId> = self.topology.device_ids().collect();
        self.installed.retain(|device, _| present.contains(device));

        let mut status = TaskStatus::Success;
        for device in &present {
            self.reset_device(*device);
            for host in hosts.iter().filter(|h| h.is_attached()) {
                if let Err(e) = self.add_route(*device, host) {
                    debug!("L3RoutingOrch: Skipping {} on {}: {}", host, device, e);
                    if e.to_status() == TaskStatus::Failed {
                        status = TaskStatus::Failed;
                    }
                }
            }
        }

        info!(
            "L3RoutingOrch: Resync generation {} installed {} routes on {} devices",
            generation,
            self.installed_route_count(),
            present.len()
        );
        status
    }

    /// Adds the route to `host` on every known device.
    fn add_host(&mut self, host: &Host) -> TaskStatus {
        if !host.is_attached() {
            return TaskStatus::Ignore;
        }
        let devices: Vec<DeviceId> = self.topology.device_ids().collect();
        let mut status = TaskStatus::Success;
        for device in devices {
            if let Err(e) = self.add_route(device, host) {
                warn!("L3RoutingOrch: No route to {} on {}: {}", host, device, e);
                status = e.to_status();
            }
        }
        status
    }

    /// Removes the route to `host` from every known device.
    fn remove_host(&mut self, host: &Host) -> TaskStatus {
        let devices: Vec<DeviceId> = self.topology.device_ids().collect();
        let removed = devices
            .into_iter()
            .filter(|device| self.remove_route(*device, host))
            .count();
        if removed == 0 {
            TaskStatus::Ignore
        } else {
            TaskStatus::Success
        }
    }

    fn process(&mut self, task: RoutingTask) -> TaskStatus {
        match task {
            RoutingTask::DeviceJoined(device) => match self.bootstrap_device(device) {
                Ok(()) => TaskStatus::Success,
                Err(e) => {
                    error!("L3RoutingOrch: Bootstrap of {} failed: {}", device, e);
                    e.to_status()
                }
            },
            RoutingTask::DeviceRemoved(device) => {
                if self.installed.remove(&device).is_some() {
                    debug!("L3RoutingOrch: Forgot routes of {}", device);
                    TaskStatus::Success
                } else {
                    TaskStatus::Ignore
                }
            }
            RoutingTask::Resync { topology, hosts } => self.resync(topology, &hosts),
            RoutingTask::HostAttached(host) => self.add_host(&host),
            RoutingTask::HostDetached(host) => self.remove_host(&host),
            RoutingTask::HostMoved { previous, current } => {
                self.remove_host(&previous);
                self.add_host(&current)
            }
        }
    }
}

#[async_trait]
impl Orch for L3RoutingOrch {
    fn name(&self) -> &str {
        "L3RoutingOrch"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn do_task(&mut self) {
        while self.queue.has_pending() {
            for task in self.queue.drain() {
                let status = self.process(task);
                self.counters.record(status);
            }
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.queue.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.queue.dump()
    }
}
