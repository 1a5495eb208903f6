//! Shortest-path computation over the unit-weight device graph.

use log::{debug, warn};
use sdn_types::DeviceId;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use super::types::{PathEntry, PathTable, PathTree};
use crate::topology::{Link, TopologySnapshot};

/// Error type for malformed computation input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Link {link} references unknown device {device}")]
    UnknownDevice { link: Link, device: DeviceId },

    #[error("Link {0} loops back to the same device")]
    SelfLoop(Link),

    #[error("Device {0} listed more than once")]
    DuplicateDevice(DeviceId),
}

/// Result type for path computation.
pub type Result<T> = std::result::Result<T, PathError>;

type Adjacency = BTreeMap<DeviceId, BTreeSet<DeviceId>>;

/// Builds an undirected adjacency map, rejecting malformed input.
fn build_adjacency(devices: &[DeviceId], links: &[Link]) -> Result<Adjacency> {
    let mut adjacency: Adjacency = BTreeMap::new();
    for device in devices {
        if adjacency.insert(*device, BTreeSet::new()).is_some() {
            return Err(PathError::DuplicateDevice(*device));
        }
    }

    for link in links {
        if link.src == link.dst {
            return Err(PathError::SelfLoop(*link));
        }
        for device in [link.src, link.dst] {
            if !adjacency.contains_key(&device) {
                return Err(PathError::UnknownDevice {
                    link: *link,
                    device,
                });
            }
        }
        // Both endpoints were checked above
        if let Some(neighbors) = adjacency.get_mut(&link.src) {
            neighbors.insert(link.dst);
        }
        if let Some(neighbors) = adjacency.get_mut(&link.dst) {
            neighbors.insert(link.src);
        }
    }

    Ok(adjacency)
}

/// Single-source shortest paths with unit link cost.
///
/// Dijkstra over a binary heap: settle the unvisited device with the least
/// tentative distance, relax its unvisited neighbours with `distance + 1`,
/// and record a predecessor only on strict improvement. Devices never
/// reached keep an unreachable entry.
pub fn shortest_path_tree(source: DeviceId, adjacency: &BTreeMap<DeviceId, BTreeSet<DeviceId>>) -> PathTree {
    let mut entries: BTreeMap<DeviceId, PathEntry> = adjacency
        .keys()
        .map(|id| (*id, PathEntry::unreachable()))
        .collect();
    entries.insert(source, PathEntry::origin());

    let mut visited: BTreeSet<DeviceId> = BTreeSet::new();
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse((0u32, source)));

    while let Some(Reverse((distance, current))) = frontier.pop() {
        if !visited.insert(current) {
            // Stale heap entry for an already settled device
            continue;
        }

        let Some(neighbors) = adjacency.get(&current) else {
            continue;
        };
        let candidate = distance + 1;
        for neighbor in neighbors {
            if visited.contains(neighbor) {
                continue;
            }
            let entry = entries.entry(*neighbor).or_default();
            if entry.distance.map_or(true, |d| candidate < d) {
                *entry = PathEntry::via(candidate, current);
                frontier.push(Reverse((candidate, *neighbor)));
            }
        }
    }

    PathTree::new(source, entries)
}

/// Computes a path tree for every device.
///
/// A disconnected graph is fine; unreachable pairs simply carry no
/// predecessor. Malformed input aborts the whole computation.
pub fn compute_paths(devices: &[DeviceId], links: &[Link], generation: u64) -> Result<PathTable> {
    let adjacency = build_adjacency(devices, links)?;

    let trees = adjacency
        .keys()
        .map(|source| (*source, shortest_path_tree(*source, &adjacency)))
        .collect();

    Ok(PathTable::new(generation, trees))
}

/// Stateful wrapper that numbers successive computations.
#[derive(Debug, Default)]
pub struct PathEngine {
    generation: u64,
    failures: u64,
}

impl PathEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the last successful computation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of computations rejected for malformed input.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Recomputes all path trees from a topology snapshot.
    pub fn compute(&mut self, topology: &TopologySnapshot) -> Result<PathTable> {
        let devices: Vec<DeviceId> = topology.device_ids().collect();
        match compute_paths(&devices, &topology.links, self.generation + 1) {
            Ok(table) => {
                self.generation += 1;
                debug!(
                    "PathEngine: computed generation {} for {} devices, {} links",
                    self.generation,
                    devices.len(),
                    topology.links.len()
                );
                Ok(table)
            }
            Err(e) => {
                self.failures += 1;
                warn!("PathEngine: computation aborted: {}", e);
                Err(e)
            }
        }
    }
}
