//! Path tree types.

use sdn_types::DeviceId;
use std::collections::BTreeMap;

/// Error returned when a predecessor chain cannot be followed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathLookupError {
    #[error("No path tree rooted at {0}")]
    UnknownSource(DeviceId),

    #[error("{target} is the source of the path tree")]
    TargetIsSource { target: DeviceId },

    #[error("{target} is not reachable from {root}")]
    Unreachable { root: DeviceId, target: DeviceId },

    #[error("Path from {root} to {target} breaks at {at}")]
    BrokenChain {
        root: DeviceId,
        target: DeviceId,
        at: DeviceId,
    },

    #[error("Predecessor chain from {target} back to {root} does not terminate")]
    Cycle { root: DeviceId, target: DeviceId },
}

/// Shortest-path state of one target device relative to a source.
///
/// `distance == None` means unreachable. `predecessor` is absent for the
/// source itself and for unreachable targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathEntry {
    pub distance: Option<u32>,
    pub predecessor: Option<DeviceId>,
}

impl PathEntry {
    /// Entry of the tree's own root.
    pub const fn origin() -> Self {
        Self {
            distance: Some(0),
            predecessor: None,
        }
    }

    pub const fn unreachable() -> Self {
        Self {
            distance: None,
            predecessor: None,
        }
    }

    pub const fn via(distance: u32, predecessor: DeviceId) -> Self {
        Self {
            distance: Some(distance),
            predecessor: Some(predecessor),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.distance.is_some()
    }
}

/// Shortest-path tree rooted at one source device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTree {
    source: DeviceId,
    entries: BTreeMap<DeviceId, PathEntry>,
}

impl PathTree {
    pub fn new(source: DeviceId, entries: BTreeMap<DeviceId, PathEntry>) -> Self {
        Self { source, entries }
    }

    pub fn source(&self) -> DeviceId {
        self.source
    }

    pub fn entry(&self, target: DeviceId) -> Option<&PathEntry> {
        self.entries.get(&target)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&DeviceId, &PathEntry)> {
        self.entries.iter()
    }

    /// Hop count to `target`, or `None` when unknown or unreachable.
    pub fn distance(&self, target: DeviceId) -> Option<u32> {
        self.entries.get(&target).and_then(|e| e.distance)
    }

    pub fn predecessor(&self, target: DeviceId) -> Option<DeviceId> {
        self.entries.get(&target).and_then(|e| e.predecessor)
    }

    /// Returns the device adjacent to the source on the path to `target`.
    ///
    /// Walks the predecessor chain backward from `target`. The walk is
    /// bounded by the number of entries so a corrupt chain cannot loop.
    pub fn first_hop(&self, target: DeviceId) -> Result<DeviceId, PathLookupError> {
        let source = self.source;
        if target == source {
            return Err(PathLookupError::TargetIsSource { target });
        }

        let mut current = target;
        for _ in 0..self.entries.len() {
            let entry = self
                .entries
                .get(&current)
                .ok_or(PathLookupError::BrokenChain {
                    root: source,
                    target,
                    at: current,
                })?;

            match entry.predecessor {
                Some(prev) if prev == source => return Ok(current),
                Some(prev) => current = prev,
                None if current == target => {
                    return Err(PathLookupError::Unreachable { root: source, target })
                }
                None => {
                    return Err(PathLookupError::BrokenChain {
                        root: source,
                        target,
                        at: current,
                    })
                }
            }
        }

        Err(PathLookupError::Cycle { root: source, target })
    }

    /// Returns the device sequence from the source to `target`, inclusive.
    pub fn path_to(&self, target: DeviceId) -> Result<Vec<DeviceId>, PathLookupError> {
        if target == self.source {
            return Ok(vec![self.source]);
        }

        let mut path = vec![target];
        let mut current = target;
        while current != self.source {
            if path.len() > self.entries.len() {
                return Err(PathLookupError::Cycle {
                    root: self.source,
                    target,
                });
            }
            current = match self.predecessor(current) {
                Some(prev) => prev,
                None if current == target => {
                    return Err(PathLookupError::Unreachable {
                        root: self.source,
                        target,
                    })
                }
                None => {
                    return Err(PathLookupError::BrokenChain {
                        root: self.source,
                        target,
                        at: current,
                    })
                }
            };
            path.push(current);
        }

        path.reverse();
        Ok(path)
    }

    /// Iterates over targets reachable from the source (excluding itself).
    pub fn reachable(&self) -> impl Iterator<Item = DeviceId> + '_ {
        let source = self.source;
        self.entries
            .iter()
            .filter(move |(id, e)| **id != source && e.is_reachable())
            .map(|(id, _)| *id)
    }
}

/// Complete set of path trees, one per device, from a single computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTable {
    generation: u64,
    trees: BTreeMap<DeviceId, PathTree>,
}

impl PathTable {
    pub fn new(generation: u64, trees: BTreeMap<DeviceId, PathTree>) -> Self {
        Self { generation, trees }
    }

    /// Empty table published before the first computation.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sequence number of the computation that produced this table.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tree(&self, source: DeviceId) -> Option<&PathTree> {
        self.trees.get(&source)
    }

    pub fn trees(&self) -> impl Iterator<Item = &PathTree> {
        self.trees.values()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn distance(&self, source: DeviceId, target: DeviceId) -> Option<u32> {
        self.trees.get(&source).and_then(|t| t.distance(target))
    }

    pub fn first_hop(&self, source: DeviceId, target: DeviceId) -> Result<DeviceId, PathLookupError> {
        self.trees
            .get(&source)
            .ok_or(PathLookupError::UnknownSource(source))?
            .first_hop(target)
    }
}
