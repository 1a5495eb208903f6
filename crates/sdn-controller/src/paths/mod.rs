//! Path computation engine.
//!
//! Computes, for every device, a shortest-path tree over the unit-weight
//! topology graph and publishes the resulting [`PathTable`] atomically.
//!
//! # Tie-breaking
//!
//! When several frontier devices share the minimum tentative distance the
//! one settled first is unspecified. Only distances are guaranteed to be
//! minimal; predecessors may differ between runs on graphs with equal-cost
//! alternatives.

mod engine;
mod store;
mod types;

pub use engine::{compute_paths, shortest_path_tree, PathEngine, PathError};
pub use store::PathStore;
pub use types::{PathEntry, PathLookupError, PathTable, PathTree};
