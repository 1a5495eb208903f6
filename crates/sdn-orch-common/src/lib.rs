//! Common orchestration abstractions for the SDN controller.
//!
//! This crate provides the core traits and types used by the orchestration
//! modules of the controller:
//!
//! - [`Orch`]: Base trait for orchestration agents
//! - [`TaskQueue`]: Ordered queue of pending work with coalescing
//! - [`TaskStatus`]: Outcome of processing a single task
//! - [`TaskCounters`]: Per-status counters for status dumps
//!
//! # Architecture
//!
//! The controller follows a single-writer, event-driven model:
//!
//! 1. Topology, host and packet-in notifications arrive on one event channel
//! 2. The daemon translates each notification into tasks on Orch queues
//! 3. Orchs drain their queues in priority order via [`Orch::do_task`]
//! 4. Orchs translate tasks into flow programming and packet emission calls
//!
//! # Example
//!
//! ```ignore
//! use sdn_orch_common::{Orch, TaskQueue, TaskStatus};
//!
//! struct MyOrch {
//!     queue: TaskQueue<MyTask>,
//! }
//!
//! #[async_trait]
//! impl Orch for MyOrch {
//!     fn name(&self) -> &str { "MyOrch" }
//!
//!     async fn do_task(&mut self) {
//!         for task in self.queue.drain() {
//!             if let Err(e) = self.process(task) {
//!                 log::warn!("MyOrch: {}", e);
//!             }
//!         }
//!     }
//! }
//! ```

mod orch;
mod queue;
mod task;

pub use orch::Orch;
pub use queue::{QueueConfig, TaskQueue};
pub use task::{TaskCounters, TaskStatus};
