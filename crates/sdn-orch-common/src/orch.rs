//! Base Orch trait.

use async_trait::async_trait;

/// Base trait for all orchestration agents.
///
/// Each Orch module implements this trait to participate in the controller
/// daemon's event loop. The daemon enqueues work on the Orch and then calls
/// [`Orch::do_task`] for every Orch with pending work, lowest priority value
/// first.
///
/// # Lifecycle
///
/// 1. Construction: the Orch receives its configuration and collaborators
/// 2. Registration: the daemon takes ownership of the Orch
/// 3. Event loop: `do_task()` is called whenever work is pending
/// 4. Shutdown: the Orch is dropped with the daemon
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the daemon can run on any
/// runtime worker thread.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes pending tasks.
    ///
    /// Implementations should drain their queue, process each task and
    /// log failures. A failing task must never abort the remaining ones.
    async fn do_task(&mut self);

    /// Returns the priority of this Orch (lower = processed earlier).
    fn priority(&self) -> i32 {
        0
    }

    /// Returns true if this Orch has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
