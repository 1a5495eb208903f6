//! Task processing status and counters.

/// Result of processing a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Task completed and its effect was applied
    Success,
    /// Task had nothing to do (host not attached, rule already absent, ...)
    Ignore,
    /// Task was skipped because the current state cannot satisfy it
    Skipped,
    /// Task input was invalid
    InvalidEntry,
    /// Task failed while programming a device
    Failed,
}

impl TaskStatus {
    /// Returns true if the task completed without error.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Ignore)
    }

    /// Returns true if the task failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::InvalidEntry | TaskStatus::Failed)
    }
}

/// Running totals of task outcomes for one Orch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounters {
    pub success: u64,
    pub ignored: u64,
    pub skipped: u64,
    pub invalid: u64,
    pub failed: u64,
}

impl TaskCounters {
    /// Records one task outcome.
    pub fn record(&mut self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Success => &mut self.success,
            TaskStatus::Ignore => &mut self.ignored,
            TaskStatus::Skipped => &mut self.skipped,
            TaskStatus::InvalidEntry => &mut self.invalid,
            TaskStatus::Failed => &mut self.failed,
        };
        *counter = counter.saturating_add(1);
    }

    /// Returns the total number of recorded outcomes.
    pub fn total(&self) -> u64 {
        self.success + self.ignored + self.skipped + self.invalid + self.failed
    }
}
