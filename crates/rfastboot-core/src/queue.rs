//! Sequential task driver
//!
//! Tasks run one after another in the order they were queued. A task may
//! depend on device state left behind by an earlier one (a reboot into
//! fastbootd before flashing a logical partition), so nothing is reordered
//! and the first failure aborts everything after it.

use crate::error::Result;
use crate::plan::FlashingPlan;
use crate::task::Task;

/// An ordered list of tasks
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<Task>,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task
    pub fn push(&mut self, task: impl Into<Task>) {
        self.tasks.push(task.into());
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The queued tasks, in execution order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Run every task against `plan`, stopping at the first error
    pub fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        let count = self.tasks.len();
        for (index, task) in self.tasks.into_iter().enumerate() {
            log::info!("[{}/{}] {}", index + 1, count, task);
            task.run(plan)?;
        }
        Ok(())
    }
}
