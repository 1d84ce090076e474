//! Frame time budgets for time-sliced work
//!
//! Long computations run as aperiodic tasks: each unit of work first asks the
//! budget whether its task still has time left in the current frame. The
//! embedding application owns the budget and calls `new_frame()` once per tick.

use std::collections::HashMap;
use std::time::Duration;

use web_time::Instant;

use navgraph_common::{Error, Result};

/// Identifier of an aperiodic task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId(pub u32);

/// Answers whether a task may keep working this frame
pub trait TimeBudget {
    /// Called before each unit of work; returning false pauses the task
    fn has_time_left(&mut self, task: TaskId) -> bool;
}

/// Budget that never runs out
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedBudget;

impl TimeBudget for UnlimitedBudget {
    fn has_time_left(&mut self, _task: TaskId) -> bool {
        true
    }
}

/// Deterministic budget counting work units per task and frame
#[derive(Debug, Clone)]
pub struct StepBudget {
    default_steps: u32,
    steps: HashMap<TaskId, u32>,
    used: HashMap<TaskId, u32>,
    total: HashMap<TaskId, u64>,
}

impl StepBudget {
    /// Every task may perform `default_steps` units per frame
    pub fn new(default_steps: u32) -> Self {
        Self {
            default_steps,
            steps: HashMap::new(),
            used: HashMap::new(),
            total: HashMap::new(),
        }
    }

    /// Overrides the per-frame allowance of one task
    pub fn with_task_steps(mut self, task: TaskId, steps: u32) -> Self {
        self.steps.insert(task, steps);
        self
    }

    pub fn set_task_steps(&mut self, task: TaskId, steps: u32) {
        self.steps.insert(task, steps);
    }

    /// Starts a new frame, restoring every allowance
    pub fn new_frame(&mut self) {
        self.used.clear();
    }

    /// Units granted to `task` in the current frame
    pub fn used(&self, task: TaskId) -> u32 {
        self.used.get(&task).copied().unwrap_or(0)
    }

    /// Units granted to `task` since creation
    pub fn total_used(&self, task: TaskId) -> u64 {
        self.total.get(&task).copied().unwrap_or(0)
    }
}

impl TimeBudget for StepBudget {
    fn has_time_left(&mut self, task: TaskId) -> bool {
        let allowance = self.steps.get(&task).copied().unwrap_or(self.default_steps);
        let used = self.used.entry(task).or_insert(0);
        if *used >= allowance {
            return false;
        }
        *used += 1;
        *self.total.entry(task).or_insert(0) += 1;
        true
    }
}

/// Wall-clock budget: each task may run for a fixed duration per frame
///
/// A task's clock starts on its first query of the frame, so tasks that run
/// one after another do not consume each other's time.
#[derive(Debug, Clone)]
pub struct ClockBudget {
    default_budget: Duration,
    budgets: HashMap<TaskId, Duration>,
    frame_start: Instant,
    task_start: HashMap<TaskId, Instant>,
}

impl ClockBudget {
    pub fn new(default_budget: Duration) -> Self {
        Self {
            default_budget,
            budgets: HashMap::new(),
            frame_start: Instant::now(),
            task_start: HashMap::new(),
        }
    }

    pub fn with_task_budget(mut self, task: TaskId, budget: Duration) -> Self {
        self.budgets.insert(task, budget);
        self
    }

    /// Starts a new frame
    pub fn new_frame(&mut self) {
        self.frame_start = Instant::now();
        self.task_start.clear();
    }

    /// Time elapsed since the frame started
    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    /// Time `task` has used this frame
    pub fn task_elapsed(&self, task: TaskId) -> Duration {
        self.task_start
            .get(&task)
            .map(|start| start.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

impl TimeBudget for ClockBudget {
    fn has_time_left(&mut self, task: TaskId) -> bool {
        let budget = self.budgets.get(&task).copied().unwrap_or(self.default_budget);
        let start = *self.task_start.entry(task).or_insert_with(Instant::now);
        start.elapsed() < budget
    }
}

/// Maps task names to ids
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    names: Vec<String>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task, returning the existing id if the name is known
    pub fn register(&mut self, name: &str) -> Result<TaskId> {
        if name.is_empty() {
            return Err(Error::Config("task name must not be empty".to_string()));
        }
        if let Some(id) = self.id(name) {
            return Ok(id);
        }
        self.names.push(name.to_string());
        Ok(TaskId((self.names.len() - 1) as u32))
    }

    pub fn id(&self, name: &str) -> Option<TaskId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| TaskId(i as u32))
    }

    pub fn name(&self, id: TaskId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_budget() {
        let a = TaskId(0);
        let b = TaskId(1);
        let mut budget = StepBudget::new(2).with_task_steps(b, 1);

        assert!(budget.has_time_left(a));
        assert!(budget.has_time_left(a));
        assert!(!budget.has_time_left(a));
        assert!(budget.has_time_left(b));
        assert!(!budget.has_time_left(b));
        assert_eq!(budget.used(a), 2);

        budget.new_frame();
        assert_eq!(budget.used(a), 0);
        assert!(budget.has_time_left(a));
        assert_eq!(budget.total_used(a), 3);
    }

    #[test]
    fn test_zero_step_budget_blocks() {
        let mut budget = StepBudget::new(0);
        assert!(!budget.has_time_left(TaskId(3)));
    }

    #[test]
    fn test_clock_budget() {
        let mut budget = ClockBudget::new(Duration::from_secs(60))
            .with_task_budget(TaskId(1), Duration::ZERO);
        assert!(budget.has_time_left(TaskId(0)));
        assert!(!budget.has_time_left(TaskId(1)));
    }

    #[test]
    fn test_clock_budget_tasks_do_not_share_time() {
        let a = TaskId(0);
        let b = TaskId(1);
        let mut budget = ClockBudget::new(Duration::from_millis(30))
            .with_task_budget(b, Duration::from_millis(20));

        assert!(budget.has_time_left(a));
        std::thread::sleep(Duration::from_millis(25));

        // B starts its own clock on its first query
        assert!(budget.has_time_left(b));
        assert!(budget.task_elapsed(b) < Duration::from_millis(20));
        assert!(budget.task_elapsed(a) >= Duration::from_millis(25));

        std::thread::sleep(Duration::from_millis(10));
        assert!(!budget.has_time_left(a));

        budget.new_frame();
        assert_eq!(budget.task_elapsed(a), Duration::ZERO);
        assert!(budget.has_time_left(a));
    }

    #[test]
    fn test_task_registry() -> Result<()> {
        let mut registry = TaskRegistry::new();
        let astar = registry.register("astar")?;
        let follow = registry.register("path_following")?;
        assert_ne!(astar, follow);
        assert_eq!(registry.register("astar")?, astar);
        assert_eq!(registry.id("path_following"), Some(follow));
        assert_eq!(registry.name(astar), Some("astar"));
        assert!(registry.register("").is_err());
        Ok(())
    }
}
