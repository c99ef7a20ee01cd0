//! Time-ordered task queue.
//!
//! Tasks are ordered by `(scheduled_time, sequence_id)`. Sequence ids are
//! assigned at push time and strictly increase, so tasks due at the same
//! instant run in submission order. Scheduling in the past is legal: such a
//! task is simply due immediately.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A task waiting in the executor.
pub struct PendingTask<T> {
    pub scheduled_time: u64,
    pub sequence_id: u64,
    pub task: T,
}

impl<T> PartialEq for PendingTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_time == other.scheduled_time && self.sequence_id == other.sequence_id
    }
}

impl<T> Eq for PendingTask<T> {}

impl<T> PartialOrd for PendingTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PendingTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest time first)
        other
            .scheduled_time
            .cmp(&self.scheduled_time)
            .then_with(|| other.sequence_id.cmp(&self.sequence_id))
    }
}

/// Min-queue of tasks keyed on virtual time.
///
/// The executor only stores and orders tasks. Running them is left to the
/// caller so that a task may borrow the structure that owns the executor.
pub struct TaskExecutor<T> {
    queue: BinaryHeap<PendingTask<T>>,
    next_sequence: u64,
}

impl<T> TaskExecutor<T> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Enqueues `task` to run at `scheduled_time`.
    pub fn push_task(&mut self, task: T, scheduled_time: u64) {
        let sequence_id = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(PendingTask {
            scheduled_time,
            sequence_id,
            task,
        });
    }

    /// Removes and returns the earliest task if it is due at `now`.
    pub fn pop_ready(&mut self, now: u64) -> Option<PendingTask<T>> {
        if self.queue.peek()?.scheduled_time > now {
            return None;
        }
        self.queue.pop()
    }

    /// Returns true if any task is queued, due or not.
    pub fn has_work(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<T> Default for TaskExecutor<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(exec: &mut TaskExecutor<&'static str>, now: u64) -> Vec<&'static str> {
        let mut out = Vec::new();
        while let Some(t) = exec.pop_ready(now) {
            out.push(t.task);
        }
        out
    }

    #[test]
    fn pops_in_time_order() {
        let mut exec = TaskExecutor::new();
        exec.push_task("c", 30);
        exec.push_task("a", 10);
        exec.push_task("b", 20);

        assert_eq!(drain(&mut exec, 100), vec!["a", "b", "c"]);
        assert!(!exec.has_work());
    }

    #[test]
    fn equal_times_run_in_submission_order() {
        let mut exec = TaskExecutor::new();
        exec.push_task("first", 5);
        exec.push_task("second", 5);
        exec.push_task("third", 5);

        assert_eq!(drain(&mut exec, 5), vec!["first", "second", "third"]);
    }

    #[test]
    fn future_tasks_stay_queued() {
        let mut exec = TaskExecutor::new();
        exec.push_task("now", 3);
        exec.push_task("later", 9);

        assert_eq!(drain(&mut exec, 3), vec!["now"]);
        assert!(exec.has_work());
        assert_eq!(drain(&mut exec, 8), Vec::<&str>::new());
        assert_eq!(drain(&mut exec, 9), vec!["later"]);
    }

    #[test]
    fn past_tasks_are_due_immediately() {
        let mut exec = TaskExecutor::new();
        exec.push_task("late", 0);
        assert_eq!(drain(&mut exec, 50), vec!["late"]);
    }

    #[test]
    fn len_counts_queued_tasks() {
        let mut exec = TaskExecutor::new();
        exec.push_task("a", 1);
        exec.push_task("b", 2);
        let _ = exec.pop_ready(10);
        assert_eq!(exec.len(), 1);
    }
}
