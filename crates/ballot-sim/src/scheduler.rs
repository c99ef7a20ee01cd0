//! Jittered scheduling on top of [`TaskExecutor`].
//!
//! Every task submitted during a run goes through the scheduler, which adds a
//! random delay in `[0, max_jitter]` to the requested time. The jitter is the
//! main source of interleaving variety between nodes.

use crate::executor::{PendingTask, TaskExecutor};
use crate::rng::SimRng;

/// Default upper bound on per-task jitter, in ticks.
pub const DEFAULT_MAX_JITTER: u64 = 100;

/// Executor plus bounded random jitter.
pub struct Scheduler<T> {
    executor: TaskExecutor<T>,
    max_jitter: u64,
}

impl<T> Scheduler<T> {
    pub fn new(max_jitter: u64) -> Self {
        Self {
            executor: TaskExecutor::new(),
            max_jitter,
        }
    }

    /// Schedules `task` at `now + jitter`.
    pub fn schedule_task(&mut self, task: T, now: u64, rng: &mut SimRng) {
        self.schedule_task_with_delay(task, 0, now, rng);
    }

    /// Schedules `task` at `now + delay + jitter`.
    pub fn schedule_task_with_delay(&mut self, task: T, delay: u64, now: u64, rng: &mut SimRng) {
        let jitter = rng.draw(0, self.max_jitter);
        let at = now.saturating_add(delay).saturating_add(jitter);
        tracing::trace!(now, delay, jitter, at, "task scheduled");
        self.executor.push_task(task, at);
    }

    /// Removes the earliest task if it is due at `now`.
    pub fn pop_ready(&mut self, now: u64) -> Option<PendingTask<T>> {
        self.executor.pop_ready(now)
    }

    pub fn has_work(&self) -> bool {
        self.executor.has_work()
    }

    pub fn pending(&self) -> usize {
        self.executor.len()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_JITTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_bounded() {
        let mut rng = SimRng::new(3);
        let mut sched = Scheduler::new(10);
        for i in 0..200 {
            sched.schedule_task_with_delay(i, 50, 1_000, &mut rng);
        }
        while let Some(t) = sched.pop_ready(u64::MAX) {
            assert!((1_050..=1_060).contains(&t.scheduled_time));
        }
    }

    #[test]
    fn zero_jitter_schedules_exactly() {
        let mut rng = SimRng::new(3);
        let mut sched = Scheduler::new(0);
        sched.schedule_task("a", 7, &mut rng);
        sched.schedule_task_with_delay("b", 3, 7, &mut rng);

        let a = sched.pop_ready(10).map(|t| (t.task, t.scheduled_time));
        let b = sched.pop_ready(10).map(|t| (t.task, t.scheduled_time));
        assert_eq!(a, Some(("a", 7)));
        assert_eq!(b, Some(("b", 10)));
        assert!(!sched.has_work());
    }

    #[test]
    fn same_seed_same_schedule() {
        let times = |seed| {
            let mut rng = SimRng::new(seed);
            let mut sched = Scheduler::default();
            for i in 0..20 {
                sched.schedule_task(i, 0, &mut rng);
            }
            let mut out = Vec::new();
            while let Some(t) = sched.pop_ready(u64::MAX) {
                out.push((t.task, t.scheduled_time));
            }
            out
        };
        assert_eq!(times(99), times(99));
    }
}
