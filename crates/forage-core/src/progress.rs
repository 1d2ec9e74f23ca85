use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::task::TaskResult;

/// Point-in-time view of run progress.
///
/// Always derived from the raw counters on read, never cached. The
/// tracker is the source of truth; the snapshot is a consistent copy.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub total_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Percentage of completed tasks that succeeded, 0–100.
    pub success_rate: f64,
    pub elapsed: Duration,
    pub estimated_remaining: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    completed: u64,
    failed: u64,
}

/// Thread-safe running aggregate, updated after every finalized task.
///
/// The counter pair sits behind a single mutex so readers on other
/// threads never observe a torn update (completed bumped, failed not).
pub struct ProgressTracker {
    total: usize,
    start: Instant,
    counters: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            start: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Record one terminal result.
    pub fn record(&self, result: &TaskResult) {
        let mut counters = self.counters.lock().unwrap();
        counters.completed += 1;
        if !result.success {
            counters.failed += 1;
        }
    }

    /// Read the counters and derive rate, elapsed time, and ETA.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let (completed, failed) = {
            let counters = self.counters.lock().unwrap();
            (counters.completed, counters.failed)
        };
        let elapsed = self.start.elapsed();

        let success_rate = (completed - failed) as f64 / completed.max(1) as f64 * 100.0;

        let remaining = (self.total as u64).saturating_sub(completed);
        let estimated_remaining = if completed == 0 {
            Duration::ZERO
        } else {
            elapsed.div_f64(completed as f64).mul_f64(remaining as f64)
        };

        ProgressSnapshot {
            total_tasks: self.total,
            completed_tasks: completed,
            failed_tasks: failed,
            success_rate,
            elapsed,
            estimated_remaining,
        }
    }
}

/// Receives a fresh snapshot after every task completion, and once more at
/// run completion with `result = None`.
///
/// Invoked synchronously from the scheduler's coordinator; implementations
/// must not re-enter the scheduler.
pub trait ProgressObserver: Send + Sync {
    fn on_task(&self, snapshot: &ProgressSnapshot, result: Option<&TaskResult>) {
        let _ = (snapshot, result);
    }
}

/// Observer that logs through the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_task(&self, snapshot: &ProgressSnapshot, result: Option<&TaskResult>) {
        match result {
            Some(result) => {
                tracing::info!(
                    target = %result.target,
                    success = result.success,
                    completed = snapshot.completed_tasks,
                    total = snapshot.total_tasks,
                    success_rate = format!("{:.1}%", snapshot.success_rate),
                    "Task finalized"
                );
            }
            None => {
                tracing::info!(
                    completed = snapshot.completed_tasks,
                    failed = snapshot.failed_tasks,
                    elapsed_secs = snapshot.elapsed.as_secs_f64(),
                    "Run completed"
                );
            }
        }
    }
}

/// No-op observer for callers that don't care about progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ScrapeTask;

    fn result(success: bool) -> TaskResult {
        let task = ScrapeTask::new("https://example.com", 0, 3);
        if success {
            TaskResult::completed(&task, serde_json::json!({}), Duration::from_millis(10))
        } else {
            TaskResult::failed(&task, "boom", Duration::from_millis(10))
        }
    }

    #[test]
    fn test_record_counts_completions_and_failures() {
        let tracker = ProgressTracker::new(4);
        tracker.record(&result(true));
        tracker.record(&result(false));
        tracker.record(&result(true));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_tasks, 4);
        assert_eq!(snapshot.completed_tasks, 3);
        assert_eq!(snapshot.failed_tasks, 1);
    }

    #[test]
    fn test_success_rate_formula() {
        let tracker = ProgressTracker::new(4);
        tracker.record(&result(true));
        tracker.record(&result(true));
        tracker.record(&result(false));
        tracker.record(&result(false));

        // (4 completed - 2 failed) / 4 * 100
        let snapshot = tracker.snapshot();
        assert!((snapshot.success_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fresh_tracker_has_zero_rate_and_eta() {
        let tracker = ProgressTracker::new(10);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.completed_tasks, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.estimated_remaining, Duration::ZERO);
    }

    #[test]
    fn test_completed_is_monotonic() {
        let tracker = ProgressTracker::new(3);
        let mut last = 0;
        for _ in 0..3 {
            tracker.record(&result(true));
            let completed = tracker.snapshot().completed_tasks;
            assert!(completed > last);
            last = completed;
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_eta_shrinks_to_zero_at_completion() {
        let tracker = ProgressTracker::new(2);
        tracker.record(&result(true));
        tracker.record(&result(true));
        assert_eq!(tracker.snapshot().estimated_remaining, Duration::ZERO);
    }
}
