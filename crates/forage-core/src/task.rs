use std::time::Duration;

use serde::{Serialize, Serializer};

/// One unit of pending work: a single target plus its retry state.
///
/// `index` is assigned at submission (position in the input list) and is
/// used only to restore input ordering in the final result list.
/// `retry_count` mutates in place across attempts of the same task; a task
/// is never reused for a different target.
#[derive(Debug, Clone)]
pub struct ScrapeTask {
    pub target: String,
    pub index: usize,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ScrapeTask {
    pub fn new(target: impl Into<String>, index: usize, max_retries: u32) -> Self {
        Self {
            target: target.into(),
            index,
            retry_count: 0,
            max_retries,
        }
    }
}

/// The terminal, immutable outcome of a task.
///
/// Exactly one `TaskResult` exists per finalized task: the last attempt's
/// outcome, regardless of how many retries preceded it.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub index: usize,
    pub target: String,
    pub success: bool,
    /// Extractor output; `Null` when the task failed.
    pub payload: serde_json::Value,
    pub error: Option<String>,
    /// Total number of extraction attempts made (retries + 1).
    pub attempts: u32,
    /// Wall-clock time from first attempt to finalization.
    #[serde(rename = "duration_secs", serialize_with = "duration_as_secs")]
    pub duration: Duration,
}

impl TaskResult {
    pub fn completed(task: &ScrapeTask, payload: serde_json::Value, duration: Duration) -> Self {
        Self {
            index: task.index,
            target: task.target.clone(),
            success: true,
            payload,
            error: None,
            attempts: task.retry_count + 1,
            duration,
        }
    }

    pub fn failed(task: &ScrapeTask, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            index: task.index,
            target: task.target.clone(),
            success: false,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
            attempts: task.retry_count + 1,
            duration,
        }
    }
}

fn duration_as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_result_carries_task_identity() {
        let mut task = ScrapeTask::new("https://example.com/a", 4, 3);
        task.retry_count = 2;

        let result = TaskResult::completed(
            &task,
            serde_json::json!({"title": "A"}),
            Duration::from_millis(1500),
        );
        assert_eq!(result.index, 4);
        assert_eq!(result.target, "https://example.com/a");
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_failed_result_has_null_payload_and_error() {
        let task = ScrapeTask::new("https://example.com/b", 0, 3);
        let result = TaskResult::failed(&task, "page did not render", Duration::from_secs(8));

        assert!(!result.success);
        assert!(result.payload.is_null());
        assert_eq!(result.error.as_deref(), Some("page did not render"));
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_result_serializes_duration_as_seconds() {
        let task = ScrapeTask::new("https://example.com", 0, 0);
        let result = TaskResult::completed(&task, serde_json::json!({}), Duration::from_millis(250));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration_secs"], serde_json::json!(0.25));
    }
}
