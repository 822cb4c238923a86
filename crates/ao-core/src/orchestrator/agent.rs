//! Sub-agent trait and execution wrapper

use super::types::{SubAgentResult, SubAgentTask};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A worker that can execute orchestrated sub-tasks
///
/// Implementations carry whatever clients or state they need; the
/// orchestrator only sees the agent type and the work entry point.
#[async_trait]
pub trait SubAgent: Send + Sync + 'static {
    /// Agent kind, used to route sub-tasks to this worker
    fn agent_type(&self) -> &str;

    /// Execute one sub-task and produce its output
    async fn do_work(&self, task: &SubAgentTask) -> Result<JsonValue>;
}

/// Wraps a [`SubAgent`] with timeout enforcement and outcome counters
pub struct SubAgentHandle {
    id: String,
    inner: Arc<dyn SubAgent>,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl SubAgentHandle {
    pub fn new(inner: Arc<dyn SubAgent>) -> Self {
        let id = format!("{}-{}", inner.agent_type(), uuid::Uuid::now_v7());
        Self {
            id,
            inner,
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Instance id, unique per registered worker
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent_type(&self) -> &str {
        self.inner.agent_type()
    }

    /// Run one sub-task under a timeout and record the outcome
    ///
    /// The task's own timeout wins when set; otherwise `default_timeout`
    /// applies. Errors and elapsed timeouts become failure results, they
    /// never propagate out of the wrapper.
    pub async fn execute(&self, task: &SubAgentTask, default_timeout: Duration) -> SubAgentResult {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let timeout = if task.timeout_seconds > 0 {
            Duration::from_secs(task.timeout_seconds)
        } else {
            default_timeout
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.inner.do_work(task)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                SubAgentResult::success(&self.id, self.agent_type(), output, elapsed_ms)
            }
            Ok(Err(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                SubAgentResult::failure(&self.id, self.agent_type(), e.to_string(), elapsed_ms)
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                SubAgentResult::timeout(&self.id, self.agent_type(), timeout.as_secs(), elapsed_ms)
            }
        }
    }

    /// Fraction of attempts that succeeded; 1.0 before any attempt
    pub fn get_success_rate(&self) -> f64 {
        let attempts = self.attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 1.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / attempts as f64
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::SubAgentStatus;
    use super::*;
    use crate::Error;
    use serde_json::json;

    struct EchoAgent;

    #[async_trait]
    impl SubAgent for EchoAgent {
        fn agent_type(&self) -> &str {
            "echo"
        }

        async fn do_work(&self, task: &SubAgentTask) -> Result<JsonValue> {
            Ok(task.operation_data.clone())
        }
    }

    struct FlakyAgent;

    #[async_trait]
    impl SubAgent for FlakyAgent {
        fn agent_type(&self) -> &str {
            "flaky"
        }

        async fn do_work(&self, task: &SubAgentTask) -> Result<JsonValue> {
            if task.operation_data.get("fail").is_some() {
                Err(Error::Other("induced failure".to_string()))
            } else {
                Ok(json!("ok"))
            }
        }
    }

    struct SlowAgent;

    #[async_trait]
    impl SubAgent for SlowAgent {
        fn agent_type(&self) -> &str {
            "slow"
        }

        async fn do_work(&self, _task: &SubAgentTask) -> Result<JsonValue> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("done"))
        }
    }

    #[tokio::test]
    async fn test_handle_success() {
        let handle = SubAgentHandle::new(Arc::new(EchoAgent));
        let task = SubAgentTask::new("echo", json!({"payload": 1}));

        let result = handle.execute(&task, Duration::from_secs(5)).await;
        assert_eq!(result.status, SubAgentStatus::Completed);
        assert_eq!(result.output, json!({"payload": 1}));
        assert_eq!(result.agent_type, "echo");
        assert!(result.agent_id.starts_with("echo-"));
    }

    #[tokio::test]
    async fn test_handle_failure_and_success_rate() {
        let handle = SubAgentHandle::new(Arc::new(FlakyAgent));
        let ok_task = SubAgentTask::new("flaky", json!({}));
        let bad_task = SubAgentTask::new("flaky", json!({"fail": true}));

        handle.execute(&ok_task, Duration::from_secs(5)).await;
        handle.execute(&ok_task, Duration::from_secs(5)).await;
        let result = handle.execute(&bad_task, Duration::from_secs(5)).await;

        assert_eq!(result.status, SubAgentStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("induced failure"));
        assert_eq!(handle.attempts(), 3);
        assert_eq!(handle.failures(), 1);
        assert!((handle.get_success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_handle_timeout_uses_task_setting() {
        let handle = SubAgentHandle::new(Arc::new(SlowAgent));
        let task = SubAgentTask::new("slow", JsonValue::Null).with_timeout(1);

        let result = handle.execute(&task, Duration::from_secs(60)).await;
        assert_eq!(result.status, SubAgentStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("timed out after 1s"));
        assert_eq!(handle.failures(), 1);
    }

    #[tokio::test]
    async fn test_fresh_handle_success_rate_is_optimistic() {
        let handle = SubAgentHandle::new(Arc::new(EchoAgent));
        assert!((handle.get_success_rate() - 1.0).abs() < f64::EPSILON);
    }
}
