//! Task queue and lifecycle coordination
//!
//! `TaskQueue` drives tasks through
//! Pending -> Assigned -> Running -> Completed | Failed, keeps dependency
//! order during polls, applies retry backoff, and mirrors assignment
//! changes into the agent registry's load counters.

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::registry::AgentRegistry;
use crate::task::store::TaskRepository;
use crate::task::types::{QueueStatistics, Task, TaskFilter, TaskPriority, TaskStatus};
use crate::{Error, Result};

/// Queue facade over task storage and agent load accounting
pub struct TaskQueue {
    store: Arc<dyn TaskRepository>,
    registry: Arc<AgentRegistry>,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(
        store: Arc<dyn TaskRepository>,
        registry: Arc<AgentRegistry>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Create a new pending task and return it
    pub async fn create_task(
        &self,
        content: impl Into<String>,
        task_type: impl Into<String>,
        priority: TaskPriority,
        requirements: Vec<String>,
        dependencies: Vec<String>,
    ) -> Result<Task> {
        let task = Task::new(content, task_type)
            .with_priority(priority)
            .with_requirements(requirements)
            .with_dependencies(dependencies);
        self.store.insert(&task).await?;
        info!("Created task {} ({})", task.id, task.task_type);
        Ok(task)
    }

    /// Poll tasks by status.
    ///
    /// Pending polls return dispatchable work: ordered by priority weight
    /// then age, with incomplete dependencies and unexpired retry backoff
    /// filtered out. When an agent id is given, pending polls only return
    /// tasks whose requirements that agent satisfies; for other statuses
    /// the agent id filters on the current assignee.
    pub async fn poll_tasks(
        &self,
        agent_id: Option<&str>,
        status: Option<TaskStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<Task>> {
        let status = status.unwrap_or(TaskStatus::Pending);
        let limit = limit.unwrap_or(self.config.default_poll_limit);

        if status != TaskStatus::Pending {
            let mut filter = TaskFilter::new().status(status).limit(limit);
            if let Some(agent_id) = agent_id {
                filter = filter.assigned_to(agent_id);
            }
            return self.store.query(&filter).await;
        }

        let capabilities = match agent_id {
            Some(id) => Some(self.registry.get_agent(id).await?.capabilities),
            None => None,
        };

        let completed = self.store.completed_ids().await?;
        let candidates = self.store.pending_ready(Utc::now()).await?;

        let ready = candidates
            .into_iter()
            .filter(|t| t.dependencies.iter().all(|d| completed.contains(d)))
            .filter(|t| match &capabilities {
                Some(caps) => t.requirements.iter().all(|r| caps.contains(r)),
                None => true,
            })
            .take(limit)
            .collect();
        Ok(ready)
    }

    /// Atomically claim a pending task for an agent.
    ///
    /// Exactly one of two concurrent claims can win; the loser sees an
    /// invalid-transition error.
    pub async fn assign_task(&self, task_id: &str, agent_id: &str) -> Result<Task> {
        self.get_task(task_id).await?;
        // The agent must exist before it can take work.
        self.registry.get_agent(agent_id).await?;

        if !self.store.mark_assigned(task_id, agent_id, Utc::now()).await? {
            return Err(self.transition_error(task_id, TaskStatus::Assigned).await);
        }
        self.registry.increment_load(agent_id).await?;
        debug!("Task {} assigned to {}", task_id, agent_id);

        self.get_task(task_id).await
    }

    /// Move an assigned task into execution
    pub async fn start_task(&self, task_id: &str) -> Result<Task> {
        self.get_task(task_id).await?;
        if !self.store.mark_running(task_id, Utc::now()).await? {
            return Err(self.transition_error(task_id, TaskStatus::Running).await);
        }
        debug!("Task {} started", task_id);
        self.get_task(task_id).await
    }

    /// Record successful completion.
    ///
    /// When no duration is supplied, it is derived from the recorded start
    /// time. The previous assignee's load is released.
    pub async fn complete_task(
        &self,
        task_id: &str,
        result: &str,
        duration_ms: Option<u64>,
    ) -> Result<Task> {
        let task = self.get_task(task_id).await?;
        let now = Utc::now();
        let duration = duration_ms.or_else(|| {
            task.started_at
                .map(|s| (now - s).num_milliseconds().max(0) as u64)
        });

        if !self.store.mark_completed(task_id, result, duration, now).await? {
            return Err(self.transition_error(task_id, TaskStatus::Completed).await);
        }
        if let Some(agent_id) = &task.assigned_to {
            self.registry.decrement_load(agent_id).await?;
        }
        info!("Task {} completed", task_id);
        self.get_task(task_id).await
    }

    /// Record a failure.
    ///
    /// Retryable failures return the task to pending with an incremented
    /// retry count and an exponential backoff gate. Once retries are
    /// exhausted the failure is permanent and every pending task that
    /// depends on this one (directly or transitively) becomes blocked.
    pub async fn fail_task(
        &self,
        task_id: &str,
        error: &str,
        should_retry: bool,
    ) -> Result<Task> {
        let task = self.get_task(task_id).await?;
        let now = Utc::now();

        if should_retry && task.retry_count < self.config.max_retries {
            let retry_count = task.retry_count + 1;
            let next_attempt_at = now + Duration::milliseconds(self.backoff_ms(retry_count) as i64);

            if !self
                .store
                .mark_retrying(task_id, error, retry_count, next_attempt_at)
                .await?
            {
                return Err(self.transition_error(task_id, TaskStatus::Pending).await);
            }
            if let Some(agent_id) = &task.assigned_to {
                self.registry.decrement_load(agent_id).await?;
            }
            warn!(
                "Task {} failed (retry {}/{}): {}",
                task_id, retry_count, self.config.max_retries, error
            );
            return self.get_task(task_id).await;
        }

        if !self.store.mark_failed(task_id, error, now).await? {
            return Err(self.transition_error(task_id, TaskStatus::Failed).await);
        }
        if let Some(agent_id) = &task.assigned_to {
            self.registry.decrement_load(agent_id).await?;
        }
        warn!("Task {} permanently failed: {}", task_id, error);

        self.block_dependents(task_id).await?;
        self.get_task(task_id).await
    }

    /// Load a task, erroring on unknown ids
    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    /// Current lifecycle status of a task
    pub async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus> {
        Ok(self.get_task(task_id).await?.status)
    }

    /// Query tasks with arbitrary filters
    pub async fn query_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.query(filter).await
    }

    /// Aggregate queue counters
    pub async fn get_queue_statistics(&self) -> Result<QueueStatistics> {
        self.store.statistics().await
    }

    /// Capped exponential backoff for the given retry attempt
    fn backoff_ms(&self, retry_count: u32) -> u64 {
        let exp = retry_count.saturating_sub(1).min(20);
        self.config
            .retry_backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.config.retry_backoff_cap_ms)
    }

    /// Mark every pending task that transitively depends on `failed_id`
    /// as blocked.
    async fn block_dependents(&self, failed_id: &str) -> Result<()> {
        let pending = self.store.list_by_status(TaskStatus::Pending).await?;

        let mut dead: HashSet<String> = HashSet::new();
        dead.insert(failed_id.to_string());

        // Fixpoint: a block can cascade through chains of pending tasks.
        loop {
            let mut changed = false;
            for task in &pending {
                if dead.contains(&task.id) {
                    continue;
                }
                if task.dependencies.iter().any(|d| dead.contains(d)) {
                    dead.insert(task.id.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        dead.remove(failed_id);

        for id in dead {
            let reason = format!("Dependency {} permanently failed", failed_id);
            if self.store.mark_blocked(&id, &reason, Utc::now()).await? {
                warn!("Task {} blocked: {}", id, reason);
            }
        }
        Ok(())
    }

    /// Build an invalid-transition error from the task's current status
    async fn transition_error(&self, task_id: &str, to: TaskStatus) -> Error {
        match self.store.get(task_id).await {
            Ok(Some(task)) => Error::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status.as_str().to_string(),
                to: to.as_str().to_string(),
            },
            Ok(None) => Error::TaskNotFound(task_id.to_string()),
            Err(e) => e,
        }
    }
}
