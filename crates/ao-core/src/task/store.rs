//! Task persistence using SQLite
//!
//! `TaskRepository` is the storage port for tasks; `SqliteTaskStore` is the
//! shipped implementation. Status transitions are conditional UPDATEs so two
//! writers cannot both claim the same transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::task::types::{QueueStatistics, Task, TaskFilter, TaskPriority, TaskStatus};
use crate::Result;

/// Storage port for tasks
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task row
    async fn insert(&self, task: &Task) -> Result<()>;

    /// Load a task by id
    async fn get(&self, id: &str) -> Result<Option<Task>>;

    /// Query tasks matching a filter, newest first
    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// List all tasks in a given status
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Pending tasks eligible for dispatch at `now` (backoff honored),
    /// ordered by priority weight descending then creation time ascending
    async fn pending_ready(&self, now: DateTime<Utc>) -> Result<Vec<Task>>;

    /// Ids of all completed tasks
    async fn completed_ids(&self) -> Result<HashSet<String>>;

    /// Pending -> Assigned; returns false if the task was not pending
    async fn mark_assigned(&self, id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Assigned -> Running
    async fn mark_running(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Running -> Completed, recording result and duration
    async fn mark_completed(
        &self,
        id: &str,
        result: &str,
        duration_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Assigned/Running -> Pending with updated retry bookkeeping
    async fn mark_retrying(
        &self,
        id: &str,
        error: &str,
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Assigned/Running -> Failed (permanent)
    async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Pending -> Blocked (dependency permanently failed)
    async fn mark_blocked(&self, id: &str, reason: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Aggregate counters over all tasks
    async fn statistics(&self) -> Result<QueueStatistics>;
}

const TASK_COLUMNS: &str = "id, content, task_type, status, priority, requirements, dependencies, \
     assigned_to, created_at, assigned_at, started_at, completed_at, next_attempt_at, \
     result, error, retry_count, execution_duration_ms";

/// SQLite-based task storage
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        debug!("Opening task database at: {}", db_path);
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        info!("SqliteTaskStore initialized successfully");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// Initialize database tables
    fn init_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                requirements TEXT NOT NULL,
                dependencies TEXT NOT NULL,
                assigned_to TEXT,
                created_at TEXT NOT NULL,
                assigned_at TEXT,
                started_at TEXT,
                completed_at TEXT,
                next_attempt_at TEXT,
                result TEXT,
                error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                execution_duration_ms INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
            [],
        )?;

        Ok(())
    }
}

/// Map a full task row (TASK_COLUMNS order) into a Task
fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(3)?;
    let priority_str: String = row.get(4)?;
    let requirements_str: String = row.get(5)?;
    let dependencies_str: String = row.get(6)?;
    let duration: Option<i64> = row.get(16)?;

    Ok(Task {
        id: row.get(0)?,
        content: row.get(1)?,
        task_type: row.get(2)?,
        status: TaskStatus::parse(&status_str).unwrap_or_default(),
        priority: TaskPriority::parse(&priority_str).unwrap_or_default(),
        requirements: serde_json::from_str(&requirements_str).unwrap_or_default(),
        dependencies: serde_json::from_str(&dependencies_str).unwrap_or_default(),
        assigned_to: row.get(7)?,
        created_at: parse_ts(row.get::<_, String>(8)?),
        assigned_at: row.get::<_, Option<String>>(9)?.map(parse_ts),
        started_at: row.get::<_, Option<String>>(10)?.map(parse_ts),
        completed_at: row.get::<_, Option<String>>(11)?.map(parse_ts),
        next_attempt_at: row.get::<_, Option<String>>(12)?.map(parse_ts),
        result: row.get(13)?,
        error: row.get(14)?,
        retry_count: row.get::<_, i64>(15)? as u32,
        execution_duration_ms: duration.map(|d| d as u64),
    })
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl TaskRepository for SqliteTaskStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        let requirements_json = serde_json::to_string(&task.requirements)?;
        let dependencies_json = serde_json::to_string(&task.dependencies)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tasks (id, content, task_type, status, priority, requirements, \
             dependencies, assigned_to, created_at, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.id,
                task.content,
                task.task_type,
                task.status.as_str(),
                task.priority.as_str(),
                requirements_json,
                dependencies_json,
                task.assigned_to,
                task.created_at.to_rfc3339(),
                task.retry_count,
            ],
        )?;
        debug!("Inserted task {} ({})", task.id, task.task_type);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE id = ?1",
            TASK_COLUMNS
        ))?;

        let result = stmt.query_row(params![id], row_to_task);
        match result {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(status) = filter.status {
            values.push(status.as_str().to_string().into());
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(agent_id) = &filter.assigned_to {
            values.push(agent_id.clone().into());
            clauses.push(format!("assigned_to = ?{}", values.len()));
        }
        if let Some(task_type) = &filter.task_type {
            values.push(task_type.clone().into());
            clauses.push(format!("task_type = ?{}", values.len()));
        }
        if let Some(priority) = filter.priority {
            values.push(priority.as_str().to_string().into());
            clauses.push(format!("priority = ?{}", values.len()));
        }
        if let Some(after) = filter.created_after {
            values.push(after.to_rfc3339().into());
            clauses.push(format!("created_at >= ?{}", values.len()));
        }
        if let Some(before) = filter.created_before {
            values.push(before.to_rfc3339().into());
            clauses.push(format!("created_at <= ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(100);

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks{} ORDER BY created_at DESC LIMIT {}",
            TASK_COLUMNS, where_sql, limit
        ))?;

        let tasks = stmt
            .query_map(rusqlite::params_from_iter(values), row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE status = ?1 ORDER BY created_at ASC",
            TASK_COLUMNS
        ))?;

        let tasks = stmt
            .query_map(params![status.as_str()], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    async fn pending_ready(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE status = 'pending'
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
             ORDER BY CASE priority WHEN 'high' THEN 10 WHEN 'medium' THEN 5 ELSE 1 END DESC,
                      created_at ASC",
            TASK_COLUMNS
        ))?;

        let tasks = stmt
            .query_map(params![now.to_rfc3339()], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    async fn completed_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM tasks WHERE status = 'completed'")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    async fn mark_assigned(&self, id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'assigned', assigned_to = ?2, assigned_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![id, agent_id, now.to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    async fn mark_running(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'running', started_at = ?2
             WHERE id = ?1 AND status = 'assigned'",
            params![id, now.to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    async fn mark_completed(
        &self,
        id: &str,
        result: &str,
        duration_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'completed', result = ?2, execution_duration_ms = ?3,
                 completed_at = ?4, assigned_to = NULL
             WHERE id = ?1 AND status = 'running'",
            params![id, result, duration_ms.map(|d| d as i64), now.to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    async fn mark_retrying(
        &self,
        id: &str,
        error: &str,
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'pending', error = ?2, retry_count = ?3,
                 next_attempt_at = ?4, assigned_to = NULL, assigned_at = NULL, started_at = NULL
             WHERE id = ?1 AND status IN ('assigned', 'running')",
            params![id, error, retry_count, next_attempt_at.to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'failed', error = ?2, completed_at = ?3, assigned_to = NULL
             WHERE id = ?1 AND status IN ('assigned', 'running')",
            params![id, error, now.to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    async fn mark_blocked(&self, id: &str, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'blocked', error = ?2, completed_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![id, reason, now.to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    async fn statistics(&self) -> Result<QueueStatistics> {
        let conn = self.conn.lock().unwrap();

        let mut stats = QueueStatistics::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (status, count) in counts {
            match TaskStatus::parse(&status) {
                Some(TaskStatus::Pending) => stats.pending = count,
                Some(TaskStatus::Assigned) => stats.assigned = count,
                Some(TaskStatus::Running) => stats.running = count,
                Some(TaskStatus::Completed) => stats.completed = count,
                Some(TaskStatus::Failed) => stats.failed = count,
                Some(TaskStatus::Blocked) => stats.blocked = count,
                None => {}
            }
            stats.total += count;
        }

        let finished = stats.completed + stats.failed;
        stats.success_rate = if finished > 0 {
            stats.completed as f64 / finished as f64
        } else {
            0.0
        };

        let avg: Option<f64> = conn.query_row(
            "SELECT AVG(execution_duration_ms) FROM tasks
             WHERE status = 'completed' AND execution_duration_ms IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        stats.avg_execution_ms = avg.unwrap_or(0.0);

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_and_get() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;

        let task = Task::new("analyze logs", "analysis")
            .with_priority(TaskPriority::High)
            .with_requirements(vec!["log_parsing".to_string()]);
        store.insert(&task).await?;

        let loaded = store.get(&task.id).await?.unwrap();
        assert_eq!(loaded.content, "analyze logs");
        assert_eq!(loaded.task_type, "analysis");
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.priority, TaskPriority::High);
        assert_eq!(loaded.requirements, vec!["log_parsing".to_string()]);
        assert!(loaded.assigned_to.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_get_unknown_returns_none() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;
        assert!(store.get("no-such-task").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_assign_is_conditional() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;
        let task = Task::new("work", "generic");
        store.insert(&task).await?;

        let now = Utc::now();
        assert!(store.mark_assigned(&task.id, "agent-1", now).await?);
        // Second claim must lose.
        assert!(!store.mark_assigned(&task.id, "agent-2", now).await?);

        let loaded = store.get(&task.id).await?.unwrap();
        assert_eq!(loaded.status, TaskStatus::Assigned);
        assert_eq!(loaded.assigned_to, Some("agent-1".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_transition_order_enforced() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;
        let task = Task::new("work", "generic");
        store.insert(&task).await?;

        let now = Utc::now();
        // Cannot run or complete before being assigned/started.
        assert!(!store.mark_running(&task.id, now).await?);
        assert!(!store.mark_completed(&task.id, "out", None, now).await?);

        assert!(store.mark_assigned(&task.id, "agent-1", now).await?);
        assert!(store.mark_running(&task.id, now).await?);
        assert!(store.mark_completed(&task.id, "out", Some(42), now).await?);

        let loaded = store.get(&task.id).await?.unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.result, Some("out".to_string()));
        assert_eq!(loaded.execution_duration_ms, Some(42));
        assert!(loaded.assigned_to.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_pending_ready_ordering() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;

        let base = Utc::now();
        let mut low = Task::new("low", "t").with_priority(TaskPriority::Low);
        low.created_at = base;
        let mut high_late = Task::new("high-late", "t").with_priority(TaskPriority::High);
        high_late.created_at = base + Duration::seconds(2);
        let mut high_early = Task::new("high-early", "t").with_priority(TaskPriority::High);
        high_early.created_at = base + Duration::seconds(1);
        let mut medium = Task::new("medium", "t");
        medium.created_at = base;

        store.insert(&low).await?;
        store.insert(&high_late).await?;
        store.insert(&high_early).await?;
        store.insert(&medium).await?;

        let ready = store.pending_ready(base + Duration::seconds(10)).await?;
        let contents: Vec<_> = ready.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["high-early", "high-late", "medium", "low"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_pending_ready_honors_backoff() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;
        let task = Task::new("retry me", "t");
        store.insert(&task).await?;

        let now = Utc::now();
        store.mark_assigned(&task.id, "agent-1", now).await?;
        store
            .mark_retrying(&task.id, "boom", 1, now + Duration::seconds(30))
            .await?;

        // Not yet eligible.
        assert!(store.pending_ready(now).await?.is_empty());
        // Eligible once the backoff elapses.
        let ready = store.pending_ready(now + Duration::seconds(31)).await?;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].retry_count, 1);
        assert_eq!(ready[0].error, Some("boom".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_query_filters() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;

        store.insert(&Task::new("a", "analysis")).await?;
        store.insert(&Task::new("b", "analysis")).await?;
        store.insert(&Task::new("c", "report")).await?;

        let analysis = store
            .query(&TaskFilter::new().task_type("analysis"))
            .await?;
        assert_eq!(analysis.len(), 2);

        let limited = store.query(&TaskFilter::new().limit(1)).await?;
        assert_eq!(limited.len(), 1);

        let none = store
            .query(&TaskFilter::new().status(TaskStatus::Completed))
            .await?;
        assert!(none.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_statistics() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;
        let now = Utc::now();

        let done = Task::new("done", "t");
        store.insert(&done).await?;
        store.mark_assigned(&done.id, "a", now).await?;
        store.mark_running(&done.id, now).await?;
        store.mark_completed(&done.id, "ok", Some(100), now).await?;

        let dead = Task::new("dead", "t");
        store.insert(&dead).await?;
        store.mark_assigned(&dead.id, "a", now).await?;
        store.mark_failed(&dead.id, "boom", now).await?;

        store.insert(&Task::new("waiting", "t")).await?;

        let stats = store.statistics().await?;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.avg_execution_ms - 100.0).abs() < f64::EPSILON);

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_blocked_only_from_pending() -> Result<()> {
        let store = SqliteTaskStore::in_memory()?;
        let now = Utc::now();

        let task = Task::new("downstream", "t");
        store.insert(&task).await?;
        assert!(store.mark_blocked(&task.id, "upstream failed", now).await?);
        assert!(!store.mark_blocked(&task.id, "again", now).await?);

        let loaded = store.get(&task.id).await?.unwrap();
        assert_eq!(loaded.status, TaskStatus::Blocked);

        Ok(())
    }
}
