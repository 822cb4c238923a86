//! Task queue module
//!
//! Provides the task model, SQLite-backed persistence and the queue that
//! drives tasks through their lifecycle.

mod queue;
mod store;
mod types;

pub use queue::TaskQueue;
pub use store::{SqliteTaskStore, TaskRepository};
pub use types::{QueueStatistics, Task, TaskFilter, TaskPriority, TaskStatus};
