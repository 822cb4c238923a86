//! Agent registry module
//!
//! Tracks registered agents, their capability tags, performance counters
//! and current load, backed by SQLite.

mod manager;
mod store;
mod types;

pub use manager::AgentRegistry;
pub use store::{AgentRepository, SqliteAgentStore};
pub use types::{Agent, AgentHealth, AgentStatistics};
