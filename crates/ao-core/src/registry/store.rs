//! Agent persistence using SQLite

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde_json::Value as JsonValue;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::registry::types::Agent;
use crate::Result;

/// Storage port for agents
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Insert a new agent row
    async fn insert(&self, agent: &Agent) -> Result<()>;

    /// Load an agent by id
    async fn get(&self, id: &str) -> Result<Option<Agent>>;

    /// List all registered agents
    async fn list(&self) -> Result<Vec<Agent>>;

    /// Delete an agent; returns false when no row existed
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Fold one task outcome into the agent's counters.
    ///
    /// Successful durations feed the running average; failures only move
    /// the failure counter. Returns the updated agent, or None if unknown.
    async fn record_outcome(
        &self,
        id: &str,
        success: bool,
        duration_ms: u64,
    ) -> Result<Option<Agent>>;

    /// Append a capability if not already present; idempotent.
    /// Returns the updated agent, or None if unknown.
    async fn add_capability(&self, id: &str, capability: &str) -> Result<Option<Agent>>;

    /// Bump current_load by one
    async fn increment_load(&self, id: &str) -> Result<bool>;

    /// Drop current_load by one, never below zero
    async fn decrement_load(&self, id: &str) -> Result<bool>;
}

const AGENT_COLUMNS: &str = "id, capabilities, max_concurrent_tasks, success_rate, \
     avg_completion_ms, current_load, total_completed, total_failed, metadata, registered_at";

/// SQLite-based agent storage
pub struct SqliteAgentStore {
    conn: Mutex<Connection>,
}

impl SqliteAgentStore {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        debug!("Opening agent database at: {}", db_path);
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        info!("SqliteAgentStore initialized successfully");
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
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                capabilities TEXT NOT NULL,
                max_concurrent_tasks INTEGER NOT NULL,
                success_rate REAL NOT NULL,
                avg_completion_ms REAL NOT NULL,
                current_load INTEGER NOT NULL,
                total_completed INTEGER NOT NULL,
                total_failed INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                registered_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn save_locked(conn: &Connection, agent: &Agent) -> Result<()> {
        let capabilities_json = serde_json::to_string(&agent.capabilities)?;
        let metadata_json = serde_json::to_string(&agent.metadata)?;
        conn.execute(
            "INSERT OR REPLACE INTO agents (id, capabilities, max_concurrent_tasks, success_rate, \
             avg_completion_ms, current_load, total_completed, total_failed, metadata, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                agent.id,
                capabilities_json,
                agent.max_concurrent_tasks,
                agent.success_rate,
                agent.avg_completion_ms,
                agent.current_load,
                agent.total_completed as i64,
                agent.total_failed as i64,
                metadata_json,
                agent.registered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_locked(conn: &Connection, id: &str) -> Result<Option<Agent>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents WHERE id = ?1",
            AGENT_COLUMNS
        ))?;
        let result = stmt.query_row(params![id], row_to_agent);
        match result {
            Ok(agent) => Ok(Some(agent)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a full agent row (AGENT_COLUMNS order) into an Agent
fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    let capabilities_str: String = row.get(1)?;
    let metadata_str: String = row.get(8)?;
    let registered_at_str: String = row.get(9)?;

    Ok(Agent {
        id: row.get(0)?,
        capabilities: serde_json::from_str(&capabilities_str).unwrap_or_default(),
        max_concurrent_tasks: row.get::<_, i64>(2)? as u32,
        success_rate: row.get(3)?,
        avg_completion_ms: row.get(4)?,
        current_load: row.get::<_, i64>(5)? as u32,
        total_completed: row.get::<_, i64>(6)? as u64,
        total_failed: row.get::<_, i64>(7)? as u64,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(JsonValue::Null),
        registered_at: DateTime::parse_from_rfc3339(&registered_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[async_trait]
impl AgentRepository for SqliteAgentStore {
    async fn insert(&self, agent: &Agent) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        SqliteAgentStore::save_locked(&conn, agent)?;
        debug!(
            "Registered agent {} with {} capabilities",
            agent.id,
            agent.capabilities.len()
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock().unwrap();
        SqliteAgentStore::get_locked(&conn, id)
    }

    async fn list(&self) -> Result<Vec<Agent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents ORDER BY id ASC",
            AGENT_COLUMNS
        ))?;
        let agents = stmt
            .query_map([], row_to_agent)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(agents)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM agents WHERE id = ?1", params![id])?;
        if rows > 0 {
            debug!("Deregistered agent {}", id);
        }
        Ok(rows > 0)
    }

    async fn record_outcome(
        &self,
        id: &str,
        success: bool,
        duration_ms: u64,
    ) -> Result<Option<Agent>> {
        // Read-modify-write under a single lock so concurrent outcomes
        // cannot interleave.
        let conn = self.conn.lock().unwrap();
        let Some(mut agent) = SqliteAgentStore::get_locked(&conn, id)? else {
            return Ok(None);
        };

        if success {
            let prior = agent.total_completed as f64;
            agent.avg_completion_ms =
                (agent.avg_completion_ms * prior + duration_ms as f64) / (prior + 1.0);
            agent.total_completed += 1;
        } else {
            agent.total_failed += 1;
        }
        let finished = agent.total_completed + agent.total_failed;
        agent.success_rate = agent.total_completed as f64 / finished as f64;

        SqliteAgentStore::save_locked(&conn, &agent)?;
        Ok(Some(agent))
    }

    async fn add_capability(&self, id: &str, capability: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock().unwrap();
        let Some(mut agent) = SqliteAgentStore::get_locked(&conn, id)? else {
            return Ok(None);
        };

        if !agent.capabilities.iter().any(|c| c == capability) {
            agent.capabilities.push(capability.to_string());
            SqliteAgentStore::save_locked(&conn, &agent)?;
            debug!("Agent {} learned capability {}", id, capability);
        }
        Ok(Some(agent))
    }

    async fn increment_load(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE agents SET current_load = current_load + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(rows > 0)
    }

    async fn decrement_load(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE agents SET current_load = MAX(current_load - 1, 0) WHERE id = ?1",
            params![id],
        )?;
        Ok(rows > 0)
    }
}
