use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest system instructions recorded for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentInstructions {
    pub agent_name: String,
    pub system_instructions: String,
    pub recorded_at: DateTime<Utc>,
}

/// Per-agent performance aggregates for the dashboard charts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentPerformance {
    pub agent_name: String,
    pub runs: i64,
    pub avg_duration_ms: f64,
    pub total_tokens: i64,
}
