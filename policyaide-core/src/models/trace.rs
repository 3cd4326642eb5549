use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One end-to-end policy query across the agent pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trace {
    pub trace_id: String,
    pub policy_query: String,
    pub policy_type: String,
    pub created_at: DateTime<Utc>,
    pub agent_count: i32,
    pub total_duration_ms: i64,
}

/// Trace row joined to its spans for the dashboard trace list.
/// `span_count` and `total_tokens` are 0 for a trace with no spans.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TraceSummary {
    pub trace_id: String,
    pub policy_query: String,
    pub policy_type: String,
    pub created_at: DateTime<Utc>,
    pub agent_count: i32,
    pub total_duration_ms: i64,
    pub span_count: i64,
    pub total_tokens: i64,
}
