//! Telemetry query layer — the dashboard's read queries and its single write
//!
//! Four reads against `policy_aide.traces` / `policy_aide.spans`:
//! - latest system instructions per agent
//! - per-agent performance aggregates
//! - recent traces joined to their spans
//! - spans of one selected trace
//!
//! One write: `record_instruction_update` appends a synthetic span so an
//! instruction edit becomes part of the history instead of mutating it.
//! Queries are runtime-checked (`query_as` with binds); the schema is owned
//! by the external Postgres instance, not this crate.

use crate::error::PolicyAideError;
use crate::models::{AgentInstructions, AgentPerformance, Span, TraceSummary};
use sqlx::PgPool;
use uuid::Uuid;

/// span_type tag written by the dashboard's instruction editor.
pub const INSTRUCTION_UPDATE: &str = "instruction_update";

/// Latest non-empty system instructions per distinct agent.
pub async fn agent_instructions(pool: &PgPool) -> Result<Vec<AgentInstructions>, PolicyAideError> {
    let rows = sqlx::query_as::<_, AgentInstructions>(
        r#"
        SELECT DISTINCT ON (agent_name)
            agent_name,
            system_instructions,
            started_at AS recorded_at
        FROM policy_aide.spans
        WHERE system_instructions IS NOT NULL
          AND system_instructions <> ''
        ORDER BY agent_name, started_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Per-agent run count, average duration, and token total.
pub async fn agent_performance(pool: &PgPool) -> Result<Vec<AgentPerformance>, PolicyAideError> {
    let rows = sqlx::query_as::<_, AgentPerformance>(
        r#"
        SELECT
            agent_name,
            COUNT(*) AS runs,
            AVG(duration_ms)::float8 AS avg_duration_ms,
            COALESCE(SUM((tokens_used->>'total_tokens')::bigint), 0) AS total_tokens
        FROM policy_aide.spans
        GROUP BY agent_name
        ORDER BY agent_name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Recent traces with per-trace span count and token total, newest first.
/// LEFT JOIN so a trace with zero spans still appears with 0/0.
pub async fn recent_traces(pool: &PgPool, limit: i64) -> Result<Vec<TraceSummary>, PolicyAideError> {
    let rows = sqlx::query_as::<_, TraceSummary>(
        r#"
        SELECT
            t.trace_id,
            t.policy_query,
            t.policy_type,
            t.created_at,
            t.agent_count,
            t.total_duration_ms,
            COUNT(s.span_id) AS span_count,
            COALESCE(SUM((s.tokens_used->>'total_tokens')::bigint), 0) AS total_tokens
        FROM policy_aide.traces t
        LEFT JOIN policy_aide.spans s ON s.trace_id = t.trace_id
        GROUP BY t.trace_id, t.policy_query, t.policy_type, t.created_at,
                 t.agent_count, t.total_duration_ms
        ORDER BY t.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All spans of one trace, in execution order.
pub async fn trace_spans(pool: &PgPool, trace_id: &str) -> Result<Vec<Span>, PolicyAideError> {
    let rows = sqlx::query_as::<_, Span>(
        r#"
        SELECT span_id, trace_id, agent_name, span_type, system_instructions,
               input_text, output_text, tokens_used, started_at, ended_at, duration_ms
        FROM policy_aide.spans
        WHERE trace_id = $1
        ORDER BY started_at
        "#,
    )
    .bind(trace_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Reject blank agent names and blank instruction text before touching the DB.
pub fn validate_instruction_input(
    agent_name: &str,
    instructions: &str,
) -> Result<(), PolicyAideError> {
    if agent_name.trim().is_empty() {
        return Err(PolicyAideError::Validation(
            "agent_name must not be blank".to_string(),
        ));
    }
    if instructions.trim().is_empty() {
        return Err(PolicyAideError::Validation(
            "instructions must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// Persist an instruction edit as one synthetic `instruction_update` span.
///
/// Spans are append-only and every span must reference an existing trace, so
/// the edit is recorded as a synthetic trace + span pair in one transaction.
/// Blank input fails validation and inserts nothing. Returns the new span_id.
pub async fn record_instruction_update(
    pool: &PgPool,
    agent_name: &str,
    instructions: &str,
) -> Result<String, PolicyAideError> {
    validate_instruction_input(agent_name, instructions)?;

    let agent_name = agent_name.trim();
    let trace_id = format!("trace-{}", Uuid::new_v4());
    let span_id = format!("span-{}", Uuid::new_v4());
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO policy_aide.traces
            (trace_id, policy_query, policy_type, created_at, agent_count, total_duration_ms)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&trace_id)
    .bind(format!("Instruction update for {}", agent_name))
    .bind(INSTRUCTION_UPDATE)
    .bind(now)
    .bind(1i32)
    .bind(0i64)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO policy_aide.spans
            (span_id, trace_id, agent_name, span_type, system_instructions,
             input_text, output_text, tokens_used, started_at, ended_at, duration_ms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&span_id)
    .bind(&trace_id)
    .bind(agent_name)
    .bind(INSTRUCTION_UPDATE)
    .bind(instructions)
    .bind("dashboard instruction editor")
    .bind("instructions saved")
    .bind(serde_json::json!({ "total_tokens": 0 }))
    .bind(now)
    .bind(now)
    .bind(0i64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(agent = agent_name, span_id = %span_id, "recorded instruction update");

    Ok(span_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // TEST 1: blank agent name is rejected
    // ========================================================================
    #[test]
    fn test_validate_blank_agent_name() {
        let result = validate_instruction_input("   ", "do the thing");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("agent_name"));
    }

    // ========================================================================
    // TEST 2: blank instructions are rejected
    // ========================================================================
    #[test]
    fn test_validate_blank_instructions() {
        let result = validate_instruction_input("research_agent", "\n\t ");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("instructions"));
    }

    // ========================================================================
    // TEST 3: non-blank input passes
    // ========================================================================
    #[test]
    fn test_validate_ok() {
        assert!(validate_instruction_input("research_agent", "Summarize bills.").is_ok());
    }
}
