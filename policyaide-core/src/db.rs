use crate::config::DatabaseConfig;
use crate::models::{Span, Trace};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url())
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Row counts for the two telemetry tables.
#[derive(Debug, Clone, Copy)]
pub struct TableCounts {
    pub traces: i64,
    pub spans: i64,
}

pub async fn table_counts(pool: &PgPool) -> Result<TableCounts, sqlx::Error> {
    let traces: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM policy_aide.traces")
        .fetch_one(pool)
        .await?;
    let spans: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM policy_aide.spans")
        .fetch_one(pool)
        .await?;
    Ok(TableCounts {
        traces: traces.0,
        spans: spans.0,
    })
}

/// Most recent trace plus its first span, for the connectivity checker's
/// sample output. A freshly provisioned instance returns `None`; a trace
/// without spans returns `Some((trace, None))`.
pub async fn sample_trace(pool: &PgPool) -> Result<Option<(Trace, Option<Span>)>, sqlx::Error> {
    let trace = sqlx::query_as::<_, Trace>(
        r#"
        SELECT trace_id, policy_query, policy_type, created_at, agent_count, total_duration_ms
        FROM policy_aide.traces
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let trace = match trace {
        Some(t) => t,
        None => return Ok(None),
    };

    let span = sqlx::query_as::<_, Span>(
        r#"
        SELECT span_id, trace_id, agent_name, span_type, system_instructions,
               input_text, output_text, tokens_used, started_at, ended_at, duration_ms
        FROM policy_aide.spans
        WHERE trace_id = $1
        ORDER BY started_at
        LIMIT 1
        "#,
    )
    .bind(&trace.trace_id)
    .fetch_optional(pool)
    .await?;

    Ok(Some((trace, span)))
}
