use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One agent execution step within a trace.
///
/// Spans are append-only: instruction edits insert a new synthetic span of
/// span_type `instruction_update` rather than mutating history.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Span {
    pub span_id: String,
    pub trace_id: String,
    pub agent_name: String,
    pub span_type: String,
    pub system_instructions: Option<String>,
    pub input_text: String,
    pub output_text: String,
    pub tokens_used: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl Span {
    /// Extract `total_tokens` from the structured `tokens_used` JSON.
    /// Missing or malformed payloads count as zero.
    pub fn total_tokens(&self) -> i64 {
        self.tokens_used
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn span_with_tokens(tokens_used: serde_json::Value) -> Span {
        Span {
            span_id: "span-1".into(),
            trace_id: "trace-1".into(),
            agent_name: "research_agent".into(),
            span_type: "agent_run".into(),
            system_instructions: None,
            input_text: "in".into(),
            output_text: "out".into(),
            tokens_used,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            duration_ms: 10,
        }
    }

    #[test]
    fn test_total_tokens_reads_field() {
        let span = span_with_tokens(serde_json::json!({
            "prompt_tokens": 120,
            "completion_tokens": 30,
            "total_tokens": 150
        }));
        assert_eq!(span.total_tokens(), 150);
    }

    #[test]
    fn test_total_tokens_missing_field_is_zero() {
        let span = span_with_tokens(serde_json::json!({"prompt_tokens": 12}));
        assert_eq!(span.total_tokens(), 0);
    }

    #[test]
    fn test_total_tokens_malformed_payload_is_zero() {
        let span = span_with_tokens(serde_json::json!("not an object"));
        assert_eq!(span.total_tokens(), 0);

        let span = span_with_tokens(serde_json::json!({"total_tokens": "150"}));
        assert_eq!(span.total_tokens(), 0);
    }
}
