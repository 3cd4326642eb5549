//! policyaide-cli — operator frontend for the PolicyAide telemetry store
//!
//! # Subcommands
//! - `check [--config <path>]` — Postgres connectivity smoke test: walks the
//!   candidate config paths, connects, reports row counts and a sample
//!   trace/span pair. Pure diagnostic; no retries.
//! - `status`                  — show dashboard server health
//! - `agents [--json]`         — latest system instructions per agent
//! - `traces [-n N] [--json]`  — recent traces with span counts

use clap::{Parser, Subcommand};
use policyaide_core::config::{PolicyAideConfig, CONFIG_CANDIDATES};
use policyaide_core::models::{AgentInstructions, TraceSummary};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";
const DEFAULT_LIMIT: i64 = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "policyaide-cli",
    version,
    about = "PolicyAide telemetry — connectivity checker and dashboard frontend"
)]
struct Cli {
    /// Dashboard HTTP server URL (overrides POLICYAIDE_HTTP_URL env var)
    #[arg(long, env = "POLICYAIDE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Smoke-test the managed Postgres connection
    Check {
        /// Explicit config path; skips the candidate-path search
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Show dashboard server status
    Status,

    /// List agents and their latest system instructions
    Agents {
        /// Output the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List recent traces with span counts
    Traces {
        /// Maximum number of traces to list
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: i64,

        /// Output the raw JSON response
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AgentsResponse {
    agents: Vec<AgentInstructions>,
}

#[derive(Debug, Deserialize)]
struct TracesResponse {
    traces: Vec<TraceSummary>,
}

// ============================================================================
// Formatting helpers
// ============================================================================

/// Truncate to `max` characters, appending an ellipsis when shortened.
/// Newlines collapse to spaces so table rows stay on one line.
fn truncate(s: &str, max: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn render_agents_table(agents: &[AgentInstructions]) -> String {
    let mut out = format!(
        "{:<24} {:<20} {}\n",
        "AGENT", "RECORDED", "INSTRUCTIONS"
    );
    for a in agents {
        out.push_str(&format!(
            "{:<24} {:<20} {}\n",
            truncate(&a.agent_name, 23),
            a.recorded_at.format("%Y-%m-%d %H:%M"),
            truncate(&a.system_instructions, 60),
        ));
    }
    out
}

fn render_traces_table(traces: &[TraceSummary]) -> String {
    let mut out = format!(
        "{:<30} {:<16} {:<17} {:>6} {:>6} {:>8} {:>9}\n",
        "TRACE", "TYPE", "CREATED", "AGENTS", "SPANS", "TOKENS", "TOTAL MS"
    );
    for t in traces {
        out.push_str(&format!(
            "{:<30} {:<16} {:<17} {:>6} {:>6} {:>8} {:>9}\n",
            truncate(&t.trace_id, 29),
            truncate(&t.policy_type, 15),
            t.created_at.format("%Y-%m-%d %H:%M"),
            t.agent_count,
            t.span_count,
            t.total_tokens,
            t.total_duration_ms,
        ));
    }
    out
}

// ============================================================================
// check — Postgres connectivity smoke test
// ============================================================================

/// Walk the candidate paths the way the server's discovery does, but print
/// each step so the operator sees why a candidate was skipped.
fn find_config(explicit: Option<&str>) -> Option<(PolicyAideConfig, String)> {
    if let Some(path) = explicit {
        match PolicyAideConfig::load(path) {
            Ok(cfg) => return Some((cfg, path.to_string())),
            Err(e) => {
                eprintln!("❌ {}: {}", path, e);
                return None;
            }
        }
    }

    for candidate in CONFIG_CANDIDATES {
        let expanded = shellexpand::tilde(candidate).into_owned();
        if !Path::new(&expanded).exists() {
            println!("   {} — not found", expanded);
            continue;
        }
        match PolicyAideConfig::load(&expanded) {
            Ok(cfg) if cfg.database.is_complete() => {
                println!("✅ {} — credentials complete", expanded);
                return Some((cfg, expanded));
            }
            Ok(_) => println!("   {} — incomplete credentials, skipping", expanded),
            Err(e) => println!("   {} — unreadable ({}), skipping", expanded, e),
        }
    }
    None
}

async fn do_check(explicit_config: Option<String>) -> anyhow::Result<()> {
    println!("Searching for config:");
    let (config, path) = match find_config(explicit_config.as_deref()) {
        Some(found) => found,
        None => {
            eprintln!("❌ No usable config found");
            std::process::exit(1);
        }
    };

    println!(
        "Using {} (user={}, host={}:{}, dbname={})",
        path, config.database.user, config.database.host, config.database.port, config.database.dbname
    );

    let pool = match policyaide_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("❌ Connection failed: {}", e);
            std::process::exit(1);
        }
    };

    match policyaide_core::db::health_check(&pool).await {
        Ok(v) => println!("✅ PostgreSQL connected: {}", v),
        Err(e) => {
            eprintln!("❌ PostgreSQL query failed: {}", e);
            std::process::exit(1);
        }
    }

    match policyaide_core::db::table_counts(&pool).await {
        Ok(c) => println!("✅ Telemetry tables: {} traces, {} spans", c.traces, c.spans),
        Err(e) => {
            eprintln!("❌ Telemetry table check failed: {}", e);
            std::process::exit(1);
        }
    }

    match policyaide_core::db::sample_trace(&pool).await {
        Ok(Some((trace, span))) => {
            println!(
                "Sample trace: {} — {} ({}, {} agents, {} ms)",
                trace.trace_id,
                truncate(&trace.policy_query, 50),
                trace.policy_type,
                trace.agent_count,
                trace.total_duration_ms,
            );
            match span {
                Some(s) => println!(
                    "  first span: {} {} [{}] {} ms, {} tokens",
                    s.span_id,
                    s.agent_name,
                    s.span_type,
                    s.duration_ms,
                    s.total_tokens(),
                ),
                None => println!("  (trace has no spans)"),
            }
        }
        Ok(None) => println!("ℹ no traces recorded yet"),
        Err(e) => {
            eprintln!("❌ Sample trace query failed: {}", e);
            std::process::exit(1);
        }
    }

    println!("✅ PolicyAide connectivity check passed");
    Ok(())
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?)
}

/// Show the server status by calling GET /health.
async fn do_status(server: &str) -> anyhow::Result<()> {
    let client = http_client()?;
    let url = format!("{}/health", server);

    match client.get(&url).send().await {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().await.unwrap_or_default();
            println!("PolicyAide server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:           {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL:        {}", body["postgresql"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("policyaide-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("policyaide-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn fetch_json(url: &str) -> anyhow::Result<serde_json::Value> {
    let client = http_client()?;
    let resp = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("policyaide-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        eprintln!("policyaide-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    Ok(resp.json().await?)
}

async fn do_agents(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/agents", server);
    let body = fetch_json(&url).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let parsed: AgentsResponse = serde_json::from_value(body)?;
    if parsed.agents.is_empty() {
        eprintln!("No agent instructions recorded");
        return Ok(());
    }
    print!("{}", render_agents_table(&parsed.agents));
    Ok(())
}

async fn do_traces(server: &str, limit: i64, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/traces?limit={}", server, limit);
    let body = fetch_json(&url).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let parsed: TracesResponse = serde_json::from_value(body)?;
    if parsed.traces.is_empty() {
        eprintln!("No traces recorded");
        return Ok(());
    }
    print!("{}", render_traces_table(&parsed.traces));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Check { config } => do_check(config).await,
        Commands::Status => do_status(&server).await,
        Commands::Agents { json } => do_agents(&server, json).await,
        Commands::Traces { limit, json } => do_traces(&server, limit, json).await,
    };

    if let Err(e) = result {
        eprintln!("policyaide-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn mock_trace(trace_id: &str, span_count: i64, total_tokens: i64) -> TraceSummary {
        TraceSummary {
            trace_id: trace_id.to_string(),
            policy_query: "What changed in HB 123?".to_string(),
            policy_type: "legislation".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 0).unwrap(),
            agent_count: 3,
            total_duration_ms: 8450,
            span_count,
            total_tokens,
        }
    }

    // ========================================================================
    // TEST 1: truncate keeps short strings intact
    // ========================================================================
    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    // ========================================================================
    // TEST 2: truncate shortens long strings with an ellipsis
    // ========================================================================
    #[test]
    fn test_truncate_long_string() {
        let long = "a".repeat(100);
        let out = truncate(&long, 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.ends_with('…'));
    }

    // ========================================================================
    // TEST 3: truncate flattens newlines so rows stay single-line
    // ========================================================================
    #[test]
    fn test_truncate_flattens_newlines() {
        assert_eq!(truncate("line one\nline two", 40), "line one line two");
    }

    // ========================================================================
    // TEST 4: traces table shows zero span counts as 0, not blank
    // ========================================================================
    #[test]
    fn test_traces_table_zero_spans() {
        let table = render_traces_table(&[mock_trace("trace-zero", 0, 0)]);
        let row = table.lines().nth(1).expect("one data row");
        assert!(row.contains("trace-zero"));
        assert!(row.contains(" 0"), "zero span count must render: {}", row);
    }

    // ========================================================================
    // TEST 5: traces table header and row alignment
    // ========================================================================
    #[test]
    fn test_traces_table_columns() {
        let table = render_traces_table(&[mock_trace("trace-abc", 4, 1534)]);
        let header = table.lines().next().unwrap();
        assert!(header.contains("TRACE"));
        assert!(header.contains("SPANS"));
        assert!(header.contains("TOKENS"));
        let row = table.lines().nth(1).unwrap();
        assert!(row.contains("trace-abc"));
        assert!(row.contains("1534"));
        assert!(row.contains("legislation"));
    }

    // ========================================================================
    // TEST 6: agents table truncates long instructions
    // ========================================================================
    #[test]
    fn test_agents_table_truncates_instructions() {
        let agents = vec![AgentInstructions {
            agent_name: "research_agent".to_string(),
            system_instructions: "x".repeat(200),
            recorded_at: Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 0).unwrap(),
        }];
        let table = render_agents_table(&agents);
        let row = table.lines().nth(1).unwrap();
        assert!(row.contains("research_agent"));
        assert!(row.chars().count() < 150, "instructions must be truncated");
    }
}
