//! Census tool bridge — translates `census_data` tool calls into the MCP
//! lookup service's wire shape
//!
//! The agent framework hands us `{query, geographic_level, location}`; the
//! lookup service wants `POST <mcp_url>/mcp` with
//! `{mcp_version, params, prompt}` where `params` carries Census-style
//! geographic predicates (`for` / `in` clauses). `call_tool` is the single
//! entry point and always returns a JSON value: on any failure — unsupported
//! tool, missing parameter, non-2xx response, transport error — the value is
//! `{"error": <string>}` and the call is terminal. No retry.

use policyaide_core::config::BridgeConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The one tool this bridge exposes.
pub const CENSUS_TOOL: &str = "census_data";

/// Bridge-level errors. These never escape `call_tool`; they are folded into
/// the `{"error": ...}` object there.
#[derive(Error, Debug)]
pub enum CensusBridgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("census service returned HTTP {code}: {message}")]
    Api { code: u16, message: String },
}

// ============================================================================
// Geographic predicates
// ============================================================================

/// Census-style geographic predicate pair.
/// `for_clause` selects the geography, `in_clause` restricts its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPredicate {
    pub for_clause: Option<String>,
    pub in_clause: Option<String>,
}

/// Reshape `geographic_level` + `location` into a predicate.
///
/// - `state`, `"TX"`          → `for = "state:TX"`
/// - `county`, `"Travis, TX"` → `for = "county:Travis"`, `in = "state:TX"`
/// - `city`, `"Austin, TX"`   → `for = "place:Austin"`, `in = "state:TX"`
///
/// An unrecognized level or empty location yields no predicate (national
/// scope). A county/city without a `, ST` suffix keeps the bare `for` clause.
pub fn build_predicate(level: Option<&str>, location: Option<&str>) -> GeoPredicate {
    let level = level.map(str::trim).unwrap_or("");
    let location = location.map(str::trim).unwrap_or("");
    if location.is_empty() {
        return GeoPredicate::default();
    }

    match level {
        "state" => GeoPredicate {
            for_clause: Some(format!("state:{}", location)),
            in_clause: None,
        },
        "county" => split_location(location, "county"),
        // The Census API calls incorporated cities "places"
        "city" => split_location(location, "place"),
        _ => GeoPredicate::default(),
    }
}

fn split_location(location: &str, geography: &str) -> GeoPredicate {
    match location.split_once(',') {
        Some((name, state)) => GeoPredicate {
            for_clause: Some(format!("{}:{}", geography, name.trim())),
            in_clause: Some(format!("state:{}", state.trim())),
        },
        None => GeoPredicate {
            for_clause: Some(format!("{}:{}", geography, location)),
            in_clause: None,
        },
    }
}

// ============================================================================
// MCP lookup client
// ============================================================================

/// HTTP client for the census MCP lookup service.
#[derive(Debug, Clone)]
pub struct McpClient {
    client: Client,
    base_url: String,
    mcp_version: String,
}

impl McpClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, CensusBridgeError> {
        Self::with_base_url(config.mcp_url.clone(), config.mcp_version.clone())
    }

    /// Create a client with an explicit base URL (for testing / integration)
    pub fn with_base_url(base_url: String, mcp_version: String) -> Result<Self, CensusBridgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mcp_version,
        })
    }

    /// One lookup call. The response body is passed through as opaque JSON.
    pub async fn lookup(
        &self,
        prompt: &str,
        predicate: &GeoPredicate,
    ) -> Result<serde_json::Value, CensusBridgeError> {
        let mut params = serde_json::Map::new();
        if let Some(f) = &predicate.for_clause {
            params.insert("for".to_string(), serde_json::json!(f));
        }
        if let Some(i) = &predicate.in_clause {
            params.insert("in".to_string(), serde_json::json!(i));
        }

        let body = serde_json::json!({
            "mcp_version": self.mcp_version,
            "params": params,
            "prompt": prompt,
        });

        let url = format!("{}/mcp", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(code = status.as_u16(), message = %message, "census service error");
            return Err(CensusBridgeError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

// ============================================================================
// Tool dispatch
// ============================================================================

/// Execute one tool call. Never fails and never panics: every failure mode
/// becomes an `{"error": <string>}` object, a terminal per-call outcome.
pub async fn call_tool(
    client: &McpClient,
    name: &str,
    args: &serde_json::Value,
) -> serde_json::Value {
    if name != CENSUS_TOOL {
        return serde_json::json!({
            "error": format!("unsupported tool: {}", name),
        });
    }

    let query = match args
        .get("query")
        .and_then(|v| v.as_str())
        .filter(|q| !q.trim().is_empty())
    {
        Some(q) => q,
        None => {
            return serde_json::json!({
                "error": "missing required parameter: query",
            });
        }
    };

    let predicate = build_predicate(
        args.get("geographic_level").and_then(|v| v.as_str()),
        args.get("location").and_then(|v| v.as_str()),
    );

    match client.lookup(query, &predicate).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, tool = name, "tool call failed");
            serde_json::json!({ "error": e.to_string() })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
