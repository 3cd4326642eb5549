//! Agent demo runtime — wires the census tool into an OpenAI chat loop
//!
//! The model is offered the `census_data` function schema; returned tool
//! calls are dispatched through the bridge and the results fed back as tool
//! messages until the model produces a plain answer. Calls are single-flight
//! and awaited sequentially; a round cap bounds runaway tool loops.

use crate::census::{call_tool, McpClient};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Upper bound on model/tool round-trips per question.
const MAX_ROUNDS: usize = 6;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key — set OPENAI_API_KEY")]
    MissingApiKey,

    #[error("No completion choice in response")]
    EmptyResponse,

    #[error("Tool loop did not settle within {rounds} rounds")]
    RoundLimit { rounds: usize },
}

// ============================================================================
// Tool dispatch seam
// ============================================================================

/// Seam between the chat loop and tool execution, so agent tests can run
/// without a live lookup service.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(&self, name: &str, args: &serde_json::Value) -> serde_json::Value;
}

/// Production dispatcher — routes every tool call through the census bridge.
pub struct CensusToolDispatcher {
    pub mcp: McpClient,
}

#[async_trait]
impl ToolDispatcher for CensusToolDispatcher {
    async fn dispatch(&self, name: &str, args: &serde_json::Value) -> serde_json::Value {
        call_tool(&self.mcp, name, args).await
    }
}

// ============================================================================
// Chat wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as the chat API delivers them.
    pub arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a [serde_json::Value],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// The `census_data` function schema in chat-completions `tools` format.
pub fn census_tool_spec() -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "census_data",
            "description": "Look up United States census statistics relevant to a policy question.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look up, e.g. 'total population'"
                    },
                    "geographic_level": {
                        "type": "string",
                        "enum": ["state", "county", "city"],
                        "description": "Geographic granularity of the question"
                    },
                    "location": {
                        "type": "string",
                        "description": "Location string, e.g. 'TX' or 'Travis, TX'"
                    }
                },
                "required": ["query"]
            }
        }
    })
}

// ============================================================================
// AgentClient
// ============================================================================

/// Minimal OpenAI chat-completions client with function tools.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AgentClient {
    pub fn new(api_key: String, model: String) -> Result<Self, AgentError> {
        Self::with_base_url(api_key, model, OPENAI_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self, AgentError> {
        if api_key.trim().is_empty() {
            return Err(AgentError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatMessage, AgentError> {
        let tools = [census_tool_spec()];
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools: &tools,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "OpenAI API error");
            return Err(AgentError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(AgentError::EmptyResponse)
    }

    /// Run one question to completion: offer the tool, execute whatever tool
    /// calls come back, and return the model's final plain answer.
    pub async fn run(
        &self,
        dispatcher: &dyn ToolDispatcher,
        question: &str,
    ) -> Result<String, AgentError> {
        let mut messages = vec![
            ChatMessage::system(
                "You are PolicyAide, a policy research assistant. \
                 Use the census_data tool for population and demographic figures; \
                 answer directly when no data lookup is needed.",
            ),
            ChatMessage::user(question),
        ];

        for _ in 0..MAX_ROUNDS {
            let reply = self.chat(&messages).await?;

            let calls = match &reply.tool_calls {
                Some(calls) if !calls.is_empty() => calls.clone(),
                _ => return Ok(reply.content.unwrap_or_default()),
            };

            messages.push(reply);
            for call in calls {
                let args: serde_json::Value = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| serde_json::json!({}));
                let result = dispatcher.dispatch(&call.function.name, &args).await;
                tracing::debug!(tool = %call.function.name, "tool call dispatched");
                messages.push(ChatMessage::tool(call.id, result.to_string()));
            }
        }

        Err(AgentError::RoundLimit { rounds: MAX_ROUNDS })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Canned dispatcher that records what it was asked to run.
    struct RecordingDispatcher {
        calls: Mutex<Vec<(String, serde_json::Value)>>,
        reply: serde_json::Value,
    }

    impl RecordingDispatcher {
        fn new(reply: serde_json::Value) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    #[async_trait]
    impl ToolDispatcher for RecordingDispatcher {
        async fn dispatch(&self, name: &str, args: &serde_json::Value) -> serde_json::Value {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), args.clone()));
            self.reply.clone()
        }
    }

    fn tool_call_response() -> serde_json::Value {
        serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "census_data",
                            "arguments": "{\"query\":\"total population\",\"geographic_level\":\"county\",\"location\":\"Travis, TX\"}"
                        }
                    }]
                }
            }]
        })
    }

    fn final_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{
                "message": { "role": "assistant", "content": text }
            }]
        })
    }

    // ========================================================================
    // TEST 1: empty API key is rejected at construction
    // ========================================================================
    #[test]
    fn test_missing_api_key() {
        let result = AgentClient::new("".to_string(), "gpt-4o-mini".to_string());
        assert!(matches!(result, Err(AgentError::MissingApiKey)));
    }

    // ========================================================================
    // TEST 2: plain answer with no tool calls returns immediately
    // ========================================================================
    #[tokio::test]
    async fn test_run_plain_answer() {
        let mock_server = MockServer::start().await;
        let client = AgentClient::with_base_url(
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            mock_server.uri(),
        )
        .unwrap();

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(final_response("No lookup needed.")),
            )
            .mount(&mock_server)
            .await;

        let dispatcher = RecordingDispatcher::new(serde_json::json!({}));
        let answer = client.run(&dispatcher, "Say hi").await.unwrap();

        assert_eq!(answer, "No lookup needed.");
        assert!(dispatcher.calls.lock().unwrap().is_empty());
    }

    // ========================================================================
    // TEST 3: tool call round — dispatched once, result fed back, final answer
    // ========================================================================
    #[tokio::test]
    async fn test_run_tool_round_trip() {
        let mock_server = MockServer::start().await;
        let client = AgentClient::with_base_url(
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            mock_server.uri(),
        )
        .unwrap();

        // First call returns a tool_call, second the final answer.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_response()))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(final_response(
                "Travis County has about 1.29 million residents.",
            )))
            .mount(&mock_server)
            .await;

        let dispatcher =
            RecordingDispatcher::new(serde_json::json!({ "rows": [{ "population": 1290188 }] }));
        let answer = client
            .run(&dispatcher, "How many people live in Travis County, TX?")
            .await
            .unwrap();

        assert!(answer.contains("1.29 million"));

        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1, "tool must be dispatched exactly once");
        assert_eq!(calls[0].0, "census_data");
        assert_eq!(calls[0].1["location"], "Travis, TX");
    }

    // ========================================================================
    // TEST 4: API error surfaces as AgentError::Api
    // ========================================================================
    #[tokio::test]
    async fn test_run_api_error() {
        let mock_server = MockServer::start().await;
        let client = AgentClient::with_base_url(
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            mock_server.uri(),
        )
        .unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&mock_server)
            .await;

        let dispatcher = RecordingDispatcher::new(serde_json::json!({}));
        let result = client.run(&dispatcher, "anything").await;

        match result {
            Err(AgentError::Api { code, .. }) => assert_eq!(code, 401),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    // ========================================================================
    // TEST 5: endless tool calls hit the round limit instead of looping
    // ========================================================================
    #[tokio::test]
    async fn test_run_round_limit() {
        let mock_server = MockServer::start().await;
        let client = AgentClient::with_base_url(
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            mock_server.uri(),
        )
        .unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_response()))
            .mount(&mock_server)
            .await;

        let dispatcher = RecordingDispatcher::new(serde_json::json!({}));
        let result = client.run(&dispatcher, "loop forever").await;

        assert!(matches!(result, Err(AgentError::RoundLimit { .. })));
    }

    // ========================================================================
    // TEST 6: tool spec names the census_data function and requires query
    // ========================================================================
    #[test]
    fn test_census_tool_spec_shape() {
        let spec = census_tool_spec();
        assert_eq!(spec["type"], "function");
        assert_eq!(spec["function"]["name"], "census_data");
        assert_eq!(spec["function"]["parameters"]["required"][0], "query");
    }
}
