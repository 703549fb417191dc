use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use orcabot_core::RetryPolicy;

/// A shade of creativity so replies read human, not templated.
const TEMPERATURE: f64 = 0.85;
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("reasoning transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("reasoning endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reasoning response decode error: {0}")]
    Decode(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

/// One entry of the reasoning transcript, in the order it will be replayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptEntry {
    Customer(String),
    Assistant(String),
    /// An assistant round that requested tools; kept verbatim so the
    /// follow-up round sees its own requests.
    AssistantToolCalls { content: String, calls: Vec<ToolCallRequest> },
    /// Result envelope for one dispatched call, keyed to its request.
    ToolResult { call_id: String, payload: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw argument payload as the model produced it; decoding is the tool
    /// router's problem.
    pub arguments: String,
}

/// Declared tool for the model's menu.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Forced(&'static str),
}

#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub system: String,
    pub transcript: Vec<TranscriptEntry>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
}

/// What a reasoning round produced: terminal text, tool requests, or
/// (degenerate case) neither.
#[derive(Clone, Debug, Default)]
pub struct ChatOutcome {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome, LlmError>;
}

/// Chat-completions client for any OpenAI-compatible endpoint. Pointed at the
/// xAI API by default; OpenRouter works by swapping `base_url`.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            retry,
        }
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system })];

        for entry in &request.transcript {
            match entry {
                TranscriptEntry::Customer(text) => {
                    messages.push(json!({ "role": "user", "content": text }));
                }
                TranscriptEntry::Assistant(text) => {
                    messages.push(json!({ "role": "assistant", "content": text }));
                }
                TranscriptEntry::AssistantToolCalls { content, calls } => {
                    let tool_calls: Vec<serde_json::Value> = calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments,
                                },
                            })
                        })
                        .collect();
                    let content = if content.is_empty() {
                        serde_json::Value::Null
                    } else {
                        json!(content)
                    };
                    messages.push(json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tool_calls,
                    }));
                }
                TranscriptEntry::ToolResult { call_id, payload } => {
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": call_id,
                        "content": payload,
                    }));
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = match &request.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::None => json!("none"),
                ToolChoice::Forced(name) => {
                    json!({ "type": "function", "function": { "name": name } })
                }
            };
        }

        body
    }

    async fn chat_once(&self, body: &serde_json::Value) -> Result<ChatOutcome, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let data: serde_json::Value =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;

        Ok(parse_outcome(&data))
    }
}

fn parse_outcome(data: &serde_json::Value) -> ChatOutcome {
    let message = &data["choices"][0]["message"];

    let text = message["content"]
        .as_str()
        .map(str::to_string)
        .filter(|content| !content.trim().is_empty());

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    Some(ToolCallRequest {
                        id: call["id"].as_str()?.to_string(),
                        name: call["function"]["name"].as_str()?.to_string(),
                        arguments: call["function"]["arguments"]
                            .as_str()
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ChatOutcome { text, tool_calls }
}

#[async_trait]
impl ReasoningClient for OpenAiCompatClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome, LlmError> {
        let body = self.build_body(request);
        debug!(
            event_name = "llm.request",
            transcript_len = request.transcript.len(),
            tools = request.tools.len(),
        );

        let mut attempt = 0;
        loop {
            match self.chat_once(&body).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        event_name = "llm.retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "reasoning call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
