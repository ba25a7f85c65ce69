// Chat-completions streaming client using reqwest-eventsource.
//
// Posts to an OpenAI-compatible endpoint (Groq by default) with
// `stream: true`, forwards content deltas as `LlmEvent::Token` over an mpsc
// channel, and accumulates tool-call fragments into a `ChatOutcome` that the
// agent loop acts on.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use medsql_core::config::Config;

// ---------------------------------------------------------------------------
// Events and errors
// ---------------------------------------------------------------------------

/// Streamed output of an in-flight completion, tagged with the generation of
/// the question that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    Token { text: String, generation: u64 },
    ToolRequested { name: String, generation: u64 },
}

impl LlmEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LlmEvent::Token { generation, .. } | LlmEvent::ToolRequested { generation, .. } => {
                *generation
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM not configured: set GROQ_API_KEY or add credentials.toml")]
    NotConfigured,

    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("LLM request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("request cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let content = content.into();
        ChatMessage {
            role: Role::Assistant,
            content: (!content.is_empty()).then_some(content),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, content: String) -> Self {
        ChatMessage {
            role,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// JSON shape expected by the chat-completions API.
    pub fn to_wire(&self) -> Value {
        let mut msg = json!({
            "role": self.role,
            "content": self.content,
        });
        if !self.tool_calls.is_empty() {
            msg["tool_calls"] = self
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": call.function,
                    })
                })
                .collect();
        }
        if let Some(id) = &self.tool_call_id {
            msg["tool_call_id"] = json!(id);
        }
        msg
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Tool definitions in the API's `{"type": "function", ...}` form.
    pub tools: Vec<Value>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Final state of one streamed completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// ChatModel trait
// ---------------------------------------------------------------------------

/// A chat model that streams tokens and reports the completed turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> Result<ChatOutcome, LlmError>;

    fn model_id(&self) -> &str;

    /// False when every request is bound to fail with `NotConfigured`.
    fn is_configured(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// GroqClient
// ---------------------------------------------------------------------------

/// Streaming client for an OpenAI-compatible chat-completions endpoint.
pub struct GroqClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GroqClient {
    pub fn new(api_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
            model,
            timeout,
        }
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "stream": true,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": request.messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
            body["tool_choice"] = json!("auto");
        }
        body
    }

    async fn run_stream(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> Result<ChatOutcome, LlmError> {
        let builder = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&self.request_body(request));

        let mut es = builder
            .eventsource()
            .map_err(|e| LlmError::Stream(format!("failed to create event source: {e}")))?;

        let mut acc = StreamAccumulator::default();

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("SSE connection opened");
                }
                Ok(Event::Message(msg)) => {
                    if msg.data.trim() == "[DONE]" {
                        debug!("[DONE]: streaming complete");
                        es.close();
                        break;
                    }
                    let Some(delta) = parse_chunk(&msg.data) else {
                        warn!("unparseable SSE chunk: {}", msg.data);
                        continue;
                    };
                    for event in acc.apply(delta, generation) {
                        if tx.send(event).await.is_err() {
                            // Receiver dropped: abort stream.
                            es.close();
                            return Err(LlmError::Cancelled);
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    es.close();
                    return Err(convert_error(err).await);
                }
            }
        }

        let outcome = acc.finish();
        debug!(
            finish_reason = ?outcome.finish_reason,
            prompt_tokens = outcome.usage.prompt_tokens,
            completion_tokens = outcome.usage.completion_tokens,
            "completion finished"
        );
        if outcome.finish_reason.as_deref() == Some("length") {
            warn!("completion hit max_tokens; the answer may be cut short");
        }
        if outcome.content.trim().is_empty() && outcome.tool_calls.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl ChatModel for GroqClient {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> Result<ChatOutcome, LlmError> {
        match tokio::time::timeout(self.timeout, self.run_stream(request, tx, generation)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either a configured client or a stand-in that rejects every request.
pub enum LlmClient {
    Active(GroqClient),
    /// No API key configured.
    Disabled,
}

impl LlmClient {
    /// `Active` if an API key is present in credentials, otherwise `Disabled`.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.groq_api_key {
            Some(key) if !key.trim().is_empty() => LlmClient::Active(GroqClient::new(
                config.llm.api_url.clone(),
                key.clone(),
                config.llm.model.clone(),
                Duration::from_secs(config.llm.request_timeout_secs),
            )),
            _ => LlmClient::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> Result<ChatOutcome, LlmError> {
        match self {
            LlmClient::Active(client) => client.stream_chat(request, tx, generation).await,
            LlmClient::Disabled => Err(LlmError::NotConfigured),
        }
    }

    fn model_id(&self) -> &str {
        match self {
            LlmClient::Active(client) => client.model_id(),
            LlmClient::Disabled => "disabled",
        }
    }

    fn is_configured(&self) -> bool {
        self.is_active()
    }
}

// ---------------------------------------------------------------------------
// SSE chunk parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// The parts of one `chat.completion.chunk` the client cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ChunkDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Parse a streamed chunk.
///
/// Expected shape:
/// `{ "choices": [{ "delta": { "content": "...", "tool_calls": [...] }, "finish_reason": null }],
///    "x_groq": { "usage": { ... } } }`
pub(crate) fn parse_chunk(data: &str) -> Option<ChunkDelta> {
    let v: Value = serde_json::from_str(data).ok()?;
    let mut out = ChunkDelta::default();

    if let Some(choice) = v.get("choices").and_then(|c| c.get(0)) {
        let delta = choice.get("delta");
        out.content = delta
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string);
        out.finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(calls) = delta.and_then(|d| d.get("tool_calls")).and_then(Value::as_array) {
            for (position, call) in calls.iter().enumerate() {
                let function = call.get("function");
                out.tool_calls.push(ToolCallDelta {
                    index: call
                        .get("index")
                        .and_then(Value::as_u64)
                        .map(|i| i as usize)
                        .unwrap_or(position),
                    id: call.get("id").and_then(Value::as_str).map(str::to_string),
                    name: function
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    arguments: function
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
        }
    }

    let usage = v
        .get("usage")
        .filter(|u| !u.is_null())
        .or_else(|| v.get("x_groq").and_then(|x| x.get("usage")));
    out.usage = usage.map(|u| Usage {
        prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    });

    Some(out)
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds chunk deltas into a `ChatOutcome`.
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    content: String,
    calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Usage,
}

impl StreamAccumulator {
    /// Absorb a delta and return the events to forward.
    pub(crate) fn apply(&mut self, delta: ChunkDelta, generation: u64) -> Vec<LlmEvent> {
        let mut events = Vec::new();

        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            self.content.push_str(&text);
            events.push(LlmEvent::Token { text, generation });
        }

        for fragment in delta.tool_calls {
            let call = self.calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id {
                call.id = id;
            }
            if let Some(name) = fragment.name.filter(|n| !n.is_empty()) {
                if call.name.is_empty() {
                    events.push(LlmEvent::ToolRequested {
                        name: name.clone(),
                        generation,
                    });
                }
                call.name.push_str(&name);
            }
            if let Some(args) = fragment.arguments {
                call.arguments.push_str(&args);
            }
        }

        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
        if let Some(usage) = delta.usage {
            self.usage = usage;
        }
        events
    }

    pub(crate) fn finish(self) -> ChatOutcome {
        let tool_calls = self
            .calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                },
                function: FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect();

        ChatOutcome {
            content: self.content,
            tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
        }
    }
}

/// Turn an SSE error into an `LlmError`, reading the API's error body for
/// non-success statuses.
async fn convert_error(err: reqwest_eventsource::Error) -> LlmError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("error")?
                        .get("message")?
                        .as_str()
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            LlmError::Status {
                status: status.as_u16(),
                message,
            }
        }
        reqwest_eventsource::Error::Transport(e) => LlmError::Transport(e.to_string()),
        other => LlmError::Stream(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
