use std::collections::BTreeMap;
use std::pin::pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl LlmError {
    /// Errors that retrying cannot fix without reconfiguration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LlmError::Api { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Parse(err.to_string())
    }
}

/// Function exposed to the model for a streamed tool-calling request.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub system: String,
    pub user: String,
    pub tool: ToolSpec,
    pub temperature: f32,
}

/// A finished tool invocation: function name plus its raw JSON arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single non-streamed call whose reply must be a JSON object.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, LlmError>;

    /// Streamed call; returns every tool invocation once the stream has ended.
    async fn stream_tool_calls(&self, request: &ToolRequest) -> Result<Vec<ToolCall>, LlmError>;
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| LlmError::Parse(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, LlmError> {
        debug!(model = %self.model, "LLM json request");
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let reply: Value = self.post(&body).await?.json().await?;
        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Parse("No content in response".to_string()))?;
        Ok(serde_json::from_str(content)?)
    }

    async fn stream_tool_calls(&self, request: &ToolRequest) -> Result<Vec<ToolCall>, LlmError> {
        debug!(model = %self.model, temperature = request.temperature, "LLM tool stream request");
        let body = json!({
            "model": self.model,
            "temperature": request.temperature,
            "stream": true,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": request.tool.name,
                    "description": request.tool.description,
                    "parameters": request.tool.parameters,
                },
            }],
            "tool_choice": "required",
            "parallel_tool_calls": true,
        });

        let response = self.post(&body).await?;
        collect_tool_calls(response.bytes_stream()).await
    }
}

/// Drains an SSE body into tool calls. A transport failure after at least one
/// call has started keeps what arrived; with nothing received it is an error.
async fn collect_tool_calls<S, B, E>(chunks: S) -> Result<Vec<ToolCall>, LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LlmError>,
{
    let mut chunks = pin!(chunks);
    let mut lines = LineBuffer::default();
    let mut calls = ToolCallAccumulator::default();

    'stream: while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) if calls.is_empty() => return Err(e.into()),
            Err(e) => {
                let e: LlmError = e.into();
                warn!(error = %e, received = calls.len(), "Tool call stream cut short");
                return Ok(calls.finish());
            }
        };
        for line in lines.push(chunk.as_ref()) {
            match parse_sse_line(&line) {
                SseLine::Done => break 'stream,
                SseLine::Data(data) => calls.absorb(&data),
                SseLine::Skip => {}
            }
        }
    }
    if let Some(rest) = lines.finish() {
        if let SseLine::Data(data) = parse_sse_line(&rest) {
            calls.absorb(&data);
        }
    }

    Ok(calls.finish())
}

#[derive(Debug, PartialEq)]
pub enum SseLine {
    Data(Value),
    Done,
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str(payload) {
        Ok(value) => SseLine::Data(value),
        Err(_) => SseLine::Skip,
    }
}

/// Splits a byte stream into complete lines; network chunks may cut a line
/// (or a UTF-8 sequence) anywhere.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// Collects streamed tool-call fragments keyed by call index. Arguments are
/// only meaningful once the stream has ended.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u64, ToolCall>,
}

impl ToolCallAccumulator {
    pub fn absorb(&mut self, chunk: &Value) {
        let Some(choices) = chunk["choices"].as_array() else {
            return;
        };
        for choice in choices {
            let Some(deltas) = choice["delta"]["tool_calls"].as_array() else {
                continue;
            };
            for delta in deltas {
                let index = delta["index"].as_u64().unwrap_or(0);
                let call = self.calls.entry(index).or_insert_with(|| ToolCall {
                    name: String::new(),
                    arguments: String::new(),
                });
                if let Some(name) = delta["function"]["name"].as_str() {
                    call.name.push_str(name);
                }
                if let Some(fragment) = delta["function"]["arguments"].as_str() {
                    call.arguments.push_str(fragment);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn finish(self) -> Vec<ToolCall> {
        self.calls.into_values().collect()
    }
}
