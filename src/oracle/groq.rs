use super::{FragmentStream, Message, Oracle, OracleReply, ToolCall};
use crate::error::OracleError;
use anyhow::Context;
use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{env, fmt, time::Duration};

pub const DEFAULT_MODEL: &str = "llama3-70b-8192";
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Bound on each oracle call and on each wait for a streamed fragment.
    pub timeout: Duration,
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OracleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// `GROQ_API_KEY`, when set to something non-blank.
    pub fn api_key_from_env() -> Option<String> {
        env::var("GROQ_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    /// Defaults overridden by `GROQ_MODEL`, `GROQ_BASE_URL` and `ORACLE_TIMEOUT_SECS`.
    pub fn from_env(api_key: impl Into<String>) -> Self {
        let mut config = Self::new(api_key);
        if let Ok(model) = env::var("GROQ_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(base_url) = env::var("GROQ_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim().to_string();
            }
        }
        if let Ok(raw) = env::var("ORACLE_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %raw,
                    default = ?DEFAULT_TIMEOUT,
                    "invalid ORACLE_TIMEOUT_SECS, using default"
                ),
            }
        }
        config
    }
}

/// Chat completion client for Groq's OpenAI-compatible API.
pub struct GroqClient {
    client: Client,
    config: OracleConfig,
}

impl GroqClient {
    pub fn new(config: OracleConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn post(&self, body: &Value) -> Result<Response, OracleError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, OracleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(OracleError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(60);
            Err(OracleError::RateLimited { retry_after_secs })
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(OracleError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl ChatCompletion {
    fn into_reply(self) -> Result<OracleReply, OracleError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::InvalidResponse("response has no choices".into()))?;
        Ok(OracleReply {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder for `text/event-stream` completion bodies.
///
/// Bytes are buffered until a full line is available, so a multi-byte
/// character split across network chunks is decoded intact. Everything after
/// `data: [DONE]` is ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, OracleError>> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                self.buffer.clear();
                break;
            }
            match serde_json::from_str::<ChatCompletionChunk>(data) {
                Ok(chunk) => {
                    let text = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .filter(|text| !text.is_empty());
                    if let Some(text) = text {
                        fragments.push(Ok(text));
                    }
                }
                Err(e) => fragments.push(Err(OracleError::InvalidResponse(e.to_string()))),
            }
        }
        fragments
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[async_trait]
impl Oracle for GroqClient {
    async fn complete(&self, messages: &[Message], tools: &[Value]) -> Result<OracleReply, OracleError> {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        tracing::debug!(model = %self.config.model, messages = messages.len(), "chat completion request");
        let completion: ChatCompletion = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        completion.into_reply()
    }

    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, OracleError> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
        });

        tracing::debug!(model = %self.config.model, messages = messages.len(), "streaming completion request");
        let response = self.post(&body).await?;

        let fragments = response
            .bytes_stream()
            .scan(SseDecoder::default(), |decoder, chunk| {
                let items = match chunk {
                    Ok(bytes) => decoder.push(&bytes),
                    Err(e) => vec![Err(OracleError::Transport(e.to_string()))],
                };
                future::ready(Some(stream::iter(items)))
            })
            .flatten()
            .boxed();
        Ok(fragments)
    }
}
