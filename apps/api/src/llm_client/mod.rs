/// LLM Client: the single point of entry for all completion-service calls.
///
/// ARCHITECTURAL RULE: No other module may call the Gemini API directly.
/// Handlers and the turn relay only see the `CompletionService` trait, which
/// `AppState` carries as `Arc<dyn CompletionService>`.
///
/// Model: gemini-2.5-flash (hardcoded; do not make configurable to prevent drift)
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::turn::{ContentPart, Role};

pub mod sse;

use sse::SseLineBuffer;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// The model used for all completion calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gemini-2.5-flash";
const MAX_RETRIES: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Whole-request timeout for non-streaming calls. Streaming calls are bounded
/// per fragment by the relay instead.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// True for quota and rate-limit failures (HTTP 429, `RESOURCE_EXHAUSTED`,
    /// or a quota message in the error body).
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Api { status, message } => {
                *status == 429
                    || message.contains("RESOURCE_EXHAUSTED")
                    || message.to_ascii_lowercase().contains("quota")
            }
            _ => false,
        }
    }
}

/// One entry of the conversation history sent to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::text(text)],
        }
    }
}

/// Sampling bounds for a single call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub thinking_budget: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
}

/// Incremental text fragments of one streamed completion, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// The completion service as seen by the rest of the app.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Single non-streaming completion; returns the generated text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Streaming completion. Dropping the returned stream aborts the upstream request.
    async fn complete_stream(&self, request: &CompletionRequest)
        -> Result<FragmentStream, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini wire format
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    system_instruction: GeminiSystemInstruction<'a>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    thinking_config: GeminiThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    /// Thought summaries are never relayed.
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

impl GeminiResponse {
    /// Concatenated answer text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
    #[serde(default)]
    status: String,
}

fn build_request(request: &CompletionRequest) -> GeminiRequest<'_> {
    GeminiRequest {
        contents: request
            .messages
            .iter()
            .map(|m| GeminiContent {
                role: m.role.as_str(),
                parts: m.parts.iter().map(to_gemini_part).collect(),
            })
            .collect(),
        system_instruction: GeminiSystemInstruction {
            parts: vec![GeminiPart::Text {
                text: &request.system,
            }],
        },
        generation_config: GeminiGenerationConfig {
            temperature: request.params.temperature,
            max_output_tokens: request.params.max_output_tokens,
            thinking_config: GeminiThinkingConfig {
                thinking_budget: request.params.thinking_budget,
            },
        },
    }
}

fn to_gemini_part(part: &ContentPart) -> GeminiPart<'_> {
    match part {
        ContentPart::Text { text } => GeminiPart::Text { text },
        ContentPart::InlineData { mime_type, data } => GeminiPart::InlineData {
            inline_data: GeminiBlob { mime_type, data },
        },
    }
}

/// Extracts `STATUS: message` from a Gemini error body, falling back to the raw body.
fn error_message(body: String) -> String {
    match serde_json::from_str::<GeminiError>(&body) {
        Ok(e) if e.error.status.is_empty() => e.error.message,
        Ok(e) => format!("{}: {}", e.error.status, e.error.message),
        Err(_) => body,
    }
}

/// Parses one SSE payload into its text fragment; empty fragments are skipped.
fn parse_fragment(payload: &str) -> Option<Result<String, LlmError>> {
    match serde_json::from_str::<GeminiResponse>(payload) {
        Ok(chunk) => {
            let text = chunk.text();
            (!text.is_empty()).then_some(Ok(text))
        }
        Err(e) => Some(Err(LlmError::Parse(e))),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The single Gemini client, built once at startup and shared through `AppState`.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?,
            api_key,
        })
    }

    fn url(method: &str) -> String {
        format!("{GEMINI_API_BASE}/{MODEL}:{method}")
    }

    /// POSTs `body`, retrying on 429 / 5xx / connection errors with
    /// exponential backoff. Only the initial request is retried; once a
    /// successful response is returned its body belongs to the caller.
    async fn send_with_retry(
        &self,
        url: &str,
        body: &GeminiRequest<'_>,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Response, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let mut builder = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .query(query)
                .json(body);
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }

            let response = match builder.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: error_message(body),
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: error_message(body),
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = build_request(request);
        let response = self
            .send_with_retry(
                &Self::url("generateContent"),
                &body,
                &[],
                Some(REQUEST_TIMEOUT),
            )
            .await?;

        let parsed: GeminiResponse = response.json().await?;
        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "LLM call succeeded: input_tokens={:?}, output_tokens={:?}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text)
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<FragmentStream, LlmError> {
        let body = build_request(request);
        let response = self
            .send_with_retry(
                &Self::url("streamGenerateContent"),
                &body,
                &[("alt", "sse")],
                None,
            )
            .await?;

        debug!("LLM stream opened");
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for payload in lines.feed(&chunk) {
                            if let Some(item) = parse_fragment(&payload) {
                                yield item;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(LlmError::Http(e));
                        return;
                    }
                }
            }
            if let Some(item) = lines.flush().as_deref().and_then(parse_fragment) {
                yield item;
            }
        };

        Ok(Box::pin(stream))
    }
}
