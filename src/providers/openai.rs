//! OpenAI-compatible provider using the `/chat/completions` API.
//!
//! Groq exposes the same wire format under `https://api.groq.com/openai/v1`,
//! so one implementation covers both.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    check_http_response, CompletionRequest, CompletionResponse, LlmProvider, ProviderError,
    UsageStats,
};

/// Default API base (Groq's OpenAI-compatible endpoint).
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default model served through the completion API.
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Chat completions API request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<OpenAiMessage>,
    /// Maximum completion tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A message in chat format.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiMessage {
    /// Role (`system`, `user`, `assistant`).
    pub role: String,
    /// Text content.
    pub content: String,
}

/// Chat completions API response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiResponse {
    /// Response choices.
    pub choices: Vec<OpenAiChoice>,
    /// Model that served the response.
    #[serde(default)]
    pub model: String,
    /// Token usage.
    pub usage: Option<OpenAiUsage>,
}

/// A response choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiChoice {
    /// Assistant message for this choice.
    pub message: OpenAiResponseMessage,
}

/// Assistant message.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiResponseMessage {
    /// Optional text content.
    pub content: Option<String>,
}

/// Usage statistics.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    /// Prompt token count.
    pub prompt_tokens: Option<u32>,
    /// Completion token count.
    pub completion_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Chat completions provider for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"__REDACTED__")
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a provider for `model` at `base_url` (without the
    /// `/chat/completions` suffix).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: String) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Full URL of the completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build a wire request from a completion request.
#[doc(hidden)]
pub fn build_request(model: &str, request: &CompletionRequest) -> OpenAiRequest {
    OpenAiRequest {
        model: model.to_owned(),
        messages: request
            .messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_owned(),
                content: m.content.clone(),
            })
            .collect(),
        max_tokens: request.max_tokens,
    }
}

/// Parse a wire response into a completion response.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body cannot be deserialized, has no
/// choices, or the first choice carries no text.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let resp: OpenAiResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("missing choices[0]".to_owned()))?;

    let text = choice
        .message
        .content
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ProviderError::Parse("choices[0] has no content".to_owned()))?;

    let usage = resp
        .usage
        .map(|u| UsageStats {
            input_tokens: u.prompt_tokens.unwrap_or(0),
            output_tokens: u.completion_tokens.unwrap_or(0),
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        text,
        usage,
        model: resp.model,
    })
}

// ---------------------------------------------------------------------------
// Trait impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let api_request = build_request(&self.model, &request);

        let response = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&api_request)
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        let parsed = parse_response(&payload)?;
        debug!(
            model = %parsed.model,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "completion received"
        );
        Ok(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
