//! Free-form mentoring replies from the completion API.
//!
//! Each call is stateless: a fixed persona prompt, an optional one-line hint
//! naming the learner's active topic, and the raw user text. Calls are bounded
//! by a per-attempt timeout and retried with jittered exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::providers::{CompletionRequest, LlmProvider, Message, ProviderError};

/// Persona and mentoring directive sent as the system message.
pub const SYSTEM_PROMPT: &str = "You are AbsoluteLearner AI – a daily mentor helping users learn one skill deeply each day.
You must suggest a topic, break it into 3 time slots, and help the user track progress.
Be supportive, structured, and focused on helping them master new domains every 24 hrs.";

/// Upper bound on generated tokens, about 1,200 characters of English.
pub const MAX_REPLY_TOKENS: u32 = 300;

/// Hint line naming the learner's active topic.
pub fn topic_hint(topic: &str) -> String {
    format!("User is currently learning {topic}")
}

/// Errors from the conversation delegate.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// The completion API failed on every attempt.
    #[error("completion failed after {attempts} attempt(s): {source}")]
    External {
        /// Attempts made, including the first.
        attempts: u32,
        /// The last failure.
        #[source]
        source: ProviderError,
    },
}

/// Timeout and retry settings for completion calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Ceiling for the un-jittered delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1_u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// [`Self::backoff`] plus up to 50% random jitter.
    fn jittered_backoff(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        let half_ms = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = rand::thread_rng().gen_range(0..=half_ms);
        delay.saturating_add(Duration::from_millis(jitter))
    }
}

/// Builds prompts and asks the completion API for a reply.
#[derive(Clone)]
pub struct ConversationDelegate {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ConversationDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationDelegate")
            .field("model", &self.provider.model_id())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ConversationDelegate {
    /// Create a delegate over `provider`.
    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Ordered prompt: system block, optional topic hint, user message.
    pub fn build_messages(user_message: &str, context_hint: Option<&str>) -> Vec<Message> {
        let mut messages = vec![Message::system(SYSTEM_PROMPT)];
        if let Some(hint) = context_hint.filter(|h| !h.trim().is_empty()) {
            messages.push(Message::user(hint));
        }
        messages.push(Message::user(user_message));
        messages
    }

    /// Ask for a reply to `user_message`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::External`] when every attempt fails or a
    /// non-retryable failure occurs.
    pub async fn converse(
        &self,
        user_message: &str,
        context_hint: Option<&str>,
    ) -> Result<String, ConversationError> {
        let request = CompletionRequest {
            messages: Self::build_messages(user_message, context_hint),
            max_tokens: Some(MAX_REPLY_TOKENS),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let outcome =
                match tokio::time::timeout(self.policy.timeout, self.provider.complete(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.policy.timeout)),
                };

            match outcome {
                Ok(response) => {
                    debug!(attempt, model = %response.model, "conversation reply ready");
                    return Ok(response.text);
                }
                Err(e) if e.is_retryable() && attempt <= self.policy.max_retries => {
                    let delay = self.policy.jittered_backoff(attempt.saturating_sub(1));
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(ConversationError::External {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}
