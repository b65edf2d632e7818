//! WhatsApp channel: inbound webhook payloads and outbound delivery via Twilio.
//!
//! Twilio addresses WhatsApp users as `whatsapp:+<number>`. Everything inside
//! the crate works with the bare `+<number>`; the prefix is stripped on the way
//! in ([`webhook`]) and added back on the way out ([`client`]).

pub mod client;
pub mod webhook;

use std::borrow::Cow;

use async_trait::async_trait;

pub use self::client::TwilioClient;
pub use self::webhook::{InboundMessage, WebhookError, WebhookPayload};

/// Channel tag Twilio puts in front of WhatsApp addresses.
pub const CHANNEL_PREFIX: &str = "whatsapp:";

/// Longest WhatsApp message body the Messages API accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1600;

/// Marker appended to a truncated body.
const TRUNCATION_MARKER: char = '…';

/// Errors from the WhatsApp adapter.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    /// HTTP request to the delivery API failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The delivery API refused the message.
    #[error("delivery rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },

    /// The delivery API did not answer in time.
    #[error("delivery timed out")]
    Timeout,
}

/// Outbound delivery of reply text to a learner.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send `text` to the bare phone number `phone`.
    ///
    /// # Errors
    ///
    /// Returns [`WhatsAppError`] when the delivery API cannot be reached or
    /// rejects the message.
    async fn send_text(&self, phone: &str, text: &str) -> Result<(), WhatsAppError>;
}

/// Strip the `whatsapp:` channel tag, if present, and surrounding whitespace.
pub fn strip_channel_prefix(address: &str) -> &str {
    let trimmed = address.trim();
    trimmed.strip_prefix(CHANNEL_PREFIX).unwrap_or(trimmed).trim()
}

/// Add the `whatsapp:` channel tag unless it is already there.
pub fn channel_address(phone: &str) -> String {
    if phone.starts_with(CHANNEL_PREFIX) {
        phone.to_owned()
    } else {
        format!("{CHANNEL_PREFIX}{phone}")
    }
}

/// Cut `text` down to [`MAX_MESSAGE_CHARS`], ending with `…` when shortened.
pub fn fit_message_body(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return Cow::Borrowed(text);
    }
    let mut fitted: String = text
        .chars()
        .take(MAX_MESSAGE_CHARS.saturating_sub(1))
        .collect();
    fitted.push(TRUNCATION_MARKER);
    Cow::Owned(fitted)
}

/// Phone number safe for logs: everything but the last four characters masked.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let keep = chars.len().min(4);
    let hidden = chars.len().saturating_sub(keep);
    let tail: String = chars.iter().skip(hidden).collect();
    format!("{}{tail}", "*".repeat(hidden))
}
