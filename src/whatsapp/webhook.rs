//! Inbound webhook payloads.
//!
//! Twilio posts url-encoded forms with capitalised field names. The same shape
//! is accepted as JSON. Unknown fields (`MessageSid`, `NumMedia`, ...) are
//! ignored.

use serde::Deserialize;

use super::strip_channel_prefix;

/// Raw webhook body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    /// Message text.
    #[serde(rename = "Body")]
    pub body: Option<String>,
    /// Sender address, e.g. `whatsapp:+15551234567`.
    #[serde(rename = "From")]
    pub from: Option<String>,
    /// Sender's WhatsApp display name, when the channel shares it.
    #[serde(rename = "ProfileName")]
    pub profile_name: Option<String>,
}

/// Inbound payload was missing a required field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    /// `From` absent or blank.
    #[error("missing sender (From)")]
    MissingSender,
    /// `Body` absent. An empty `Body` (media-only message) is valid.
    #[error("missing message text (Body)")]
    MissingBody,
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Bare phone number with the channel tag removed.
    pub phone: String,
    /// Message text, trimmed.
    pub text: String,
    /// Sender display name, if provided.
    pub name: Option<String>,
}

impl InboundMessage {
    /// Build a message directly, trimming text and stripping the channel tag.
    pub fn new(from: &str, text: &str) -> Self {
        Self {
            phone: strip_channel_prefix(from).to_owned(),
            text: text.trim().to_owned(),
            name: None,
        }
    }
}

impl TryFrom<WebhookPayload> for InboundMessage {
    type Error = WebhookError;

    fn try_from(payload: WebhookPayload) -> Result<Self, Self::Error> {
        let phone = payload
            .from
            .as_deref()
            .map(strip_channel_prefix)
            .filter(|p| !p.is_empty())
            .ok_or(WebhookError::MissingSender)?
            .to_owned();
        let text = payload
            .body
            .as_deref()
            .map(str::trim)
            .ok_or(WebhookError::MissingBody)?
            .to_owned();
        let name = payload
            .profile_name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty());
        Ok(Self { phone, text, name })
    }
}
