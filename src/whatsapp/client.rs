//! Twilio Messages API client for outbound WhatsApp replies.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{channel_address, mask_phone, ReplySender, WhatsAppError};
use crate::providers::sanitize_http_error_body;

/// Production API base.
pub const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Client for `POST /Accounts/{sid}/Messages.json`.
#[derive(Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    sender: String,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("api_base", &self.api_base)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"__REDACTED__")
            .field("sender", &self.sender)
            .finish()
    }
}

impl TwilioClient {
    /// Create a client.
    ///
    /// `sender` is the WhatsApp-enabled number replies come from; the
    /// `whatsapp:` tag is added if missing. `timeout` bounds each request.
    pub fn new(
        api_base: impl Into<String>,
        account_sid: String,
        auth_token: String,
        sender: &str,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            account_sid,
            auth_token,
            sender: channel_address(sender),
        }
    }

    /// Full URL of the messages endpoint for this account.
    pub fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }

    /// Sender address including the channel tag.
    pub fn sender(&self) -> &str {
        &self.sender
    }
}

#[async_trait]
impl ReplySender for TwilioClient {
    async fn send_text(&self, phone: &str, text: &str) -> Result<(), WhatsAppError> {
        let to = channel_address(phone);
        let form = [
            ("From", self.sender.as_str()),
            ("To", to.as_str()),
            ("Body", text),
        ];
        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form[..])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WhatsAppError::Timeout
                } else {
                    WhatsAppError::Http(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            let body = sanitize_http_error_body(&body_text);
            warn!(%status, phone = %mask_phone(phone), "WhatsApp send failed: {body}");
            return Err(WhatsAppError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(phone = %mask_phone(phone), "message sent via WhatsApp");
        Ok(())
    }
}
