//! Configuration loading and validation.
//!
//! Loads from `./config.toml` (or `$LEARNER_CONFIG_PATH`), then applies
//! environment overrides. A missing file means defaults.
//!
//! Precedence: env vars > config file > defaults.
//!
//! Loading happens before logging is set up, so nothing here logs directly.
//! Where the config came from and which overrides were rejected are kept on
//! the struct and reported by [`LearnerConfig::report`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::providers::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::whatsapp::client::DEFAULT_API_BASE;

// ── Top-level config ────────────────────────────────────────────

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Profile store settings.
    pub store: StoreConfig,
    /// Completion API settings.
    pub completion: CompletionConfig,
    /// Delivery API settings.
    pub delivery: DeliveryConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// File the config was read from; `None` when defaults were used.
    #[serde(skip)]
    pub source: Option<PathBuf>,
    /// Environment overrides that failed to parse and were ignored.
    #[serde(skip)]
    pub rejected_overrides: Vec<RejectedOverride>,
}

/// An environment override whose value could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Variable name.
    pub key: &'static str,
    /// Raw value as found in the environment.
    pub value: String,
}

impl LearnerConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = Self::config_path_with(env);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    fn load_from_file(path: &std::path::Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let mut config = Self::from_toml(&contents)?;
                config.source = Some(path.to_path_buf());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config file path using a custom env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("LEARNER_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability. Numeric values that fail
    /// to parse leave the current value in place and are recorded in
    /// [`Self::rejected_overrides`].
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Server.
        if let Some(v) = env("LEARNER_BIND_HOST") {
            self.server.host = v;
        }
        parse_override(
            &env,
            "PORT",
            &mut self.server.port,
            &mut self.rejected_overrides,
        );
        parse_override(
            &env,
            "LEARNER_SHUTDOWN_TIMEOUT_SECS",
            &mut self.server.shutdown_timeout_secs,
            &mut self.rejected_overrides,
        );

        // Store.
        if let Some(v) = env("DATABASE_URL") {
            self.store.database_url = v;
        }

        // Completion API.
        if let Some(v) = env("GROQ_API_KEY") {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = env("GROQ_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = env("GROQ_BASE_URL") {
            self.completion.base_url = v;
        }
        parse_override(
            &env,
            "LEARNER_COMPLETION_TIMEOUT_SECS",
            &mut self.completion.timeout_secs,
            &mut self.rejected_overrides,
        );
        parse_override(
            &env,
            "LEARNER_MAX_RETRIES",
            &mut self.completion.max_retries,
            &mut self.rejected_overrides,
        );

        // Delivery API.
        if let Some(v) = env("TWILIO_ACCOUNT_SID") {
            self.delivery.account_sid = Some(v);
        }
        if let Some(v) = env("TWILIO_AUTH_TOKEN") {
            self.delivery.auth_token = Some(v);
        }
        if let Some(v) = env("TWILIO_WHATSAPP_NUMBER") {
            self.delivery.sender = Some(v);
        }
        parse_override(
            &env,
            "LEARNER_DELIVERY_TIMEOUT_SECS",
            &mut self.delivery.timeout_secs,
            &mut self.rejected_overrides,
        );

        // Logging.
        if let Some(v) = env("LEARNER_LOGS_DIR") {
            self.logging.logs_dir = Some(v);
        }
    }

    /// Check that every secret needed to serve traffic is present.
    ///
    /// # Errors
    ///
    /// Returns an error naming every missing setting.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if is_blank(self.completion.api_key.as_deref()) {
            missing.push("GROQ_API_KEY");
        }
        if is_blank(self.delivery.account_sid.as_deref()) {
            missing.push("TWILIO_ACCOUNT_SID");
        }
        if is_blank(self.delivery.auth_token.as_deref()) {
            missing.push("TWILIO_AUTH_TOKEN");
        }
        if is_blank(self.delivery.sender.as_deref()) {
            missing.push("TWILIO_WHATSAPP_NUMBER");
        }
        if !missing.is_empty() {
            anyhow::bail!("missing required settings: {}", missing.join(", "));
        }
        Ok(())
    }

    /// Log where the config came from and every rejected override.
    ///
    /// Call once a subscriber is installed.
    pub fn report(&self) {
        match &self.source {
            Some(path) => tracing::info!(path = %path.display(), "loaded config from file"),
            None => tracing::debug!("no config file found, using defaults"),
        }
        for rejected in &self.rejected_overrides {
            tracing::warn!(
                var = rejected.key,
                value = %rejected.value,
                "ignoring invalid env override"
            );
        }
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn parse_override<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut T,
    rejected: &mut Vec<RejectedOverride>,
) {
    if let Some(value) = env(key) {
        match value.trim().parse() {
            Ok(n) => *target = n,
            Err(_) => rejected.push(RejectedOverride { key, value }),
        }
    }
}

// ── Server config ───────────────────────────────────────────────

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Seconds to wait for in-flight messages after a shutdown signal.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout_secs: 10,
        }
    }
}

// ── Store config ────────────────────────────────────────────────

/// Profile store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite connection URL.
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://absolute-learner.db".to_string(),
        }
    }
}

// ── Completion config ───────────────────────────────────────────

/// Completion API settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// API key.
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "__REDACTED__"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

// ── Delivery config ─────────────────────────────────────────────

/// Delivery (Twilio) API settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// API base URL.
    pub api_base: String,
    /// Account SID; also the basic-auth user.
    pub account_sid: Option<String>,
    /// Auth token; the basic-auth password.
    pub auth_token: Option<String>,
    /// WhatsApp-enabled sender number.
    pub sender: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("api_base", &self.api_base)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "__REDACTED__"))
            .field("sender", &self.sender)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            account_sid: None,
            auth_token: None,
            sender: None,
            timeout_secs: 15,
        }
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rotated JSON logs. Console only when unset.
    pub logs_dir: Option<String>,
}

// ── Tests ───────────────────────────────────────────────────────
