//! Full config file parsing and precedence.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use absolute_learner::config::LearnerConfig;

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture_logs(f: impl FnOnce()) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    captured.text()
}

const FULL_TOML: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[store]
database_url = "sqlite:///var/lib/learner/profiles.db"

[completion]
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
timeout_secs = 20
max_retries = 4

[delivery]
account_sid = "AC_from_file"
sender = "+14155238886"

[logging]
logs_dir = "/var/log/learner"
"#;

#[test]
fn full_file_is_parsed() {
    let config = LearnerConfig::from_toml(FULL_TOML).expect("valid toml");
    assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    assert_eq!(config.store.database_url, "sqlite:///var/lib/learner/profiles.db");
    assert_eq!(config.completion.model, "gpt-4o-mini");
    assert_eq!(config.completion.timeout_secs, 20);
    assert_eq!(config.completion.max_retries, 4);
    assert_eq!(config.delivery.account_sid.as_deref(), Some("AC_from_file"));
    assert_eq!(config.delivery.timeout_secs, 15);
    assert_eq!(config.logging.logs_dir.as_deref(), Some("/var/log/learner"));
}

#[test]
fn env_wins_over_file() {
    let mut config = LearnerConfig::from_toml(FULL_TOML).expect("valid toml");
    let env: HashMap<&str, &str> = HashMap::from([
        ("PORT", "9000"),
        ("GROQ_MODEL", "llama3-8b-8192"),
        ("TWILIO_ACCOUNT_SID", "AC_from_env"),
        ("TWILIO_AUTH_TOKEN", "token"),
        ("GROQ_API_KEY", "gsk_key"),
    ]);
    config.apply_overrides(|key| env.get(key).map(|v| (*v).to_owned()));

    assert_eq!(config.bind_addr(), "127.0.0.1:9000");
    assert_eq!(config.completion.model, "llama3-8b-8192");
    assert_eq!(config.completion.base_url, "https://api.openai.com/v1");
    assert_eq!(config.delivery.account_sid.as_deref(), Some("AC_from_env"));
    assert!(config.validate().is_ok());
}

#[test]
fn missing_secrets_fail_validation() {
    let config = LearnerConfig::from_toml(FULL_TOML).expect("valid toml");
    let err = config.validate().expect_err("secrets missing").to_string();
    assert!(err.contains("GROQ_API_KEY"));
    assert!(err.contains("TWILIO_AUTH_TOKEN"));
    assert!(!err.contains("TWILIO_ACCOUNT_SID"));
}

#[test]
fn invalid_override_is_reported_once_logging_is_up() {
    let mut config = LearnerConfig::default();
    config.apply_overrides(|key| match key {
        "PORT" => Some("abc".to_owned()),
        "LEARNER_MAX_RETRIES" => Some("-1".to_owned()),
        _ => None,
    });
    assert_eq!(config.bind_addr(), "0.0.0.0:3000");

    let logs = capture_logs(|| config.report());
    assert!(logs.contains("ignoring invalid env override"));
    assert!(logs.contains("var=\"PORT\"") || logs.contains("var=PORT"));
    assert!(logs.contains("LEARNER_MAX_RETRIES"));
    assert!(logs.contains("WARN"));
}

#[test]
fn config_source_is_reported() {
    let mut config = LearnerConfig::from_toml(FULL_TOML).expect("valid toml");
    config.source = Some("/etc/learner/config.toml".into());

    let logs = capture_logs(|| config.report());
    assert!(logs.contains("loaded config from file"));
    assert!(logs.contains("/etc/learner/config.toml"));
    assert!(!logs.contains("ignoring invalid env override"));
}
