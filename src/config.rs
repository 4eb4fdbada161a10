use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::rules::{Rule, RuleTable};
use crate::session::{
    SessionSettings, DEFAULT_GREETING, DEFAULT_SUGGESTION_LIMIT, SUGGESTED_QUESTIONS,
};
use crate::telemetry::TelemetryCollector;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

fn default_max_sessions() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogueConfig {
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_suggestions")]
    pub suggestions: Vec<String>,
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
    /// Replaces the built-in rule table when present.
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: default_reply_delay_ms(),
            greeting: default_greeting(),
            suggestions: default_suggestions(),
            suggestion_limit: default_suggestion_limit(),
            rules: None,
        }
    }
}

fn default_reply_delay_ms() -> u64 {
    1500
}

fn default_greeting() -> String {
    DEFAULT_GREETING.into()
}

fn default_suggestions() -> Vec<String> {
    SUGGESTED_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

fn default_suggestion_limit() -> usize {
    DEFAULT_SUGGESTION_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "softsell_chat=info".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| ChatError::Config(format!("Failed to parse configuration: {err}")))
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Defaults with environment overrides, for running without a file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("SOFTSELL_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SOFTSELL_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ChatError::Config(format!("invalid SOFTSELL_PORT `{port}`")))?;
        }
        if let Ok(delay) = env::var("SOFTSELL_REPLY_DELAY_MS") {
            self.dialogue.reply_delay_ms = delay.parse().map_err(|_| {
                ChatError::Config(format!("invalid SOFTSELL_REPLY_DELAY_MS `{delay}`"))
            })?;
        }
        if let Ok(filter) = env::var("SOFTSELL_LOG") {
            self.telemetry.log_filter = filter;
        }
        if let Ok(json) = env::var("SOFTSELL_LOG_JSON") {
            if let Ok(parsed) = json.parse::<bool>() {
                self.telemetry.json = parsed;
            }
        }
        Ok(())
    }

    pub fn rule_table(&self) -> Result<RuleTable> {
        match &self.dialogue.rules {
            Some(rules) => RuleTable::new(rules.clone()),
            None => Ok(RuleTable::default()),
        }
    }

    pub fn session_settings(&self, telemetry: Option<TelemetryCollector>) -> SessionSettings {
        let settings = SessionSettings::default()
            .with_reply_delay(Duration::from_millis(self.dialogue.reply_delay_ms))
            .with_greeting(self.dialogue.greeting.clone())
            .with_suggestions(self.dialogue.suggestions.clone())
            .with_suggestion_limit(self.dialogue.suggestion_limit);
        match telemetry {
            Some(t) => settings.with_telemetry(t),
            None => settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.dialogue.reply_delay_ms, 1500);
        assert_eq!(cfg.dialogue.suggestions.len(), 4);
        assert_eq!(cfg.rule_table().unwrap().len(), 5);
    }

    #[test]
    fn loads_and_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost='0.0.0.0'\nport=9000\n[dialogue]\nreply_delay_ms=250\ngreeting='Welcome!'"
        )
        .unwrap();

        env::set_var("SOFTSELL_PORT", "9100");
        let cfg = AppConfig::from_env_or_file(file.path()).unwrap();
        env::remove_var("SOFTSELL_PORT");

        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "0.0.0.0");

        let settings = cfg.session_settings(None);
        assert_eq!(settings.reply_delay, Duration::from_millis(250));
        assert_eq!(settings.greeting, "Welcome!");
    }

    #[test]
    fn loads_custom_rules() {
        let cfg = AppConfig::from_toml(
            r#"
[[dialogue.rules]]
id = "hours"
response = "We are available around the clock."
when = { op = "any", of = [{ op = "contains", keyword = "Hours" }, { op = "contains", keyword = "open" }] }

[[dialogue.rules]]
id = "fallback"
response = "A specialist will follow up."
when = { op = "always" }
"#,
        )
        .unwrap();

        let table = cfg.rule_table().unwrap();
        assert_eq!(table.select("what are your hours?").id, "hours");
        assert_eq!(table.select("hello").id, "fallback");
    }

    #[test]
    fn rejects_rules_without_fallback() {
        let cfg = AppConfig::from_toml(
            r#"
[[dialogue.rules]]
id = "hours"
response = "Always open."
when = { op = "contains", keyword = "hours" }
"#,
        )
        .unwrap();
        assert!(matches!(cfg.rule_table(), Err(ChatError::InvalidRules(_))));
    }

    #[test]
    fn reports_parse_errors() {
        let err = AppConfig::from_toml("[server]\nport='not a number'").unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
