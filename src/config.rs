//! Process configuration
//!
//! Loaded once at startup (after `dotenv`) and shared by `Arc`.
//! Nothing below the binaries reads the environment.

use std::env;
use std::time::Duration;

use crate::error::OrchestrationError;
use crate::Result;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Settings {
    pub model_provider: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub gemini_base_url: String,
    pub model_max_retries: u32,
    pub database_url: Option<String>,
    pub storage_path: String,
    pub report_base_url: Option<String>,
    pub search_provider: String,
    pub search_api_key: Option<String>,
    pub app_env: String,
    pub log_level: String,
    pub port: u16,
    pub max_turns: usize,
    pub turn_timeout: Duration,
    pub group_chat_enabled: bool,
    pub risk_agents_enabled: bool,
    /// Chat sessions idle longer than this are dropped.
    pub session_idle_timeout: Duration,
    /// Events kept by the in-memory event log before the oldest are dropped.
    pub event_log_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_provider: "google".to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model_max_retries: 2,
            database_url: None,
            storage_path: "./uploads".to_string(),
            report_base_url: None,
            search_provider: "serper".to_string(),
            search_api_key: None,
            app_env: "development".to_string(),
            log_level: "info".to_string(),
            port: 8000,
            max_turns: 12,
            turn_timeout: Duration::from_secs(120),
            group_chat_enabled: true,
            risk_agents_enabled: true,
            session_idle_timeout: Duration::from_secs(3600),
            event_log_capacity: 10_000,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings from any key lookup (the environment in production,
    /// a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        Ok(Self {
            model_provider: get("AI_MODEL_PROVIDER").unwrap_or(defaults.model_provider),
            model_name: get("AI_MODEL_NAME").unwrap_or(defaults.model_name),
            api_key: get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            gemini_base_url: get("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            model_max_retries: parse_or("MODEL_MAX_RETRIES", get("MODEL_MAX_RETRIES"), defaults.model_max_retries)?,
            database_url: get("DB_CONNECTION_STRING").or_else(|| get("DATABASE_URL")),
            storage_path: get("STORAGE_PATH").unwrap_or(defaults.storage_path),
            report_base_url: get("REPORT_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            search_provider: get("SEARCH_PROVIDER").unwrap_or(defaults.search_provider),
            search_api_key: get("SEARCH_API_KEY"),
            app_env: get("APP_ENV").unwrap_or(defaults.app_env),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            max_turns: parse_or("MAX_TURNS", get("MAX_TURNS"), defaults.max_turns)?,
            turn_timeout: Duration::from_secs(parse_or(
                "TURN_TIMEOUT_SECS",
                get("TURN_TIMEOUT_SECS"),
                defaults.turn_timeout.as_secs(),
            )?),
            group_chat_enabled: parse_bool("GROUP_CHAT_ENABLED", get("GROUP_CHAT_ENABLED"), true)?,
            risk_agents_enabled: parse_bool("RISK_AGENTS_ENABLED", get("RISK_AGENTS_ENABLED"), true)?,
            session_idle_timeout: Duration::from_secs(parse_or(
                "SESSION_IDLE_TIMEOUT_SECS",
                get("SESSION_IDLE_TIMEOUT_SECS"),
                defaults.session_idle_timeout.as_secs(),
            )?),
            event_log_capacity: parse_or(
                "EVENT_LOG_CAPACITY",
                get("EVENT_LOG_CAPACITY"),
                defaults.event_log_capacity,
            )?,
        })
    }

    /// Postgres URLs select the database event sink; anything else keeps
    /// events in memory.
    pub fn postgres_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .filter(|url| url.starts_with("postgres://") || url.starts_with("postgresql://"))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| {
            OrchestrationError::Config(format!("{} has invalid value '{}'", key, value))
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool> {
    match raw.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(OrchestrationError::Config(format!(
            "{} has invalid boolean '{}'",
            key, v
        ))),
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.model_name, DEFAULT_MODEL);
        assert_eq!(settings.max_turns, 12);
        assert_eq!(settings.port, 8000);
        assert!(settings.api_key.is_none());
        assert!(settings.group_chat_enabled);
        assert_eq!(settings.session_idle_timeout, Duration::from_secs(3600));
        assert_eq!(settings.event_log_capacity, 10_000);
    }

    #[test]
    fn test_overrides_and_key_fallback() {
        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("MAX_TURNS", "4"),
            ("TURN_TIMEOUT_SECS", "9"),
            ("GROUP_CHAT_ENABLED", "false"),
            ("REPORT_BASE_URL", "https://files.example.com/"),
            ("SESSION_IDLE_TIMEOUT_SECS", "60"),
            ("EVENT_LOG_CAPACITY", "50"),
        ]))
        .unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("k"));
        assert_eq!(settings.max_turns, 4);
        assert_eq!(settings.turn_timeout, Duration::from_secs(9));
        assert!(!settings.group_chat_enabled);
        assert_eq!(settings.session_idle_timeout, Duration::from_secs(60));
        assert_eq!(settings.event_log_capacity, 50);
        assert_eq!(
            settings.report_base_url.as_deref(),
            Some("https://files.example.com")
        );
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = Settings::from_lookup(lookup(&[("MAX_TURNS", "many")])).unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }

    #[test]
    fn test_postgres_url_detection() {
        let sqlite = Settings::from_lookup(lookup(&[("DB_CONNECTION_STRING", "sqlite:///local.db")]))
            .unwrap();
        assert!(sqlite.postgres_url().is_none());

        let pg = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://u@h/db")])).unwrap();
        assert_eq!(pg.postgres_url(), Some("postgres://u@h/db"));
    }
}
