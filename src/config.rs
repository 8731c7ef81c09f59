//! Process configuration
//!
//! Read once from the environment in `main` and handed to each component at
//! construction time. Nothing below `main` touches `std::env`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Credentials and endpoint for the remote assistant engine
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    /// Fixed assistant configuration every run is bound to
    pub assistant_id: String,
    pub base_url: String,
}

/// Bounds for the run polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two status fetches
    pub interval: Duration,
    /// Maximum number of status fetches for one run
    pub max_polls: u32,
    /// Wall-clock budget for one orchestration, including reply fetch
    pub max_duration: Duration,
    /// Retries for idempotent reads that fail with a retryable error
    pub fetch_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_polls: 600,
            max_duration: Duration::from_secs(120),
            fetch_retries: 3,
        }
    }
}

impl PollPolicy {
    /// Zero bounds would spin the poll loop or time out every turn at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |name| {
            Err(ConfigError::Invalid {
                name,
                value: "0".to_string(),
            })
        };
        if self.interval.is_zero() {
            return zero("PDI_POLL_INTERVAL_MS");
        }
        if self.max_polls == 0 {
            return zero("PDI_MAX_POLLS");
        }
        if self.max_duration.is_zero() {
            return zero("PDI_MAX_RUN_SECS");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub assistant: AssistantConfig,
    pub poll: PollPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("PDI_DB_PATH").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(format!("{home}/.pdi-chat/pdi.db"))
            },
            PathBuf::from,
        );

        let port = parse_var("PDI_PORT")?.unwrap_or(DEFAULT_PORT);

        let assistant = AssistantConfig {
            api_key: required_var("OPENAI_API_KEY")?,
            assistant_id: required_var("OPENAI_ASSISTANT_ID")?,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };

        let defaults = PollPolicy::default();
        let poll = PollPolicy {
            interval: parse_var("PDI_POLL_INTERVAL_MS")?
                .map_or(defaults.interval, Duration::from_millis),
            max_polls: parse_var("PDI_MAX_POLLS")?.unwrap_or(defaults.max_polls),
            max_duration: parse_var("PDI_MAX_RUN_SECS")?
                .map_or(defaults.max_duration, Duration::from_secs),
            fetch_retries: parse_var("PDI_FETCH_RETRIES")?.unwrap_or(defaults.fetch_retries),
        };

        poll.validate()?;

        Ok(Self {
            db_path,
            port,
            assistant,
            poll,
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(None),
    }
}
