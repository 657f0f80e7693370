use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PollPolicy {
    pub interval_ms: Option<u64>,
    pub max_polls: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionSettings {
    pub default_model: Option<String>,
    pub poll: Option<PollPolicy>,
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GlobalConfigDefaults {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub default_model: Option<String>,
    pub poll: Option<PollPolicy>,
    pub data_dir: Option<String>,
}

impl GlobalConfigDefaults {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            default_model: std::env::var("TURBO4_MODEL").ok(),
            poll: None,
            data_dir: std::env::var("TURBO4_DATA_DIR").ok(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub poll: Option<PollPolicy>,
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub poll_interval: Duration,
    pub max_polls: Option<u32>,
    pub data_dir: PathBuf,
}

impl EffectiveSettings {
    /// Directory the assistant's generated artifacts and knowledge files land in.
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("agentOutput")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db.sqlite")
    }

    pub fn measurements_path(&self) -> PathBuf {
        self.data_dir.join("measurements.txt")
    }

    pub fn stations_path(&self) -> PathBuf {
        self.data_dir.join("weather_stations.csv")
    }
}

pub fn resolve_effective_settings(
    global: &GlobalConfigDefaults,
    session: &SessionSettings,
    request: &RequestOverrides,
) -> EffectiveSettings {
    let model = request
        .model
        .clone()
        .or_else(|| session.default_model.clone())
        .or_else(|| global.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.into());

    let interval_ms = request
        .poll
        .as_ref()
        .and_then(|p| p.interval_ms)
        .or_else(|| session.poll.as_ref().and_then(|p| p.interval_ms))
        .or_else(|| global.poll.as_ref().and_then(|p| p.interval_ms))
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

    let max_polls = request
        .poll
        .as_ref()
        .and_then(|p| p.max_polls)
        .or_else(|| session.poll.as_ref().and_then(|p| p.max_polls))
        .or_else(|| global.poll.as_ref().and_then(|p| p.max_polls));

    let data_dir = request
        .data_dir
        .clone()
        .or_else(|| session.data_dir.clone())
        .or_else(|| global.data_dir.clone())
        .unwrap_or_else(|| DEFAULT_DATA_DIR.into());

    EffectiveSettings {
        base_url: global.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.into()),
        api_key: global.api_key.clone(),
        model,
        poll_interval: Duration::from_millis(interval_ms),
        max_polls,
        data_dir: PathBuf::from(data_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_request_over_session_over_global() {
        let global = GlobalConfigDefaults {
            base_url: Some("http://localhost:9999/v1".into()),
            api_key: Some("sk-test".into()),
            default_model: Some("global-model".into()),
            poll: Some(PollPolicy { interval_ms: Some(1000), max_polls: Some(50) }),
            data_dir: Some("/global".into()),
        };

        let session = SessionSettings {
            default_model: Some("session-model".into()),
            poll: Some(PollPolicy { interval_ms: Some(250), max_polls: None }),
            data_dir: None,
        };

        let request = RequestOverrides {
            model: Some("request-model".into()),
            poll: None,
            data_dir: Some("/request".into()),
        };

        let eff = resolve_effective_settings(&global, &session, &request);

        assert_eq!(eff.model, "request-model");
        assert_eq!(eff.poll_interval, Duration::from_millis(250)); // from session
        assert_eq!(eff.max_polls, Some(50)); // from global
        assert_eq!(eff.data_dir, PathBuf::from("/request"));
        assert_eq!(eff.base_url, "http://localhost:9999/v1");
        assert_eq!(eff.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn defaults_when_nothing_is_configured() {
        let eff = resolve_effective_settings(
            &GlobalConfigDefaults::default(),
            &SessionSettings::default(),
            &RequestOverrides::default(),
        );
        assert_eq!(eff.model, DEFAULT_MODEL);
        assert_eq!(eff.base_url, DEFAULT_BASE_URL);
        assert_eq!(eff.poll_interval, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert_eq!(eff.max_polls, None);
        assert_eq!(eff.output_dir(), PathBuf::from("data/agentOutput"));
        assert_eq!(eff.db_path(), PathBuf::from("data/db.sqlite"));
    }
}
