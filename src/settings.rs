use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub base_url: Url,
    #[serde(rename = "box")]
    pub box_slug: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub poll_interval_secs: u64,
    pub timezone: String,
    pub api_token: String,
    pub enable_swagger: bool,
    pub debug: bool,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // Load from environment variables with APP_ prefix. No separator:
            // APP_POLL_INTERVAL_SECS must bind to the flat key
            // `poll_interval_secs`, not a nested `poll.interval.secs`.
            .add_source(Environment::with_prefix("APP"))
            .set_default("base_url", "https://fitblocks.nl")?
            .set_default("box", "physicsperformance")?
            .set_default("poll_interval_secs", 1800)?
            .set_default("timezone", "UTC")?
            .set_default("api_token", "default-token-change-me")?
            .set_default("enable_swagger", true)?
            .set_default("debug", false)?
            .set_default("port", 8080)?
            .build()?;

        config.try_deserialize()
    }
}
