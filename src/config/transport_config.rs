use super::parse_env;
use crate::infrastructure::core::http_client_factory::HttpClientConfig;
use anyhow::Result;
use std::env;
use std::time::Duration;

/// Exchange and chat endpoints, credentials and HTTP behaviour.
#[derive(Debug, Clone)]
pub struct TransportEnvConfig {
    pub binance_base_url: String,
    pub telegram_api_url: String,
    pub telegram_token: Option<String>,
    pub poll_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub http_connect_timeout_secs: u64,
    pub http_max_retries: u32,
}

impl TransportEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            binance_base_url: env::var("BINANCE_BASE_URL")
                .unwrap_or_else(|_| "https://api.binance.com".to_string()),
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            telegram_token: env::var("TELEGRAM_TOKEN").ok().filter(|t| !t.is_empty()),
            poll_timeout_secs: parse_env("TELEGRAM_POLL_TIMEOUT_SECS", 30)?,
            http_timeout_secs: parse_env("HTTP_TIMEOUT_SECS", 30)?,
            http_connect_timeout_secs: parse_env("HTTP_CONNECT_TIMEOUT_SECS", 10)?,
            http_max_retries: parse_env("HTTP_MAX_RETRIES", 3)?,
        })
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            connect_timeout: Duration::from_secs(self.http_connect_timeout_secs),
            max_retries: self.http_max_retries,
        }
    }
}
