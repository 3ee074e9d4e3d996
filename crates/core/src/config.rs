use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub bot_token: String,
    pub telegram_api_url: String,
    pub courier_env: String,
    pub api_bind: String,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub sweep_concurrency: usize,
    pub provider_timeout_secs: u64,
    pub verify_timeout_secs: u64,
    pub media_base_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let database_url =
            std::env::var("DATABASE_URL").or_else(|_| std::env::var("COURIER_DATABASE_URL"))?;
        let bot_token =
            std::env::var("COURIER_BOT_TOKEN").or_else(|_| std::env::var("TELEGRAM_BOT_TOKEN"))?;
        let telegram_api_url = std::env::var("COURIER_TELEGRAM_API_URL")
            .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_URL.to_string());
        let courier_env = std::env::var("COURIER_ENV").unwrap_or_else(|_| "dev".to_string());
        let api_bind =
            std::env::var("COURIER_API_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let sweep_interval_secs = parse_var("COURIER_SWEEP_INTERVAL_SECS").unwrap_or(60);
        let sweep_batch_size = parse_var("COURIER_SWEEP_BATCH_SIZE").unwrap_or(10);
        let sweep_concurrency = parse_var("COURIER_SWEEP_CONCURRENCY").unwrap_or(1);
        let provider_timeout_secs = parse_var("COURIER_PROVIDER_TIMEOUT_SECS").unwrap_or(30);
        let verify_timeout_secs = parse_var("COURIER_VERIFY_TIMEOUT_SECS").unwrap_or(30);
        let media_base_url = std::env::var("COURIER_MEDIA_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url,
            bot_token,
            telegram_api_url,
            courier_env,
            api_bind,
            sweep_interval_secs,
            sweep_batch_size,
            sweep_concurrency,
            provider_timeout_secs,
            verify_timeout_secs,
            media_base_url,
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
