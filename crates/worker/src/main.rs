use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use courier_core::config::Settings;
use courier_core::media::StorageResolver;
use courier_db::PgStore;
use courier_telegram::BotClient;
use courier_worker::{DispatchConfig, Dispatcher};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "courier-worker")]
#[command(about = "Publishes scheduled posts as they come due", version)]
struct Args {
    /// Run a single sweep and exit.
    #[arg(long)]
    once: bool,
    /// Seconds between sweeps; overrides COURIER_SWEEP_INTERVAL_SECS.
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,
}

impl Args {
    fn sweep_interval(&self, settings: &Settings) -> Duration {
        self.interval
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or_else(|| settings.sweep_interval())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;
    courier_db::run_migrations(&db).await?;
    let store = Arc::new(PgStore::new(db));

    let media_base = settings
        .media_base_url
        .as_deref()
        .map(url::Url::parse)
        .transpose()?;
    let provider = BotClient::new(
        &settings.telegram_api_url,
        &settings.bot_token,
        settings.provider_timeout(),
        Arc::new(StorageResolver::new(media_base)),
    )?;

    let dispatcher = Dispatcher::new(
        store.clone(),
        store,
        Arc::new(provider),
        DispatchConfig::from_settings(&settings),
    );

    if args.once {
        let report = dispatcher.sweep(Utc::now()).await?;
        info!(
            sent = report.sent(),
            failed = report.failed(),
            retry = report.retried(),
            "single sweep complete"
        );
        return Ok(());
    }

    let period = args.sweep_interval(&settings);
    info!(env = %settings.courier_env, period_secs = period.as_secs(), "worker starting");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = dispatcher.sweep(Utc::now()).await {
                    error!(error = %err, "could not select due posts");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["courier-worker"]).unwrap();
        assert!(!args.once);
        assert_eq!(args.interval, None);
    }

    #[test]
    fn test_args_once_with_interval() {
        let args =
            Args::try_parse_from(["courier-worker", "--once", "--interval", "15"]).unwrap();
        assert!(args.once);
        assert_eq!(args.interval, Some(15));
    }

    #[test]
    fn test_args_rejects_non_numeric_interval() {
        let result = Args::try_parse_from(["courier-worker", "--interval", "soon"]);
        assert!(result.is_err());
    }
}
