use axum::{middleware::from_fn, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod error;
mod middleware;
mod routes;
mod state;

use courier_core::config::Settings;
use courier_core::media::StorageResolver;
use courier_core::verify::{ChannelVerifier, VerificationSessions};
use courier_db::PgStore;
use courier_telegram::BotClient;
use courier_worker::{DispatchConfig, Dispatcher};

use crate::middleware::user::require_user;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    courier_db::run_migrations(&db).await?;
    let store = Arc::new(PgStore::new(db));

    let media_base = settings
        .media_base_url
        .as_deref()
        .map(url::Url::parse)
        .transpose()?;
    let provider = Arc::new(BotClient::new(
        &settings.telegram_api_url,
        &settings.bot_token,
        settings.provider_timeout(),
        Arc::new(StorageResolver::new(media_base)),
    )?);

    let verifier = Arc::new(
        ChannelVerifier::new(provider.clone(), store.clone())
            .with_timeout(settings.verify_timeout()),
    );
    let dispatcher = Dispatcher::new(
        store.clone(),
        store.clone(),
        provider,
        DispatchConfig::from_settings(&settings),
    );

    let state = AppState {
        posts: store.clone(),
        channels: store,
        sessions: Arc::new(VerificationSessions::new(verifier.clone())),
        verifier,
        dispatcher: Arc::new(dispatcher),
        courier_env: settings.courier_env.clone(),
    };

    let v1 = routes::v1_router(state.clone()).layer(from_fn(require_user));

    let app = Router::new()
        .merge(routes::health_router(state))
        .merge(v1);

    let addr: SocketAddr = settings.api_bind.parse()?;

    info!(%addr, env = %settings.courier_env, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
