use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod db;
mod error;
mod html;
mod mail;
mod pipeline;
mod routes;
mod store;
#[cfg(test)]
mod testing;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::mail::Mailer;
use crate::store::{MemoryUserStore, PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(config: Config, users: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_expires_in);
        Self {
            config: Arc::new(config),
            users,
            mailer,
            tokens,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "natours=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let listen_addr = config.listen_addr.clone();

    let users: Arc<dyn UserStore> = match config.database_url {
        Some(ref url) => {
            let pool = db::create_pool(url, config.database_max_connections).await?;
            Arc::new(PgUserStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, users are kept in memory");
            Arc::new(MemoryUserStore::new())
        }
    };
    let mailer = mail::from_config(&config);

    tracing::info!(environment = ?config.environment, "starting natours");
    let state = AppState::new(config, users, mailer);
    let app = pipeline::build(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("listening on {listen_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl+c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
