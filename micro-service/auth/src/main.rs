use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber, layer::SubscriberExt};

use app_config::AuthConfig;
use app_error::AppError;
use micro_auth::{bind_address, build_app, build_service};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AuthConfig::from_env()?;

    // Load and initialize sentry
    let _guard = sentry::init((
        config.monitoring.sentry_dsn.clone(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            ..Default::default()
        },
    ));

    // Initialize the logger
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(&config.monitoring.log_level))
        .finish();

    let subscriber = subscriber.with(sentry_tracing::layer());
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting auth service at {}", chrono::Utc::now());

    let service = build_service(&config).await?;
    let app = build_app(service, &config.server);

    // Bind server to address and start it
    let address = bind_address(&config.server);
    let listener = TcpListener::bind(&address)
        .await
        .context(format!("Failed to bind to address: {}", address))?;

    info!("Server starting");
    // The peer address keys the rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
