//! Grounded on `ferrex-server/src/main.rs`: tracing-subscriber init via an `EnvFilter` fallback,
//! a plain `TcpListener` + `axum::serve`.

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tv_server::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "tv_server=debug,tv_core=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let bind_addr = settings.bind_addr;
    info!(%bind_addr, "loaded configuration");

    let (_state, app) = tv_server::build(settings).await?;

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
