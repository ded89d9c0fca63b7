#![forbid(unsafe_code)]

use std::net::SocketAddr;

use corkboard_server::{build_router, init_tracing, AppConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let rate_limit_requests_per_minute = std::env::var("CORKBOARD_RATE_LIMIT_PER_MINUTE")
        .map_or_else(
            |_| Ok(AppConfig::default().rate_limit_requests_per_minute),
            |value| {
                value.parse::<u32>().map_err(|e| {
                    anyhow::anyhow!("invalid CORKBOARD_RATE_LIMIT_PER_MINUTE value {value:?}: {e}")
                })
            },
        )?;
    let app_config = AppConfig {
        rate_limit_requests_per_minute,
        database_url: std::env::var("CORKBOARD_DATABASE_URL").ok(),
        ..AppConfig::default()
    };
    if app_config.database_url.is_none() {
        tracing::warn!(
            event = "startup.storage",
            "CORKBOARD_DATABASE_URL not set; state is kept in memory only"
        );
    }

    let app = build_router(&app_config)?;
    let addr = std::env::var("CORKBOARD_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:3000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid CORKBOARD_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "corkboard-server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
