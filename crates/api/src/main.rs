use std::sync::Arc;

use anyhow::Context;

use tally_api::app::{build_app, services::build_services};
use tally_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tally_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting tally-api");

    let services = Arc::new(
        build_services(&config)
            .await
            .context("failed to initialise stores")?,
    );

    if let Some(bootstrap) = &config.bootstrap_superuser {
        services
            .auth
            .ensure_superuser(bootstrap)
            .await
            .context("failed to bootstrap superuser")?;
    }

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
