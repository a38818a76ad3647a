use anyhow::Context;

use bazaar_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    bazaar_observability::init(&config.log);

    tracing::info!(
        bind_addr = %config.bind_addr,
        postgres = config.database.is_some(),
        policy = ?config.orders.transition_policy,
        "starting order service"
    );

    let app = bazaar_api::app::build_app(&config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
