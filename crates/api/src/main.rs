use std::sync::Arc;

use relayq_infra::{PgConfig, PgJobRepository, MIGRATOR};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relayq_observability::init();

    let cfg = PgConfig::from_env()?;
    let pool = relayq_infra::connect(&cfg).await?;

    MIGRATOR.run(&pool).await?;
    tracing::info!("database migrations applied");

    let repo = Arc::new(PgJobRepository::new(pool.clone()));
    let app = relayq_api::app::build_app(repo, Some(pool));

    let addr = std::env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
