//! Creates or updates the warehouse schema in the database named by
//! `WMS_DATABASE_URL`.

use anyhow::Context;

use wms_infra::{PostgresStore, WmsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wms_observability::init();

    let config = WmsConfig::from_env();
    let url = config
        .database_url
        .context("WMS_DATABASE_URL must be set to run migrations")?;

    let store = PostgresStore::connect(&url)
        .await
        .context("failed to connect to the database")?;
    store.migrate().await.context("schema migration failed")?;

    tracing::info!("migration complete");
    Ok(())
}
