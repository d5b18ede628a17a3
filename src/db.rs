use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::config::Secret;

/// Connects to the curated-list database and applies pending migrations.
pub async fn init_db_pool(database_url: &Secret) -> Result<Pool<Postgres>> {
    info!("Initializing curated-list database pool");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose())
        .await
        .context("failed to connect to DATABASE_URL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run curated-list migrations")?;

    Ok(pool)
}
