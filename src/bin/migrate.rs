//! Standalone migration runner: loads configuration, connects to the
//! database, applies all pending migrations and exits.

use anyhow::Context;
use assembly_api::{config, db, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing("info");

    let cfg = config::load_config().context("loading configuration")?;

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("connecting to database")?;

    db::run_migrations(&pool).await.context("running migrations")?;

    db::close_pool(pool).await.context("closing pool")?;

    Ok(())
}
