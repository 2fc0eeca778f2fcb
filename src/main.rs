use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use sqlx::postgres::PgPoolOptions;
use xe_rates::{
    config::Config,
    fetcher::XeClient,
    pipeline::Pipeline,
    scheduler::Scheduler,
    status::{self, StatusBoard},
    store::PgRateStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    info!(
        "Tracking {} against {}",
        config.currencies.targets().join(","),
        config.currencies.base()
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Can't connect to the database")?;

    let source = XeClient::new(
        &config.provider_url,
        config.credentials.clone(),
        config.request_timeout,
    )?;
    let store = PgRateStore::new(pool, &config.rates_table)?;
    let pipeline = Pipeline::new(source, store, config.currencies.clone());

    let board = Arc::new(StatusBoard::default());
    let scheduler = Scheduler::new(pipeline, config.schedule.clone(), config.retry, board.clone());

    if config.run_once {
        if !scheduler.run_slot(Utc::now()).await {
            anyhow::bail!("Run failed");
        }
        return Ok(());
    }

    let started = Utc::now();
    let runs = async {
        if config.catchup {
            scheduler.catch_up(config.backfill_start, started).await;
        }
        scheduler.run_forever(started).await
    };

    match &config.status_addr {
        Some(addr) => {
            tokio::select! {
                res = runs => res,
                res = status::serve(addr, board) => res,
            }
        }
        None => runs.await,
    }
}
