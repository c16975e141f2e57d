use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dynafka::{
    decoder::get_decoder,
    pool::{self, PoolConfig},
    settings::Settings,
    source::kafka::KafkaLog,
    store::{mysql::MySqlStore, RowStore},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = Settings::new(&args.config).context("cannot load config")?;
    let decoder = get_decoder(&settings.decoder)?;
    let store = Arc::new(
        MySqlStore::connect(&settings.store_url, &settings.table, &settings.column)
            .await
            .context("cannot connect to mysql")?,
    );
    let log = Arc::new(KafkaLog::new(&settings).context("cannot create kafka consumer")?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {e}");
            return;
        }
        info!("interrupted, draining workers");
        signal.cancel();
    });

    let stats = pool::run(
        &PoolConfig::from(&settings),
        log,
        store.clone(),
        decoder,
        shutdown,
    )
    .await;
    store.close().await;
    info!(
        persisted = stats.persisted,
        skipped = stats.skipped,
        failed_writes = stats.failed_writes,
        "done"
    );
    Ok(())
}
