use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::decoder::Decoder;
use crate::settings::{BatchAck, Settings, WriteMode};
use crate::source::MessageLog;
use crate::store::RowStore;
use crate::worker::{Strategy, Worker, WorkerStats};

/// Static shape of a worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub write_mode: WriteMode,
    pub batch_size: usize,
    /// `AfterFlush` is only sound with a single batch worker, see `Settings::new`
    pub batch_ack: BatchAck,
    pub batch_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            write_mode: WriteMode::Batch,
            batch_size: 100,
            batch_ack: BatchAck::Delegated,
            batch_timeout: None,
        }
    }
}

impl From<&Settings> for PoolConfig {
    fn from(s: &Settings) -> Self {
        Self {
            worker_count: s.worker_count,
            write_mode: s.write_mode,
            batch_size: s.batch_size,
            batch_ack: s.batch_ack,
            batch_timeout: s.batch_timeout(),
        }
    }
}

/// Runs `worker_count` workers against the shared log and store, waits for
/// all of them to stop and closes the log.
pub async fn run(
    config: &PoolConfig,
    log: Arc<dyn MessageLog>,
    store: Arc<dyn RowStore>,
    decoder: Arc<dyn Decoder + Send + Sync>,
    shutdown: CancellationToken,
) -> WorkerStats {
    let mut workers = JoinSet::new();
    for id in 0..config.worker_count {
        let worker = Worker::new(
            id,
            log.clone(),
            store.clone(),
            decoder.clone(),
            Strategy::new(config.write_mode, config.batch_size, config.batch_ack),
            config.batch_timeout,
            shutdown.clone(),
        );
        workers.spawn(worker.run());
    }
    info!(
        workers = config.worker_count,
        mode = ?config.write_mode,
        decoder = %decoder.get_name(),
        "pool started"
    );

    let mut total = WorkerStats::default();
    while let Some(res) = workers.join_next().await {
        match res {
            Ok(stats) => total += stats,
            Err(e) => error!("worker crashed: {e}"),
        }
    }
    log.close().await;
    info!(stats = ?total, "pool stopped");
    total
}
