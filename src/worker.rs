use std::{collections::HashMap, ops::AddAssign, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder::{Decoder, Record};
use crate::error::FetchError;
use crate::settings::{BatchAck, WriteMode};
use crate::source::{MessageLog, Position, RawMessage};
use crate::store::RowStore;
use crate::writer::{self, BatchWriter};

/// Counters a worker reports once it stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub fetched: u64,
    /// messages dropped by the decoder
    pub skipped: u64,
    pub persisted: u64,
    /// records lost to failed writes
    pub failed_writes: u64,
    pub flushes: u64,
    pub commits: u64,
    pub failed_commits: u64,
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, o: WorkerStats) {
        self.fetched += o.fetched;
        self.skipped += o.skipped;
        self.persisted += o.persisted;
        self.failed_writes += o.failed_writes;
        self.flushes += o.flushes;
        self.commits += o.commits;
        self.failed_commits += o.failed_commits;
    }
}

/// Per-worker write state
pub enum Strategy {
    Batch {
        writer: BatchWriter,
        ack: BatchAck,
        /// highest offset seen per partition since the last flush
        pending: HashMap<(String, i32), i64>,
    },
    Immediate,
}

impl Strategy {
    pub fn new(mode: WriteMode, batch_size: usize, ack: BatchAck) -> Strategy {
        match mode {
            WriteMode::Batch => Strategy::Batch {
                writer: BatchWriter::new(batch_size),
                ack,
                pending: HashMap::new(),
            },
            WriteMode::Immediate => Strategy::Immediate,
        }
    }
}

enum Fetched {
    Message(RawMessage),
    /// batch timeout elapsed with no new message
    Idle,
    Shutdown,
    Failed(FetchError),
}

/// One consumption loop: fetch, decode, write and, where the strategy asks
/// for it, acknowledge.
pub struct Worker {
    id: usize,
    log: Arc<dyn MessageLog>,
    store: Arc<dyn RowStore>,
    decoder: Arc<dyn Decoder + Send + Sync>,
    strategy: Strategy,
    batch_timeout: Option<Duration>,
    shutdown: CancellationToken,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        id: usize,
        log: Arc<dyn MessageLog>,
        store: Arc<dyn RowStore>,
        decoder: Arc<dyn Decoder + Send + Sync>,
        strategy: Strategy,
        batch_timeout: Option<Duration>,
        shutdown: CancellationToken,
    ) -> Worker {
        Worker {
            id,
            log,
            store,
            decoder,
            strategy,
            batch_timeout,
            shutdown,
            stats: WorkerStats::default(),
        }
    }

    /// Runs until the log fails or shutdown is requested, then drains
    /// whatever is still batched.
    pub async fn run(mut self) -> WorkerStats {
        debug!(worker = self.id, "started");
        loop {
            match self.fetch().await {
                Fetched::Message(msg) => self.process(msg).await,
                Fetched::Idle => {
                    debug!(worker = self.id, "batch timeout");
                    self.flush().await;
                }
                Fetched::Shutdown => {
                    info!(worker = self.id, "shutting down");
                    break;
                }
                Fetched::Failed(e) => {
                    error!(worker = self.id, "error receiving message: {e}");
                    break;
                }
            }
        }
        self.flush().await;
        info!(worker = self.id, stats = ?self.stats, "stopped");
        self.stats
    }

    async fn fetch(&self) -> Fetched {
        let deadline = match &self.strategy {
            Strategy::Batch { writer, .. } if !writer.is_empty() => self.batch_timeout,
            _ => None,
        };
        let next = async {
            match deadline {
                Some(d) => tokio::time::timeout(d, self.log.fetch()).await.ok(),
                None => Some(self.log.fetch().await),
            }
        };
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Fetched::Shutdown,
            r = next => match r {
                None => Fetched::Idle,
                Some(Ok(msg)) => Fetched::Message(msg),
                Some(Err(e)) => Fetched::Failed(e),
            },
        }
    }

    async fn process(&mut self, msg: RawMessage) {
        self.stats.fetched += 1;
        let RawMessage { payload, position } = msg;
        if let Strategy::Batch {
            pending,
            ack: BatchAck::AfterFlush,
            ..
        } = &mut self.strategy
        {
            let k = (position.topic.clone(), position.partition);
            let offset = pending.entry(k).or_insert(position.offset);
            *offset = (*offset).max(position.offset);
        }
        let record = match self.decoder.decode(&payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    worker = self.id,
                    partition = position.partition,
                    offset = position.offset,
                    "failed to decode message: {e}"
                );
                self.stats.skipped += 1;
                return;
            }
        };
        match &mut self.strategy {
            Strategy::Batch { writer, .. } => {
                writer.accumulate(record);
                if writer.is_full() {
                    self.flush().await;
                }
            }
            Strategy::Immediate => self.persist(record, position).await,
        }
    }

    async fn persist(&mut self, record: Record, position: Position) {
        if let Err(e) = writer::persist(self.store.as_ref(), &record).await {
            error!(
                worker = self.id,
                partition = position.partition,
                offset = position.offset,
                "inserting record: {e}"
            );
            self.stats.failed_writes += 1;
            return;
        }
        self.stats.persisted += 1;
        self.commit(&[position]).await;
    }

    async fn flush(&mut self) {
        let Strategy::Batch {
            writer,
            ack,
            pending,
        } = &mut self.strategy
        else {
            return;
        };
        let positions: Vec<Position> = pending
            .drain()
            .map(|((topic, partition), offset)| Position {
                topic,
                partition,
                offset,
            })
            .collect();
        let ack = *ack;
        let rows = writer.len();
        if rows > 0 {
            self.stats.flushes += 1;
            match writer.flush(self.store.as_ref()).await {
                Ok(n) => {
                    info!(worker = self.id, rows = n, "inserted batch");
                    self.stats.persisted += n as u64;
                }
                Err(e) => {
                    error!(worker = self.id, rows, "inserting batch: {e}");
                    self.stats.failed_writes += rows as u64;
                    return;
                }
            }
        }
        if ack == BatchAck::AfterFlush {
            self.commit(&positions).await;
        }
    }

    async fn commit(&mut self, positions: &[Position]) {
        if positions.is_empty() {
            return;
        }
        match self.log.commit(positions).await {
            Ok(()) => self.stats.commits += 1,
            Err(e) => {
                warn!(worker = self.id, "failed to commit offsets: {e}");
                self.stats.failed_commits += 1;
            }
        }
    }
}
