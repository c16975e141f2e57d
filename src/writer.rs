//! Write strategies: buffered batches or one row per message
use tracing::warn;

use crate::decoder::Record;
use crate::error::WriteError;
use crate::store::RowStore;

/// Inserts every record as one row inside a single transaction.
/// Any failure rolls the whole transaction back.
async fn insert_rows(store: &dyn RowStore, records: &[Record]) -> Result<(), WriteError> {
    let mut tx = store.begin().await?;
    for record in records {
        let inserted = match serde_json::to_string(record) {
            Ok(json) => tx.insert(&json).await.map_err(WriteError::from),
            Err(e) => Err(WriteError::from(e)),
        };
        if let Err(e) = inserted {
            if let Err(rb) = tx.rollback().await {
                warn!("rolling back: {rb}");
            }
            return Err(e);
        }
    }
    tx.commit().await?;
    Ok(())
}

/// Accumulates records of one worker and writes them all-or-nothing
pub struct BatchWriter {
    batch: Vec<Record>,
    batch_size: usize,
}

impl BatchWriter {
    pub fn new(batch_size: usize) -> BatchWriter {
        BatchWriter {
            batch: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    pub fn accumulate(&mut self, record: Record) {
        self.batch.push(record);
    }

    pub fn is_full(&self) -> bool {
        self.batch.len() >= self.batch_size
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Writes pending records in one transaction and returns how many were written.
    /// The batch is cleared whether or not the write succeeds.
    pub async fn flush(&mut self, store: &dyn RowStore) -> Result<usize, WriteError> {
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        if batch.is_empty() {
            return Ok(0);
        }
        insert_rows(store, &batch).await?;
        Ok(batch.len())
    }
}

/// Writes a single record in its own transaction.
pub async fn persist(store: &dyn RowStore, record: &Record) -> Result<(), WriteError> {
    insert_rows(store, std::slice::from_ref(record)).await
}
