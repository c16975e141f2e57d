//! Message log the workers consume from
pub mod kafka;

use async_trait::async_trait;

use crate::error::{CommitError, FetchError};

/// Where a message lives in the log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Undecoded message as delivered by the log
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub payload: Vec<u8>,
    pub position: Position,
}

/// Consumer group session shared by all workers of a pool.
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Blocks until the next message for this group member is available.
    async fn fetch(&self) -> Result<RawMessage, FetchError>;
    /// Acknowledges that the given messages have been consumed.
    async fn commit(&self, positions: &[Position]) -> Result<(), CommitError>;
    async fn close(&self);
}
