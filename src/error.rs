//! Error taxonomy of the pipeline
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Failure to pull the next message. Fatal to the worker that hit it.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("message log closed")]
    Closed,
}

/// Failure to acknowledge offsets. Logged, never fatal.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[cfg(any(test, feature = "testing"))]
    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Payload could not be turned into a record; the message is skipped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload too short for wire header: {0} bytes")]
    MissingHeader(usize),

    #[error("unexpected magic byte {0}")]
    BadMagic(u8),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("mysql error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("mysql url: {0}")]
    Url(#[from] mysql_async::UrlError),

    #[cfg(any(test, feature = "testing"))]
    #[error("row rejected: {0}")]
    Rejected(String),
}

/// Failure to persist a record or a batch; the affected rows are discarded.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("serializing record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
