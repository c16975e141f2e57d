//! Manages decoders
pub mod confluent;
pub mod json;

use std::sync::Arc;

use anyhow::anyhow;

use crate::error::DecodeError;

/// Confluent [header](https://docs.confluent.io/platform/current/schema-registry/fundamentals/serdes-develop/index.html#wire-format) length
pub const CONFLUENT_HEADER_LEN: usize = 5;

/// Decoded event - JSON object, keys kept in their original order
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Decoder converts binary message from Kafka into a record
pub trait Decoder {
    fn get_name(&self) -> String;
    fn decode(&self, message: &[u8]) -> Result<Record, DecodeError>;
}

/// Creates decoder of specified name.
/// If you add your own decoders, register them here
pub fn get_decoder(name: &str) -> Result<Arc<dyn Decoder + Send + Sync>, anyhow::Error> {
    match name {
        "json" => Ok(Arc::new(json::Decoder)),
        "confluent-json" => Ok(Arc::new(confluent::Decoder)),
        _ => Err(anyhow!("unknown decoder {}", name)),
    }
}
