use crate::error::DecodeError;

use super::Record;

/// Plain JSON object payloads
pub struct Decoder;

impl super::Decoder for Decoder {
    fn get_name(&self) -> String {
        String::from("json")
    }
    fn decode(&self, message: &[u8]) -> Result<Record, DecodeError> {
        Ok(serde_json::from_slice(message)?)
    }
}
