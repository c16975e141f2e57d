//! JSON payloads framed with the schema registry wire header
use crate::error::DecodeError;

use super::{Record, CONFLUENT_HEADER_LEN};

pub struct Decoder;

impl super::Decoder for Decoder {
    fn get_name(&self) -> String {
        String::from("confluent-json")
    }
    fn decode(&self, message: &[u8]) -> Result<Record, DecodeError> {
        if message.len() < CONFLUENT_HEADER_LEN {
            return Err(DecodeError::MissingHeader(message.len()));
        }
        if message[0] != 0 {
            return Err(DecodeError::BadMagic(message[0]));
        }
        Ok(serde_json::from_slice(&message[CONFLUENT_HEADER_LEN..])?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::Decoder as _;
    use super::*;

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut m = vec![0, 0, 0, 0, 42];
        m.extend_from_slice(body);
        m
    }

    #[test]
    fn strips_header() {
        let r = Decoder.decode(&framed(br#"{"a":1}"#)).unwrap();
        assert_eq!(r["a"], json!(1));
    }

    #[test]
    fn rejects_bad_framing() {
        assert!(matches!(
            Decoder.decode(&[0, 0, 1]),
            Err(DecodeError::MissingHeader(3))
        ));
        let mut m = framed(br#"{"a":1}"#);
        m[0] = 1;
        assert!(matches!(Decoder.decode(&m), Err(DecodeError::BadMagic(1))));
        assert!(matches!(
            Decoder.decode(&framed(b"nope")),
            Err(DecodeError::Json(_))
        ));
    }
}
