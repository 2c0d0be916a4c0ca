//! Messages as they travel on the bus.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// A single record read from or written to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The topic the record was published to.
    pub topic: String,

    /// The partition the key hashed to.
    pub partition: usize,

    /// Position of the record within its partition.
    pub offset: u64,

    /// Routing key; all records with the same key share a partition.
    pub key: String,

    /// Encoded value.
    pub payload: Vec<u8>,

    /// When the broker accepted the record.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Decodes the JSON payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Returns the payload as UTF-8 text, if it is valid.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Encodes a value as the JSON payload of a message.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    fn message_with(payload: Vec<u8>) -> Message {
        Message {
            topic: "Ping".to_string(),
            partition: 0,
            offset: 0,
            key: "k".to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_decode_typed_payload() {
        let message = message_with(encode(&Ping { seq: 7 }).unwrap());
        let ping: Ping = message.decode().unwrap();
        assert_eq!(ping, Ping { seq: 7 });
        assert_eq!(message.payload_str(), Some(r#"{"seq":7}"#));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let message = message_with(b"not json".to_vec());
        assert!(message.decode::<Ping>().is_err());
    }
}
