use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const RECORD_VERSION: &str = "1.0";

/// Envelope every backend stores. The millisecond timestamp decides which
/// copy wins during reconciliation; the version tag guards against layout
/// changes across releases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub value: serde_json::Value,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl StoredRecord {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
            version: RECORD_VERSION.to_string(),
        }
    }

    pub fn wrap<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_and_parse_round_trip() {
        let record = StoredRecord::wrap(&vec!["a", "b"]).unwrap();
        assert_eq!(record.version, RECORD_VERSION);
        let back: Vec<String> = record.parse().unwrap();
        assert_eq!(back, vec!["a", "b"]);
    }

    #[test]
    fn timestamp_rides_as_milliseconds() {
        let record = StoredRecord::new(serde_json::json!(42));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["timestamp"].is_i64());
        assert_eq!(json["timestamp"].as_i64(), Some(record.timestamp.timestamp_millis()));
        assert_eq!(json["version"], "1.0");
    }
}
