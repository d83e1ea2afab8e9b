//! The literal, non-configurable header names the retry engine reads and
//! writes on redriven messages.

use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

const RETRY_COUNT: &str = "x-retry-count";
const LAST_ERROR: &str = "x-last-error";
const FIRST_FAILURE_TIMESTAMP: &str = "x-first-failure-timestamp";
const DELIVERY_COUNT: &str = "x-delivery-count";

/// Reads `x-retry-count` from `headers`, defaulting to `0`.
pub fn retry_count(headers: &Map<String, Value>) -> u32 {
    headers.get(RETRY_COUNT).and_then(Value::as_u64).map(|value| value as u32).unwrap_or(0)
}

/// Reads `x-delivery-count`, the broker-maintained counter on quorum queues.
pub fn delivery_count(headers: &Map<String, Value>) -> Option<u64> {
    headers.get(DELIVERY_COUNT).and_then(Value::as_u64)
}

/// The current epoch-millis timestamp, used as the default
/// `x-first-failure-timestamp` on a message's first retry.
pub fn now_epoch_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis() as i64).unwrap_or(0)
}

/// Builds the header set for a redriven message: the original headers, with
/// `x-retry-count`, `x-last-error`, and `x-first-failure-timestamp` set per
/// the retry engine's rules (the latter preserved from the original headers
/// if already present, since it marks the *first* failure, not the latest).
pub fn redrive_headers(original: &Map<String, Value>, next_retry_count: u32, last_error: &str) -> Map<String, Value> {
    let mut headers = original.clone();

    headers.insert(RETRY_COUNT.to_string(), Value::from(next_retry_count));
    headers.insert(LAST_ERROR.to_string(), Value::String(last_error.to_string()));

    let first_failure_timestamp = original.get(FIRST_FAILURE_TIMESTAMP).and_then(Value::as_i64).unwrap_or_else(now_epoch_millis);
    headers.insert(FIRST_FAILURE_TIMESTAMP.to_string(), Value::from(first_failure_timestamp));

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn retry_count_defaults_to_zero() {
        // Given
        let headers = Map::new();

        // When
        let actual = retry_count(&headers);

        // Then
        assert_eq!(actual, 0);
    }

    #[test]
    fn retry_count_reads_existing_value() {
        // Given
        let mut headers = Map::new();
        headers.insert("x-retry-count".to_string(), json!(2));

        // When
        let actual = retry_count(&headers);

        // Then
        assert_eq!(actual, 2);
    }

    #[test]
    fn redrive_headers_preserve_first_failure_timestamp_across_retries() {
        // Given
        let mut original = Map::new();
        original.insert("x-first-failure-timestamp".to_string(), json!(1_700_000_000_000i64));

        // When
        let first = redrive_headers(&original, 1, "boom");
        let second = redrive_headers(&first, 2, "boom again");

        // Then
        assert_eq!(first["x-first-failure-timestamp"], json!(1_700_000_000_000i64));
        assert_eq!(second["x-first-failure-timestamp"], json!(1_700_000_000_000i64));
        assert_eq!(second["x-retry-count"], json!(2));
        assert_eq!(second["x-last-error"], json!("boom again"));
    }

    #[test]
    fn redrive_headers_stamp_first_failure_timestamp_when_absent() {
        // Given
        let original = Map::new();

        // When
        let actual = redrive_headers(&original, 1, "boom");

        // Then
        assert!(actual["x-first-failure-timestamp"].as_i64().unwrap() > 0);
    }
}
