//! Conversion between cached values and their stored string form.
//!
//! Every store persists values as JSON text. Typed values are first mapped
//! onto [`serde_json::Value`] so the repository can inspect them (null checks,
//! event payloads) before they reach the backend.

use crate::error::{CacheError, CacheResult};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Serialize a cached value to its stored string form.
pub fn serialize(value: &Value) -> CacheResult<String> {
    serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Parse a stored string back into a cached value.
pub fn deserialize(raw: &str) -> CacheResult<Value> {
    serde_json::from_str(raw).map_err(|e| CacheError::Deserialization(e.to_string()))
}

/// Convert a typed value into a cacheable value.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CacheResult<Value> {
    serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Convert a cached value into a typed value.
pub fn from_value<T: DeserializeOwned>(value: Value) -> CacheResult<T> {
    serde_json::from_value(value).map_err(|e| CacheError::Deserialization(e.to_string()))
}

/// Pass a value through its stored form and back.
///
/// The result is structurally identical to what a later read of the same
/// entry yields.
pub fn round_trip(value: &Value) -> CacheResult<Value> {
    deserialize(&serialize(value)?)
}

/// Parse a stored value as an integer counter.
///
/// Accepts the stored text of a JSON integer (`"42"`); anything else is not a
/// counter.
pub fn parse_counter(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}
