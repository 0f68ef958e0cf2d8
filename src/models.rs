//! Data models for the greenhouse telemetry pipeline.
//!
//! A submission is decoded into a [`CanonicalRecord`]: the greenhouse id plus
//! its readings in document order, each reading already resolved to the type
//! of the sensor it references. Records are never stored in this form; the
//! store keeps the raw accepted bytes ([`StoredRecord`]) and every query
//! decodes them again.

use serde::{Deserialize, Serialize};

// ---

/// Type given to a reading whose sensor reference is not declared in its
/// own document.
pub const UNKNOWN_SENSOR_TYPE: &str = "unknown";

/// A sensor declared inside one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDeclaration {
    // ---
    pub id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One measurement, resolved against the declaring document's sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub id: String,
    pub timestamp: String,
    pub sensor_ref: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub value: f64,
}

/// Decoded, typed view of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    // ---
    pub greenhouse_id: String,
    pub readings: Vec<Reading>,
}

impl CanonicalRecord {
    /// Natural id of the record: the id of its first reading.
    pub fn record_id(&self) -> Option<&str> {
        self.readings.first().map(|r| r.id.as_str())
    }
}

/// A persisted submission exactly as it was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    // ---
    pub id: String,
    pub raw: Vec<u8>,
}

/// A stored record after decoding, tagged with its store id.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    // ---
    pub id: String,
    pub record: CanonicalRecord,
}

/// A reading outside the range currently configured for its type.
///
/// Alerts are derived on every scan and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    // ---
    pub greenhouse_id: String,
    pub reading_id: String,
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub value: f64,
    pub range: String,
    pub timestamp: String,
    pub record_id: String,
}

/// Render a number with at least one decimal place (`4` becomes `4.0`).
pub fn format_decimal(value: f64) -> String {
    // ---
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
