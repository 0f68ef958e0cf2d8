//! Canonical decoding of greenhouse submissions.
//!
//! Turns a parsed document into a [`CanonicalRecord`]. Sensor declarations
//! are collected first into an id → declaration map, then every `leitura` is
//! read in document order and resolved through that map. A reference to an
//! undeclared sensor is tolerated and typed as [`UNKNOWN_SENSOR_TYPE`]; a
//! reading without a timestamp or a numeric value is not.

use std::collections::HashMap;

use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::warn;

use crate::models::{
    CanonicalRecord, DecodedRecord, Reading, SensorDeclaration, StoredRecord, UNKNOWN_SENSOR_TYPE,
};
use crate::schema::{element_text, parse_document};

// ---

const ROOT: &str = "estufa";
const SENSOR: &str = "sensor";
const READING: &str = "leitura";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stored document is not readable XML: {0}")]
    Unreadable(String),

    #[error("root element must be <estufa>, found <{0}>")]
    UnexpectedRoot(String),

    #[error("<estufa> has no id")]
    MissingGreenhouseId,

    #[error("reading {reading} is missing {field}")]
    MissingField {
        reading: String,
        field: &'static str,
    },

    #[error("reading {reading} has a non-numeric value '{value}'")]
    NotNumeric { reading: String, value: String },
}

/// Decode raw stored bytes without schema validation.
pub fn decode_bytes(raw: &[u8]) -> Result<CanonicalRecord, DecodeError> {
    // ---
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Unreadable(e.to_string()))?;
    let doc = parse_document(text).map_err(|e| DecodeError::Unreadable(e.to_string()))?;
    decode(&doc)
}

/// Decode a batch of stored records, sorted by record id.
///
/// Records that no longer decode are logged and left out.
pub fn decode_stored(records: impl IntoIterator<Item = StoredRecord>) -> Vec<DecodedRecord> {
    // ---
    let mut decoded: Vec<DecodedRecord> = records
        .into_iter()
        .filter_map(|stored| match decode_bytes(&stored.raw) {
            Ok(record) => Some(DecodedRecord {
                id: stored.id,
                record,
            }),
            Err(e) => {
                warn!(record_id = %stored.id, error = %e, "skipping record that failed to decode");
                None
            }
        })
        .collect();
    decoded.sort_by(|a, b| a.id.cmp(&b.id));
    decoded
}

/// Decode a parsed submission.
pub fn decode(doc: &Document) -> Result<CanonicalRecord, DecodeError> {
    // ---
    let root = doc.root_element();
    if root.tag_name().name() != ROOT {
        return Err(DecodeError::UnexpectedRoot(root.tag_name().name().to_string()));
    }
    let greenhouse_id = root
        .attribute("id")
        .ok_or(DecodeError::MissingGreenhouseId)?
        .to_string();

    let sensors = sensor_map(root);

    let readings = root
        .descendants()
        .filter(|n| n.has_tag_name(READING))
        .enumerate()
        .map(|(index, node)| decode_reading(node, index, &sensors))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CanonicalRecord {
        greenhouse_id,
        readings,
    })
}

fn sensor_map(root: Node) -> HashMap<String, SensorDeclaration> {
    // ---
    root.descendants()
        .filter(|n| n.has_tag_name(SENSOR))
        .filter_map(|n| {
            let id = n.attribute("id")?;
            let sensor_type = n.attribute("tipo").unwrap_or(UNKNOWN_SENSOR_TYPE);
            let unit = child_text(n, "unidade")
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty());
            Some((
                id.to_string(),
                SensorDeclaration {
                    id: id.to_string(),
                    sensor_type: sensor_type.to_string(),
                    unit,
                },
            ))
        })
        .collect()
}

fn decode_reading(
    node: Node,
    index: usize,
    sensors: &HashMap<String, SensorDeclaration>,
) -> Result<Reading, DecodeError> {
    // ---
    let label = |id: Option<&str>| match id {
        Some(id) => format!("'{id}'"),
        None => format!("#{}", index + 1),
    };

    let id = node.attribute("id").ok_or_else(|| DecodeError::MissingField {
        reading: label(None),
        field: "an id",
    })?;

    let timestamp = child_text(node, "dataHora")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| DecodeError::MissingField {
            reading: label(Some(id)),
            field: "a timestamp",
        })?;

    let raw_value = child_text(node, "valor")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DecodeError::MissingField {
            reading: label(Some(id)),
            field: "a value",
        })?;

    let value = raw_value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::NotNumeric {
            reading: label(Some(id)),
            value: raw_value.clone(),
        })?;

    let sensor_ref = node
        .children()
        .find(|c| c.has_tag_name("sensorRef"))
        .and_then(|c| c.attribute("ref"))
        .unwrap_or_default();

    let (sensor_type, unit) = match sensors.get(sensor_ref) {
        Some(decl) => (decl.sensor_type.clone(), decl.unit.clone()),
        None => (UNKNOWN_SENSOR_TYPE.to_string(), None),
    };

    Ok(Reading {
        id: id.to_string(),
        timestamp,
        sensor_ref: sensor_ref.to_string(),
        sensor_type,
        unit,
        value,
    })
}

fn child_text(node: Node, name: &str) -> Option<String> {
    node.children()
        .find(|c| c.has_tag_name(name))
        .map(element_text)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    const DOC: &str = r#"<estufa id="EST01">
  <sensores>
    <sensor id="S01" tipo="temperatura"><unidade>°C</unidade></sensor>
    <sensor id="S04" tipo="pH"/>
  </sensores>
  <leituras>
    <leitura id="L01">
      <dataHora>2025-10-20T14:30:00</dataHora>
      <sensorRef ref="S01"/>
      <valor>22.5</valor>
    </leitura>
    <leitura id="L04">
      <dataHora> 2025-10-20T14:31:00 </dataHora>
      <sensorRef ref="S04"/>
      <valor>6</valor>
    </leitura>
  </leituras>
</estufa>"#;

    #[test]
    fn test_decode_resolves_types_in_order() {
        // ---
        let record = decode_bytes(DOC.as_bytes()).unwrap();
        assert_eq!(record.greenhouse_id, "EST01");
        assert_eq!(record.record_id(), Some("L01"));

        let ids: Vec<_> = record.readings.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["L01", "L04"]);

        assert_eq!(record.readings[0].sensor_type, "temperatura");
        assert_eq!(record.readings[0].unit.as_deref(), Some("°C"));
        assert_eq!(record.readings[0].value, 22.5);

        assert_eq!(record.readings[1].sensor_type, "pH");
        assert_eq!(record.readings[1].unit, None);
        assert_eq!(record.readings[1].timestamp, "2025-10-20T14:31:00");
        assert_eq!(record.readings[1].value, 6.0);
    }

    #[test]
    fn test_unresolved_reference_is_unknown() {
        // ---
        let doc = DOC.replace(r#"ref="S04""#, r#"ref="S99""#);
        let record = decode_bytes(doc.as_bytes()).unwrap();
        assert_eq!(record.readings[1].sensor_ref, "S99");
        assert_eq!(record.readings[1].sensor_type, UNKNOWN_SENSOR_TYPE);
    }

    #[test]
    fn test_missing_value_fails() {
        // ---
        let doc = DOC.replace("<valor>6</valor>", "");
        let err = decode_bytes(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "a value", .. }));
        assert_eq!(err.to_string(), "reading 'L04' is missing a value");
    }

    #[test]
    fn test_missing_timestamp_fails() {
        // ---
        let doc = DOC.replace("<dataHora>2025-10-20T14:30:00</dataHora>", "<dataHora/>");
        let err = decode_bytes(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "a timestamp", .. }));
    }

    #[test]
    fn test_non_numeric_value_fails() {
        // ---
        for bad in ["abc", "NaN", "inf"] {
            let doc = DOC.replace("<valor>22.5</valor>", &format!("<valor>{bad}</valor>"));
            let err = decode_bytes(doc.as_bytes()).unwrap_err();
            assert!(matches!(err, DecodeError::NotNumeric { .. }), "{bad}");
        }
    }

    #[test]
    fn test_decode_stored_skips_and_sorts() {
        // ---
        let stored = vec![
            StoredRecord {
                id: "L09".to_string(),
                raw: DOC.replace("L01", "L09").into_bytes(),
            },
            StoredRecord {
                id: "BROKEN".to_string(),
                raw: b"<estufa id=".to_vec(),
            },
            StoredRecord {
                id: "L01".to_string(),
                raw: DOC.as_bytes().to_vec(),
            },
        ];
        let decoded = decode_stored(stored);
        let ids: Vec<_> = decoded.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["L01", "L09"]);
    }

    #[test]
    fn test_unreadable_bytes() {
        // ---
        assert!(matches!(
            decode_bytes(b"<estufa").unwrap_err(),
            DecodeError::Unreadable(_)
        ));
        assert!(matches!(
            decode_bytes(&[0xff, 0xfe, 0x00]).unwrap_err(),
            DecodeError::Unreadable(_)
        ));
        assert!(matches!(
            decode_bytes(b"<other/>").unwrap_err(),
            DecodeError::UnexpectedRoot(_)
        ));
    }
}
