//! Alert scanning.
//!
//! Alerts are a projection: every stored reading is replayed against the
//! rule set passed in, and nothing about earlier scans is remembered.

use crate::models::{Alert, DecodedRecord};
use crate::rules::{RuleSet, Verdict};

// ---

/// Every reading in `records` that falls outside its type's range.
pub fn scan(records: &[DecodedRecord], rules: &RuleSet) -> Vec<Alert> {
    // ---
    records
        .iter()
        .flat_map(|decoded| {
            let record = &decoded.record;
            record.readings.iter().filter_map(move |reading| {
                match rules.evaluate(&reading.sensor_type, reading.value) {
                    Verdict::InRange => None,
                    Verdict::OutOfRange(range) => Some(Alert {
                        greenhouse_id: record.greenhouse_id.clone(),
                        reading_id: reading.id.clone(),
                        sensor_id: reading.sensor_ref.clone(),
                        sensor_type: reading.sensor_type.clone(),
                        value: reading.value,
                        range: range.to_string(),
                        timestamp: reading.timestamp.clone(),
                        record_id: decoded.id.clone(),
                    }),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{CanonicalRecord, Reading};
    use crate::rules::Range;

    fn reading(id: &str, sensor_type: &str, value: f64) -> Reading {
        // ---
        Reading {
            id: id.to_string(),
            timestamp: "2025-11-10T14:30:00".to_string(),
            sensor_ref: format!("S-{sensor_type}"),
            sensor_type: sensor_type.to_string(),
            unit: None,
            value,
        }
    }

    fn records() -> Vec<DecodedRecord> {
        // ---
        vec![DecodedRecord {
            id: "L01".to_string(),
            record: CanonicalRecord {
                greenhouse_id: "E01".to_string(),
                readings: vec![
                    reading("L01", "pH", 3.0),
                    reading("L02", "temperatura", 22.5),
                    reading("L03", "co2", 9000.0),
                ],
            },
        }]
    }

    #[test]
    fn test_scan_reports_out_of_range_only() {
        // ---
        let rules: RuleSet = [
            ("pH".to_string(), Range::new(4.0, 6.0)),
            ("temperatura".to_string(), Range::new(18.0, 30.0)),
        ]
        .into_iter()
        .collect();

        let alerts = scan(&records(), &rules);
        assert_eq!(alerts.len(), 1);

        let alert = &alerts[0];
        assert_eq!(alert.greenhouse_id, "E01");
        assert_eq!(alert.reading_id, "L01");
        assert_eq!(alert.sensor_id, "S-pH");
        assert_eq!(alert.sensor_type, "pH");
        assert_eq!(alert.value, 3.0);
        assert_eq!(alert.range, "4.0 - 6.0");
        assert_eq!(alert.record_id, "L01");
    }

    #[test]
    fn test_scan_follows_the_rules_it_is_given() {
        // ---
        let records = records();
        assert!(scan(&records, &RuleSet::new()).is_empty());

        let strict: RuleSet = [("co2".to_string(), Range::new(400.0, 1200.0))]
            .into_iter()
            .collect();
        let alerts = scan(&records, &strict);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].reading_id, "L03");
        assert_eq!(alerts[0].range, "400.0 - 1200.0");
    }
}
