//! Ingestion of one submission.
//!
//! A submission moves strictly forward through [`Stage`]s and stops at the
//! first failure, before anything is persisted:
//!
//! ```text
//! Received -> SchemaValidated -> Decoded -> RuleChecked -> Persisted -> Accepted
//! ```
//!
//! The rule check only observes. Out-of-range readings are logged and the
//! submission is still persisted; they surface later through alert scans.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::decoder;
use crate::error::{Result, ServiceError};
use crate::rules::{RuleEngine, Verdict};
use crate::schema::SchemaValidator;
use crate::store::RecordStore;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    SchemaValidated,
    Decoded,
    RuleChecked,
    Persisted,
    Accepted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::SchemaValidated => "schema_validated",
            Stage::Decoded => "decoded",
            Stage::RuleChecked => "rule_checked",
            Stage::Persisted => "persisted",
            Stage::Accepted => "accepted",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    // ---
    pub record_id: String,
    pub greenhouse_id: String,
    pub readings: usize,
    /// Readings outside their configured range at ingest time.
    pub out_of_range: usize,
}

pub struct Pipeline<'a> {
    validator: &'a SchemaValidator,
    rules: &'a RuleEngine,
    store: &'a dyn RecordStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        validator: &'a SchemaValidator,
        rules: &'a RuleEngine,
        store: &'a dyn RecordStore,
    ) -> Self {
        Self {
            validator,
            rules,
            store,
        }
    }

    /// Run one submission through every stage.
    pub fn ingest(&self, raw: &[u8]) -> Result<Accepted> {
        // ---
        let mut stage = Stage::Received;
        let result = self.run(raw, &mut stage);
        if let Err(e) = &result {
            match e {
                ServiceError::Internal(_) => error!(after = %stage, error = %e, "submission failed"),
                _ => warn!(after = %stage, kind = e.kind(), error = %e, "submission rejected"),
            }
        }
        result
    }

    fn run(&self, raw: &[u8], stage: &mut Stage) -> Result<Accepted> {
        // ---
        debug!(bytes = raw.len(), "submission received");

        let text = std::str::from_utf8(raw)
            .map_err(|e| ServiceError::Malformed(format!("body is not valid UTF-8: {e}")))?;
        let doc = self.validator.validate(text)?;
        advance(stage, Stage::SchemaValidated);

        let record = decoder::decode(&doc)?;
        let record_id = record
            .record_id()
            .ok_or_else(|| ServiceError::StructuralDecode("document has no readings".to_string()))?
            .to_string();
        advance(stage, Stage::Decoded);

        let rules = self.rules.snapshot();
        let mut out_of_range = 0;
        for reading in &record.readings {
            if let Verdict::OutOfRange(range) = rules.evaluate(&reading.sensor_type, reading.value)
            {
                out_of_range += 1;
                warn!(
                    record_id = %record_id,
                    reading_id = %reading.id,
                    sensor_type = %reading.sensor_type,
                    value = reading.value,
                    range = %range,
                    "reading outside configured range"
                );
            }
        }
        advance(stage, Stage::RuleChecked);

        self.store.put(&record_id, raw)?;
        advance(stage, Stage::Persisted);

        advance(stage, Stage::Accepted);
        info!(
            record_id = %record_id,
            greenhouse_id = %record.greenhouse_id,
            readings = record.readings.len(),
            out_of_range,
            "submission accepted"
        );

        Ok(Accepted {
            record_id,
            greenhouse_id: record.greenhouse_id,
            readings: record.readings.len(),
            out_of_range,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!(from = %stage, to = %next, "pipeline stage");
    *stage = next;
}
