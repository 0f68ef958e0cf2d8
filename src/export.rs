//! Tabular export of every stored reading.
//!
//! One row per (greenhouse, reading) pair in a fixed column order. The field
//! delimiter is configurable and must differ from the decimal separator, so
//! decimal-comma exports stay parseable.

use std::io;

use thiserror::Error;

use crate::models::{format_decimal, DecodedRecord};

// ---

pub const COLUMNS: [&str; 6] = [
    "greenhouse_id",
    "reading_id",
    "timestamp",
    "sensor_ref",
    "type",
    "value",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid export format: {0}")]
    InvalidFormat(String),

    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv buffer flush failed: {0}")]
    Io(#[from] io::Error),

    #[error("encoded export is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    delimiter: u8,
    decimal_separator: char,
}

impl ExportFormat {
    /// `delimiter` must be a single ASCII character other than a quote or a
    /// line break; `decimal_separator` is `.` or `,` and differs from it.
    pub fn new(delimiter: char, decimal_separator: char) -> Result<Self, ExportError> {
        // ---
        if !delimiter.is_ascii() || matches!(delimiter, '"' | '\n' | '\r') {
            return Err(ExportError::InvalidFormat(format!(
                "unsupported delimiter {delimiter:?}"
            )));
        }
        if !matches!(decimal_separator, '.' | ',') {
            return Err(ExportError::InvalidFormat(format!(
                "decimal separator must be '.' or ',', got {decimal_separator:?}"
            )));
        }
        if delimiter == decimal_separator {
            return Err(ExportError::InvalidFormat(format!(
                "delimiter and decimal separator are both {delimiter:?}"
            )));
        }
        Ok(Self {
            delimiter: delimiter as u8,
            decimal_separator,
        })
    }

    pub fn delimiter(&self) -> char {
        self.delimiter as char
    }

    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    fn format_value(&self, value: f64) -> String {
        // ---
        let text = format_decimal(value);
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self {
            delimiter: b';',
            decimal_separator: '.',
        }
    }
}

/// One flattened reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    // ---
    pub greenhouse_id: String,
    pub reading_id: String,
    pub timestamp: String,
    pub sensor_ref: String,
    pub sensor_type: String,
    pub value: f64,
}

/// Rows for every reading, records in the given order and readings in
/// document order.
pub fn flatten(records: &[DecodedRecord]) -> Vec<ExportRow> {
    // ---
    records
        .iter()
        .flat_map(|decoded| {
            let record = &decoded.record;
            record.readings.iter().map(move |r| ExportRow {
                greenhouse_id: record.greenhouse_id.clone(),
                reading_id: r.id.clone(),
                timestamp: r.timestamp.clone(),
                sensor_ref: r.sensor_ref.clone(),
                sensor_type: r.sensor_type.clone(),
                value: r.value,
            })
        })
        .collect()
}

/// Serialize rows with a header line. No rows produce an empty string.
pub fn encode(rows: &[ExportRow], format: ExportFormat) -> Result<String, ExportError> {
    // ---
    if rows.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(COLUMNS)?;
    for row in rows {
        let value = format.format_value(row.value);
        writer.write_record([
            row.greenhouse_id.as_str(),
            row.reading_id.as_str(),
            row.timestamp.as_str(),
            row.sensor_ref.as_str(),
            row.sensor_type.as_str(),
            value.as_str(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
