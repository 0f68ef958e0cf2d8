//! The operations the telemetry core offers to its transport.
//!
//! [`TelemetryService`] owns one schema validator, one rule engine and one
//! record store. Every operation is synchronous and re-reads the state it
//! needs: nothing about records or rules is cached between calls.

use anyhow::Context;
use tracing::debug;

use crate::alerts;
use crate::config::Config;
use crate::config_store::ConfigStore;
use crate::decoder;
use crate::error::Result;
use crate::export::{self, ExportFormat};
use crate::models::{Alert, CanonicalRecord, DecodedRecord};
use crate::pipeline::{Accepted, Pipeline};
use crate::rules::{RuleEngine, RuleSet};
use crate::schema::SchemaValidator;
use crate::store::{FsRecordStore, RecordStore};

// ---

pub struct TelemetryService {
    validator: SchemaValidator,
    rules: RuleEngine,
    store: Box<dyn RecordStore>,
    export_format: ExportFormat,
}

impl TelemetryService {
    pub fn new(
        validator: SchemaValidator,
        rules: RuleEngine,
        store: impl RecordStore + 'static,
        export_format: ExportFormat,
    ) -> Self {
        Self {
            validator,
            rules,
            store: Box::new(store),
            export_format,
        }
    }

    /// Wire the filesystem-backed service from loaded configuration.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        // ---
        let validator = SchemaValidator::load(&cfg.schema_path);
        let rules = RuleEngine::new(ConfigStore::new(
            cfg.live_rules_path(),
            &cfg.default_rules_path,
        ));
        let store = FsRecordStore::open(cfg.records_dir()).with_context(|| {
            format!("failed to open record store at '{}'", cfg.records_dir().display())
        })?;
        Ok(Self::new(validator, rules, store, cfg.export_format))
    }

    pub fn schema_available(&self) -> bool {
        self.validator.is_available()
    }

    /// Validate, decode and persist one submission.
    pub fn ingest(&self, raw: &[u8]) -> Result<Accepted> {
        Pipeline::new(&self.validator, &self.rules, &*self.store).ingest(raw)
    }

    /// Every stored record, decoded, ordered by record id.
    pub fn list_records(&self) -> Result<Vec<CanonicalRecord>> {
        // ---
        let records = self.decoded_records()?;
        debug!(records = records.len(), "listing records");
        Ok(records.into_iter().map(|d| d.record).collect())
    }

    /// Readings that violate the rule set as it is right now.
    pub fn list_alerts(&self) -> Result<Vec<Alert>> {
        // ---
        let rules = self.rules.snapshot();
        let records = self.decoded_records()?;
        let alerts = alerts::scan(&records, &rules);
        debug!(records = records.len(), alerts = alerts.len(), "alert scan complete");
        Ok(alerts)
    }

    pub fn get_config(&self) -> RuleSet {
        self.rules.config().load()
    }

    pub fn put_config(&self, payload: &[u8]) -> Result<RuleSet> {
        Ok(self.rules.config().update(payload)?)
    }

    pub fn reset_config(&self) -> Result<RuleSet> {
        // ---
        self.rules.config().reset()?;
        Ok(self.rules.config().load())
    }

    /// Delimited text of every stored reading; empty when nothing is stored.
    pub fn export_rows(&self) -> Result<String> {
        // ---
        let rows = export::flatten(&self.decoded_records()?);
        let text = export::encode(&rows, self.export_format)?;
        debug!(rows = rows.len(), "export encoded");
        Ok(text)
    }

    pub fn delete_all_records(&self) -> Result<usize> {
        Ok(self.store.delete_all()?)
    }

    fn decoded_records(&self) -> Result<Vec<DecodedRecord>> {
        Ok(decoder::decode_stored(self.store.list_all()?))
    }
}
