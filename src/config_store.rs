//! Live and default rule configuration on disk.
//!
//! Two JSON files hold a sensor type → `{min, max}` mapping: the default
//! template, shipped with the deployment and never written here, and the live
//! file, which is bootstrapped from the template on first read and replaced
//! whole on every update or reset.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::fsutil;
use crate::rules::{Range, RuleSet};

// ---

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    InvalidPayload(String),

    #[error("failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize rule set: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    live_path: PathBuf,
    default_path: PathBuf,
}

impl ConfigStore {
    pub fn new(live_path: impl Into<PathBuf>, default_path: impl Into<PathBuf>) -> Self {
        Self {
            live_path: live_path.into(),
            default_path: default_path.into(),
        }
    }

    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    /// Current live rule set.
    ///
    /// Copies the default template into place if the live file is missing.
    /// Any failure after that degrades to an empty rule set, which means "no
    /// constraints configured".
    pub fn load(&self) -> RuleSet {
        // ---
        if let Err(e) = self.bootstrap() {
            warn!(error = %e, "could not bootstrap live configuration, using empty rule set");
            return RuleSet::new();
        }

        let bytes = match fs::read(&self.live_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.live_path.display(), error = %e, "live configuration unreadable, using empty rule set");
                return RuleSet::new();
            }
        };

        match serde_json::from_slice::<RuleSet>(&bytes) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(path = %self.live_path.display(), error = %e, "live configuration unparsable, using empty rule set");
                RuleSet::new()
            }
        }
    }

    /// Replace the live rule set with `payload`.
    ///
    /// The payload must be a JSON object of `type → {min, max}` with numeric
    /// bounds, `min <= max` and non-empty type names.
    pub fn update(&self, payload: &[u8]) -> Result<RuleSet, ConfigError> {
        // ---
        let rules = parse_payload(payload)?;
        let bytes = serde_json::to_vec_pretty(&rules)?;

        self.ensure_parent()?;
        fsutil::replace_atomic(&self.live_path, &bytes).map_err(io_error(&self.live_path))?;

        info!(rules = rules.len(), "live configuration updated");
        Ok(rules)
    }

    /// Overwrite the live file with the default template, verbatim.
    pub fn reset(&self) -> Result<(), ConfigError> {
        // ---
        let template = fs::read(&self.default_path).map_err(io_error(&self.default_path))?;

        self.ensure_parent()?;
        fsutil::replace_atomic(&self.live_path, &template).map_err(io_error(&self.live_path))?;

        info!(path = %self.live_path.display(), "live configuration reset to defaults");
        Ok(())
    }

    fn bootstrap(&self) -> Result<(), ConfigError> {
        // ---
        if self.live_path.exists() {
            return Ok(());
        }
        let template = fs::read(&self.default_path).map_err(io_error(&self.default_path))?;

        self.ensure_parent()?;
        let created = fsutil::create_new_atomic(&self.live_path, &template)
            .map_err(io_error(&self.live_path))?;
        if created {
            info!(
                from = %self.default_path.display(),
                to = %self.live_path.display(),
                "live configuration bootstrapped from defaults"
            );
        }
        Ok(())
    }

    fn ensure_parent(&self) -> Result<(), ConfigError> {
        // ---
        match self.live_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir).map_err(io_error(dir))
            }
            _ => Ok(()),
        }
    }
}

fn parse_payload(payload: &[u8]) -> Result<RuleSet, ConfigError> {
    // ---
    let raw: BTreeMap<String, Range> = serde_json::from_slice(payload)
        .map_err(|e| ConfigError::InvalidPayload(format!("expected a type -> {{min, max}} mapping: {e}")))?;

    for (sensor_type, range) in &raw {
        if sensor_type.trim().is_empty() {
            return Err(ConfigError::InvalidPayload(
                "sensor type names must not be empty".to_string(),
            ));
        }
        if range.min > range.max {
            return Err(ConfigError::InvalidPayload(format!(
                "range for '{}' has min {} above max {}",
                sensor_type, range.min, range.max
            )));
        }
    }
    Ok(raw.into_iter().collect())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use tempfile::TempDir;

    const DEFAULTS: &str = r#"{
  "pH": { "min": 5.5, "max": 6.5 },
  "temperatura": { "min": 18.0, "max": 30.0 }
}
"#;

    fn temp_store() -> (TempDir, ConfigStore) {
        // ---
        let dir = TempDir::new().expect("create tempdir");
        let default_path = dir.path().join("default_rules.json");
        fs::write(&default_path, DEFAULTS).unwrap();
        let store = ConfigStore::new(dir.path().join("live").join("rules.json"), default_path);
        (dir, store)
    }

    #[test]
    fn test_load_bootstraps_verbatim_copy() {
        // ---
        let (_dir, store) = temp_store();
        assert!(!store.live_path().exists());

        let rules = store.load();
        assert_eq!(rules.get("pH"), Some(&Range::new(5.5, 6.5)));
        assert_eq!(fs::read_to_string(store.live_path()).unwrap(), DEFAULTS);
    }

    #[test]
    fn test_load_does_not_overwrite_existing_live_file() {
        // ---
        let (_dir, store) = temp_store();
        store.update(br#"{"co2": {"min": 400, "max": 1200}}"#).unwrap();

        let rules = store.load();
        assert_eq!(rules.len(), 1);
        assert!(rules.get("pH").is_none());
    }

    #[test]
    fn test_unparsable_live_file_degrades_to_empty() {
        // ---
        let (_dir, store) = temp_store();
        store.load();
        fs::write(store.live_path(), "{ not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_missing_default_degrades_to_empty() {
        // ---
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("rules.json"), dir.path().join("missing.json"));
        assert!(store.load().is_empty());
        assert!(store.reset().is_err());
    }

    #[test]
    fn test_update_rejects_invalid_payloads() {
        // ---
        let (_dir, store) = temp_store();
        let bad: [&[u8]; 6] = [
            b"not json",
            b"[1, 2]",
            br#"{"pH": {"min": "low", "max": 6}}"#,
            br#"{"pH": {"min": 5}}"#,
            br#"{"pH": {"min": 7, "max": 6}}"#,
            br#"{"pH": {"min": 5, "max": 6, "avg": 5.5}}"#,
        ];
        for payload in bad {
            let err = store.update(payload).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidPayload(_)),
                "{}",
                String::from_utf8_lossy(payload)
            );
        }
        // Rejected updates leave the live file alone.
        assert_eq!(store.load().get("pH"), Some(&Range::new(5.5, 6.5)));
    }

    #[test]
    fn test_reset_restores_defaults() {
        // ---
        let (_dir, store) = temp_store();
        store.update(br#"{"pH": {"min": 1, "max": 2}}"#).unwrap();
        store.update(br#"{}"#).unwrap();
        assert!(store.load().is_empty());

        store.reset().unwrap();
        let expected: RuleSet = serde_json::from_str(DEFAULTS).unwrap();
        assert_eq!(store.load(), expected);
    }
}
