//! Configuration loader for the `greenhouse-telemetry` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Paths are resolved relative to the working
//! directory unless given as absolute paths.
//!
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::export::ExportFormat;

/// Parse an optional environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Root of everything the service writes.
    pub data_dir: PathBuf,

    /// Structural schema definition for submissions.
    pub schema_path: PathBuf,

    /// Factory rule template, never written by the service.
    pub default_rules_path: PathBuf,

    /// Address the HTTP server binds to.
    pub listen_addr: IpAddr,

    /// Port the HTTP server binds to.
    pub listen_port: u16,

    /// Delimiter and decimal separator for `/api/exportar`.
    pub export_format: ExportFormat,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATA_DIR` – data root (default: `data`)
/// - `SCHEMA_PATH` – schema definition (default: `schema/greenhouse.schema.json`)
/// - `DEFAULT_RULES_PATH` – default rules (default: `config/default_rules.json`)
/// - `LISTEN_ADDR` – bind address (default: `127.0.0.1`)
/// - `LISTEN_PORT` – bind port (default: 5000)
/// - `EXPORT_DELIMITER` – export field delimiter (default: `;`)
/// - `EXPORT_DECIMAL_SEPARATOR` – export decimal separator (default: `.`)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let data_dir = PathBuf::from(env_or!("DATA_DIR", "data"));
    let schema_path = PathBuf::from(env_or!("SCHEMA_PATH", "schema/greenhouse.schema.json"));
    let default_rules_path =
        PathBuf::from(env_or!("DEFAULT_RULES_PATH", "config/default_rules.json"));
    let listen_addr = parse_env!("LISTEN_ADDR", IpAddr, IpAddr::from([127, 0, 0, 1]));
    let listen_port = parse_env!("LISTEN_PORT", u16, 5000);
    let delimiter = parse_env!("EXPORT_DELIMITER", char, ';');
    let decimal_separator = parse_env!("EXPORT_DECIMAL_SEPARATOR", char, '.');

    let export_format = ExportFormat::new(delimiter, decimal_separator)
        .map_err(|e| anyhow!("Invalid EXPORT_DELIMITER/EXPORT_DECIMAL_SEPARATOR: {}", e))?;

    Ok(Config {
        data_dir,
        schema_path,
        default_rules_path,
        listen_addr,
        listen_port,
        export_format,
    })
}

impl Config {
    /// Directory holding one file per accepted record.
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    /// Live rule set, bootstrapped from `default_rules_path`.
    pub fn live_rules_path(&self) -> PathBuf {
        self.data_dir.join("rules.json")
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.listen_port)
    }

    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATA_DIR                 : {}", self.data_dir.display());
        tracing::info!("  SCHEMA_PATH              : {}", self.schema_path.display());
        tracing::info!("  DEFAULT_RULES_PATH       : {}", self.default_rules_path.display());
        tracing::info!("  LISTEN                   : {}", self.socket_addr());
        tracing::info!("  EXPORT_DELIMITER         : {:?}", self.export_format.delimiter());
        tracing::info!(
            "  EXPORT_DECIMAL_SEPARATOR : {:?}",
            self.export_format.decimal_separator()
        );
    }
}
