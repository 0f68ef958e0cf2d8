//! Greenhouse telemetry core.
//!
//! Submissions are XML documents describing one greenhouse, its sensors and a
//! batch of readings. The core validates them against a declarative schema,
//! decodes them into [`models::CanonicalRecord`]s, and stores accepted ones
//! verbatim, one record per natural id. Alerts and exports are recomputed
//! from stored state and the live rule set on every request.
//!
//! Module layout follows the data flow:
//! - `schema` → `decoder` → `pipeline` → `store` for ingestion
//! - `config_store` + `rules` for the hot-reloadable range rules
//! - `alerts` and `export` for the derived views
//! - `service` bundles the operations; `routes` exposes them over HTTP

pub mod alerts;
pub mod config;
pub mod config_store;
pub mod decoder;
pub mod error;
pub mod export;
mod fsutil;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod rules;
pub mod schema;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{ErrorCategory, ServiceError};
pub use service::TelemetryService;
