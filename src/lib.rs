//! Plant wetness analysis service.
//!
//! Validates plant telemetry, filters it to a date range, renders a chart and
//! publishes it behind a time-limited link. Module boundaries follow the
//! pipeline:
//! - `schema` – body validation into typed records
//! - `filter` – date-range filtering and ordering
//! - `chart` – PNG rendering
//! - `artifacts` – storage and signed links
//! - `handler` – authentication, decoding and dispatch
//! - `routes` – HTTP transport
//! - `config` / `secrets` – startup configuration and secret resolution

pub mod artifacts;
pub mod chart;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod models;
pub mod routes;
pub mod schema;
pub mod secrets;

pub use config::Config;
pub use error::{AnalysisError, SchemaError};
pub use handler::{AnalysisResponse, Analyzer, Envelope};
pub use models::{ChartArtifact, DateRange, FilteredSeries, PlantCollection, PlantRecord};
