//! Telemetry log queries for the admin backend.
//!
//! A caller's identity is turned into a [`scope::ScopeDescriptor`], the descriptor is
//! woven into the query text by [`query::LogQueryComposer`], the composed text runs
//! against the log analytics workspace through a [`log_analytics::LogStore`], and the
//! tabular answer is materialized and de-anonymized before it reaches the caller.

pub mod core;
pub mod deanonymize;
pub mod enums;
pub mod errors;
pub mod health_check;
pub mod identity;
pub mod log_analytics;
pub mod materialize;
pub mod query;
pub mod scope;
pub mod settings;
pub mod types;

pub use self::{
    core::TelemetryQueryService,
    enums::{CallerIdentity, TelemetryAccess},
    errors::{TelemetryError, TelemetryResult},
    types::QueryResult,
};
