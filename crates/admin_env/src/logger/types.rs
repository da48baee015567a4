//! Types.

use strum::Display;
pub use tracing::Level;

/// API Flow
///
/// Recorded on the request span so that every log line emitted while serving a
/// request can be attributed to the operation that produced it.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Deep health check against the log analytics workspace
    DeepHealthCheck,
    /// Telemetry query from caller supplied query text
    TelemetryRawQuery,
    /// Telemetry query assembled from a table name and search clauses
    TelemetryStructuredQuery,
}
