use common_utils::errors::CustomResult;

pub type TelemetryResult<T> = CustomResult<T, TelemetryError>;

/// Failures surfaced to the callers of [`crate::TelemetryQueryService`].
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Caller identity is missing or invalid")]
    InvalidCallerIdentity,
    #[error("Telemetry query could not be composed")]
    InvalidQuery,
    #[error("Time range must be a positive duration")]
    InvalidTimeRange,
    #[error("Telemetry query execution failed")]
    QueryExecutionFailure,
    #[error("Telemetry query result could not be materialized")]
    MaterializationFailure,
    #[error("Telemetry query did not complete within {0:?}")]
    RequestTimedOut(std::time::Duration),
}
