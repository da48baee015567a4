use common_utils::errors::CustomResult;
use error_stack::ResultExt;

use crate::{log_analytics::LogStore, types::QueryExecutionError};

/// Smallest query a workspace answers with a table.
pub const HEALTH_CHECK_QUERY: &str = "print 1";

#[async_trait::async_trait]
pub trait HealthCheck {
    async fn deep_health_check(&self) -> CustomResult<(), QueryExecutionError>;
}

#[async_trait::async_trait]
impl<S> HealthCheck for S
where
    S: LogStore + ?Sized,
{
    async fn deep_health_check(&self) -> CustomResult<(), QueryExecutionError> {
        self.execute(HEALTH_CHECK_QUERY, time::Duration::minutes(5))
            .await
            .attach_printable("Log analytics health check query failed")
            .map(|_| ())
    }
}
