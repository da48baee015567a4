use std::time::Duration;

use admin_env::{
    logger,
    tracing::instrument,
    Flow,
};
use common_utils::{
    errors::{ApplicationError, CustomResult},
    fp_utils::when,
};
use error_stack::{report, ResultExt};

use crate::{
    enums::CallerIdentity,
    errors::{TelemetryError, TelemetryResult},
    health_check::HealthCheck,
    identity::IdentityLookup,
    log_analytics::{LogAnalyticsClient, LogStore},
    materialize::ResultMaterializer,
    query::LogQueryComposer,
    scope::{QueryScopeProvider, ScopeDescriptor},
    settings::{Settings, TelemetrySettings},
    types::QueryResult,
};

/// Runs telemetry queries on behalf of an authenticated caller.
///
/// Every query is confined to the caller's scope before it reaches the store, and the
/// rows that come back are de-anonymized before they are returned.
#[derive(Debug)]
pub struct TelemetryQueryService<S, I> {
    store: S,
    identity: I,
    scope_provider: QueryScopeProvider,
    composer: LogQueryComposer,
    request_timeout: Duration,
}

impl<I: IdentityLookup> TelemetryQueryService<LogAnalyticsClient, I> {
    pub fn from_conf(settings: &Settings, identity: I) -> CustomResult<Self, ApplicationError> {
        settings.validate().map_err(|error| report!(error))?;

        let store = LogAnalyticsClient::create(&settings.log_analytics).change_context(
            ApplicationError::ConfigurationError(
                "Unable to create the log analytics client".into(),
            ),
        )?;

        Ok(Self::new(store, identity, &settings.telemetry))
    }
}

impl<S, I> TelemetryQueryService<S, I>
where
    S: LogStore,
    I: IdentityLookup,
{
    pub fn new(store: S, identity: I, settings: &TelemetrySettings) -> Self {
        Self {
            store,
            identity,
            scope_provider: QueryScopeProvider::new(settings.app_role_name.clone()),
            composer: LogQueryComposer::new(settings.default_table.clone()),
            request_timeout: settings.request_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[instrument(skip_all, fields(flow = %Flow::TelemetryRawQuery, access = %caller.access))]
    pub async fn run_raw_query(
        &self,
        raw_query: &str,
        time_range: time::Duration,
        caller: &CallerIdentity,
    ) -> TelemetryResult<QueryResult> {
        let scope = self.scope_for(caller, time_range)?;
        let query = self
            .composer
            .rewrite_raw_query(raw_query, &scope)
            .change_context(TelemetryError::InvalidQuery)?;

        self.execute(&query, time_range).await
    }

    #[instrument(
        skip_all,
        fields(flow = %Flow::TelemetryStructuredQuery, access = %caller.access, table = ?table_name)
    )]
    pub async fn run_structured_query<Q: AsRef<str>>(
        &self,
        table_name: Option<&str>,
        search_clauses: &[Q],
        time_range: time::Duration,
        caller: &CallerIdentity,
    ) -> TelemetryResult<QueryResult> {
        let scope = self.scope_for(caller, time_range)?;
        let query = self
            .composer
            .build_structured_query(table_name, search_clauses, &scope)
            .change_context(TelemetryError::InvalidQuery)?;

        self.execute(&query, time_range).await
    }

    #[instrument(skip_all, fields(flow = %Flow::DeepHealthCheck))]
    pub async fn deep_health_check(&self) -> TelemetryResult<()> {
        self.store
            .deep_health_check()
            .await
            .change_context(TelemetryError::QueryExecutionFailure)
    }

    fn scope_for(
        &self,
        caller: &CallerIdentity,
        time_range: time::Duration,
    ) -> TelemetryResult<ScopeDescriptor> {
        let scope = self
            .scope_provider
            .scope_for(caller)
            .change_context(TelemetryError::InvalidCallerIdentity)?;

        when(!time_range.is_positive(), || {
            Err(report!(TelemetryError::InvalidTimeRange))
                .attach_printable(format!("time range {time_range} is not positive"))
        })?;

        Ok(scope)
    }

    /// The store call and the de-anonymization of its answer share one deadline.
    async fn execute(
        &self,
        query: &str,
        time_range: time::Duration,
    ) -> TelemetryResult<QueryResult> {
        logger::debug!(query, "Composed telemetry query");

        let result = tokio::time::timeout(self.request_timeout, async {
            let raw = self
                .store
                .execute(query, time_range)
                .await
                .change_context(TelemetryError::QueryExecutionFailure)?;

            ResultMaterializer::new(&self.identity)
                .materialize(raw)
                .await
                .change_context(TelemetryError::MaterializationFailure)
        })
        .await
        .map_err(|_| report!(TelemetryError::RequestTimedOut(self.request_timeout)))??;

        logger::info!(
            rows = result.total_row_count,
            execution_time = %result.execution_time,
            "Telemetry query completed"
        );
        Ok(result)
    }
}
