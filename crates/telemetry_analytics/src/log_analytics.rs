use std::{sync::Arc, time::Duration};

use admin_env::logger;
use common_utils::{
    errors::{ApplicationError, CustomResult},
    ext_traits::ConfigExt,
    fp_utils::when,
};
use error_stack::{report, ResultExt};
use masking::{PeekInterface, Secret};
use serde_json::Value;

use crate::types::{QueryExecutionError, RawTable, RawTableResult};

const STATISTICS_PREFERENCE: &str = "include-statistics=true";

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct LogAnalyticsConfig {
    pub endpoint: String,
    pub workspace_id: String,
    pub access_token: Secret<String>,
    pub request_timeout_secs: u64,
}

impl Default for LogAnalyticsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.loganalytics.io".to_string(),
            workspace_id: String::new(),
            access_token: Secret::default(),
            request_timeout_secs: 30,
        }
    }
}

impl LogAnalyticsConfig {
    pub fn validate(&self) -> Result<(), ApplicationError> {
        when(self.endpoint.is_default_or_empty(), || {
            Err(ApplicationError::InvalidConfigurationValueError(
                "Log analytics endpoint must not be empty".into(),
            ))
        })?;

        when(self.workspace_id.is_default_or_empty(), || {
            Err(ApplicationError::InvalidConfigurationValueError(
                "Log analytics workspace id must not be empty".into(),
            ))
        })?;

        when(self.access_token.peek().is_default_or_empty(), || {
            Err(ApplicationError::InvalidConfigurationValueError(
                "Log analytics access token must not be empty".into(),
            ))
        })?;

        when(self.request_timeout_secs.is_default_or_empty(), || {
            Err(ApplicationError::InvalidConfigurationValueError(
                "Log analytics request timeout must be greater than zero".into(),
            ))
        })
    }

    fn query_url(&self) -> String {
        format!(
            "{}/v1/workspaces/{}/query",
            self.endpoint.trim_end_matches('/'),
            self.workspace_id
        )
    }
}

/// Executes query text against a log store.
#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        time_range: time::Duration,
    ) -> CustomResult<RawTableResult, QueryExecutionError>;
}

#[async_trait::async_trait]
impl<T: LogStore + ?Sized> LogStore for Arc<T> {
    async fn execute(
        &self,
        query: &str,
        time_range: time::Duration,
    ) -> CustomResult<RawTableResult, QueryExecutionError> {
        (**self).execute(query, time_range).await
    }
}

#[derive(Debug, serde::Serialize)]
struct LogAnalyticsRequest<'a> {
    query: &'a str,
    timespan: String,
}

#[derive(Debug, serde::Deserialize)]
struct LogAnalyticsResponse {
    #[serde(default)]
    tables: Vec<RawTable>,
    statistics: Option<Value>,
}

impl LogAnalyticsResponse {
    fn into_primary_table(self) -> CustomResult<RawTableResult, QueryExecutionError> {
        let table = self
            .tables
            .into_iter()
            .next()
            .ok_or_else(|| report!(QueryExecutionError::MissingResult))?;

        Ok(RawTableResult {
            table,
            statistics: self.statistics,
        })
    }
}

/// Client of the Log Analytics query API.
#[derive(Clone, Debug)]
pub struct LogAnalyticsClient {
    client: reqwest::Client,
    config: Arc<LogAnalyticsConfig>,
}

impl LogAnalyticsClient {
    pub fn create(conf: &LogAnalyticsConfig) -> CustomResult<Self, QueryExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.request_timeout_secs))
            .build()
            .change_context(QueryExecutionError::RequestFailed)
            .attach_printable("Failed to construct the log analytics http client")?;

        Ok(Self {
            client,
            config: Arc::new(conf.clone()),
        })
    }
}

#[async_trait::async_trait]
impl LogStore for LogAnalyticsClient {
    async fn execute(
        &self,
        query: &str,
        time_range: time::Duration,
    ) -> CustomResult<RawTableResult, QueryExecutionError> {
        logger::debug!(query, timespan = %iso8601_timespan(time_range), "Executing log analytics query");

        let response = self
            .client
            .post(self.config.query_url())
            .bearer_auth(self.config.access_token.peek())
            .header("Prefer", STATISTICS_PREFERENCE)
            .json(&LogAnalyticsRequest {
                query,
                timespan: iso8601_timespan(time_range),
            })
            .send()
            .await
            .change_context(QueryExecutionError::RequestFailed)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(rejection(status, response.text().await));
        }

        response
            .json::<LogAnalyticsResponse>()
            .await
            .change_context(QueryExecutionError::DeserializationError)?
            .into_primary_table()
    }
}

/// Report for a non-success answer, carrying the body or the reason it could not be read.
fn rejection<E: std::fmt::Display>(
    status: reqwest::StatusCode,
    body: Result<String, E>,
) -> error_stack::Report<QueryExecutionError> {
    match body {
        Ok(body) => {
            logger::warn!(%status, "Log analytics rejected the query");
            report!(QueryExecutionError::ResponseNotOK(body))
                .attach_printable(format!("status code {status}"))
        }
        Err(error) => {
            logger::warn!(%status, %error, "Log analytics rejected the query with an unreadable body");
            report!(QueryExecutionError::ResponseNotOK(String::new()))
                .attach_printable(format!("status code {status}"))
                .attach_printable(format!("Failed to read the response body: {error}"))
        }
    }
}

/// ISO-8601 duration with millisecond precision, e.g. `PT3600S` or `PT1.500S`.
fn iso8601_timespan(range: time::Duration) -> String {
    let seconds = range.whole_seconds();
    let millis = range.subsec_milliseconds();
    if millis == 0 {
        format!("PT{seconds}S")
    } else {
        format!("PT{seconds}.{:03}S", millis.unsigned_abs())
    }
}
