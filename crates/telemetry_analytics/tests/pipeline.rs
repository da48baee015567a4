#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::{sync::Arc, time::Duration};

use common_utils::errors::CustomResult;
use error_stack::ResultExt;
use serde_json::{json, Value};
use telemetry_analytics::{
    enums::RoleConfig,
    identity::{IdentityProfile, MockIdentityStore},
    log_analytics::LogStore,
    settings::{Settings, TelemetrySettings},
    types::{properties, QueryExecutionError, RawTable, RawTableResult},
    CallerIdentity, TelemetryError, TelemetryQueryService,
};
use tokio::sync::Mutex;

fn init_logger() -> &'static admin_env::TelemetryGuard {
    use admin_env::once_cell::sync::OnceCell;

    static INSTANCE: OnceCell<admin_env::TelemetryGuard> = OnceCell::new();
    INSTANCE.get_or_init(|| {
        let settings = Settings::new().unwrap();

        admin_env::setup(
            &settings.log,
            admin_env::service_name!(),
            ["telemetry_analytics", "pipeline"],
        )
    })
}

/// Log store answering every query with the same table and recording the query text.
#[derive(Clone)]
struct CannedLogStore {
    table: Value,
    delay: Option<Duration>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl CannedLogStore {
    fn answering(table: Value) -> Self {
        Self {
            table,
            delay: None,
            queries: Arc::default(),
        }
    }

    async fn last_query(&self) -> String {
        self.queries.lock().await.last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl LogStore for CannedLogStore {
    async fn execute(
        &self,
        query: &str,
        _time_range: time::Duration,
    ) -> CustomResult<RawTableResult, QueryExecutionError> {
        self.queries.lock().await.push(query.to_owned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let table: RawTable = serde_json::from_value(self.table.clone())
            .change_context(QueryExecutionError::DeserializationError)?;
        Ok(RawTableResult {
            table,
            statistics: Some(json!({ "query": { "executionTime": 0.042 } })),
        })
    }
}

fn events_table() -> Value {
    json!({
        "name": "PrimaryResult",
        "columns": [
            { "name": "TimeGenerated", "type": "datetime" },
            { "name": "Name", "type": "string" },
            { "name": "Properties", "type": "dynamic" }
        ],
        "rows": [
            [
                "2024-03-01T10:00:00Z",
                "DatasetDownloaded",
                "{\"OrganisationId\":\"5\",\"DomainId\":\"7\",\"UserId\":\"9\",\"UserName\":\"\"}"
            ],
            [
                "2024-03-01T09:00:00Z",
                "DatasetDownloaded",
                "{\"OrganisationId\":\"5\",\"DomainId\":\"7\",\"UserId\":\"9\",\"UserName\":\"\"}"
            ],
            [
                "2024-03-01T08:00:00Z",
                "UserLoggedIn",
                "{\"OrganisationId\":\"5\",\"DomainId\":\"7\",\"UserId\":\"-1\"}"
            ]
        ]
    })
}

fn identities() -> MockIdentityStore {
    MockIdentityStore::with_profiles([IdentityProfile {
        user_id: 9,
        organisation_id: 5,
        organisation_name: "Heritage Trust".to_owned(),
        domain_id: 7,
        domain_name: "Archives".to_owned(),
        user_name: "Ada Lovelace".to_owned(),
    }])
}

fn caller(roles: &[&str]) -> CallerIdentity {
    CallerIdentity::from_role_names(roles, &RoleConfig::default(), 5, 7, 9)
}

fn service(
    store: &CannedLogStore,
    identities: &MockIdentityStore,
    app_role_name: Option<&str>,
) -> TelemetryQueryService<CannedLogStore, MockIdentityStore> {
    let settings = TelemetrySettings {
        app_role_name: app_role_name.map(str::to_owned),
        ..TelemetrySettings::default()
    };
    TelemetryQueryService::new(store.clone(), identities.clone(), &settings)
}

#[tokio::test]
async fn raw_query_is_scoped_and_de_anonymized() {
    init_logger();
    let store = CannedLogStore::answering(events_table());
    let identities = identities();
    let service = service(&store, &identities, None);

    let result = service
        .run_raw_query(
            "AppEvents | where Name == 'DatasetDownloaded' | serialize | take 10",
            time::Duration::days(1),
            &caller(&["Analyst"]),
        )
        .await
        .unwrap();

    assert_eq!(
        store.last_query().await,
        "AppEvents | where Name == 'DatasetDownloaded' | where Properties.OrganisationId == 5 \
         and Properties.DomainId == 7 and Properties.UserId == 9 | serialize | take 10"
    );
    assert_eq!(result.total_row_count, 3);
    assert_eq!(result.rows.len(), result.total_row_count);
    assert_eq!(result.execution_time, time::Duration::milliseconds(42));

    let first = result.rows[0].properties().unwrap();
    assert_eq!(first[properties::USER_NAME], "Ada Lovelace");
    assert_eq!(first[properties::ORGANISATION_NAME], "Heritage Trust");
    assert!(result.rows[2]
        .properties()
        .unwrap()
        .get(properties::USER_NAME)
        .is_none());
    // Both rows share one identity and the third is not applicable.
    assert_eq!(identities.lookup_count().await, 1);
}

#[tokio::test]
async fn system_administrator_raw_query_is_sent_unchanged() {
    let store = CannedLogStore::answering(events_table());
    let identities = identities();
    let service = service(&store, &identities, None);
    let raw = "AppEvents\n| where Name has \"Login\"\n| serialize | take 5";

    service
        .run_raw_query(raw, time::Duration::hours(6), &caller(&["SystemAdministrator"]))
        .await
        .unwrap();

    assert_eq!(store.last_query().await, raw);
}

#[tokio::test]
async fn structured_query_for_an_organisation_administrator() {
    init_logger();
    let store = CannedLogStore::answering(events_table());
    let identities = identities();
    let service = service(&store, &identities, Some("admin-prod"));

    service
        .run_structured_query(
            None,
            &["where Name == 'DatasetDownloaded'"],
            time::Duration::days(7),
            &caller(&["organisationadministrator"]),
        )
        .await
        .unwrap();

    assert_eq!(
        store.last_query().await,
        "AppEvents | where Name == 'DatasetDownloaded' | where AppRoleName == \"admin-prod\" \
         and Properties.OrganisationId == 5 and Properties.DomainId == 7 \
         | order by TimeGenerated desc"
    );
}

#[tokio::test]
async fn structured_query_without_filters_appends_the_scope() {
    let store = CannedLogStore::answering(events_table());
    let identities = identities();
    let service = service(&store, &identities, None);

    service
        .run_structured_query(
            Some("AppTraces"),
            &["take 100"],
            time::Duration::hours(1),
            &caller(&[]),
        )
        .await
        .unwrap();

    assert_eq!(
        store.last_query().await,
        "AppTraces | take 100 | where Properties.OrganisationId == 5 and \
         Properties.DomainId == 7 and Properties.UserId == 9 | order by TimeGenerated desc"
    );
}

#[tokio::test]
async fn invalid_callers_never_reach_the_store() {
    let store = CannedLogStore::answering(events_table());
    let identities = identities();
    let service = service(&store, &identities, None);
    let mut caller = caller(&["Analyst"]);
    caller.user_id = 0;

    let error = service
        .run_raw_query("AppEvents", time::Duration::hours(1), &caller)
        .await
        .unwrap_err();

    assert!(matches!(
        error.current_context(),
        TelemetryError::InvalidCallerIdentity
    ));
    assert!(store.queries.lock().await.is_empty());
}

#[tokio::test]
async fn caller_input_errors_are_reported_as_invalid_queries() {
    let store = CannedLogStore::answering(events_table());
    let identities = identities();
    let service = service(&store, &identities, None);
    let caller = caller(&["Analyst"]);

    let empty = service
        .run_raw_query("   ", time::Duration::hours(1), &caller)
        .await
        .unwrap_err();
    assert!(matches!(empty.current_context(), TelemetryError::InvalidQuery));

    let union = service
        .run_raw_query(
            "AppEvents | union AppTraces | serialize",
            time::Duration::hours(1),
            &caller,
        )
        .await
        .unwrap_err();
    assert!(matches!(union.current_context(), TelemetryError::InvalidQuery));

    let commented_out = service
        .run_structured_query(
            None,
            &["take 100 //"],
            time::Duration::hours(1),
            &caller,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        commented_out.current_context(),
        TelemetryError::InvalidQuery
    ));

    let second_statement = service
        .run_raw_query(
            "AppEvents | take 1000; AppEvents | take 1",
            time::Duration::hours(1),
            &caller,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        second_statement.current_context(),
        TelemetryError::InvalidQuery
    ));

    let time_range = service
        .run_raw_query("AppEvents", time::Duration::ZERO, &caller)
        .await
        .unwrap_err();
    assert!(matches!(
        time_range.current_context(),
        TelemetryError::InvalidTimeRange
    ));

    assert!(store.queries.lock().await.is_empty());
}

#[tokio::test]
async fn unknown_column_types_fail_the_request() {
    let store = CannedLogStore::answering(json!({
        "name": "PrimaryResult",
        "columns": [{ "name": "Id", "type": "uuid" }],
        "rows": []
    }));
    let identities = identities();
    let service = service(&store, &identities, None);

    let error = service
        .run_raw_query("AppEvents", time::Duration::hours(1), &caller(&["Analyst"]))
        .await
        .unwrap_err();

    assert!(matches!(
        error.current_context(),
        TelemetryError::MaterializationFailure
    ));
}

#[tokio::test]
async fn slow_store_times_out() {
    let mut store = CannedLogStore::answering(events_table());
    store.delay = Some(Duration::from_secs(5));
    let identities = identities();
    let service =
        service(&store, &identities, None).with_request_timeout(Duration::from_millis(20));

    let error = service
        .run_raw_query("AppEvents", time::Duration::hours(1), &caller(&["Analyst"]))
        .await
        .unwrap_err();

    assert!(matches!(
        error.current_context(),
        TelemetryError::RequestTimedOut(timeout) if *timeout == Duration::from_millis(20)
    ));
    assert_eq!(identities.lookup_count().await, 0);
}

#[tokio::test]
async fn deep_health_check_runs_a_trivial_query() {
    let store = CannedLogStore::answering(json!({
        "name": "PrimaryResult",
        "columns": [{ "name": "print_0", "type": "long" }],
        "rows": [[1]]
    }));
    let identities = identities();
    let service = service(&store, &identities, None);

    service.deep_health_check().await.unwrap();

    assert_eq!(store.last_query().await, "print 1");
}
