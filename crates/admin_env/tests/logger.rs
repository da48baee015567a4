#![allow(clippy::unwrap_used)]

use admin_env::{logger, Flow, TelemetryGuard};

fn init_logger() -> &'static TelemetryGuard {
    use admin_env::once_cell::sync::OnceCell;

    static INSTANCE: OnceCell<TelemetryGuard> = OnceCell::new();
    INSTANCE.get_or_init(|| {
        let config = admin_env::Config::new().unwrap();

        admin_env::setup(&config.log, "admin_env_test", ["admin_env", "logger"])
    })
}

#[tokio::test]
async fn basic() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logger();

    let span = admin_env::tracing::info_span!("request", flow = %Flow::TelemetryRawQuery);
    let _entered = span.enter();
    logger::info!(rows = 3, "materialized telemetry rows");
    logger::warn!("de-anonymization skipped for row");

    Ok(())
}

#[test]
fn flow_names_are_stable() {
    assert_eq!(Flow::TelemetryRawQuery.to_string(), "TelemetryRawQuery");
    assert_eq!(
        Flow::TelemetryStructuredQuery.to_string(),
        "TelemetryStructuredQuery"
    );
}

#[test]
fn config_falls_back_to_defaults() {
    let config = admin_env::Config::new().unwrap();
    assert!(!config.log.file.path.is_empty());
}
