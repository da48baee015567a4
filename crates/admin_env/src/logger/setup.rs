//!
//! Setup logging subsystem.
//!

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use super::config;

/// Keeps the non-blocking log writers alive; logs are flushed when it is dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    _log_guards: Vec<WorkerGuard>,
}

///
/// Setup logging sub-system specifying.
/// Expects config and list of names of crates to watch.
///
pub fn setup<Str: AsRef<str>>(
    conf: &config::Log,
    service_name: &str,
    crates_to_watch: impl IntoIterator<Item = Str>,
) -> TelemetryGuard {
    let mut guards = Vec::new();
    let crates_to_watch = crates_to_watch
        .into_iter()
        .map(|krate| krate.as_ref().to_owned())
        .collect::<Vec<_>>();

    let file_layer = if conf.file.enabled {
        let mut path = crate::env::workspace_path();
        path.push(&conf.file.path);
        let file_appender = tracing_appender::rolling::hourly(&path, &conf.file.file_name);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        guards.push(guard);

        let file_filter = get_filter(conf.file.level.into_level(), &crates_to_watch);
        Some(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(file_writer)
                .with_filter(file_filter),
        )
    } else {
        None
    };

    // `RUST_LOG` overrides the configured directives.
    let subscriber = tracing_subscriber::registry().with(file_layer).with(
        EnvFilter::builder()
            .with_default_directive(filter::LevelFilter::TRACE.into())
            .from_env_lossy(),
    );

    if conf.console.enabled {
        let (console_writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(guard);

        let console_filter = conf
            .console
            .filtering_directive
            .as_deref()
            .and_then(|directive| directive.parse::<filter::Targets>().ok())
            .unwrap_or_else(|| get_filter(conf.console.level.into_level(), &crates_to_watch));

        match conf.console.log_format {
            config::LogFormat::Default => {
                let logging_layer = fmt::layer()
                    .with_timer(fmt::time::time())
                    .with_span_events(fmt::format::FmtSpan::CLOSE)
                    .pretty()
                    .with_writer(console_writer)
                    .with_filter(console_filter);

                subscriber.with(logging_layer).try_init().ok();
            }
            config::LogFormat::Json => {
                let logging_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(console_writer)
                    .with_filter(console_filter);

                subscriber.with(logging_layer).try_init().ok();
            }
        }
    } else {
        subscriber.try_init().ok();
    }

    tracing::debug!(service = service_name, "logging subsystem initialised");

    // Returning the WorkerGuard for logs to be printed until it is dropped
    TelemetryGuard {
        _log_guards: guards,
    }
}

fn get_filter(level: tracing::Level, crates_to_watch: &[String]) -> filter::Targets {
    crates_to_watch
        .iter()
        .fold(
            filter::Targets::new().with_default(tracing::Level::WARN),
            |targets, krate| targets.with_target(krate.clone(), level),
        )
}
