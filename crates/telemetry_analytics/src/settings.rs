use std::path::PathBuf;

use admin_env::config::Log;
use common_utils::{
    errors::{ApplicationError, CustomResult},
    ext_traits::ConfigExt,
    fp_utils::when,
};
use error_stack::ResultExt;
use serde::Deserialize;

use crate::{enums::RoleConfig, log_analytics::LogAnalyticsConfig, query::DEFAULT_TABLE};

const ENV_PREFIX: &str = "TELEMETRY";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub log: Log,
    pub log_analytics: LogAnalyticsConfig,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Confines every query to the telemetry of this application role when set.
    pub app_role_name: Option<String>,
    pub default_table: String,
    #[serde(flatten)]
    pub roles: RoleConfig,
    /// Bounds the store call and the de-anonymization of its answer together.
    pub request_timeout_secs: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            app_role_name: None,
            default_table: DEFAULT_TABLE.to_string(),
            roles: RoleConfig::default(),
            request_timeout_secs: 60,
        }
    }
}

impl TelemetrySettings {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        when(self.default_table.is_default_or_empty(), || {
            Err(ApplicationError::InvalidConfigurationValueError(
                "telemetry default table must not be empty".into(),
            ))
        })?;

        when(self.request_timeout_secs.is_default_or_empty(), || {
            Err(ApplicationError::InvalidConfigurationValueError(
                "telemetry request timeout must be greater than zero".into(),
            ))
        })?;

        when(
            self.roles
                .system_admin_roles
                .iter()
                .chain(&self.roles.organisation_admin_roles)
                .any(|role| role.is_default_or_empty()),
            || {
                Err(ApplicationError::InvalidConfigurationValueError(
                    "telemetry administrator role names must not be blank".into(),
                ))
            },
        )
    }
}

impl Settings {
    pub fn new() -> CustomResult<Self, ApplicationError> {
        Self::with_config_path(None)
    }

    /// `config/default.toml`, then the file of the current environment (or
    /// `config_path`), then `TELEMETRY__`-prefixed environment variables.
    pub fn with_config_path(config_path: Option<PathBuf>) -> CustomResult<Self, ApplicationError> {
        let environment = admin_env::which();
        let config_path = admin_env::Config::config_path(environment.config_path(), config_path);

        let config = admin_env::Config::builder(environment.config_path())
            .change_context(ApplicationError::ConfigurationError(
                "Unable to set up the configuration defaults".into(),
            ))?
            .add_source(config::File::from(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("telemetry.system_admin_roles")
                    .with_list_parse_key("telemetry.organisation_admin_roles"),
            )
            .build()
            .change_context(ApplicationError::ConfigurationError(
                "Unable to read the configuration sources".into(),
            ))?;

        config
            .try_deserialize()
            .change_context(ApplicationError::ConfigurationError(
                "Unable to deserialize the application configuration".into(),
            ))
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        self.log_analytics.validate()?;
        self.telemetry.validate()
    }
}
