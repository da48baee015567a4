use serde::Deserialize;

/// Which slice of the emitted telemetry a caller may read.
///
/// Resolved once from the caller's role names at the authorization boundary, see
/// [`TelemetryAccess::from_role_names`].
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, serde::Serialize, serde::Deserialize, strum::Display,
)]
pub enum TelemetryAccess {
    /// Every organisation, domain and user.
    AllTelemetry,
    /// Every domain and user of the caller's own organisation.
    OrganisationTelemetry,
    /// Only events the caller emitted.
    OwnTelemetry,
}

/// Role names granting elevated telemetry access, compared case-insensitively.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoleConfig {
    pub system_admin_roles: Vec<String>,
    pub organisation_admin_roles: Vec<String>,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            system_admin_roles: vec!["SystemAdministrator".to_string()],
            organisation_admin_roles: vec!["OrganisationAdministrator".to_string()],
        }
    }
}

impl TelemetryAccess {
    /// System administrator roles win over organisation administrator roles; callers
    /// holding neither only see their own telemetry.
    pub fn from_role_names<S: AsRef<str>>(roles: &[S], role_config: &RoleConfig) -> Self {
        let holds_any = |candidates: &[String]| {
            roles.iter().any(|role| {
                candidates
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(role.as_ref().trim()))
            })
        };

        if holds_any(&role_config.system_admin_roles) {
            Self::AllTelemetry
        } else if holds_any(&role_config.organisation_admin_roles) {
            Self::OrganisationTelemetry
        } else {
            Self::OwnTelemetry
        }
    }
}

/// An authenticated caller as resolved by the identity layer.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallerIdentity {
    pub access: TelemetryAccess,
    pub organisation_id: i64,
    pub domain_id: i64,
    pub user_id: i64,
}

impl CallerIdentity {
    pub fn from_role_names<S: AsRef<str>>(
        roles: &[S],
        role_config: &RoleConfig,
        organisation_id: i64,
        domain_id: i64,
        user_id: i64,
    ) -> Self {
        Self {
            access: TelemetryAccess::from_role_names(roles, role_config),
            organisation_id,
            domain_id,
            user_id,
        }
    }
}
