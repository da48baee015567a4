use common_utils::{errors::CustomResult, fp_utils::when};
use error_stack::report;

use crate::enums::{CallerIdentity, TelemetryAccess};

#[derive(thiserror::Error, Debug)]
pub enum ScopeError {
    #[error("Caller identity has a non-positive {0}")]
    InvalidIdentity(&'static str),
}

/// Restrictions applied to every query a caller runs.
///
/// A `restrict_by_*` flag that is `false` keeps the matching id out of the query text
/// altogether, whatever value the id holds.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScopeDescriptor {
    pub restrict_by_app_role: bool,
    pub app_role_name: Option<String>,
    pub restrict_by_organisation: bool,
    pub organisation_id: i64,
    pub restrict_by_domain: bool,
    pub domain_id: i64,
    pub restrict_by_user: bool,
    pub user_id: i64,
}

impl ScopeDescriptor {
    pub fn is_unrestricted(&self) -> bool {
        !(self.restrict_by_app_role
            || self.restrict_by_organisation
            || self.restrict_by_domain
            || self.restrict_by_user)
    }
}

/// Derives the [`ScopeDescriptor`] of a caller.
#[derive(Clone, Debug, Default)]
pub struct QueryScopeProvider {
    app_role_name: Option<String>,
}

impl QueryScopeProvider {
    /// `app_role_name` names the telemetry emitted by this deployment; when set every
    /// query is confined to it regardless of the caller's access.
    pub fn new(app_role_name: Option<String>) -> Self {
        Self {
            app_role_name: app_role_name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty()),
        }
    }

    pub fn scope_for(&self, caller: &CallerIdentity) -> CustomResult<ScopeDescriptor, ScopeError> {
        when(caller.organisation_id <= 0, || {
            Err(report!(ScopeError::InvalidIdentity("organisation id")))
        })?;
        when(caller.domain_id <= 0, || {
            Err(report!(ScopeError::InvalidIdentity("domain id")))
        })?;
        when(caller.user_id <= 0, || {
            Err(report!(ScopeError::InvalidIdentity("user id")))
        })?;

        let (restrict_by_organisation, restrict_by_domain, restrict_by_user) = match caller.access
        {
            TelemetryAccess::AllTelemetry => (false, false, false),
            TelemetryAccess::OrganisationTelemetry => (true, true, false),
            TelemetryAccess::OwnTelemetry => (true, true, true),
        };

        Ok(ScopeDescriptor {
            restrict_by_app_role: self.app_role_name.is_some(),
            app_role_name: self.app_role_name.clone(),
            restrict_by_organisation,
            organisation_id: caller.organisation_id,
            restrict_by_domain,
            domain_id: caller.domain_id,
            restrict_by_user,
            user_id: caller.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::enums::RoleConfig;

    fn caller(roles: &[&str]) -> CallerIdentity {
        CallerIdentity::from_role_names(roles, &RoleConfig::default(), 5, 7, 9)
    }

    #[test]
    fn system_administrator_is_not_scoped_to_an_organisation() {
        let scope = QueryScopeProvider::new(None)
            .scope_for(&caller(&["SystemAdministrator"]))
            .unwrap();

        assert!(!scope.restrict_by_organisation);
        assert!(!scope.restrict_by_domain);
        assert!(!scope.restrict_by_user);
        assert!(scope.is_unrestricted());
    }

    #[test]
    fn organisation_administrator_is_scoped_to_organisation_and_domain() {
        let scope = QueryScopeProvider::new(None)
            .scope_for(&caller(&["OrganisationAdministrator"]))
            .unwrap();

        assert!(scope.restrict_by_organisation);
        assert!(scope.restrict_by_domain);
        assert!(!scope.restrict_by_user);
        assert_eq!((scope.organisation_id, scope.domain_id), (5, 7));
    }

    #[test]
    fn other_callers_only_see_themselves() {
        let scope = QueryScopeProvider::new(None)
            .scope_for(&caller(&["Analyst"]))
            .unwrap();

        assert!(scope.restrict_by_organisation && scope.restrict_by_domain && scope.restrict_by_user);
        assert_eq!(
            (scope.organisation_id, scope.domain_id, scope.user_id),
            (5, 7, 9)
        );
    }

    #[test]
    fn app_role_restriction_applies_to_every_caller() {
        let provider = QueryScopeProvider::new(Some("datashare-admin-prod".to_string()));

        let role_sets: [&[&str]; 3] = [&["SystemAdministrator"], &["OrganisationAdministrator"], &[]];
        for roles in role_sets {
            let scope = provider.scope_for(&caller(roles)).unwrap();
            assert!(scope.restrict_by_app_role);
            assert_eq!(scope.app_role_name.as_deref(), Some("datashare-admin-prod"));
        }
    }

    #[test]
    fn blank_app_role_name_disables_the_restriction() {
        let scope = QueryScopeProvider::new(Some("  ".to_string()))
            .scope_for(&caller(&["Analyst"]))
            .unwrap();

        assert!(!scope.restrict_by_app_role);
        assert_eq!(scope.app_role_name, None);
    }

    #[test]
    fn non_positive_identity_is_rejected() {
        let mut identity = caller(&["SystemAdministrator"]);
        identity.domain_id = 0;

        let error = QueryScopeProvider::new(None).scope_for(&identity).unwrap_err();
        assert!(matches!(
            error.current_context(),
            ScopeError::InvalidIdentity("domain id")
        ));
    }
}
