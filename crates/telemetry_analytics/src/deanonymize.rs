use std::collections::HashMap;

use admin_env::logger;
use common_utils::{errors::CustomResult, fp_utils::when};
use error_stack::{report, ResultExt};
use serde_json::Value;

use crate::{
    identity::{IdentityLookup, IdentityProfile},
    types::{properties, PropertiesBag, ResultRow},
};

/// Wire value standing for "this dimension does not apply to the event".
const NOT_APPLICABLE_SENTINEL: &str = "-1";

const NAME_KEYS: [&str; 3] = [
    properties::ORGANISATION_NAME,
    properties::DOMAIN_NAME,
    properties::USER_NAME,
];

#[derive(thiserror::Error, Debug)]
pub enum DeAnonymizationError {
    #[error("Identity {recorded} recorded on the event is no longer held by user {user_id}")]
    IdentityMismatch { recorded: String, user_id: i64 },
    #[error("Recorded {0} is not a numeric id")]
    InvalidIdentifier(&'static str),
    #[error("Failed to look up the identity of user {0}")]
    LookupFailed(i64),
}

/// One identity dimension as recorded on an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityDimension {
    Absent,
    NotApplicable,
    Id(String),
}

impl IdentityDimension {
    fn from_property(value: Option<&Value>) -> Self {
        let text = match value {
            None | Some(Value::Null) => return Self::Absent,
            Some(Value::String(text)) => text.trim().to_owned(),
            Some(other) => other.to_string(),
        };

        if text.is_empty() {
            Self::Absent
        } else if text == NOT_APPLICABLE_SENTINEL {
            Self::NotApplicable
        } else {
            Self::Id(text)
        }
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Absent | Self::NotApplicable => None,
        }
    }

    fn parse(&self, dimension: &'static str) -> CustomResult<i64, DeAnonymizationError> {
        self.as_id()
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| report!(DeAnonymizationError::InvalidIdentifier(dimension)))
    }
}

/// Organisation, domain and user an event was recorded against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityTriple {
    pub organisation_id: IdentityDimension,
    pub domain_id: IdentityDimension,
    pub user_id: IdentityDimension,
}

impl IdentityTriple {
    pub fn from_properties(bag: &PropertiesBag) -> Self {
        Self {
            organisation_id: IdentityDimension::from_property(bag.get(properties::ORGANISATION_ID)),
            domain_id: IdentityDimension::from_property(bag.get(properties::DOMAIN_ID)),
            user_id: IdentityDimension::from_property(bag.get(properties::USER_ID)),
        }
    }

    /// `"{organisation}-{domain}-{user}"`, only when all three dimensions carry an id.
    pub fn cache_key(&self) -> Option<String> {
        match (
            self.organisation_id.as_id(),
            self.domain_id.as_id(),
            self.user_id.as_id(),
        ) {
            (Some(organisation_id), Some(domain_id), Some(user_id)) => {
                Some(format!("{organisation_id}-{domain_id}-{user_id}"))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedNames {
    pub organisation_name: String,
    pub domain_name: String,
    pub user_name: String,
}

impl From<&IdentityProfile> for ResolvedNames {
    fn from(profile: &IdentityProfile) -> Self {
        Self {
            organisation_name: profile.organisation_name.clone(),
            domain_name: profile.domain_name.clone(),
            user_name: profile.user_name.clone(),
        }
    }
}

impl ResolvedNames {
    fn write_into(&self, bag: &mut PropertiesBag) {
        bag.insert(
            properties::ORGANISATION_NAME.to_owned(),
            Value::from(self.organisation_name.as_str()),
        );
        bag.insert(
            properties::DOMAIN_NAME.to_owned(),
            Value::from(self.domain_name.as_str()),
        );
        bag.insert(
            properties::USER_NAME.to_owned(),
            Value::from(self.user_name.as_str()),
        );
    }
}

#[derive(Clone, Debug)]
enum CacheEntry {
    Resolved(ResolvedNames),
    Mismatched { user_id: i64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeAnonymizationSummary {
    pub resolved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Missing, `null` and whitespace-only strings are blank. Any other value is kept.
fn is_blank(bag: &PropertiesBag, key: &str) -> bool {
    match bag.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(value)) => value.trim().is_empty(),
        Some(_) => false,
    }
}

/// Fills in the names of anonymized events from the identity repository.
///
/// Rows are processed one after another against a cache that lives for a single
/// [`DeAnonymizer::populate`] call, so each distinct identity is looked up once per
/// request.
#[derive(Debug)]
pub struct DeAnonymizer<'a, I: ?Sized> {
    identity: &'a I,
}

impl<'a, I> DeAnonymizer<'a, I>
where
    I: IdentityLookup + ?Sized,
{
    pub fn new(identity: &'a I) -> Self {
        Self { identity }
    }

    pub async fn populate(&self, rows: &mut [ResultRow]) -> DeAnonymizationSummary {
        let mut cache = HashMap::new();
        let mut summary = DeAnonymizationSummary::default();

        for (index, row) in rows.iter_mut().enumerate() {
            let Some(bag) = row.properties_mut() else {
                summary.skipped += 1;
                continue;
            };

            match self.populate_bag(bag, &mut cache).await {
                Ok(true) => summary.resolved += 1,
                Ok(false) => summary.skipped += 1,
                Err(error) => {
                    summary.failed += 1;
                    logger::error!(row = index, ?error, "Failed to de-anonymize telemetry row");
                }
            }
        }

        logger::debug!(?summary, identities = cache.len(), "De-anonymization finished");
        summary
    }

    async fn populate_bag(
        &self,
        bag: &mut PropertiesBag,
        cache: &mut HashMap<String, CacheEntry>,
    ) -> CustomResult<bool, DeAnonymizationError> {
        let triple = IdentityTriple::from_properties(bag);
        let Some(key) = triple.cache_key() else {
            return Ok(false);
        };
        if !NAME_KEYS.iter().any(|name_key| is_blank(bag, name_key)) {
            return Ok(false);
        }

        let names = match cache.get(&key).cloned() {
            Some(CacheEntry::Resolved(names)) => names,
            Some(CacheEntry::Mismatched { user_id }) => {
                return Err(report!(DeAnonymizationError::IdentityMismatch {
                    recorded: key,
                    user_id,
                }))
            }
            None => match self.resolve(&triple, &key).await {
                Ok(names) => {
                    cache.insert(key, CacheEntry::Resolved(names.clone()));
                    names
                }
                Err(error) => {
                    if let DeAnonymizationError::IdentityMismatch { user_id, .. } =
                        error.current_context()
                    {
                        cache.insert(key, CacheEntry::Mismatched { user_id: *user_id });
                    }
                    return Err(error);
                }
            },
        };

        names.write_into(bag);
        Ok(true)
    }

    async fn resolve(
        &self,
        triple: &IdentityTriple,
        key: &str,
    ) -> CustomResult<ResolvedNames, DeAnonymizationError> {
        let organisation_id = triple.organisation_id.parse("organisation id")?;
        let domain_id = triple.domain_id.parse("domain id")?;
        let user_id = triple.user_id.parse("user id")?;

        let profile = self
            .identity
            .find_identity_by_user_id(user_id)
            .await
            .change_context(DeAnonymizationError::LookupFailed(user_id))?;

        // The user id may have been reassigned since the event was recorded.
        when(
            profile.user_id != user_id
                || profile.organisation_id != organisation_id
                || profile.domain_id != domain_id,
            || {
                Err(report!(DeAnonymizationError::IdentityMismatch {
                    recorded: key.to_owned(),
                    user_id,
                }))
                .attach_printable(format!(
                    "repository holds {}-{}-{}",
                    profile.organisation_id, profile.domain_id, profile.user_id
                ))
            },
        )?;

        Ok(ResolvedNames::from(&profile))
    }
}
