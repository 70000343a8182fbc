use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The stable logical identity of every config: `(project, type, configId)`.
///
/// Equality and ordering are structural. The string form `project:type:configId`
/// is used for deterministic tie-breaking in the scheduler and for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub project: String,
    #[serde(rename = "type")]
    pub config_type: String,
    pub config_id: String,
}

impl Coordinate {
    /// Builds a coordinate, rejecting any empty component.
    pub fn new(
        project: impl Into<String>,
        config_type: impl Into<String>,
        config_id: impl Into<String>,
    ) -> Result<Self, String> {
        let project = project.into();
        let config_type = config_type.into();
        let config_id = config_id.into();
        if project.is_empty() || config_type.is_empty() || config_id.is_empty() {
            return Err(format!(
                "coordinate components must be non-empty (got project='{project}', type='{config_type}', configId='{config_id}')"
            ));
        }
        Ok(Self {
            project,
            config_type,
            config_id,
        })
    }

    /// The deterministic external-id Dynatrace uses to find-or-create a settings
    /// or document object: `H(discriminator, coordinate)`.
    ///
    /// `discriminator` is the settings schema id for settings objects, or an
    /// empty string for documents (whose identity doesn't depend on a schema).
    pub fn external_id(&self, discriminator: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(discriminator.as_bytes());
        hasher.update([0]);
        hasher.update(self.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The synthetic object id of a bucket: `project_configId`.
    pub fn bucket_id(&self) -> String {
        format!("{}_{}", self.project, self.config_id)
    }

    /// The synthetic object id the generic "non-unique-name" classic API
    /// strategy generates when no server-assigned id is known yet: `project_type_configId`.
    pub fn generated_id(&self) -> String {
        format!("{}_{}_{}", self.project, self.config_type, self.config_id)
    }

    /// Deterministic UUID derived from this coordinate, used for automation
    /// resources that have no `originObjectId`.
    pub fn uuid(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, self.to_string().as_bytes())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.config_type, self.config_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Coordinate {
        Coordinate::new("alerting", "alerting-profile", "prod-alerts").unwrap()
    }

    #[test]
    fn rejects_empty_components() {
        assert!(Coordinate::new("", "t", "c").is_err());
        assert!(Coordinate::new("p", "", "c").is_err());
        assert!(Coordinate::new("p", "t", "").is_err());
    }

    #[test]
    fn display_matches_string_form() {
        assert_eq!(coord().to_string(), "alerting:alerting-profile:prod-alerts");
    }

    #[test]
    fn external_id_is_deterministic_and_discriminator_sensitive() {
        let c = coord();
        let a = c.external_id("builtin:x");
        let b = c.external_id("builtin:x");
        let d = c.external_id("builtin:y");
        assert_eq!(a, b);
        assert_ne!(a, d);
    }

    #[test]
    fn bucket_id_is_project_underscore_config_id() {
        let c = Coordinate::new("p", "bucket", "myB").unwrap();
        assert_eq!(c.bucket_id(), "p_myB");
    }

    #[test]
    fn uuid_is_stable_for_same_coordinate() {
        let c = coord();
        assert_eq!(c.uuid(), coord().uuid());
    }
}
