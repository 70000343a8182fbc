use indexmap::IndexMap;

use crate::coordinate::Coordinate;
use crate::parameter::Parameter;

/// Classic-API document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Dashboard,
    Notebook,
    Launchpad,
}

/// Automation resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationResource {
    Workflow,
    BusinessCalendar,
    SchedulingRule,
}

/// The tagged variant naming which upsert strategy a config uses.
#[derive(Debug, Clone)]
pub enum ConfigType {
    ClassicApi {
        api_id: String,
        parent_scope: Option<Coordinate>,
        /// Whether the server disallows two objects of this API sharing a name.
        unique_name: bool,
    },
    Settings {
        schema_id: String,
        schema_version: String,
        allow_all_user_permission: bool,
        ordered: bool,
    },
    Automation {
        resource: AutomationResource,
    },
    Bucket,
    Document {
        kind: DocumentKind,
        private: bool,
    },
    OpenPipeline {
        kind: String,
    },
    Segment,
    Slo,
}

impl ConfigType {
    pub fn name(&self) -> &'static str {
        match self {
            ConfigType::ClassicApi { .. } => "classic-api",
            ConfigType::Settings { .. } => "settings",
            ConfigType::Automation { .. } => "automation",
            ConfigType::Bucket => "bucket",
            ConfigType::Document { .. } => "document",
            ConfigType::OpenPipeline { .. } => "openpipeline",
            ConfigType::Segment => "segment",
            ConfigType::Slo => "slo",
        }
    }

    /// Whether two configs of this type deployed with the same resolved name
    /// collide. Classic APIs with `unique_name == true` are the canonical
    /// example; every other type either has no user-facing "name" concept
    /// shared across instances, or tolerates duplicates.
    pub fn disallows_duplicate_names(&self) -> bool {
        matches!(self, ConfigType::ClassicApi { unique_name: true, .. })
    }
}

/// The unit of deployment: a coordinate, the template producing its request
/// body, and the parameters that fill that template in.
#[derive(Debug, Clone)]
pub struct Config {
    pub coordinate: Coordinate,
    pub group: String,
    pub environment: String,
    pub config_type: ConfigType,
    pub origin_object_id: Option<String>,
    pub template: String,
    pub template_path: String,
    pub parameters: IndexMap<String, Parameter>,
}

impl Config {
    /// Whether the user declared this config skipped via the reserved `skip`
    /// parameter. Absence of the parameter means "not skipped".
    pub fn is_skip_literal(&self) -> bool {
        matches!(
            self.parameters.get("skip"),
            Some(Parameter::Value(serde_json::Value::Bool(true)))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_name_classic_api_disallows_duplicates() {
        let t = ConfigType::ClassicApi {
            api_id: "alerting-profile".into(),
            parent_scope: None,
            unique_name: true,
        };
        assert!(t.disallows_duplicate_names());
    }

    #[test]
    fn bucket_allows_duplicate_names() {
        assert!(!ConfigType::Bucket.disallows_duplicate_names());
    }
}
