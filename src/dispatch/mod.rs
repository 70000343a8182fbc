//! The resource dispatcher: a single `deploy` façade that selects the
//! per-kind upsert strategy and identity resolution for a config.
//!
//! Each submodule owns one kind's strategy; this module only owns the match
//! that routes a [`Config`] to its client and strategy, plus the two small
//! helpers (`rendered_body`, `resolved_id`) every strategy needs.

mod automation;
mod bucket;
mod classic_api;
mod document;
mod platform;
mod settings;

use serde_json::Value;

use crate::client::EnvironmentClients;
use crate::config::{FeatureFlag, FeatureFlags};
use crate::entity_map::ResolvedEntity;
use crate::error::{DeployerError, Result};
use crate::model::{Config, ConfigType};
use crate::value::Properties;

/// Deploys one config's rendered body to its environment, returning the
/// resolved entity on success.
///
/// Every error returned here is wrapped as a `ConfigDeployError` attributed
/// to `config`'s coordinate and environment, regardless of which strategy
/// produced it.
pub async fn deploy(
    clients: &EnvironmentClients,
    feature_flags: &FeatureFlags,
    config: &Config,
    properties: &Properties,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let result = match &config.config_type {
        ConfigType::ClassicApi { api_id, unique_name, .. } => {
            let client = clients.classic_api(api_id);
            classic_api::dispatch(&client, *unique_name, config, properties, rendered).await
        }
        ConfigType::Settings { schema_id, schema_version, .. } => {
            let client = clients.settings();
            settings::dispatch(&client, schema_id, schema_version, config, properties, rendered).await
        }
        ConfigType::Automation { resource } => {
            let client = clients.automation();
            automation::dispatch(&client, *resource, config, properties, rendered).await
        }
        ConfigType::Bucket => {
            let client = clients.bucket();
            bucket::dispatch(&client, config, properties, rendered).await
        }
        ConfigType::Document { kind, private } => {
            let client = clients.document();
            document::dispatch(&client, *kind, *private, config, properties, rendered).await
        }
        ConfigType::OpenPipeline { kind } => {
            let client = clients.openpipeline(kind);
            platform::dispatch(&client, FeatureFlag::OpenPipeline, feature_flags, config, properties, rendered).await
        }
        ConfigType::Segment => {
            let client = clients.segment();
            platform::dispatch(&client, FeatureFlag::Segments, feature_flags, config, properties, rendered).await
        }
        ConfigType::Slo => {
            let client = clients.slo();
            platform::dispatch(&client, FeatureFlag::SloV2, feature_flags, config, properties, rendered).await
        }
    };
    result.map_err(|err| err.into_config_deploy(&config.coordinate, &config.environment))
}

/// Parses the rendered template into the JSON body strategies send over the
/// wire. Rendering already validated this parses; this just converts it into
/// a `Value` so strategies can merge in an `id` for PUT-or-POST and similar.
fn rendered_body(config: &Config, rendered: &str) -> Result<Value> {
    serde_json::from_str(rendered).map_err(|err| DeployerError::InvalidJson {
        coordinate: config.coordinate.clone(),
        template_path: config.template_path.clone(),
        message: err.to_string(),
    })
}

/// Pulls `id` out of a server response, when the response carries one as a
/// plain string field. Strategies that already know the id (bucket,
/// settings) don't need this; strategies that let the server assign one do.
fn resolved_id(response: &Value) -> Option<String> {
    response.get("id").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::Coordinate;

    fn config() -> Config {
        Config {
            coordinate: Coordinate::new("p", "alerting-profile", "a").unwrap(),
            group: "default".into(),
            environment: "prod".into(),
            config_type: ConfigType::Bucket,
            origin_object_id: None,
            template: "{}".into(),
            template_path: "template.json".into(),
            parameters: indexmap::IndexMap::new(),
        }
    }

    #[test]
    fn rendered_body_rejects_invalid_json() {
        let err = rendered_body(&config(), "not json").unwrap_err();
        assert!(matches!(err, DeployerError::InvalidJson { .. }));
    }

    #[test]
    fn resolved_id_reads_string_id_field() {
        let value = serde_json::json!({"id": "srv-1"});
        assert_eq!(resolved_id(&value), Some("srv-1".to_string()));
        assert_eq!(resolved_id(&serde_json::json!({})), None);
    }
}
