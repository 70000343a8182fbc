use serde_json::Value;

use crate::client::GenericUpsertClient;
use crate::config::{FeatureFlag, FeatureFlags};
use crate::entity_map::ResolvedEntity;
use crate::error::{DeployerError, Result};
use crate::model::Config;
use crate::value::Properties;

use super::{rendered_body, resolved_id};

/// Shared dispatch path for openpipeline, segment, and SLO configs: upsert
/// by a coordinate-derived id, gated by the feature flag the caller
/// resolved for this config's type.
pub async fn dispatch(
    client: &GenericUpsertClient,
    flag: FeatureFlag,
    flags: &FeatureFlags,
    config: &Config,
    properties: &Properties,
    rendered: &str,
) -> Result<ResolvedEntity> {
    if !flags.is_enabled(flag) {
        return Err(DeployerError::UnsupportedType {
            coordinate: config.coordinate.clone(),
            environment: config.environment.clone(),
            config_type: config.config_type.name().to_string(),
            reason: format!("feature flag '{}' is disabled", flag.name()),
        });
    }

    let body = rendered_body(config, rendered)?;
    let id = config
        .origin_object_id
        .clone()
        .unwrap_or_else(|| config.coordinate.generated_id());

    let response = client.upsert(&id, &body).await?;
    let resolved = resolved_id(&response).unwrap_or(id);

    let mut result_properties = properties.clone();
    result_properties.insert("id", resolved);

    Ok(ResolvedEntity {
        coordinate: config.coordinate.clone(),
        entity_name: properties.get("name").and_then(Value::as_str).map(str::to_string),
        properties: result_properties,
        skip: false,
    })
}
