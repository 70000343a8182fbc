use serde_json::Value;

use crate::client::settings::decode_management_zone_id;
use crate::client::SettingsClient;
use crate::entity_map::ResolvedEntity;
use crate::error::{DeployerError, Result};
use crate::model::Config;
use crate::value::Properties;

use super::rendered_body;

const MANAGEMENT_ZONES_SCHEMA: &str = "builtin:management-zones";

#[allow(clippy::too_many_arguments)]
pub async fn dispatch(
    client: &SettingsClient,
    schema_id: &str,
    schema_version: &str,
    config: &Config,
    properties: &Properties,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let body = rendered_body(config, rendered)?;
    let scope = properties.get("scope").and_then(Value::as_str).ok_or_else(|| {
        DeployerError::ParameterResolve {
            coordinate: config.coordinate.clone(),
            environment: config.environment.clone(),
            parameter: "scope".to_string(),
            message: "settings configs require a resolved 'scope' property".to_string(),
        }
    })?;
    let insert_after = properties.get("insert_after").and_then(Value::as_str);
    let external_id = config.coordinate.external_id(schema_id);

    let result = client
        .upsert(schema_id, schema_version, scope, &external_id, body, insert_after)
        .await?;

    let id = if schema_id == MANAGEMENT_ZONES_SCHEMA {
        decode_management_zone_id(&result.object_id)?
    } else {
        result.object_id
    };

    let entity_name = properties
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{id}", config.coordinate.config_id));

    let mut result_properties = properties.clone();
    result_properties.insert("id", id);
    result_properties.insert("scope", scope);
    if !result_properties.contains_key("name") {
        result_properties.insert("name", entity_name.clone());
    }

    Ok(ResolvedEntity {
        coordinate: config.coordinate.clone(),
        entity_name: Some(entity_name),
        properties: result_properties,
        skip: false,
    })
}
