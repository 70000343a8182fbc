use serde_json::Value;

use crate::client::ClassicApiClient;
use crate::entity_map::ResolvedEntity;
use crate::error::{DeployerError, Result};
use crate::model::Config;
use crate::value::Properties;

use super::{rendered_body, resolved_id};

/// Classic config-v1 APIs split into two identity strategies depending on
/// whether the API itself enforces unique names.
pub async fn dispatch(
    client: &ClassicApiClient,
    unique_name: bool,
    config: &Config,
    properties: &Properties,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let body = rendered_body(config, rendered)?;
    let scope = properties.get("scope").and_then(Value::as_str);
    let name = properties.get("name").and_then(Value::as_str);

    let id = if let Some(origin) = &config.origin_object_id {
        let response = client.update_or_create(scope, origin, &body).await?;
        resolved_id(&response).unwrap_or_else(|| origin.clone())
    } else if unique_name {
        dispatch_unique_name(client, scope, name, config, &body).await?
    } else {
        dispatch_non_unique_name(client, scope, name, config, &body).await?
    };

    let mut result_properties = properties.clone();
    result_properties.insert("id", id);
    if let Some(scope) = scope {
        result_properties.insert("scope", scope);
    }

    Ok(ResolvedEntity {
        coordinate: config.coordinate.clone(),
        entity_name: name.map(str::to_string),
        properties: result_properties,
        skip: false,
    })
}

async fn dispatch_unique_name(
    client: &ClassicApiClient,
    scope: Option<&str>,
    name: Option<&str>,
    config: &Config,
    body: &Value,
) -> Result<String> {
    let name = name.ok_or_else(|| DeployerError::ParameterResolve {
        coordinate: config.coordinate.clone(),
        environment: config.environment.clone(),
        parameter: "name".to_string(),
        message: "unique-name classic APIs require a resolved 'name' property".to_string(),
    })?;

    match client.find_unique_by_name(scope, name).await? {
        Some(id) => {
            client.update(scope, &id, body).await?;
            Ok(id)
        }
        None => {
            let created = client.create(scope, body).await?;
            resolved_id(&created).ok_or_else(|| DeployerError::Other(format!(
                "classic API create for {} returned no id",
                config.coordinate
            )))
        }
    }
}

async fn dispatch_non_unique_name(
    client: &ClassicApiClient,
    scope: Option<&str>,
    name: Option<&str>,
    config: &Config,
    body: &Value,
) -> Result<String> {
    let generated_id = config.coordinate.generated_id();
    if let Some(name) = name {
        let matches = client.find_all_by_name(scope, name).await?;
        if matches.len() == 1 {
            let id = matches[0]
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| DeployerError::Other(format!(
                    "classic API list for {} returned a match with no id",
                    config.coordinate
                )))?
                .to_string();
            client.update(scope, &id, body).await?;
            return Ok(id);
        }
    }
    client.update_or_create(scope, &generated_id, body).await?;
    Ok(generated_id)
}
