use serde_json::Value;

use crate::client::AutomationClient;
use crate::entity_map::ResolvedEntity;
use crate::error::Result;
use crate::model::{AutomationResource, Config};
use crate::value::Properties;

use super::{rendered_body, resolved_id};

pub async fn dispatch(
    client: &AutomationClient,
    resource: AutomationResource,
    config: &Config,
    properties: &Properties,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let body = rendered_body(config, rendered)?;
    let id = match &config.origin_object_id {
        Some(origin) => origin.clone(),
        None => config.coordinate.uuid().to_string(),
    };

    let response = client.upsert(resource, &id, &body).await?;
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
