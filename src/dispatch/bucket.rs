use serde_json::Value;

use crate::client::BucketClient;
use crate::entity_map::ResolvedEntity;
use crate::error::Result;
use crate::model::Config;
use crate::value::Properties;

use super::rendered_body;

pub async fn dispatch(
    client: &BucketClient,
    config: &Config,
    properties: &Properties,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let body = rendered_body(config, rendered)?;
    let id = config
        .origin_object_id
        .clone()
        .unwrap_or_else(|| config.coordinate.bucket_id());

    client.upsert(&id, &body).await?;

    let mut result_properties = properties.clone();
    result_properties.insert("id", id);

    Ok(ResolvedEntity {
        coordinate: config.coordinate.clone(),
        entity_name: properties.get("name").and_then(Value::as_str).map(str::to_string),
        properties: result_properties,
        skip: false,
    })
}
