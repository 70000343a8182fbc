use serde_json::Value;

use crate::client::document::reject_classic_dashboard_payload;
use crate::client::DocumentClient;
use crate::entity_map::ResolvedEntity;
use crate::error::{DeployerError, Result};
use crate::model::{Config, DocumentKind};
use crate::value::Properties;

use super::rendered_body;

pub async fn dispatch(
    client: &DocumentClient,
    kind: DocumentKind,
    private: bool,
    config: &Config,
    properties: &Properties,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let body = rendered_body(config, rendered)?;
    if kind == DocumentKind::Dashboard {
        reject_classic_dashboard_payload(&body)?;
    }

    let external_id = config.coordinate.external_id("");
    let name = properties
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| config.coordinate.config_id.clone());

    let id = if let Some(origin) = &config.origin_object_id {
        match client.update(origin, &body).await {
            Ok(()) => origin.clone(),
            Err(err) if err.is_not_found() => {
                find_and_update_or_create(client, &external_id, &name, private, &body, config).await?
            }
            Err(err) => return Err(err),
        }
    } else {
        find_and_update_or_create(client, &external_id, &name, private, &body, config).await?
    };

    let mut result_properties = properties.clone();
    result_properties.insert("id", id);

    Ok(ResolvedEntity {
        coordinate: config.coordinate.clone(),
        entity_name: Some(name),
        properties: result_properties,
        skip: false,
    })
}

async fn find_and_update_or_create(
    client: &DocumentClient,
    external_id: &str,
    name: &str,
    private: bool,
    body: &Value,
    config: &Config,
) -> Result<String> {
    let matches = client.list_by_external_id(external_id).await?;
    match matches.as_slice() {
        [] => {
            let created = client.create(name, private, external_id, body, kind_of(config)).await?;
            created
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| DeployerError::Other(format!(
                    "document create for {} returned no id",
                    config.coordinate
                )))
        }
        [single] => {
            client.update(&single.id, body).await?;
            Ok(single.id.clone())
        }
        many => Err(DeployerError::Other(format!(
            "document external-id '{external_id}' for {} matched {} documents, expected at most one",
            config.coordinate,
            many.len()
        ))),
    }
}

fn kind_of(config: &Config) -> DocumentKind {
    match &config.config_type {
        crate::model::ConfigType::Document { kind, .. } => *kind,
        _ => unreachable!("document dispatch invoked for a non-document config"),
    }
}
