use base64::Engine;
use reqwest::Method;
use serde_json::{Value, json};

use crate::error::{DeployerError, Result};

use super::transport::HttpTransport;

/// Typed wrapper over the settings 2.0 objects API
/// (`POST /api/v2/settings/objects`). The server performs find-or-create
/// keyed by `externalId`, so there is no separate create/update verb —
/// `upsert` is the only write operation this resource exposes.
#[derive(Clone)]
pub struct SettingsClient {
    transport: HttpTransport,
}

pub struct SettingsUpsertResult {
    pub object_id: String,
}

impl SettingsClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        schema_id: &str,
        schema_version: &str,
        scope: &str,
        external_id: &str,
        value: Value,
        insert_after: Option<&str>,
    ) -> Result<SettingsUpsertResult> {
        let mut entry = json!({
            "schemaId": schema_id,
            "schemaVersion": schema_version,
            "scope": scope,
            "externalId": external_id,
            "value": value,
        });
        if let Some(insert_after) = insert_after {
            entry["insertAfter"] = Value::String(insert_after.to_string());
        }
        let body = Value::Array(vec![entry]);

        let response = self
            .transport
            .request_json(Method::POST, "api/v2/settings/objects", Some(&body))
            .await?;

        let first = response
            .as_array()
            .and_then(|items| items.first())
            .ok_or_else(|| DeployerError::Transport {
                url: "api/v2/settings/objects".to_string(),
                message: "empty settings upsert response".to_string(),
            })?;

        if let Some(error) = first.get("error") {
            return Err(DeployerError::Response {
                environment: self.transport.environment().to_string(),
                status: error.get("code").and_then(Value::as_u64).unwrap_or(0) as u16,
                body: error.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
            });
        }

        let object_id = first
            .get("objectId")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployerError::Transport {
                url: "api/v2/settings/objects".to_string(),
                message: "settings upsert response missing objectId".to_string(),
            })?
            .to_string();

        Ok(SettingsUpsertResult { object_id })
    }

    /// Lists every settings object for `schema_id`, optionally narrowed to
    /// one `scope` — the downloader's entry point into this API.
    pub async fn list(&self, schema_id: &str, scope: Option<&str>) -> Result<Vec<Value>> {
        let path = match scope {
            Some(scope) => format!("api/v2/settings/objects?schemaIds={schema_id}&scopes={scope}"),
            None => format!("api/v2/settings/objects?schemaIds={schema_id}"),
        };
        self.transport.list_paginated(&path, "items").await
    }
}

/// Decodes a management-zones settings object id. Dynatrace encodes the
/// numeric management-zone id as base64 inside the generic settings
/// `objectId`; the dispatcher stores the decoded numeric id as
/// `properties.id` so other configs can reference it the way they'd
/// reference a classic management-zone id.
pub fn decode_management_zone_id(object_id: &str) -> Result<String> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(object_id)
        .map_err(|err| DeployerError::Other(format!("invalid management-zone objectId: {err}")))?;
    let text = String::from_utf8(decoded)
        .map_err(|err| DeployerError::Other(format!("invalid management-zone objectId: {err}")))?;
    // Dynatrace encodes "<numeric-id>@<schema>" - the numeric prefix is the id.
    Ok(text.split('@').next().unwrap_or(&text).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numeric_prefix_from_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("-1472644358166052855@NONE");
        assert_eq!(decode_management_zone_id(&encoded).unwrap(), "-1472644358166052855");
    }
}
