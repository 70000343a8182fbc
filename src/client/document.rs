use reqwest::Method;
use serde_json::{Value, json};

use crate::error::{DeployerError, Result};
use crate::model::DocumentKind;

use super::transport::HttpTransport;

const DOCUMENTS_PATH: &str = "platform/document/v1/documents";

#[derive(Debug, Clone)]
pub struct DocumentListEntry {
    pub id: String,
    pub external_id: String,
}

/// Typed wrapper over the platform documents API (dashboards, notebooks,
/// launchpads). Documents have no server-side upsert-by-external-id verb —
/// the three-step create-then-find-then-update dance lives in the
/// dispatcher, this client only exposes the primitives it needs.
#[derive(Clone)]
pub struct DocumentClient {
    transport: HttpTransport,
}

impl DocumentClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub async fn update(&self, id: &str, body: &Value) -> Result<()> {
        let path = format!("{DOCUMENTS_PATH}/{id}");
        self.transport.request_json(Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    /// Lists documents whose `externalId` equals `external_id`. More than
    /// one match is the caller's problem to reject as a fatal ambiguity.
    pub async fn list_by_external_id(&self, external_id: &str) -> Result<Vec<DocumentListEntry>> {
        let path = format!("{DOCUMENTS_PATH}?filter=externalId=='{external_id}'");
        let response = self.transport.request_json(Method::GET, &path, None).await?;
        let documents = response.get("documents").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(documents
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get("id")?.as_str()?.to_string();
                let external_id = doc.get("externalId").and_then(Value::as_str).unwrap_or_default().to_string();
                Some(DocumentListEntry { id, external_id })
            })
            .collect())
    }

    pub async fn create(
        &self,
        name: &str,
        private: bool,
        external_id: &str,
        content: &Value,
        kind: DocumentKind,
    ) -> Result<Value> {
        let body = json!({
            "name": name,
            "type": kind_name(kind),
            "private": private,
            "externalId": external_id,
            "content": content,
        });
        self.transport.request_json(Method::POST, DOCUMENTS_PATH, Some(&body)).await
    }

    /// Lists every document of `kind`, metadata only — the downloader fetches
    /// each one's full body with a follow-up `get` once it knows the id.
    pub async fn list(&self, kind: DocumentKind) -> Result<Vec<Value>> {
        let path = format!("{DOCUMENTS_PATH}?filter=type=='{}'", kind_name(kind));
        self.transport.list_paginated(&path, "documents").await
    }

    /// Fetches one document's full content by id, for the downloader.
    pub async fn get(&self, id: &str) -> Result<Value> {
        let path = format!("{DOCUMENTS_PATH}/{id}/content");
        self.transport.request_json(Method::GET, &path, None).await
    }
}

fn kind_name(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Dashboard => "dashboard",
        DocumentKind::Notebook => "notebook",
        DocumentKind::Launchpad => "launchpad",
    }
}

/// Rejects a classic-dashboard payload (`tiles` as an array) — the document
/// API expects the platform dashboard shape (`tiles` as an object keyed by
/// tile id), not the legacy classic-API shape.
pub fn reject_classic_dashboard_payload(body: &Value) -> Result<()> {
    if let Some(Value::Array(_)) = body.get("tiles") {
        return Err(DeployerError::Other(
            "dashboard payload uses the classic-dashboard 'tiles' array shape; platform dashboards require an object keyed by tile id".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_array_tiles() {
        let body = json!({"tiles": [{"id": "a"}]});
        assert!(reject_classic_dashboard_payload(&body).is_err());
    }

    #[test]
    fn accepts_object_tiles() {
        let body = json!({"tiles": {"a": {"id": "a"}}});
        assert!(reject_classic_dashboard_payload(&body).is_ok());
    }
}
