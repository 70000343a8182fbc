use reqwest::Method;
use serde_json::Value;

use crate::error::Result;

use super::transport::HttpTransport;

/// Typed wrapper over a classic config-v1-style REST API
/// (`/api/config/v1/<api_id>[/<scope>/...]`).
#[derive(Clone)]
pub struct ClassicApiClient {
    transport: HttpTransport,
    api_id: String,
}

impl ClassicApiClient {
    pub fn new(transport: HttpTransport, api_id: impl Into<String>) -> Self {
        Self {
            transport,
            api_id: api_id.into(),
        }
    }

    fn base_path(&self, parent_scope: Option<&str>) -> String {
        match parent_scope {
            Some(scope) => format!("api/config/v1/{}/{}/{}", self.api_id, scope, self.api_id),
            None => format!("api/config/v1/{}", self.api_id),
        }
    }

    /// Lists every object summary (`{id, name}`) regardless of name — the
    /// downloader's entry point into this API.
    pub async fn list_all(&self, parent_scope: Option<&str>) -> Result<Vec<Value>> {
        let summaries = self
            .transport
            .request_json(Method::GET, &self.base_path(parent_scope), None)
            .await?;
        Ok(summaries.get("values").and_then(Value::as_array).cloned().unwrap_or_default())
    }

    /// Lists every object whose `name` field equals `name`. Classic list
    /// responses are unpaginated summaries of `{id, name}`.
    pub async fn find_all_by_name(&self, parent_scope: Option<&str>, name: &str) -> Result<Vec<Value>> {
        let values = self.list_all(parent_scope).await?;
        Ok(values
            .into_iter()
            .filter(|v| v.get("name").and_then(Value::as_str) == Some(name))
            .collect())
    }

    /// Fetches one object's full body by id — the downloader's follow-up to
    /// `list_all`, which returns `{id, name}` summaries only.
    pub async fn get(&self, parent_scope: Option<&str>, id: &str) -> Result<Value> {
        let path = format!("{}/{}", self.base_path(parent_scope), id);
        self.transport.request_json(Method::GET, &path, None).await
    }

    /// Returns `Some(id)` iff exactly one object is already named `name`.
    /// Two or more matches means the name isn't actually unique on the
    /// server yet (or anymore); the caller must not upsert into either.
    pub async fn find_unique_by_name(&self, parent_scope: Option<&str>, name: &str) -> Result<Option<String>> {
        let matches = self.find_all_by_name(parent_scope, name).await?;
        match matches.as_slice() {
            [single] => Ok(single.get("id").and_then(Value::as_str).map(str::to_string)),
            _ => Ok(None),
        }
    }

    pub async fn create(&self, parent_scope: Option<&str>, body: &Value) -> Result<Value> {
        self.transport
            .request_json(Method::POST, &self.base_path(parent_scope), Some(body))
            .await
    }

    pub async fn update(&self, parent_scope: Option<&str>, id: &str, body: &Value) -> Result<()> {
        let path = format!("{}/{}", self.base_path(parent_scope), id);
        self.transport.request_json(Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    /// `PUT <id>`, falling back to `POST` with `id` folded into the body
    /// when the id doesn't exist yet — the "upsert by (name, generated_id)"
    /// strategy non-unique-name classic APIs use.
    pub async fn update_or_create(&self, parent_scope: Option<&str>, id: &str, body: &Value) -> Result<Value> {
        self.transport
            .upsert_by_put_or_post(&self.base_path(parent_scope), id, body)
            .await
    }

    pub async fn delete(&self, parent_scope: Option<&str>, id: &str) -> Result<()> {
        let path = format!("{}/{}", self.base_path(parent_scope), id);
        self.transport.request_json(Method::DELETE, &path, None).await?;
        Ok(())
    }
}
