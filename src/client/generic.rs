use serde_json::Value;

use crate::error::Result;

use super::transport::HttpTransport;

/// Shared shape for the platform resources that are a plain upsert-by-id
/// with no kind-specific quirks: openpipeline configurations, segments, and
/// SLOs. Each gets its own instance pointed at its own resource path.
#[derive(Clone)]
pub struct GenericUpsertClient {
    transport: HttpTransport,
    resource_path: String,
    items_key: &'static str,
}

impl GenericUpsertClient {
    pub fn openpipeline(transport: HttpTransport, kind: &str) -> Self {
        Self {
            transport,
            resource_path: format!("platform/openpipeline/v1/configurations/{kind}"),
            items_key: "configurations",
        }
    }

    pub fn segment(transport: HttpTransport) -> Self {
        Self {
            transport,
            resource_path: "platform/storage/filter-segments/v1/filter-segments".to_string(),
            items_key: "filterSegments",
        }
    }

    pub fn slo(transport: HttpTransport) -> Self {
        Self {
            transport,
            resource_path: "platform/slo/v1/slos".to_string(),
            items_key: "slos",
        }
    }

    pub async fn upsert(&self, id: &str, body: &Value) -> Result<Value> {
        self.transport.upsert_by_put_or_post(&self.resource_path, id, body).await
    }

    pub async fn list(&self) -> Result<Vec<Value>> {
        self.transport.list_paginated(&self.resource_path, self.items_key).await
    }
}
