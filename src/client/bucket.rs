use serde_json::Value;

use crate::error::Result;

use super::transport::HttpTransport;

const BUCKETS_PATH: &str = "platform/storage/management/v1/bucket-definitions";

/// Typed wrapper over the Grail bucket-definitions API.
#[derive(Clone)]
pub struct BucketClient {
    transport: HttpTransport,
}

impl BucketClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    /// Idempotent: repeated calls with the same `id` converge on the same
    /// bucket rather than erroring on the second call.
    pub async fn upsert(&self, id: &str, body: &Value) -> Result<Value> {
        self.transport.upsert_by_put_or_post(BUCKETS_PATH, id, body).await
    }

    pub async fn list(&self) -> Result<Vec<Value>> {
        self.transport.list_paginated(BUCKETS_PATH, "buckets").await
    }
}
