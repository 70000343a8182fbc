use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{DeployerError, Result};

/// Supplies a bearer token for an environment. The real OAuth2 token
/// exchange (and the classic API-token lookup) are external collaborators;
/// this crate only depends on the narrow contract its clients need.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, environment: &str) -> Result<String>;
}

/// Test/fixture token provider returning a fixed token regardless of
/// environment.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _environment: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Bounded exponential backoff with jitter, applied only to HTTP 429/5xx and
/// connection-level transport errors. The core never sees a retry attempt —
/// only the terminal success or failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(scaled * jitter)
    }
}

/// Shared HTTP client used by every resource client: one `reqwest::Client`
/// (connection pooling, rustls), one semaphore bounding in-flight requests,
/// and one retry policy. Clone is cheap — everything behind it is `Arc`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    token_provider: Arc<dyn TokenProvider>,
    base_url: String,
    environment: String,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        environment: impl Into<String>,
        token_provider: Arc<dyn TokenProvider>,
        timeout: Duration,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DeployerError::Transport {
                url: "client-builder".to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            retry,
            token_provider,
            base_url: base_url.into(),
            environment: environment.into(),
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Issues one JSON request, retrying transient failures with backoff.
    /// `body` is omitted entirely for verbs that carry none (`GET`/`DELETE`).
    pub async fn request_json(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        let _permit = self.semaphore.acquire().await.map_err(|err| DeployerError::Transport {
            url: url.clone(),
            message: err.to_string(),
        })?;

        let token = self.token_provider.token(&self.environment).await?;
        let mut attempt = 0;
        loop {
            let mut request = self.client.request(method.clone(), &url).bearer_auth(&token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        if status == StatusCode::NO_CONTENT {
                            return Ok(Value::Null);
                        }
                        let text = resp.text().await.unwrap_or_default();
                        if text.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return serde_json::from_str(&text).map_err(|err| DeployerError::Transport {
                            url: url.clone(),
                            message: format!("invalid JSON response: {err}"),
                        });
                    }
                    if status == StatusCode::NOT_FOUND {
                        let body_excerpt = resp.text().await.unwrap_or_default();
                        return Err(DeployerError::NotFound {
                            environment: self.environment.clone(),
                            status: status.as_u16(),
                            body: body_excerpt.chars().take(500).collect(),
                        });
                    }
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    let body_excerpt = resp.text().await.unwrap_or_default();
                    if retryable && attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        warn!(%url, status = %status, attempt, ?delay, "retrying transient HTTP error");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(DeployerError::Response {
                        environment: self.environment.clone(),
                        status: status.as_u16(),
                        body: body_excerpt.chars().take(500).collect(),
                    });
                }
                Err(err) => {
                    if err.is_timeout() && attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        debug!(%url, attempt, ?delay, "retrying after timeout");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(DeployerError::Transport {
                        url: url.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// Idempotent upsert-by-id: `PUT <path>/<id>`, falling back to
    /// `POST <path>` (with `id` folded into the body) when the server
    /// reports the id doesn't exist yet. Used by every resource whose wire
    /// protocol treats PUT-to-an-id as create-or-replace.
    pub async fn upsert_by_put_or_post(&self, path: &str, id: &str, body: &Value) -> Result<Value> {
        let put_path = format!("{}/{}", path.trim_end_matches('/'), id);
        match self.request_json(Method::PUT, &put_path, Some(body)).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_not_found() => {
                let mut with_id = body.clone();
                if let Value::Object(map) = &mut with_id {
                    map.entry("id").or_insert_with(|| Value::String(id.to_string()));
                }
                self.request_json(Method::POST, path, Some(&with_id)).await
            }
            Err(err) => Err(err),
        }
    }

    /// Accumulates pages until the server stops returning a `nextPageKey`
    /// (the shape every Dynatrace list endpoint uses). A page that returns
    /// no items and no next-page key on the first attempt is retried once to
    /// absorb the eventual-consistency anomaly Dynatrace's config APIs are
    /// known to exhibit right after a write.
    pub async fn list_paginated(&self, path: &str, items_key: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next: Option<String> = None;
        let mut empty_retries = 0;
        loop {
            let page_path = match &next {
                Some(token) => format!("{path}?nextPageKey={token}"),
                None => path.to_string(),
            };
            let page = self.request_json(Method::GET, &page_path, None).await?;
            let page_items = page
                .get(items_key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let page_next = page
                .get("nextPageKey")
                .and_then(Value::as_str)
                .map(str::to_string);

            if page_items.is_empty() && page_next.is_none() && next.is_none() && empty_retries < 1 {
                empty_retries += 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }

            items.extend(page_items);
            match page_next {
                Some(token) => next = Some(token),
                None => break,
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_with_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
        };
        let d0 = policy.delay_for(0).as_secs_f64();
        let d3 = policy.delay_for(3).as_secs_f64();
        assert!(d3 > d0);
    }

    #[tokio::test]
    async fn static_token_provider_returns_fixed_token() {
        let provider = StaticTokenProvider::new("abc123");
        assert_eq!(provider.token("prod").await.unwrap(), "abc123");
    }
}
