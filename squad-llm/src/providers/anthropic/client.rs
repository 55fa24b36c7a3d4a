//! Anthropic HTTP client with rate limiting

use super::types::ApiError;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use squad_core::{LlmError, SquadResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

const PROVIDER: &str = "anthropic";

/// Anthropic API client with rate limiting.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<Semaphore>,
    started: Instant,
    /// Milliseconds since `started` of the last request
    last_request: AtomicU64,
    min_request_interval_ms: u64,
}

impl AnthropicClient {
    /// Create a new Anthropic client.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `requests_per_minute` - Maximum requests per minute
    pub fn new(api_key: impl Into<String>, requests_per_minute: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            rate_limiter: Arc::new(Semaphore::new(requests_per_minute as usize)),
            started: Instant::now(),
            last_request: AtomicU64::new(0),
            min_request_interval_ms: (60_000 / requests_per_minute as u64).max(10),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Make an API request with automatic rate limiting.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> SquadResult<Res> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| LlmError::RateLimited {
                provider: PROVIDER.to_string(),
            })?;

        // Enforce minimum interval between requests
        let now_ms = self.started.elapsed().as_millis() as u64;
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);
        if last_ms > 0 && elapsed < self.min_request_interval_ms {
            tokio::time::sleep(Duration::from_millis(self.min_request_interval_ms - elapsed)).await;
        }
        self.last_request
            .store(self.started.elapsed().as_millis() as u64, Ordering::Relaxed);

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: format!("Failed to parse response: {}", e),
                }
                .into()
            });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ApiError>(&error_text)
            .map(|e| e.error.message)
            .unwrap_or(error_text);

        Err(map_status(status, message).into())
    }
}

fn map_status(status: StatusCode, message: String) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey {
            provider: PROVIDER.to_string(),
        },
        _ => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, String::new()),
            LlmError::InvalidApiKey { .. }
        ));
        assert_eq!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, "overloaded".to_string()),
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                status: 500,
                message: "overloaded".to_string(),
            }
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = AnthropicClient::new("sk-ant-secret", 50);
        let debug = format!("{:?}", client);
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
