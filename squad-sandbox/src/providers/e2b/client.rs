//! Hosted sandbox provider over HTTP
//!
//! Lifecycle calls go to the REST control plane; commands go to the
//! in-sandbox process service, which streams enveloped JSON events.

use super::types::{
    encode_envelope, ApiError, ConnectSandbox, EndStream, EnvelopeDecoder, NewSandbox,
    ProcessConfig, SandboxInfo, StartRequest, StartResponse, END_STREAM_FLAG,
};
use crate::provider::{
    CreateRequest, OutputSink, ProviderError, RunOptions, SandboxProvider, SandboxSession,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use squad_core::OutputStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Port the in-sandbox process service listens on.
const ENVD_PORT: u16 = 49983;

/// Connection settings for the hosted sandbox service.
#[derive(Clone)]
pub struct E2bConfig {
    pub api_key: String,
    pub api_url: String,
    pub domain: String,
    pub template: String,
    /// Lifetime requested on reconnect, in seconds
    pub reconnect_timeout_secs: u64,
}

impl E2bConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: "https://api.e2b.dev".to_string(),
            domain: "e2b.app".to_string(),
            template: "base".to_string(),
            reconnect_timeout_secs: 600,
        }
    }
}

impl std::fmt::Debug for E2bConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("E2bConfig")
            .field("api_url", &self.api_url)
            .field("domain", &self.domain)
            .field("template", &self.template)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

struct E2bClient {
    http: Client,
    config: E2bConfig,
}

impl E2bClient {
    fn control(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.config.api_url, path))
            .header("X-API-Key", &self.config.api_key)
    }

    async fn send(&self, request: RequestBuilder, sandbox_id: &str) -> Result<Response, ProviderError> {
        let response = request.send().await.map_err(map_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ApiError>(&text)
            .map(|e| e.message)
            .unwrap_or(text);
        Err(match status {
            StatusCode::NOT_FOUND => ProviderError::NotFound(sandbox_id.to_string()),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout,
            _ => ProviderError::Request(format!("{}: {}", status, message)),
        })
    }

    fn session(self: &Arc<Self>, info: SandboxInfo) -> Arc<dyn SandboxSession> {
        Arc::new(E2bSession {
            client: Arc::clone(self),
            info,
        })
    }
}

fn map_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Request(e.to_string())
    }
}

// ============================================================================
// PROVIDER
// ============================================================================

/// Sandbox provider backed by the hosted sandbox service.
pub struct E2bProvider {
    client: Arc<E2bClient>,
}

impl E2bProvider {
    pub fn new(config: E2bConfig) -> Self {
        Self {
            client: Arc::new(E2bClient {
                http: Client::new(),
                config,
            }),
        }
    }
}

impl std::fmt::Debug for E2bProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("E2bProvider")
            .field("config", &self.client.config)
            .finish()
    }
}

#[async_trait]
impl SandboxProvider for E2bProvider {
    async fn create(&self, request: &CreateRequest) -> Result<Arc<dyn SandboxSession>, ProviderError> {
        let body = NewSandbox {
            template_id: self.client.config.template.clone(),
            timeout: (request.timeout_ms.max(1_000) / 1_000) as u64,
            metadata: request.metadata.clone(),
        };
        let response = self
            .client
            .send(self.client.control(Method::POST, "/sandboxes").json(&body), "new")
            .await?;
        let info: SandboxInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(format!("Failed to parse response: {}", e)))?;
        debug!(sandbox_id = %info.sandbox_id, "Remote sandbox allocated");
        Ok(self.client.session(info))
    }

    async fn connect(&self, sandbox_id: &str) -> Result<Arc<dyn SandboxSession>, ProviderError> {
        let body = ConnectSandbox {
            timeout: self.client.config.reconnect_timeout_secs,
        };
        let path = format!("/sandboxes/{}/connect", sandbox_id);
        let response = self
            .client
            .send(self.client.control(Method::POST, &path).json(&body), sandbox_id)
            .await?;
        let info: SandboxInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(format!("Failed to parse response: {}", e)))?;
        Ok(self.client.session(info))
    }

    async fn attach(&self, sandbox_id: &str) -> Result<Arc<dyn SandboxSession>, ProviderError> {
        let path = format!("/sandboxes/{}", sandbox_id);
        let response = self
            .client
            .send(self.client.control(Method::GET, &path), sandbox_id)
            .await?;
        let info: SandboxInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(format!("Failed to parse response: {}", e)))?;
        Ok(self.client.session(info))
    }
}

// ============================================================================
// SESSION
// ============================================================================

struct E2bSession {
    client: Arc<E2bClient>,
    info: SandboxInfo,
}

impl E2bSession {
    fn envd_url(&self, path: &str) -> String {
        let domain = self
            .info
            .domain
            .as_deref()
            .unwrap_or(&self.client.config.domain);
        format!(
            "https://{}-{}.{}{}",
            ENVD_PORT, self.info.sandbox_id, domain, path
        )
    }

    async fn stream_process(
        &self,
        command: &str,
        options: &RunOptions,
        sink: &dyn OutputSink,
    ) -> Result<i32, ProviderError> {
        let body = StartRequest {
            process: ProcessConfig::shell(command, options.env.clone(), options.cwd.clone()),
        };
        let payload = serde_json::to_vec(&body)
            .map_err(|e| ProviderError::Request(format!("Failed to encode request: {}", e)))?;

        let mut request = self
            .client
            .http
            .post(self.envd_url("/process.Process/Start"))
            .header("Content-Type", "application/connect+json")
            .header("Connect-Protocol-Version", "1")
            .header("Authorization", format!("Basic {}", STANDARD.encode("user:")))
            .body(encode_envelope(&payload));
        if let Some(token) = &self.info.envd_access_token {
            request = request.header("X-Access-Token", token);
        }
        if let Some(timeout_ms) = options.timeout_ms {
            request = request.header("Connect-Timeout-Ms", timeout_ms.to_string());
        }

        let response = self.client.send(request, &self.info.sandbox_id).await?;
        let mut stream = Box::pin(response.bytes_stream());
        let mut decoder = EnvelopeDecoder::default();

        while let Some(chunk) = stream.next().await {
            decoder.push(&chunk.map_err(map_transport)?);
            while let Some((flags, frame)) = decoder.next_frame() {
                if flags & END_STREAM_FLAG != 0 {
                    let trailer: EndStream = serde_json::from_slice(&frame).map_err(|e| {
                        ProviderError::Request(format!("Malformed stream trailer: {}", e))
                    })?;
                    return Err(match trailer.error {
                        Some(err) if err.code == "deadline_exceeded" => ProviderError::Timeout,
                        Some(err) => ProviderError::Request(format!("{}: {}", err.code, err.message)),
                        None => ProviderError::Request("Process stream ended without exit".to_string()),
                    });
                }
                let message: StartResponse = serde_json::from_slice(&frame).map_err(|e| {
                    ProviderError::Request(format!("Malformed process event: {}", e))
                })?;
                let Some(event) = message.event else { continue };
                if let Some(data) = event.data {
                    for (which, encoded) in [
                        (OutputStream::Stdout, data.stdout),
                        (OutputStream::Stderr, data.stderr),
                    ] {
                        if let Some(encoded) = encoded {
                            let bytes = STANDARD.decode(encoded).map_err(|e| {
                                ProviderError::Request(format!("Invalid output encoding: {}", e))
                            })?;
                            sink.on_output(which, &String::from_utf8_lossy(&bytes));
                        }
                    }
                }
                if let Some(end) = event.end {
                    if let Some(error) = end.error.filter(|e| !e.is_empty()) {
                        debug!(sandbox_id = %self.info.sandbox_id, error = %error, "Process ended with error");
                    }
                    return Ok(end.exit_code);
                }
            }
        }
        Err(ProviderError::Request(
            "Process stream closed before exit".to_string(),
        ))
    }
}

#[async_trait]
impl SandboxSession for E2bSession {
    fn sandbox_id(&self) -> &str {
        &self.info.sandbox_id
    }

    async fn run(
        &self,
        command: &str,
        options: &RunOptions,
        sink: &dyn OutputSink,
    ) -> Result<i32, ProviderError> {
        match options.timeout_ms {
            Some(ms) => tokio::time::timeout(
                Duration::from_millis(ms),
                self.stream_process(command, options, sink),
            )
            .await
            .map_err(|_| ProviderError::Timeout)?,
            None => self.stream_process(command, options, sink).await,
        }
    }

    async fn pause(&self) -> Result<(), ProviderError> {
        let path = format!("/sandboxes/{}/pause", self.info.sandbox_id);
        match self
            .client
            .send(self.client.control(Method::POST, &path), &self.info.sandbox_id)
            .await
        {
            Ok(_) => Ok(()),
            // Already paused.
            Err(ProviderError::Request(message)) if message.starts_with("409") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn kill(&self) -> Result<(), ProviderError> {
        let path = format!("/sandboxes/{}", self.info.sandbox_id);
        self.client
            .send(self.client.control(Method::DELETE, &path), &self.info.sandbox_id)
            .await
            .map(|_| ())
    }
}
