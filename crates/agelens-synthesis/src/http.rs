//! JSON-over-HTTP provider client
//!
//! Request: `POST {endpoint}` with a JSON body carrying the rendered prompt,
//! the descriptor seed, fingerprint and attributes, and the stage tag.
//!
//! Response: either the image itself (`Content-Type: image/*`) or a JSON
//! object whose `url` (or `image_url`) field points at the produced image,
//! which is then downloaded.
//!
//! Status mapping: 408, 425, 429 and 5xx are transient; any other non-2xx is
//! a permanent rejection. Transport failures are transient.
//! Image bodies larger than `max_image_bytes` are rejected as permanent.

use crate::adapter::SynthesisAdapter;
use crate::error::{ProviderSetupError, UpstreamError};
use crate::prompt;
use agelens_model::{AgeStage, Attributes, Descriptor, ImageBytes};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ERROR_BODY: usize = 200;

/// Default ceiling on a downloaded image
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Provider connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Generation endpoint URL
    pub endpoint: Option<String>,
    /// Name of the environment variable holding a bearer token
    pub api_key_env: Option<String>,
    /// Client-side deadline for one HTTP exchange
    pub request_timeout_ms: u64,
    /// Largest image body accepted from the provider
    pub max_image_bytes: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: None,
            request_timeout_ms: 120_000,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: String,
    seed: u64,
    stage: AgeStage,
    fingerprint: String,
    attributes: &'a Attributes,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    url: Option<String>,
    image_url: Option<String>,
}

/// Provider reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpSynthesisAdapter {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    max_image_bytes: u64,
}

impl HttpSynthesisAdapter {
    /// Build from configuration, resolving the API key from the environment
    ///
    /// # Errors
    /// - [`ProviderSetupError::MissingEndpoint`] / [`ProviderSetupError::InvalidEndpoint`]
    /// - [`ProviderSetupError::MissingApiKey`] if the named variable is unset
    /// - [`ProviderSetupError::Client`] if the HTTP client cannot be built
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderSetupError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or(ProviderSetupError::MissingEndpoint)?;

        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| ProviderSetupError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };

        Ok(Self::new(
            endpoint,
            api_key,
            Duration::from_millis(config.request_timeout_ms),
        )?
        .with_max_image_bytes(config.max_image_bytes))
    }

    /// Build with explicit values
    ///
    /// # Errors
    /// See [`from_config`](Self::from_config)
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderSetupError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ProviderSetupError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }

    /// Reject image bodies larger than `limit` bytes
    #[must_use]
    pub fn with_max_image_bytes(mut self, limit: u64) -> Self {
        self.max_image_bytes = limit;
        self
    }

    /// Configured endpoint
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn download(&self, url: &str) -> Result<ImageBytes, UpstreamError> {
        let url = self
            .endpoint
            .join(url)
            .map_err(|e| UpstreamError::permanent(format!("provider returned bad url '{url}': {e}")))?;

        tracing::debug!(%url, "downloading generated image");
        let response = self.client.get(url).send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        self.read_image(response).await
    }

    /// Body of an image response, bounded by `max_image_bytes`
    async fn read_image(&self, mut response: Response) -> Result<ImageBytes, UpstreamError> {
        let limit = self.max_image_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large(limit));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_transport)? {
            let total = u64::try_from(bytes.len() + chunk.len()).unwrap_or(u64::MAX);
            if total > limit {
                return Err(too_large(limit));
            }
            bytes.extend_from_slice(&chunk);
        }
        non_empty(bytes)
    }
}

#[async_trait]
impl SynthesisAdapter for HttpSynthesisAdapter {
    async fn generate(
        &self,
        descriptor: &Descriptor,
        stage: AgeStage,
    ) -> Result<ImageBytes, UpstreamError> {
        let body = GenerateRequest {
            prompt: prompt::render(descriptor, stage),
            seed: descriptor.seed(),
            stage,
            fingerprint: descriptor.fingerprint(),
            attributes: descriptor.attributes(),
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(%stage, descriptor = %descriptor.short_fingerprint(), "calling provider");
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let is_image = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("image/"));

        if is_image {
            return self.read_image(response).await;
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            UpstreamError::transient(format!("provider returned unreadable response: {e}"))
        })?;

        match parsed.url.or(parsed.image_url) {
            Some(url) => self.download(&url).await,
            None => Err(UpstreamError::transient(
                "provider response carried neither an image nor a url",
            )),
        }
    }
}

/// Map a non-success HTTP status to an upstream error
#[must_use]
pub fn classify_status(status: StatusCode, body: &str) -> UpstreamError {
    let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
    let reason = if snippet.is_empty() {
        format!("provider returned {status}")
    } else {
        format!("provider returned {status}: {snippet}")
    };

    let transient = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
    ) || status.as_u16() == 425
        || status.is_server_error();

    if transient {
        UpstreamError::Transient(reason)
    } else {
        UpstreamError::Permanent(reason)
    }
}

fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_builder() {
        UpstreamError::permanent(format!("invalid provider request: {err}"))
    } else {
        UpstreamError::transient(format!("provider transport error: {err}"))
    }
}

fn too_large(limit: u64) -> UpstreamError {
    UpstreamError::permanent(format!("provider image exceeds {limit} bytes"))
}

fn non_empty(bytes: Vec<u8>) -> Result<ImageBytes, UpstreamError> {
    if bytes.is_empty() {
        return Err(UpstreamError::transient("provider returned an empty image"));
    }
    Ok(ImageBytes::from(bytes))
}
