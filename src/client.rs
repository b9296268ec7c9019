use anyhow::{anyhow, Result};
use async_stream::try_stream;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::sse::{SseDecoder, SseEvent};
use crate::stream::ChatBackend;
use crate::upload::{PdfFile, UploadError, UploadReceipt};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// HTTP client for the PDF chat backend
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a validated PDF as multipart form data (`file` field).
    pub async fn upload_pdf(&self, file: &PdfFile) -> Result<UploadReceipt, UploadError> {
        let url = format!("{}/upload-pdf", self.base_url);

        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|source| UploadError::Read {
                path: file.path.clone(),
                source,
            })?;
        let part = Part::bytes(bytes)
            .file_name(file.name.clone())
            .mime_str("application/pdf")
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let form = Form::new().part("file", part);

        debug!(name = %file.name, size = file.size, %url, "uploading pdf");
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let status_text = status.canonical_reason().unwrap_or("Unknown error").to_string();
            let reason = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .filter(|error| !error.is_empty())
                .unwrap_or(status_text);
            warn!(%status, %reason, "backend rejected pdf");
            return Err(UploadError::Rejected(reason));
        }

        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;
        info!(
            characters = receipt.characters,
            backend_message = receipt.message.as_deref().unwrap_or_default(),
            "pdf loaded"
        );
        Ok(receipt)
    }

    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Health check failed with status: {}", response.status()));
        }

        let health: HealthResponse = response.json().await?;
        if health.status != "ok" {
            return Err(anyhow!("Backend reported status: {}", health.status));
        }
        Ok(())
    }
}

impl ChatBackend for BackendClient {
    fn chat_stream(&self, message: &str) -> BoxStream<'static, Result<SseEvent>> {
        let request = self
            .client
            .get(format!("{}/chat_stream", self.base_url))
            .query(&[("message", message)])
            .header(header::ACCEPT, "text/event-stream");

        sse_events(request).boxed()
    }
}

/// Issue `request` and decode the body as server-sent events.
///
/// Only events an EventSource `onmessage` handler would receive are yielded.
/// A non-2xx status fails the stream before any event.
fn sse_events(request: RequestBuilder) -> impl Stream<Item = Result<SseEvent>> + Send {
    try_stream! {
        let response = request.send().await?.error_for_status()?;
        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                if event.is_message() {
                    yield event;
                } else {
                    trace!(event = ?event.event, "skipping named event");
                }
            }
        }
    }
}
