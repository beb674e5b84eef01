//! Backend collaborator contracts.
//!
//! The wizard consumes the backend through this trait: long-running jobs
//! come back as chunked byte streams (decoded by `stream::StreamIngestor`),
//! chat refinement and packaged download are plain request/response. The
//! reqwest adapter is the production implementation; tests script their own.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{backend_error, WizardError};
use crate::generation::GeneratedArtifact;
use crate::investigation::CategoryJob;

/// Chunked response body as it arrives off the wire.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// Parameters for a (re)issued investigation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationRequest {
    pub topic: String,
    /// Opaque business descriptors collected by the wizard forms.
    pub descriptors: Value,
    /// Category index to resume from after a reconnect or explicit retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<usize>,
}

/// Parameters for the build/generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub requirements: Map<String, Value>,
    pub investigation: Vec<CategoryJob>,
    pub design_template: Option<String>,
    pub content_template: Option<String>,
}

/// The wizard's view of the backend. Implementations must be cheap to share.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start (or resume) an investigation run; events stream back.
    async fn start_investigation(
        &self,
        request: &InvestigationRequest,
    ) -> Result<ByteStream, WizardError>;

    /// Start the generation job; events stream back.
    async fn start_generation(&self, request: &GenerationRequest)
        -> Result<ByteStream, WizardError>;

    /// Single-shot refinement of the current artifact through chat.
    async fn chat_refinement(
        &self,
        message: &str,
        artifact: &GeneratedArtifact,
    ) -> Result<Value, WizardError>;

    /// Package the artifact into a downloadable archive.
    async fn package_download(&self, artifact: &GeneratedArtifact) -> Result<Vec<u8>, WizardError>;
}

/// Streaming HTTP implementation over a JSON API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn stream_post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ByteStream, WizardError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|err| backend_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(backend_error(format!("{path} returned {status}: {detail}")));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(io::Error::other));
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn start_investigation(
        &self,
        request: &InvestigationRequest,
    ) -> Result<ByteStream, WizardError> {
        self.stream_post("investigation/start", request).await
    }

    async fn start_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<ByteStream, WizardError> {
        self.stream_post("generation/start", request).await
    }

    async fn chat_refinement(
        &self,
        message: &str,
        artifact: &GeneratedArtifact,
    ) -> Result<Value, WizardError> {
        let body = serde_json::json!({ "message": message, "artifact": artifact });
        let response = self
            .client
            .post(self.url("chat/refine"))
            .json(&body)
            .send()
            .await
            .map_err(|err| backend_error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(backend_error(format!("chat/refine returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|err| WizardError::StreamParse(err.to_string()))
    }

    async fn package_download(&self, artifact: &GeneratedArtifact) -> Result<Vec<u8>, WizardError> {
        let body = serde_json::json!({
            "manifest": artifact.manifest,
            "files": artifact.files,
        });
        let response = self
            .client
            .post(self.url("package/download"))
            .json(&body)
            .send()
            .await
            .map_err(|err| backend_error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(backend_error(format!("package/download returned {status}")));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|err| backend_error(err.to_string()))
    }
}
