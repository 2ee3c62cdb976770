//! ApiClient - REST client for the Charla assistant backend.
//!
//! Wraps the backend operations behind typed request/response pairs:
//! chat turns, file uploads for retrieval indexing, note creation, the
//! note listing, and the health probe.

use charla_core::config::ClientConfig;
use charla_core::error::{CharlaError, Result};
use charla_core::notes::NoteSummary;
use charla_core::session::Turn;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Full conversation so far, including the newly composed user turn.
    pub messages: Vec<Turn>,
    /// Augment with indexed-document retrieval.
    pub use_rag: bool,
    /// Augment with encyclopedic web lookup.
    pub use_wiki: bool,
}

/// Response body for `POST /chat`.
///
/// `answer` may be absent; `sources` is present only when the backend
/// used retrieval context.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

/// Retrieval source metadata attached to a chat answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRef {
    /// Filename of the indexed document the context came from.
    #[serde(default)]
    pub source: Option<String>,
}

/// Response body for `POST /upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub ok: bool,
    /// Filename as stored by the backend.
    #[serde(default)]
    pub file: Option<String>,
    /// Number of text fragments added to the retrieval index.
    pub chunks_indexed: u64,
}

/// Response body for `POST /tools/note`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedNote {
    pub id: i64,
    pub title: String,
}

#[derive(Serialize)]
struct NoteRequest<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// HTTP adapter for the assistant backend.
///
/// The base URL is fixed at construction; all operations are plain
/// request/response calls with no client-side retry.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for the configured backend endpoint.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Probes `GET /health` and returns the reported status string.
    pub async fn health(&self) -> Result<String> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        let parsed: HealthResponse = response.json().await.map_err(parse_error)?;
        Ok(parsed.status)
    }

    /// Fetches the note listing via `GET /notes`.
    pub async fn list_notes(&self) -> Result<Vec<NoteSummary>> {
        let url = format!("{}/notes", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(parse_error)
    }

    /// Sends one chat turn via `POST /chat`.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(parse_error)
    }

    /// Uploads one file for retrieval indexing via `POST /upload`.
    ///
    /// The payload is sent as a multipart form with a single `file`
    /// field, matching the backend contract.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|err| CharlaError::internal(format!("Invalid upload part: {err}")))?;
        let form = Form::new().part("file", part);

        let url = format!("{}/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(parse_error)
    }

    /// Creates a note via `POST /tools/note`.
    pub async fn create_note(&self, title: &str, body: &str) -> Result<CreatedNote> {
        let url = format!("{}/tools/note", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&NoteRequest { title, body })
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(parse_error)
    }
}

fn transport_error(err: reqwest::Error) -> CharlaError {
    CharlaError::transport(err.to_string())
}

fn parse_error(err: reqwest::Error) -> CharlaError {
    CharlaError::parse(err.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(CharlaError::api(status.as_u16(), body))
}
