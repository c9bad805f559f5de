//! Google Drive API client.
//!
//! [`DriveApi`] is the capability interface the rest of the crate talks to;
//! [`HttpDriveApi`] implements it against the Drive v3 REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::auth::CredentialProvider;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, FileListPage, RemoteEntry};

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested for every file resource.
const ENTRY_FIELDS: &str = "id, name, mimeType, parents, size";

/// Streamed body of an export or media download.
pub struct MediaStream {
    /// Total length in bytes, when the server announces it.
    pub total: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

impl MediaStream {
    /// A stream over already-available chunks.
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        let total = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            total: Some(total),
            chunks: futures::stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }
}

/// Remote operations the downloader needs, keyed by resource id.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Fetch one page of the children of `container_id`.
    async fn list_page(
        &self,
        container_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileListPage>;

    async fn get_metadata(&self, file_id: &str) -> Result<RemoteEntry>;

    /// Export a Google-native document as `mime_type`.
    async fn export(&self, file_id: &str, mime_type: &str) -> Result<MediaStream>;

    /// Fetch the raw bytes of a file.
    async fn get_media(&self, file_id: &str) -> Result<MediaStream>;
}

/// Drive v3 client over HTTP.
pub struct HttpDriveApi {
    auth: Arc<dyn CredentialProvider>,
    http: Client,
    base_url: String,
    max_retries: u32,
}

impl HttpDriveApi {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `auth` - Provider of access tokens
    pub fn new(auth: Arc<dyn CredentialProvider>) -> Self {
        Self {
            auth,
            http: Client::new(),
            base_url: DRIVE_API_BASE.to_string(),
            max_retries: 3,
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of retries for rate-limited, server-side and transport failures.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.base_url, file_id)
    }

    /// Send a GET request, retrying 429/5xx and transport errors with
    /// exponential backoff. Other failures are turned into `DriveError::Api`.
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let token = self.auth.access_token().await?;
        let mut attempt = 0;

        loop {
            let request: RequestBuilder = self.http.get(url).bearer_auth(&token).query(query);

            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if is_retryable(response.status()) && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = backoff(attempt);
                    log::warn!(
                        "GET {} failed (attempt {}/{}): status={}, retrying in {}ms",
                        url,
                        attempt,
                        self.max_retries,
                        response.status(),
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Ok(response) => return Err(api_error(response).await),
                Err(e) if attempt < self.max_retries && (e.is_connect() || e.is_timeout()) => {
                    attempt += 1;
                    let backoff = backoff(attempt);
                    log::warn!(
                        "GET {} failed (attempt {}/{}): {}, retrying in {}ms",
                        url,
                        attempt,
                        self.max_retries,
                        e,
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100u64 * 2u64.pow(attempt))
}

/// Turn a non-success response into `DriveError::Api`, preferring the
/// structured Google error body when there is one.
async fn api_error(response: Response) -> DriveError {
    let status = response.status();
    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return DriveError::Api {
            status: api_error.error.code,
            message: api_error.error.message,
        };
    }
    DriveError::Api {
        status: status.as_u16(),
        message: error_body,
    }
}

fn media_stream(response: Response) -> MediaStream {
    MediaStream {
        total: response.content_length(),
        chunks: response.bytes_stream().map_err(DriveError::from).boxed(),
    }
}

#[async_trait]
impl DriveApi for HttpDriveApi {
    async fn list_page(
        &self,
        container_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileListPage> {
        let query = format!(
            "'{}' in parents and trashed = false",
            container_id.replace('\'', "\\'")
        );
        let page_size = page_size.to_string();
        let fields = format!("nextPageToken, files({})", ENTRY_FIELDS);

        let mut params = vec![
            ("q", query.as_str()),
            ("pageSize", page_size.as_str()),
            ("spaces", "drive"),
            ("includeItemsFromAllDrives", "true"),
            ("supportsAllDrives", "true"),
            ("fields", fields.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response = self
            .get(&format!("{}/files", self.base_url), &params)
            .await?;
        Ok(response.json().await?)
    }

    async fn get_metadata(&self, file_id: &str) -> Result<RemoteEntry> {
        let response = self
            .get(
                &self.file_url(file_id),
                &[("supportsAllDrives", "true"), ("fields", ENTRY_FIELDS)],
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn export(&self, file_id: &str, mime_type: &str) -> Result<MediaStream> {
        let url = format!("{}/export", self.file_url(file_id));
        let response = self.get(&url, &[("mimeType", mime_type)]).await?;
        Ok(media_stream(response))
    }

    async fn get_media(&self, file_id: &str) -> Result<MediaStream> {
        let response = self
            .get(
                &self.file_url(file_id),
                &[("alt", "media"), ("supportsAllDrives", "true")],
            )
            .await?;
        Ok(media_stream(response))
    }
}
