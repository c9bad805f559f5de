//! In-memory Drive used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use drive_fetch::client::{DriveApi, MediaStream};
use drive_fetch::models::{FileListPage, RemoteEntry, FOLDER_MIME_TYPE};
use drive_fetch::{DriveError, Result};

pub const DOC_MIME: &str = "application/vnd.google-apps.document";
pub const SHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Chunk size used when streaming fake content, so progress sees several steps.
const CHUNK: usize = 4;

#[derive(Default)]
pub struct FakeDrive {
    entries: HashMap<String, RemoteEntry>,
    children: HashMap<String, Vec<String>>,
    content: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    list_calls: AtomicUsize,
    listed: Mutex<Vec<String>>,
    exports: Mutex<Vec<(String, String)>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, parent: &str, id: &str, name: &str, mime: &str) -> Self {
        self.entries.insert(
            id.to_string(),
            RemoteEntry {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime.to_string(),
                parents: vec![parent.to_string()],
                size: None,
            },
        );
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(id.to_string());
        self
    }

    pub fn folder(self, parent: &str, id: &str, name: &str) -> Self {
        self.add(parent, id, name, FOLDER_MIME_TYPE)
    }

    pub fn file(mut self, parent: &str, id: &str, name: &str, mime: &str, bytes: &[u8]) -> Self {
        self.content.insert(id.to_string(), bytes.to_vec());
        self.add(parent, id, name, mime)
    }

    /// Register an entry that is not a child of anything (metadata only).
    pub fn standalone(mut self, id: &str, name: &str, mime: &str, bytes: &[u8]) -> Self {
        self.content.insert(id.to_string(), bytes.to_vec());
        self.entries.insert(
            id.to_string(),
            RemoteEntry {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime.to_string(),
                parents: vec![],
                size: Some(bytes.len() as u64),
            },
        );
        self
    }

    /// Listing or downloading `id` fails with a server error.
    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }

    pub fn exports(&self) -> Vec<(String, String)> {
        self.exports.lock().unwrap().clone()
    }

    /// Ids whose content was requested, by export or media, in call order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    fn check(&self, id: &str) -> Result<()> {
        if self.failing.contains(id) {
            return Err(DriveError::Api {
                status: 500,
                message: format!("backend error for {}", id),
            });
        }
        Ok(())
    }

    fn stream(&self, id: &str) -> Result<MediaStream> {
        self.downloads.lock().unwrap().push(id.to_string());
        self.check(id)?;
        let bytes = self.content.get(id).ok_or_else(|| DriveError::Api {
            status: 404,
            message: format!("File not found: {}", id),
        })?;
        let chunks = bytes
            .chunks(CHUNK)
            .map(|c| Bytes::copy_from_slice(c))
            .collect();
        Ok(MediaStream::from_chunks(chunks))
    }
}

#[async_trait]
impl DriveApi for FakeDrive {
    async fn list_page(
        &self,
        container_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check(container_id)?;

        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        if offset == 0 {
            self.listed.lock().unwrap().push(container_id.to_string());
        }

        let ids = self.children.get(container_id).cloned().unwrap_or_default();
        let end = (offset + page_size as usize).min(ids.len());
        let files = ids[offset..end]
            .iter()
            .map(|id| self.entries[id].clone())
            .collect();
        let next_page_token = (end < ids.len()).then(|| end.to_string());

        Ok(FileListPage {
            files,
            next_page_token,
        })
    }

    async fn get_metadata(&self, file_id: &str) -> Result<RemoteEntry> {
        self.entries.get(file_id).cloned().ok_or_else(|| DriveError::Api {
            status: 404,
            message: format!("File not found: {}", file_id),
        })
    }

    async fn export(&self, file_id: &str, mime_type: &str) -> Result<MediaStream> {
        self.exports
            .lock()
            .unwrap()
            .push((file_id.to_string(), mime_type.to_string()));
        self.stream(file_id)
    }

    async fn get_media(&self, file_id: &str) -> Result<MediaStream> {
        self.stream(file_id)
    }
}
