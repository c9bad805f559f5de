//! Paginated listing of folder contents.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::DriveApi;
use crate::error::{DriveError, Result};
use crate::models::RemoteEntry;

/// Lists the children of a container, following page tokens to the end.
#[derive(Clone)]
pub struct ListingClient {
    api: Arc<dyn DriveApi>,
    page_size: u32,
    cancel: CancellationToken,
}

impl ListingClient {
    pub fn new(api: Arc<dyn DriveApi>, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Every entry whose parents include `container_id`, across all pages.
    pub async fn list_children(&self, container_id: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(DriveError::Cancelled);
            }

            let page = self
                .api
                .list_page(container_id, self.page_size, page_token.as_deref())
                .await
                .map_err(|e| DriveError::listing(container_id, e))?;
            entries.extend(page.files);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if entries.is_empty() {
            log::info!("No files found in {}", container_id);
        } else {
            log::debug!("Listed {} entries in {}", entries.len(), container_id);
        }

        Ok(entries)
    }
}
