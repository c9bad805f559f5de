//! Error types for the drive_fetch crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when fetching from Google Drive.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Failed to read credentials file {path:?}: {source}")]
    CredentialsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse credentials JSON: {0}")]
    CredentialsParse(#[from] serde_json::Error),

    #[error("JWT encoding error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to list children of {container_id}: {source}")]
    Listing {
        container_id: String,
        #[source]
        source: Box<DriveError>,
    },

    #[error("Failed to download {name:?} ({file_id}): {source}")]
    Download {
        file_id: String,
        name: String,
        #[source]
        source: Box<DriveError>,
    },

    #[error("{0} is a folder and has no content to download")]
    NotAFile(String),

    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl DriveError {
    /// Wrap an error raised while listing `container_id`.
    pub fn listing(container_id: impl Into<String>, source: DriveError) -> Self {
        match source {
            DriveError::Cancelled => DriveError::Cancelled,
            source => DriveError::Listing {
                container_id: container_id.into(),
                source: Box::new(source),
            },
        }
    }

    /// Wrap an error raised while exporting or downloading one file.
    pub fn download(file_id: impl Into<String>, name: impl Into<String>, source: DriveError) -> Self {
        match source {
            DriveError::Cancelled => DriveError::Cancelled,
            source => DriveError::Download {
                file_id: file_id.into(),
                name: name.into(),
                source: Box::new(source),
            },
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriveError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Structural errors end the whole run; everything else is scoped to one
    /// entry or subtree.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriveError::InvalidUrl { .. }
                | DriveError::Auth(_)
                | DriveError::CredentialsFile { .. }
                | DriveError::CredentialsParse(_)
                | DriveError::Jwt(_)
                | DriveError::TokenRefresh(_)
                | DriveError::Config(_)
                | DriveError::Cancelled
        )
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_not_wrapped() {
        let err = DriveError::listing("abc", DriveError::Cancelled);
        assert!(matches!(err, DriveError::Cancelled));

        let err = DriveError::download("abc", "a.txt", DriveError::Cancelled);
        assert!(matches!(err, DriveError::Cancelled));
    }

    #[test]
    fn test_download_error_carries_context() {
        let err = DriveError::download(
            "file123",
            "report.txt",
            DriveError::Api {
                status: 403,
                message: "forbidden".to_string(),
            },
        );
        let display = err.to_string();
        assert!(display.contains("file123"));
        assert!(display.contains("report.txt"));
        assert!(display.contains("403"));
        assert!(!err.is_fatal());
    }
}
