//! drive_fetch - Download folders and files from Google Drive.
//!
//! This library provides functionality to:
//! - Parse Drive and Docs URLs into resource ids
//! - List folder contents across all result pages
//! - Mirror a folder tree locally down to a depth bound, exporting
//!   Google-native documents (Docs, Sheets, Slides) to office formats
//! - Stream a folder's files into memory one at a time
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use drive_fetch::{Authenticator, FetchConfig, Fetcher, HttpDriveApi, Summary};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_file("credentials.json")?;
//!     let api = Arc::new(HttpDriveApi::new(Arc::new(auth)));
//!     let fetcher = Fetcher::new(api, &FetchConfig::default());
//!
//!     let tree = fetcher
//!         .fetch("https://drive.google.com/drive/folders/1abc", Path::new("out"), 2)
//!         .await?;
//!     println!("{}", Summary::of(&tree));
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod listing;
pub mod materialize;
pub mod mime_map;
pub mod models;
pub mod progress;
pub mod traverse;
pub mod url_parser;

// Re-exports for convenience
pub use auth::{Authenticator, CredentialProvider, StaticToken};
pub use client::{DriveApi, HttpDriveApi, MediaStream};
pub use config::{ExistingFilePolicy, FetchConfig};
pub use error::{DriveError, Result};
pub use listing::ListingClient;
pub use materialize::{sanitize, LocalTarget, Materialized, Materializer, Written};
pub use mime_map::{ExportFormat, MimeMap};
pub use models::RemoteEntry;
pub use progress::{LogProgress, NoProgress, ProgressObserver};
pub use traverse::{Fetcher, MemoryFile, Outcome, Summary, TreeNode};
pub use url_parser::{parse, ResourceKind, ResourceRef};
