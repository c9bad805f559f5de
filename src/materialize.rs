//! Rendering a single remote file locally.
//!
//! Google-native documents are exported through the [`MimeMap`]; everything
//! else is fetched as raw media. Bytes land either in a file under a target
//! directory or in an in-memory buffer.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::client::{DriveApi, MediaStream};
use crate::config::ExistingFilePolicy;
use crate::error::{DriveError, Result};
use crate::mime_map::{ExportFormat, MimeMap};
use crate::models::RemoteEntry;
use crate::progress::{percent, NoProgress, ProgressObserver};

/// Make a remote name safe to use as a single local path component.
///
/// Path separators become `_`, and names that would refer to the current or
/// parent directory are replaced by `_`.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match replaced.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => replaced,
    }
}

/// Where materialized bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalTarget {
    Directory(PathBuf),
    Memory,
}

/// Result of writing a file into a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    Saved { path: PathBuf, bytes: u64 },
    /// The destination existed and the policy said to leave it.
    Skipped(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    File(Written),
    Memory(Bytes),
}

/// How a remote file's bytes are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source<'a> {
    Export(&'a ExportFormat),
    Media,
}

/// Downloads or exports individual files.
#[derive(Clone)]
pub struct Materializer {
    api: Arc<dyn DriveApi>,
    mime_map: Arc<MimeMap>,
    existing: ExistingFilePolicy,
    progress: Arc<dyn ProgressObserver>,
    cancel: CancellationToken,
}

enum Sink {
    File { file: File, path: PathBuf },
    Memory(BytesMut),
}

impl Sink {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            Sink::File { file, path } => file
                .write_all(chunk)
                .await
                .map_err(|e| DriveError::filesystem(path.as_path(), e)),
            Sink::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
        }
    }

    async fn finish(self) -> Result<Option<Bytes>> {
        match self {
            Sink::File { mut file, path } => {
                file.flush()
                    .await
                    .map_err(|e| DriveError::filesystem(path.as_path(), e))?;
                Ok(None)
            }
            Sink::Memory(buf) => Ok(Some(buf.freeze())),
        }
    }
}

/// `<path>.part`, where bytes are written before the final rename.
fn part_path(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".part");
    PathBuf::from(s)
}

/// File name of the `.part` file used while writing `local_name`.
pub(crate) fn part_name(local_name: &str) -> String {
    format!("{}.part", local_name)
}

impl Materializer {
    pub fn new(api: Arc<dyn DriveApi>, mime_map: Arc<MimeMap>) -> Self {
        Self {
            api,
            mime_map,
            existing: ExistingFilePolicy::default(),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_existing(mut self, existing: ExistingFilePolicy) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn source<'a>(&'a self, entry: &RemoteEntry) -> Source<'a> {
        match self.mime_map.get(&entry.mime_type) {
            Some(format) => Source::Export(format),
            None => Source::Media,
        }
    }

    /// Local file name for `entry`: the sanitized remote name, plus the
    /// export extension for Google-native documents.
    pub fn local_name(&self, entry: &RemoteEntry) -> String {
        let name = sanitize(&entry.name);
        match self.source(entry) {
            Source::Export(format) if !format.extension.is_empty() => {
                format!("{}.{}", name, format.extension.replace(['/', '\\'], "_"))
            }
            _ => name,
        }
    }

    pub async fn materialize(&self, entry: &RemoteEntry, target: &LocalTarget) -> Result<Materialized> {
        match target {
            LocalTarget::Directory(dir) => self.write_to_dir(entry, dir).await.map(Materialized::File),
            LocalTarget::Memory => self.read_to_memory(entry).await.map(Materialized::Memory),
        }
    }

    /// Write `entry` into `dir` under its [`local_name`](Self::local_name).
    ///
    /// Bytes go to a `.part` file that is renamed over the destination once
    /// complete and removed if the transfer fails.
    pub async fn write_to_dir(&self, entry: &RemoteEntry, dir: &Path) -> Result<Written> {
        let dest = dir.join(self.local_name(entry));

        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            match self.existing {
                ExistingFilePolicy::Skip => {
                    log::info!("{} already exists, skipping", dest.display());
                    return Ok(Written::Skipped(dest));
                }
                ExistingFilePolicy::Overwrite => {
                    log::info!("{} already exists, overwriting", dest.display());
                }
            }
        }

        let label = dest.display().to_string();
        let media = self.open(entry).await?;

        let part = part_path(&dest);
        let file = File::create(&part)
            .await
            .map_err(|e| DriveError::filesystem(&part, e))?;
        let sink = Sink::File {
            file,
            path: part.clone(),
        };

        let result = match self.drain(entry, &label, media, sink).await {
            Ok((bytes, _)) => tokio::fs::rename(&part, &dest)
                .await
                .map(|()| bytes)
                .map_err(|e| DriveError::filesystem(&dest, e)),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                self.progress.on_complete(&label, bytes);
                Ok(Written::Saved { path: dest, bytes })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                if !matches!(e, DriveError::Cancelled) {
                    self.progress.on_error(&label, &e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Download `entry` into memory.
    pub async fn read_to_memory(&self, entry: &RemoteEntry) -> Result<Bytes> {
        let media = self.open(entry).await?;
        let capacity = media.total.unwrap_or(0).min(64 * 1024 * 1024) as usize;
        let sink = Sink::Memory(BytesMut::with_capacity(capacity));

        match self.drain(entry, &entry.name, media, sink).await {
            Ok((bytes, buf)) => {
                self.progress.on_complete(&entry.name, bytes);
                Ok(buf.unwrap_or_default())
            }
            Err(e) => {
                if !matches!(e, DriveError::Cancelled) {
                    self.progress.on_error(&entry.name, &e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Start the export or media transfer for `entry`.
    async fn open(&self, entry: &RemoteEntry) -> Result<MediaStream> {
        if entry.is_folder() {
            return Err(DriveError::download(
                &entry.id,
                &entry.name,
                DriveError::NotAFile(entry.id.clone()),
            ));
        }
        if self.cancel.is_cancelled() {
            return Err(DriveError::Cancelled);
        }

        let opened = match self.source(entry) {
            Source::Export(format) => {
                log::debug!("Exporting {} as {}", entry.name, format.mime_type);
                self.api.export(&entry.id, &format.mime_type).await
            }
            Source::Media => self.api.get_media(&entry.id).await,
        };
        opened.map_err(|e| DriveError::download(&entry.id, &entry.name, e))
    }

    /// Copy every chunk of `media` into `sink`, reporting progress.
    async fn drain(
        &self,
        entry: &RemoteEntry,
        label: &str,
        media: MediaStream,
        mut sink: Sink,
    ) -> Result<(u64, Option<Bytes>)> {
        let MediaStream { total, mut chunks } = media;
        self.progress.on_start(label, total);

        let mut received: u64 = 0;
        let mut last_percent: Option<u8> = None;

        while let Some(chunk) = chunks.next().await {
            if self.cancel.is_cancelled() {
                return Err(DriveError::Cancelled);
            }
            let chunk = chunk.map_err(|e| DriveError::download(&entry.id, &entry.name, e))?;
            sink.write(&chunk).await?;
            received += chunk.len() as u64;

            let pct = percent(received, total);
            if last_percent != Some(pct) {
                self.progress.on_progress(label, pct);
                last_percent = Some(pct);
            }
        }

        if last_percent != Some(100) {
            self.progress.on_progress(label, 100);
        }

        let buf = sink.finish().await?;
        Ok((received, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize("a/b/c"), "a_b_c");
        assert_eq!(sanitize("a\\b"), "a_b");
        assert_eq!(sanitize("report.txt"), "report.txt");
    }

    #[test]
    fn test_sanitize_dot_names() {
        assert_eq!(sanitize(""), "_");
        assert_eq!(sanitize("."), "_");
        assert_eq!(sanitize(".."), "_");
        assert_eq!(sanitize("..."), "...");
        assert_eq!(sanitize("../etc"), ".._etc");
    }

    #[test]
    fn test_export_extension_stays_in_directory() {
        let mime_map = MimeMap::with_overrides([(
            "application/vnd.google-apps.document".to_string(),
            ExportFormat::new("text/plain", "x/../../y"),
        )]);
        let api: Arc<dyn DriveApi> = Arc::new(crate::client::HttpDriveApi::new(Arc::new(
            crate::auth::StaticToken::new("tok"),
        )));
        let materializer = Materializer::new(api, Arc::new(mime_map));
        let entry = RemoteEntry {
            id: "d1".to_string(),
            name: "notes".to_string(),
            mime_type: "application/vnd.google-apps.document".to_string(),
            parents: Vec::new(),
            size: None,
        };

        let name = materializer.local_name(&entry);
        assert_eq!(name, "notes.x_.._.._y");
        assert_eq!(Path::new("/out").join(&name).parent(), Some(Path::new("/out")));
    }

    #[test]
    fn test_part_path() {
        assert_eq!(part_path(Path::new("/tmp/x.docx")), PathBuf::from("/tmp/x.docx.part"));
        assert_eq!(
            Path::new("/tmp").join(part_name("x.docx")),
            part_path(Path::new("/tmp/x.docx"))
        );
    }
}
