//! Recursive traversal of a Drive folder into a local directory tree.
//!
//! [`Fetcher`] walks a remote folder to a bounded depth, mirroring folders as
//! local directories and handing files to the [`Materializer`]. Failures of a
//! single file or subfolder are recorded in the returned tree and do not stop
//! the siblings.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use futures::stream::{self, Stream};
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::DriveApi;
use crate::config::FetchConfig;
use crate::error::{DriveError, Result};
use crate::listing::ListingClient;
use crate::materialize::{part_name, sanitize, Materializer, Written};
use crate::models::RemoteEntry;
use crate::progress::ProgressObserver;
use crate::url_parser::{self, ResourceRef};

/// What happened to one remote entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A folder mirrored at `path`. `children` is `None` when the depth bound
    /// stopped the descent before listing it.
    Folder {
        path: PathBuf,
        children: Option<Vec<TreeNode>>,
    },
    Saved(PathBuf),
    Skipped(PathBuf),
    Failed(String),
}

/// A remote entry annotated with its local outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub entry: RemoteEntry,
    pub outcome: Outcome,
}

impl TreeNode {
    fn failed(entry: RemoteEntry, error: &DriveError) -> Self {
        log::warn!("{}", error);
        Self {
            entry,
            outcome: Outcome::Failed(error.to_string()),
        }
    }

    /// Traversed children of a folder, if it was listed.
    pub fn children(&self) -> Option<&[TreeNode]> {
        match &self.outcome {
            Outcome::Folder {
                children: Some(children),
                ..
            } => Some(children),
            _ => None,
        }
    }
}

impl From<Written> for Outcome {
    fn from(written: Written) -> Self {
        match written {
            Written::Saved { path, .. } => Outcome::Saved(path),
            Written::Skipped(path) => Outcome::Skipped(path),
        }
    }
}

/// Counts of outcomes across a traversed tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub folders: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn of(nodes: &[TreeNode]) -> Self {
        let mut summary = Self::default();
        summary.add(nodes);
        summary
    }

    fn add(&mut self, nodes: &[TreeNode]) {
        for node in nodes {
            match &node.outcome {
                Outcome::Folder { children, .. } => {
                    self.folders += 1;
                    if let Some(children) = children {
                        self.add(children);
                    }
                }
                Outcome::Saved(_) => self.saved += 1,
                Outcome::Skipped(_) => self.skipped += 1,
                Outcome::Failed(_) => self.failed += 1,
            }
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved, {} skipped, {} failed, {} folders",
            self.saved, self.skipped, self.failed, self.folders
        )
    }
}

/// One file downloaded by [`Fetcher::fetch_to_memory`].
#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub entry: RemoteEntry,
    pub bytes: Bytes,
}

/// Downloads Drive folders and files.
pub struct Fetcher {
    api: Arc<dyn DriveApi>,
    listing: ListingClient,
    materializer: Materializer,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(api: Arc<dyn DriveApi>, config: &FetchConfig) -> Self {
        let cancel = CancellationToken::new();
        let listing = ListingClient::new(Arc::clone(&api), config.page_size)
            .with_cancellation(cancel.clone());
        let materializer = Materializer::new(Arc::clone(&api), Arc::new(config.mime_map()))
            .with_existing(config.existing)
            .with_cancellation(cancel.clone());

        Self {
            api,
            listing,
            materializer,
            concurrency: config.concurrency.max(1),
            cancel,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.materializer = self.materializer.with_progress(progress);
        self
    }

    /// Abort the run when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.listing = self.listing.with_cancellation(cancel.clone());
        self.materializer = self.materializer.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn listing(&self) -> &ListingClient {
        &self.listing
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Download whatever `url` points at into `output_root`.
    ///
    /// Folder URLs are traversed down to `max_depth`; file and document URLs
    /// fetch that single item.
    pub async fn fetch(&self, url: &str, output_root: &Path, max_depth: u32) -> Result<Vec<TreeNode>> {
        let resource = url_parser::parse(url)?;
        self.fetch_resource(&resource, output_root, max_depth).await
    }

    pub async fn fetch_resource(
        &self,
        resource: &ResourceRef,
        output_root: &Path,
        max_depth: u32,
    ) -> Result<Vec<TreeNode>> {
        log::info!("Fetching {} {} into {}", resource.kind, resource.id, output_root.display());
        if resource.kind.is_container() {
            self.traverse(&resource.id, output_root, max_depth).await
        } else {
            self.fetch_item(&resource.id, output_root, max_depth).await
        }
    }

    /// Mirror the folder `root_id` into `output_root`.
    ///
    /// The root is depth 0. A folder at depth `d` is listed only while
    /// `d <= max_depth`; deeper folders are created but left empty.
    pub async fn traverse(&self, root_id: &str, output_root: &Path, max_depth: u32) -> Result<Vec<TreeNode>> {
        create_dir(output_root).await?;
        let children = self.traverse_at(root_id, output_root, 0, max_depth).await?;
        Ok(children.unwrap_or_default())
    }

    /// Download the single item `file_id` into `output_root`. A folder id is
    /// traversed instead.
    pub async fn fetch_item(&self, file_id: &str, output_root: &Path, max_depth: u32) -> Result<Vec<TreeNode>> {
        if self.cancel.is_cancelled() {
            return Err(DriveError::Cancelled);
        }
        let entry = self
            .api
            .get_metadata(file_id)
            .await
            .map_err(|e| DriveError::download(file_id, file_id, e))?;

        if entry.is_folder() {
            log::info!("{} is a folder, traversing it", entry.name);
            return self.traverse(&entry.id, output_root, max_depth).await;
        }

        create_dir(output_root).await?;
        let node = match self.materializer.write_to_dir(&entry, output_root).await {
            Ok(written) => TreeNode {
                entry,
                outcome: written.into(),
            },
            Err(DriveError::Cancelled) => return Err(DriveError::Cancelled),
            Err(e) => TreeNode::failed(entry, &e),
        };
        Ok(vec![node])
    }

    /// Lazily download the immediate children of `url` into memory.
    ///
    /// Only the listing happens up front; each file is downloaded when the
    /// stream is polled for it. Folders are skipped. For a file or document
    /// URL the stream yields that one item.
    pub async fn fetch_to_memory(
        &self,
        url: &str,
    ) -> Result<impl Stream<Item = Result<MemoryFile>> + '_> {
        let resource = url_parser::parse(url)?;
        let entries = if resource.kind.is_container() {
            self.listing.list_children(&resource.id).await?
        } else {
            if self.cancel.is_cancelled() {
                return Err(DriveError::Cancelled);
            }
            let entry = self
                .api
                .get_metadata(&resource.id)
                .await
                .map_err(|e| DriveError::download(&resource.id, &resource.id, e))?;
            vec![entry]
        };

        Ok(stream::iter(entries)
            .filter(|entry| {
                let keep = !entry.is_folder();
                if !keep {
                    log::info!("Skipping folder {}", entry.name);
                }
                future::ready(keep)
            })
            .then(move |entry| async move {
                let bytes = self.materializer.read_to_memory(&entry).await?;
                Ok::<_, DriveError>(MemoryFile { entry, bytes })
            }))
    }

    fn traverse_at<'a>(
        &'a self,
        container_id: &'a str,
        dir: &'a Path,
        depth: u32,
        max_depth: u32,
    ) -> BoxFuture<'a, Result<Option<Vec<TreeNode>>>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(DriveError::Cancelled);
            }
            if depth > max_depth {
                log::debug!("Depth limit reached at {}", dir.display());
                return Ok(None);
            }

            let entries = self.listing.list_children(container_id).await?;
            let mut slots: Vec<Option<TreeNode>> = entries.iter().map(|_| None).collect();
            let (folders, files): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .enumerate()
                .partition(|(_, entry)| entry.is_folder());

            for (idx, node) in self.materialize_files(files, dir).await? {
                slots[idx] = Some(node);
            }

            for (idx, folder) in folders {
                slots[idx] = Some(self.traverse_folder(folder, dir, depth, max_depth).await?);
            }

            Ok(Some(slots.into_iter().flatten().collect()))
        }
        .boxed()
    }

    async fn traverse_folder(
        &self,
        folder: RemoteEntry,
        parent: &Path,
        depth: u32,
        max_depth: u32,
    ) -> Result<TreeNode> {
        let path = parent.join(sanitize(&folder.name));
        if let Err(e) = create_dir(&path).await {
            return Ok(TreeNode::failed(folder, &e));
        }

        match self.traverse_at(&folder.id, &path, depth + 1, max_depth).await {
            Ok(children) => Ok(TreeNode {
                entry: folder,
                outcome: Outcome::Folder { path, children },
            }),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(TreeNode::failed(folder, &e)),
        }
    }

    /// Materialize the files of one folder, at most `concurrency` at a time.
    ///
    /// Files that touch a common path on disk are written one after another
    /// by a single worker, in the order [`group_by_path`] gives.
    async fn materialize_files(
        &self,
        files: Vec<(usize, RemoteEntry)>,
        dir: &Path,
    ) -> Result<Vec<(usize, TreeNode)>> {
        let named = files
            .into_iter()
            .map(|(idx, entry)| (self.materializer.local_name(&entry), (idx, entry)))
            .collect();
        let groups = group_by_path(named);

        let results: Vec<Result<Vec<(usize, TreeNode)>>> = stream::iter(groups)
            .map(|group| async move {
                let mut nodes = Vec::with_capacity(group.len());
                for (idx, entry) in group {
                    let node = match self.materializer.write_to_dir(&entry, dir).await {
                        Ok(written) => TreeNode {
                            entry,
                            outcome: written.into(),
                        },
                        Err(DriveError::Cancelled) => return Err(DriveError::Cancelled),
                        Err(e) => TreeNode::failed(entry, &e),
                    };
                    nodes.push((idx, node));
                }
                Ok(nodes)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut nodes = Vec::new();
        for result in results {
            nodes.extend(result?);
        }
        Ok(nodes)
    }
}

/// Group files so that no two groups touch the same path.
///
/// A file writes `<name>.part` and then renames it to `<name>`, so it shares a
/// path with any sibling whose local name is either of those. Such files end up
/// in one group. Inside a group shorter names are written first, then listing
/// order, so a `.part` file never lands on a name that is already written.
fn group_by_path<T>(named: Vec<(String, (usize, T))>) -> Vec<Vec<(usize, T)>> {
    let mut groups: Vec<Vec<(usize, (usize, T))>> = Vec::new();
    let mut owner: HashMap<String, usize> = HashMap::new();

    for (name, item) in named {
        let len = name.len();
        let paths = [part_name(&name), name];
        let mut hits: Vec<usize> = paths.iter().filter_map(|p| owner.get(p).copied()).collect();
        hits.sort_unstable();
        hits.dedup();

        let target = match hits.first() {
            Some(&group) => group,
            None => {
                groups.push(Vec::new());
                groups.len() - 1
            }
        };
        for &other in hits.iter().skip(1) {
            let moved = std::mem::take(&mut groups[other]);
            groups[target].extend(moved);
            for group in owner.values_mut().filter(|g| **g == other) {
                *group = target;
            }
        }

        groups[target].push((len, item));
        for path in paths {
            owner.insert(path, target);
        }
    }

    groups
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(|mut group| {
            group.sort_by_key(|(len, (idx, _))| (*len, *idx));
            group.into_iter().map(|(_, item)| item).collect()
        })
        .collect()
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| DriveError::filesystem(path, e))
}
