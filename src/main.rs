//! drive_fetch CLI - Download folders and files from Google Drive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use drive_fetch::traverse::Outcome;
use drive_fetch::{
    parse, Authenticator, CredentialProvider, DriveError, ExistingFilePolicy, FetchConfig, Fetcher,
    HttpDriveApi, LogProgress, StaticToken, Summary, TreeNode,
};

/// CLI tool for downloading from Google Drive.
#[derive(Parser)]
#[command(name = "drive_fetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a service account or authorized user credentials JSON file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Use this access token instead of a credentials file.
    #[arg(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Config file (defaults to <config dir>/drive_fetch/config.toml if present).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Log debug output, including per-file progress.
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a folder tree, file or document.
    Download {
        /// Drive folder, file or Docs URL.
        url: String,

        /// Local destination directory.
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,

        /// Deepest folder level to list (the URL's folder is level 0).
        #[arg(long, short = 'd')]
        depth: Option<u32>,

        /// Keep files that already exist instead of downloading them again.
        #[arg(long)]
        skip_existing: bool,

        /// Files downloaded at the same time within a folder.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Entries requested per listing page.
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// List the immediate children of a folder.
    List {
        /// Drive folder URL.
        url: String,
    },

    /// Download a folder's files into memory, one at a time.
    Cat {
        /// Drive folder, file or Docs URL.
        url: String,

        /// Also write each downloaded buffer into this directory.
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = FetchConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Fail on a bad URL before touching credentials or the network
    let url = match &cli.command {
        Commands::Download { url, .. } | Commands::List { url } | Commands::Cat { url, .. } => url,
    };
    let resource = parse(url).with_context(|| format!("Invalid Drive URL: {}", url))?;

    let provider: Arc<dyn CredentialProvider> = match (&cli.access_token, &cli.credentials) {
        (Some(token), _) => Arc::new(StaticToken::new(token.clone())),
        (None, Some(path)) => {
            let mut auth = Authenticator::from_file(path)
                .with_context(|| format!("Failed to load credentials from {:?}", path))?;
            if let Some(cache) = config
                .token_cache
                .clone()
                .or_else(FetchConfig::default_token_cache)
            {
                auth = auth.with_token_cache(cache);
            }
            Arc::new(auth)
        }
        (None, None) => anyhow::bail!(
            "No credentials: pass --credentials or --access-token \
             (or set GOOGLE_APPLICATION_CREDENTIALS / DRIVE_ACCESS_TOKEN)"
        ),
    };

    provider
        .access_token()
        .await
        .context("Failed to authenticate with Google")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, stopping");
                cancel.cancel();
            }
        });
    }

    let api = Arc::new(HttpDriveApi::new(provider).with_max_retries(config.max_retries));

    match cli.command {
        Commands::Download {
            out,
            depth,
            skip_existing,
            concurrency,
            page_size,
            ..
        } => {
            if let Some(depth) = depth {
                config = config.with_max_depth(depth);
            }
            if skip_existing {
                config = config.with_existing(ExistingFilePolicy::Skip);
            }
            if let Some(concurrency) = concurrency {
                config = config.with_concurrency(concurrency);
            }
            if let Some(page_size) = page_size {
                config = config.with_page_size(page_size);
            }

            let fetcher = Fetcher::new(api, &config)
                .with_progress(Arc::new(LogProgress))
                .with_cancellation(cancel);

            let tree = fetcher
                .fetch_resource(&resource, &out, config.max_depth)
                .await
                .with_context(|| format!("Failed to download {} {}", resource.kind, resource.id))?;

            let failures = collect_failures(&tree);
            for (name, error) in &failures {
                eprintln!("FAILED {}: {}", name, error);
            }

            let summary = Summary::of(&tree);
            println!("Done: {}", summary);
            println!("Saved to: {:?}", out);

            if summary.failed > 0 {
                anyhow::bail!("{} entries could not be downloaded", summary.failed);
            }
        }

        Commands::List { .. } => {
            let fetcher = Fetcher::new(api, &config).with_cancellation(cancel);
            let entries = fetcher
                .listing()
                .list_children(&resource.id)
                .await
                .with_context(|| format!("Failed to list files in folder: {}", resource.id))?;

            if entries.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<44} {:>10} {:<30} {}", "ID", "SIZE", "TYPE", "NAME");
                println!("{}", "-".repeat(100));
                for entry in entries {
                    println!("{}", entry);
                }
            }
        }

        Commands::Cat { url, out } => {
            let fetcher = Fetcher::new(api, &config)
                .with_progress(Arc::new(LogProgress))
                .with_cancellation(cancel);

            if let Some(out) = &out {
                tokio::fs::create_dir_all(out)
                    .await
                    .with_context(|| format!("Failed to create directory: {:?}", out))?;
            }

            let files = fetcher
                .fetch_to_memory(&url)
                .await
                .with_context(|| format!("Failed to list {}", resource.id))?;
            let mut files = Box::pin(files);

            let mut failed = 0usize;
            while let Some(item) = files.next().await {
                match item {
                    Ok(file) => {
                        println!("{}\t{} bytes", file.entry.name, file.bytes.len());
                        if let Some(out) = &out {
                            let path = out.join(fetcher.materializer().local_name(&file.entry));
                            tokio::fs::write(&path, &file.bytes)
                                .await
                                .with_context(|| format!("Failed to write {:?}", path))?;
                        }
                    }
                    Err(DriveError::Cancelled) => anyhow::bail!("Cancelled"),
                    Err(e) => {
                        failed += 1;
                        eprintln!("FAILED: {}", e);
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{} files could not be downloaded", failed);
            }
        }
    }

    Ok(())
}

/// Names and errors of every failed entry, depth-first.
fn collect_failures(nodes: &[TreeNode]) -> Vec<(String, String)> {
    let mut failures = Vec::new();
    for node in nodes {
        match &node.outcome {
            Outcome::Failed(error) => failures.push((node.entry.name.clone(), error.clone())),
            Outcome::Folder {
                children: Some(children),
                ..
            } => failures.extend(collect_failures(children)),
            _ => {}
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_fetch::RemoteEntry;

    fn node(name: &str, outcome: Outcome) -> TreeNode {
        TreeNode {
            entry: RemoteEntry {
                id: name.to_string(),
                name: name.to_string(),
                mime_type: String::new(),
                parents: vec![],
                size: None,
            },
            outcome,
        }
    }

    #[test]
    fn test_collect_failures_descends_into_folders() {
        let tree = vec![
            node("a", Outcome::Failed("boom".to_string())),
            node(
                "dir",
                Outcome::Folder {
                    path: PathBuf::from("dir"),
                    children: Some(vec![node("b", Outcome::Failed("bang".to_string()))]),
                },
            ),
            node("c", Outcome::Saved(PathBuf::from("c"))),
        ];

        let failures = collect_failures(&tree);
        assert_eq!(
            failures,
            vec![
                ("a".to_string(), "boom".to_string()),
                ("b".to_string(), "bang".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_parses_download() {
        let cli = Cli::try_parse_from([
            "drive_fetch",
            "--access-token",
            "tok",
            "download",
            "https://drive.google.com/drive/folders/abc",
            "--depth",
            "2",
            "--skip-existing",
        ])
        .unwrap();

        match cli.command {
            Commands::Download {
                depth, skip_existing, ..
            } => {
                assert_eq!(depth, Some(2));
                assert!(skip_existing);
            }
            _ => panic!("expected download"),
        }
    }
}
