//! HAR (HTTP Archive) harvesting.
//!
//! Captures are moved from a source directory into the target folder, then
//! every stored capture is scanned for request URLs ending in a media
//! extension (e.g. `.jpg`).

use crate::target::{list_with_extension, Target};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarError {
    #[error("create target folder {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("list HAR files in {path}: {source}")]
    List { path: PathBuf, source: io::Error },
    #[error("move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("read HAR file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("parse HAR JSON {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

// Minimal HAR 1.2 shape: only the request URL matters here.

#[derive(Debug, Deserialize)]
struct HarFile {
    log: HarLog,
}

#[derive(Debug, Deserialize)]
struct HarLog {
    entries: Vec<HarEntry>,
}

#[derive(Debug, Deserialize)]
struct HarEntry {
    request: HarRequest,
}

#[derive(Debug, Deserialize)]
struct HarRequest {
    #[serde(default)]
    url: String,
}

/// The HAR captures stored in one target folder.
#[derive(Debug, Clone)]
pub struct HarArchive {
    files: Vec<PathBuf>,
}

impl HarArchive {
    /// Move every `*.har` in `source_dir` into the target folder, then open
    /// the folder's archive.
    ///
    /// The folder is created when missing; an existing folder is reused.
    pub fn import(target: &Target, source_dir: &Path) -> Result<Self, HarError> {
        let incoming = list_with_extension(source_dir, "har").map_err(|source| HarError::List {
            path: source_dir.to_path_buf(),
            source,
        })?;

        if incoming.is_empty() {
            tracing::info!(dir = %source_dir.display(), "no new HAR files found");
        } else {
            tracing::info!(count = incoming.len(), "found new HAR files");

            match std::fs::create_dir(target.dir()) {
                Ok(()) => tracing::info!(path = %target.dir().display(), "created target folder"),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::info!(target = target.name(), "target already exists, adding to it");
                }
                Err(source) => {
                    return Err(HarError::CreateDir {
                        path: target.dir().to_path_buf(),
                        source,
                    })
                }
            }

            for from in incoming {
                // list_with_extension only yields entries with a file name
                let Some(file_name) = from.file_name() else {
                    continue;
                };
                let to = target.dir().join(file_name);
                move_file(&from, &to).map_err(|source| HarError::Move {
                    from: from.clone(),
                    to: to.clone(),
                    source,
                })?;
                tracing::debug!(from = %from.display(), to = %to.display(), "moved HAR file");
            }
        }

        Self::open(target)
    }

    /// Open the captures already stored in the target folder.
    pub fn open(target: &Target) -> Result<Self, HarError> {
        let files = target.har_paths().map_err(|source| HarError::List {
            path: target.dir().to_path_buf(),
            source,
        })?;
        Ok(Self { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Collect request URLs whose path ends in `.{extension}`.
    ///
    /// The query string is ignored for matching but kept in the returned URL.
    /// Order follows file order, then entry order within each file.
    pub fn media_urls(&self, extension: &str) -> Result<Vec<String>, HarError> {
        let mut urls = Vec::new();

        for path in &self.files {
            let bytes = std::fs::read(path).map_err(|source| HarError::Read {
                path: path.clone(),
                source,
            })?;
            let har: HarFile = serde_json::from_slice(&bytes).map_err(|source| HarError::Parse {
                path: path.clone(),
                source,
            })?;

            let before = urls.len();
            urls.extend(
                har.log
                    .entries
                    .into_iter()
                    .map(|entry| entry.request.url)
                    .filter(|url| has_extension(url, extension)),
            );
            tracing::debug!(
                path = %path.display(),
                matched = urls.len() - before,
                extension,
                "scanned HAR file"
            );
        }

        Ok(urls)
    }
}

/// True when the URL's path (everything before `?`) ends in `.{extension}`.
pub fn has_extension(url: &str, extension: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let path = url.split('?').next().unwrap_or(url);
    path.strip_suffix(extension)
        .is_some_and(|rest| rest.ends_with('.'))
}

/// Rename, falling back to copy + remove when crossing filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}
