//! Manifest and file-list records for temp storage
//!
//! A manifest describes the contents of one block: for every file, its
//! workspace-relative path (forward slashes), length, last-write time as
//! UTC 100-ns ticks, and a SHA-1 digest. Length and ticks are the cheap
//! integrity proxy checked on every run; the digest is the authoritative
//! record used when a block crosses machines.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::filespec::FileSet;

/// Identifies one persisted block: producing node plus output name, where
/// the empty output designates the default output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockRef {
    pub node: String,
    pub output: String,
}

impl BlockRef {
    pub fn new(node: &str, output: &str) -> Self {
        Self {
            node: node.to_string(),
            output: output.to_string(),
        }
    }

    /// File-name stem for this block's archive and manifest
    pub fn file_stem(&self) -> String {
        format!("{}@{}", self.node, self.output)
    }
}

/// One file record within a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredFile {
    /// Workspace-relative path with forward slashes
    pub path: String,
    pub length: u64,
    /// Last write time, UTC 100-ns ticks since the Unix epoch
    pub ticks: i64,
    /// SHA-1 digest, lowercase hex
    pub digest: String,
}

impl StoredFile {
    /// Absolute location in a workspace
    pub fn absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }

    /// Whether the workspace copy still has the recorded length and
    /// timestamp. Content is deliberately not rehashed here.
    pub fn matches_current(&self, root: &Path) -> bool {
        match stat_file(&self.absolute(root)) {
            Ok((length, ticks)) => length == self.length && ticks == self.ticks,
            Err(_) => false,
        }
    }
}

/// Ordered file list for one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub block: BlockRef,
    /// When the block was published
    pub written_at: DateTime<Utc>,
    pub files: Vec<StoredFile>,
}

impl Manifest {
    /// Record the current state of a file set.
    ///
    /// Every file must live under the workspace root and exist on disk.
    pub fn capture(root: &Path, block: BlockRef, files: &FileSet) -> Result<Self> {
        let mut records = Vec::with_capacity(files.len());
        for file in files {
            records.push(capture_file(root, file)?);
        }
        Ok(Self {
            block,
            written_at: Utc::now(),
            files: records,
        })
    }

    /// Re-stat every file, keeping the recorded digests.
    ///
    /// Used after unpacking an archive: extraction gives files fresh
    /// timestamps, and the local manifest must describe what is actually on
    /// disk for later integrity checks to pass.
    pub fn refresh_stats(&mut self, root: &Path) -> Result<()> {
        for file in &mut self.files {
            let (length, ticks) = stat_file(&file.absolute(root))
                .with_context(|| format!("Missing extracted file '{}'", file.path))?;
            file.length = length;
            file.ticks = ticks;
        }
        Ok(())
    }
}

/// The files composing one tag, and the blocks that physically hold them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileList {
    /// Tag name, with the leading `#`
    pub tag: String,
    /// Workspace-relative paths with forward slashes
    pub files: Vec<String>,
    pub blocks: Vec<BlockRef>,
}

/// Workspace-relative forward-slash form of a path
pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).with_context(|| {
        format!(
            "File {} is outside the workspace {}",
            path.display(),
            root.display()
        )
    })?;
    let key = relative.to_string_lossy().replace('\\', "/");
    if key.is_empty() {
        bail!("Cannot record the workspace root itself");
    }
    Ok(key)
}

/// Length and mtime (as ticks) of a file
pub fn stat_file(path: &Path) -> Result<(u64, i64)> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let modified = metadata
        .modified()
        .with_context(|| format!("No modification time for {}", path.display()))?;
    let ticks = match modified.duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => (duration.as_nanos() / 100) as i64,
        Err(before_epoch) => -((before_epoch.duration().as_nanos() / 100) as i64),
    };
    Ok((metadata.len(), ticks))
}

/// Streaming SHA-1 of a file's contents, lowercase hex
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn capture_file(root: &Path, path: &Path) -> Result<StoredFile> {
    let key = relative_key(root, path)?;
    let (length, ticks) = stat_file(path)?;
    let digest = hash_file(path)?;
    Ok(StoredFile {
        path: key,
        length,
        ticks,
        digest,
    })
}
