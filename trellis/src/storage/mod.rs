//! Temp storage: persistence and transfer of node outputs
//!
//! Two layers. The local layer under `<workspace>/.trellis/storage/` always
//! exists and holds manifests (`<node>@<block>.manifest`), file-lists
//! (`<node>+<tag>.filelist`), completion markers (`<node>.complete`) and
//! cached archives. The optional shared layer under
//! `<shared>/<branch>/<change>/<node>/` holds zip archives and their
//! manifests for cross-agent transfer; archives there are the source of
//! truth and are never deleted by this tool.
//!
//! All metadata writes go to a sibling temp file and rename into place, so
//! a partially written block is detectable by its missing manifest.

mod archive;
pub mod manifest;

pub use manifest::{BlockRef, FileList, Manifest, StoredFile};

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::filespec::FileSet;

/// Directory under the workspace root holding local storage state
pub const LOCAL_STORAGE_DIR: &str = ".trellis/storage";

/// Handle to the storage layers for one workspace
pub struct TempStorage {
    root_dir: PathBuf,
    local_dir: PathBuf,
    /// `<shared>/<branch>/<change>`, when shared storage is enabled
    shared_dir: Option<PathBuf>,
    write_shared: bool,
}

impl TempStorage {
    pub fn new(
        root_dir: &Path,
        shared_base: Option<&Path>,
        branch: &str,
        change: &str,
        write_shared: bool,
    ) -> Self {
        // Branch names may contain separators; flatten them for the layout
        let branch_dir = branch.replace(['/', '\\'], "+");
        Self {
            root_dir: root_dir.to_path_buf(),
            local_dir: root_dir.join(LOCAL_STORAGE_DIR),
            shared_dir: shared_base.map(|base| base.join(branch_dir).join(change)),
            write_shared,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn has_shared(&self) -> bool {
        self.shared_dir.is_some()
    }

    // ------------------------------------------------------------- layout

    fn local_manifest_path(&self, block: &BlockRef) -> PathBuf {
        self.local_dir.join(format!("{}.manifest", block.file_stem()))
    }

    fn local_archive_path(&self, block: &BlockRef) -> PathBuf {
        self.local_dir.join(format!("{}.zip", block.file_stem()))
    }

    fn local_file_list_path(&self, node: &str, tag: &str) -> PathBuf {
        self.local_dir
            .join(format!("{node}+{}.filelist", tag.trim_start_matches('#')))
    }

    fn local_marker_path(&self, node: &str) -> PathBuf {
        self.local_dir.join(format!("{node}.complete"))
    }

    fn shared_node_dir(&self, node: &str) -> Option<PathBuf> {
        self.shared_dir.as_ref().map(|dir| dir.join(node))
    }

    fn shared_manifest_path(&self, block: &BlockRef) -> Option<PathBuf> {
        self.shared_node_dir(&block.node)
            .map(|dir| dir.join(format!("{}.manifest", block.file_stem())))
    }

    fn shared_archive_path(&self, block: &BlockRef) -> Option<PathBuf> {
        self.shared_node_dir(&block.node)
            .map(|dir| dir.join(format!("{}.zip", block.file_stem())))
    }

    fn shared_file_list_path(&self, node: &str, tag: &str) -> Option<PathBuf> {
        self.shared_node_dir(node)
            .map(|dir| dir.join(format!("{node}+{}.filelist", tag.trim_start_matches('#'))))
    }

    fn shared_marker_path(&self, node: &str) -> Option<PathBuf> {
        self.shared_node_dir(node).map(|dir| dir.join(format!("{node}.complete")))
    }

    // ------------------------------------------------------------- writes

    /// Publish one block: local manifest always; archive and manifest into
    /// shared storage when the block is needed by another agent.
    pub fn write_block(
        &self,
        block: &BlockRef,
        files: &FileSet,
        mirror_to_shared: bool,
    ) -> Result<Manifest> {
        let manifest = Manifest::capture(&self.root_dir, block.clone(), files)?;
        write_json_atomic(&self.local_manifest_path(block), &manifest)?;

        if mirror_to_shared && self.write_shared {
            if let (Some(archive_path), Some(manifest_path)) = (
                self.shared_archive_path(block),
                self.shared_manifest_path(block),
            ) {
                archive::create_archive(&archive_path, &self.root_dir, &manifest)?;
                write_json_atomic(&manifest_path, &manifest)?;
            }
        }
        Ok(manifest)
    }

    /// Write the file-list for one output tag
    pub fn write_file_list(
        &self,
        node: &str,
        file_list: &FileList,
        mirror_to_shared: bool,
    ) -> Result<()> {
        write_json_atomic(&self.local_file_list_path(node, &file_list.tag), file_list)?;
        if mirror_to_shared && self.write_shared {
            if let Some(path) = self.shared_file_list_path(node, &file_list.tag) {
                write_json_atomic(&path, file_list)?;
            }
        }
        Ok(())
    }

    /// Mark a node complete. Written strictly after all of the node's
    /// blocks and file-lists.
    pub fn write_complete_marker(&self, node: &str) -> Result<()> {
        write_bytes_atomic(&self.local_marker_path(node), b"")?;
        if self.write_shared {
            if let Some(path) = self.shared_marker_path(node) {
                write_bytes_atomic(&path, b"")?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------- reads

    /// Whether the node completed in this workspace.
    ///
    /// A marker alone is not trusted: the manifests and expected file-lists
    /// must still be present alongside it.
    pub fn is_complete(&self, node: &str, expected_tags: &[String]) -> bool {
        if !self.local_marker_path(node).exists() {
            return false;
        }
        expected_tags
            .iter()
            .all(|tag| self.local_file_list_path(node, tag).exists())
    }

    /// Read a tag's file-list, falling back to shared storage
    pub fn read_file_list(&self, node: &str, tag: &str) -> Result<FileList> {
        let local = self.local_file_list_path(node, tag);
        if local.exists() {
            return read_json(&local);
        }
        if let Some(shared) = self.shared_file_list_path(node, tag) {
            if shared.exists() {
                let file_list: FileList = read_json(&shared)?;
                write_json_atomic(&local, &file_list)?;
                return Ok(file_list);
            }
        }
        bail!("No file-list for tag '{tag}' of node '{node}'");
    }

    /// Fetch a block's manifest, pulling the archive from shared storage
    /// into the workspace when it is not available locally.
    ///
    /// Extraction verifies every file against the manifest's SHA-1 digests
    /// (the authoritative record for cross-machine transfer), then the
    /// cached manifest is refreshed with post-extraction lengths and
    /// timestamps so later integrity checks compare against reality.
    pub fn retrieve(&self, block: &BlockRef) -> Result<Manifest> {
        let local = self.local_manifest_path(block);
        if local.exists() {
            return read_json(&local);
        }

        let (Some(shared_manifest), Some(shared_archive)) = (
            self.shared_manifest_path(block),
            self.shared_archive_path(block),
        ) else {
            bail!(
                "Block '{}' is not in local storage and no shared storage is configured",
                block.file_stem()
            );
        };
        if !shared_manifest.exists() {
            bail!(
                "Block '{}' is missing from shared storage ({})",
                block.file_stem(),
                shared_manifest.display()
            );
        }
        let mut manifest: Manifest = read_json(&shared_manifest)?;

        // Cache the archive locally, then unpack it into the workspace
        let cached = self.local_archive_path(block);
        copy_atomic(&shared_archive, &cached)?;
        archive::extract_archive(&cached, &self.root_dir)?;

        for record in &manifest.files {
            let digest = manifest::hash_file(&record.absolute(&self.root_dir))?;
            if digest != record.digest {
                bail!(
                    "Digest mismatch for '{}' extracted from block '{}'",
                    record.path,
                    block.file_stem()
                );
            }
        }
        manifest.refresh_stats(&self.root_dir)?;
        write_json_atomic(&local, &manifest)?;
        Ok(manifest)
    }

    /// All local manifests belonging to one node
    pub fn local_manifests(&self, node: &str) -> Result<Vec<Manifest>> {
        let prefix = format!("{node}@");
        let mut manifests = Vec::new();
        let entries = match fs::read_dir(&self.local_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(manifests),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".manifest") {
                manifests.push(read_json(&entry.path())?);
            }
        }
        manifests.sort_by(|a, b| a.block.cmp(&b.block));
        Ok(manifests)
    }

    // ---------------------------------------------------------- integrity

    /// Validate a node's local state: every manifest entry must match the
    /// workspace file, and every expected tag must have a file-list. On
    /// mismatch the node's entire local state is deleted and `false` is
    /// returned.
    pub fn check_local_integrity(&self, node: &str, expected_tags: &[String]) -> Result<bool> {
        let mut valid = true;
        for manifest in self.local_manifests(node)? {
            for record in &manifest.files {
                if !record.matches_current(&self.root_dir) {
                    valid = false;
                }
            }
        }
        if valid {
            for tag in expected_tags {
                if !self.local_file_list_path(node, tag).exists() {
                    valid = false;
                }
            }
        }
        if !valid {
            self.clean_local_node(node)?;
        }
        Ok(valid)
    }

    // ------------------------------------------------------------ cleanup

    /// Remove one node's markers, manifests, file-lists and cached
    /// archives. Shared storage is left untouched.
    pub fn clean_local_node(&self, node: &str) -> Result<()> {
        let entries = match fs::read_dir(&self.local_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        let block_prefix = format!("{node}@");
        let list_prefix = format!("{node}+");
        let marker = format!("{node}.complete");
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == marker || name.starts_with(&block_prefix) || name.starts_with(&list_prefix) {
                fs::remove_file(entry.path())
                    .with_context(|| format!("Failed to delete {}", entry.path().display()))?;
            }
        }
        Ok(())
    }

    /// Remove all local storage state for the workspace
    pub fn clean_local(&self) -> Result<()> {
        if self.local_dir.exists() {
            fs::remove_dir_all(&self.local_dir)
                .with_context(|| format!("Failed to delete {}", self.local_dir.display()))?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------ io

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Path {} has no parent", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    temp.write_all(bytes)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.persist(path)
        .with_context(|| format!("Failed to publish {}", path.display()))?;
    Ok(())
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize")?;
    write_bytes_atomic(path, json.as_bytes())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Corrupt metadata {}", path.display()))
}

fn copy_atomic(from: &Path, to: &Path) -> Result<()> {
    let parent = to
        .parent()
        .with_context(|| format!("Path {} has no parent", to.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    let temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    fs::copy(from, temp.path())
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    temp.persist(to)
        .with_context(|| format!("Failed to publish {}", to.display()))?;
    Ok(())
}
