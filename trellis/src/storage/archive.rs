//! Block archives: zip packing and guarded extraction
//!
//! Entries are stored under their workspace-relative forward-slash paths.
//! Extraction rejects path traversal and absurd compression ratios before
//! touching the workspace.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::manifest::Manifest;

/// Ratio beyond which an entry is treated as a zip bomb
const MAX_COMPRESSION_RATIO: f64 = 100.0;

/// Pack a block's files into a zip at `archive_path`, atomically.
///
/// The archive is written to a sibling temp file and renamed into place, so
/// readers never observe a partial archive.
pub fn create_archive(archive_path: &Path, root: &Path, manifest: &Manifest) -> Result<()> {
    let parent = archive_path
        .parent()
        .with_context(|| format!("Archive path {} has no parent", archive_path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    let mut writer = ZipWriter::new(temp);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for record in &manifest.files {
        writer
            .start_file(record.path.clone(), options)
            .with_context(|| format!("Failed to add '{}' to archive", record.path))?;
        let mut source = File::open(record.absolute(root))
            .with_context(|| format!("Failed to open '{}'", record.path))?;
        io::copy(&mut source, &mut writer)
            .with_context(|| format!("Failed to compress '{}'", record.path))?;
    }

    let temp = writer
        .finish()
        .with_context(|| format!("Failed to finish {}", archive_path.display()))?;
    temp.persist(archive_path)
        .with_context(|| format!("Failed to publish {}", archive_path.display()))?;
    Ok(())
}

/// Validate an entry name from an archive: relative, forward, no traversal
fn safe_entry_path(root: &Path, name: &str) -> Result<PathBuf> {
    if name.contains("..") {
        bail!("Archive entry '{name}' contains a parent directory component");
    }
    if name.starts_with('/') || name.starts_with('\\') || Path::new(name).is_absolute() {
        bail!("Archive entry '{name}' has an absolute path");
    }
    Ok(root.join(name))
}

/// Unpack an archive into the workspace, returning the extracted paths
pub fn extract_archive(archive_path: &Path, root: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Corrupt archive {}", archive_path.display()))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("Corrupt entry in {}", archive_path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let compressed = entry.compressed_size();
        if compressed > 0 {
            let ratio = entry.size() as f64 / compressed as f64;
            if ratio > MAX_COMPRESSION_RATIO {
                bail!(
                    "Suspicious compression ratio {ratio:.1}x for '{}' in {}",
                    entry.name(),
                    archive_path.display()
                );
            }
        }
        let name = entry.name().to_string();
        let dest = safe_entry_path(root, &name)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract '{name}'"))?;
        extracted.push(dest);
    }
    Ok(extracted)
}
