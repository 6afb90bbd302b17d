//! File-spec resolution: paths, wildcards and tag references into file sets
//!
//! A file spec is a semicolon-separated list of items. Each item is a plain
//! path, a Perforce-style wildcard (`...` matches any subpath, `*` within one
//! segment, `?` one character), or a `#Tag` reference into the current tag
//! map. A leading `-` subtracts the item from the set accumulated so far.
//! Relative items are anchored at the workspace root.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The set of files a tag denotes. Paths are absolute and ordered.
pub type FileSet = BTreeSet<PathBuf>;

/// Mapping from tag name (with leading `#`) to its file set
pub type TagSetMap = BTreeMap<String, FileSet>;

/// Whether an item is a tag reference
pub fn is_tag(item: &str) -> bool {
    item.starts_with('#')
}

/// Validate a tag name: leading `#` and a non-empty body without separators
pub fn validate_tag_name(name: &str) -> Result<()> {
    let body = match name.strip_prefix('#') {
        Some(body) => body,
        None => bail!("Tag name '{name}' must begin with '#'"),
    };
    if body.is_empty() {
        bail!("Tag name '{name}' must not be empty");
    }
    if body.contains([';', '+', '#', '/', '\\']) {
        bail!("Tag name '{name}' contains an invalid character");
    }
    Ok(())
}

/// Split a semicolon-separated list, dropping empty entries
pub fn split_list(spec: &str) -> Vec<&str> {
    spec.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Tag names referenced by a spec, subtracted items included
pub fn tags_in_spec(spec: &str) -> Vec<String> {
    split_list(spec)
        .into_iter()
        .map(|item| item.strip_prefix('-').unwrap_or(item).trim())
        .filter(|item| is_tag(item))
        .map(str::to_string)
        .collect()
}

/// Resolve a file spec against the workspace root and the current tag map.
///
/// Items are evaluated left to right, starting from the empty set. Additive
/// wildcards enumerate the filesystem; subtractive wildcards filter the
/// accumulated set instead.
pub fn resolve(spec: &str, root: &Path, tags: &TagSetMap) -> Result<FileSet> {
    let mut files = FileSet::new();
    for raw in split_list(spec) {
        let (subtract, item) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest.trim()),
            None => (false, raw),
        };
        if item.is_empty() {
            bail!("Empty item in file spec '{spec}'");
        }
        if is_tag(item) {
            let tagged = tags
                .get(item)
                .with_context(|| format!("Reference to undefined tag '{item}'"))?;
            if subtract {
                for file in tagged {
                    files.remove(file);
                }
            } else {
                files.extend(tagged.iter().cloned());
            }
        } else if has_wildcard(item) {
            let pattern = anchor(item, root);
            let regex = wildcard_regex(&pattern)?;
            if subtract {
                files.retain(|file| !regex.is_match(&path_key(file)));
            } else {
                for file in enumerate_matches(&pattern, &regex) {
                    files.insert(file);
                }
            }
        } else {
            let path = anchor_path(item, root);
            if subtract {
                files.remove(&path);
            } else {
                files.insert(path);
            }
        }
    }
    Ok(files)
}

/// Whether an item contains wildcard characters
fn has_wildcard(item: &str) -> bool {
    item.contains("...") || item.contains('*') || item.contains('?')
}

/// Whether an item is its own anchor (absolute path or drive-letter prefix)
fn is_anchored(item: &str) -> bool {
    item.starts_with('/') || (item.len() >= 2 && item.as_bytes()[1] == b':')
}

fn anchor(item: &str, root: &Path) -> String {
    if is_anchored(item) {
        item.replace('\\', "/")
    } else {
        format!("{}/{}", path_key(root), item.replace('\\', "/"))
    }
}

fn anchor_path(item: &str, root: &Path) -> PathBuf {
    let normalized = item.replace('\\', "/");
    if is_anchored(&normalized) {
        PathBuf::from(normalized)
    } else {
        root.join(normalized)
    }
}

/// Forward-slash form of a path, used for matching
fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Translate a Perforce-style pattern into an anchored regex
fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if pattern[i..].starts_with("...") {
            expr.push_str(".*");
            i += 3;
        } else {
            let c = bytes[i] as char;
            match c {
                '*' => expr.push_str("[^/]*"),
                '?' => expr.push_str("[^/]"),
                _ => expr.push_str(&regex::escape(&c.to_string())),
            }
            i += 1;
        }
    }
    expr.push('$');
    Regex::new(&expr).with_context(|| format!("Invalid wildcard pattern '{pattern}'"))
}

/// Walk the deepest fixed directory prefix of `pattern` and collect matches
fn enumerate_matches(pattern: &str, regex: &Regex) -> Vec<PathBuf> {
    let mut base = String::new();
    for component in pattern.split('/') {
        if has_wildcard(component) {
            break;
        }
        if base.is_empty() {
            if pattern.starts_with('/') {
                base.push('/');
            }
        } else if !base.ends_with('/') {
            base.push('/');
        }
        base.push_str(component);
    }
    let base_dir = if base.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(&base)
    };

    let mut matches = Vec::new();
    for entry in WalkDir::new(&base_dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && regex.is_match(&path_key(entry.path())) {
            matches.push(entry.path().to_path_buf());
        }
    }
    matches
}
