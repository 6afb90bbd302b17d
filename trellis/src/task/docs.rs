//! Markdown documentation for the registered task vocabulary

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::TaskRegistry;

/// Render one markdown section per registered task
pub fn render(registry: &TaskRegistry) -> String {
    let mut out = String::from("# Tasks\n");
    for descriptor in registry.descriptors() {
        let _ = write!(out, "\n## {}\n\n{}\n", descriptor.name, descriptor.description);
        if descriptor.params.is_empty() {
            continue;
        }
        out.push_str("\n| Attribute | Type | Required | Description |\n");
        out.push_str("|-----------|------|----------|-------------|\n");
        for param in &descriptor.params {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                param.name,
                param.kind,
                if param.optional { "No" } else { "Yes" },
                param.description
            );
        }
    }
    out
}

/// Write the task documentation to a file
pub fn write(registry: &TaskRegistry, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, render(registry))
        .with_context(|| format!("Failed to write {}", path.display()))
}
