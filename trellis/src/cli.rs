//! Command-line surface

use clap::Parser;
use std::path::PathBuf;

/// Declarative build-graph runner
#[derive(Debug, Parser)]
#[command(name = "trellis")]
#[command(about = "Run declarative build graphs locally or across a build farm", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Graph script to read
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Target nodes, aggregates or tags ('+' or ';' separated)
    #[arg(long, value_name = "LIST")]
    pub target: Option<String>,

    /// Write the element schema as JSON and exit (unless a script is given)
    #[arg(long, value_name = "PATH")]
    pub schema: Option<PathBuf>,

    /// Write markdown documentation for the registered tasks and exit
    /// (unless a script is given)
    #[arg(long, value_name = "PATH")]
    pub documentation: Option<PathBuf>,

    /// Write the external-scheduler JSON manifest; do not execute
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Write the post-expansion, post-selection script; do not execute
    #[arg(long, value_name = "PATH")]
    pub preprocess: Option<PathBuf>,

    /// Enable shared storage at this directory
    #[arg(long, value_name = "PATH")]
    pub shared_storage_dir: Option<PathBuf>,

    /// Allow writing to shared storage (read-only otherwise)
    #[arg(long)]
    pub write_to_shared_storage: bool,

    /// Execute exactly one node (implies --resume)
    #[arg(long, value_name = "NAME")]
    pub single_node: Option<String>,

    /// Include nodes behind this trigger
    #[arg(long, value_name = "NAME")]
    pub trigger: Option<String>,

    /// Skip nodes behind the named triggers ('+' or ';' separated)
    #[arg(long, value_name = "LIST")]
    pub skip_trigger: Option<String>,

    /// Skip every triggered node, even when targeted
    #[arg(long)]
    pub skip_triggers: bool,

    /// Enable token arbitration with this job signature
    #[arg(long, value_name = "SIGNATURE")]
    pub token_signature: Option<String>,

    /// On a token conflict, drop the affected nodes instead of failing
    #[arg(long)]
    pub skip_targets_without_tokens: bool,

    /// Keep local state and skip nodes that already completed
    #[arg(long)]
    pub resume: bool,

    /// Delete all local storage state before running
    #[arg(long)]
    pub clean: bool,

    /// Delete local storage state for the named nodes ('+' or ';' separated)
    #[arg(long, value_name = "LIST")]
    pub clean_node: Option<String>,

    /// Print the selected graph and exit
    #[arg(long)]
    pub list_only: bool,

    /// Show node dependencies when printing
    #[arg(long)]
    pub show_deps: bool,

    /// Show notification recipients when printing
    #[arg(long)]
    pub show_notifications: bool,

    /// Set a property (repeatable; also accepted as --set:Name=Value)
    #[arg(long = "set", value_name = "NAME=VALUE", action = clap::ArgAction::Append)]
    pub set: Vec<String>,

    /// Restrict the task registry to publicly distributed tasks
    #[arg(long)]
    pub public_tasks_only: bool,

    /// Inject a report with this name covering all selected nodes
    #[arg(long, value_name = "NAME")]
    pub report_name: Option<String>,

    /// Workspace root (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

/// Rewrite `--set:Name=Value` (and the `-set:` short form) into the
/// two-token form clap expects.
pub fn normalize_args(args: impl Iterator<Item = String>) -> Vec<String> {
    let mut normalized = Vec::new();
    for arg in args {
        if let Some(rest) = arg.strip_prefix("--set:").or_else(|| arg.strip_prefix("-set:")) {
            normalized.push("--set".to_string());
            normalized.push(rest.to_string());
        } else {
            normalized.push(arg);
        }
    }
    normalized
}

/// Split a target-style list on '+' and ';', discarding empty items
pub fn split_name_list(list: &str) -> Vec<String> {
    list.split(['+', ';'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse one `Name=Value` property override
pub fn parse_set(value: &str) -> anyhow::Result<(String, String)> {
    match value.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => anyhow::bail!("Invalid property override '{value}' (expected Name=Value)"),
    }
}
