//! Shared helpers for the integration scenarios

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::TempDir;
use trellis::cli::Cli;
use trellis::commands::run;

/// Create a workspace containing a graph script
pub fn workspace_with_script(script: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("Failed to create temp workspace");
    let script_path = temp.path().join("build.graph.xml");
    fs::write(&script_path, script).expect("Failed to write script");
    (temp, script_path)
}

/// Run the driver as the binary would, with --workspace and --script set
pub fn run_trellis(workspace: &Path, script: &Path, extra: &[&str]) -> anyhow::Result<()> {
    let workspace_arg = format!("--workspace={}", workspace.display());
    let script_arg = format!("--script={}", script.display());
    let mut args = vec!["trellis", workspace_arg.as_str(), script_arg.as_str()];
    args.extend_from_slice(extra);
    let cli = Cli::parse_from(args);
    run::execute(cli)
}

/// Whether a node's completion marker exists in a workspace
pub fn is_complete(workspace: &Path, node: &str) -> bool {
    workspace
        .join(trellis::storage::LOCAL_STORAGE_DIR)
        .join(format!("{node}.complete"))
        .exists()
}

/// A two-node pipeline: A writes and tags a file, B stages it
pub fn two_node_script() -> &'static str {
    r##"
    <BuildGraph>
        <Agent Name="Primary" Type="Linux">
            <Node Name="A" Produces="#Out">
                <WriteTextFile File="out/a.txt" Text="from A" Tag="#Out"/>
            </Node>
            <Node Name="B">
                <Copy Files="#Out" From="out" To="staged"/>
            </Node>
        </Agent>
    </BuildGraph>
    "##
}
