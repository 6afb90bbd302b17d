//! Schema, documentation, scheduler export and preprocess surfaces

use std::fs;

use super::helpers::*;
use clap::Parser;
use tempfile::TempDir;
use trellis::cli::Cli;
use trellis::commands::run;

#[test]
fn test_schema_without_script_exits_cleanly() {
    let temp = TempDir::new().unwrap();
    let schema_path = temp.path().join("schema.json");
    let schema_arg = format!("--schema={}", schema_path.display());
    let cli = Cli::parse_from(["trellis", schema_arg.as_str()]);
    run::execute(cli).unwrap();

    let schema: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&schema_path).unwrap()).unwrap();
    assert!(schema["Elements"]["Node"].is_object());
    assert!(schema["Elements"]["Copy"]["Task"].as_bool().unwrap());
}

#[test]
fn test_documentation_lists_tasks() {
    let temp = TempDir::new().unwrap();
    let docs_path = temp.path().join("tasks.md");
    let docs_arg = format!("--documentation={}", docs_path.display());
    let cli = Cli::parse_from(["trellis", docs_arg.as_str()]);
    run::execute(cli).unwrap();

    let markdown = fs::read_to_string(&docs_path).unwrap();
    assert!(markdown.contains("## Spawn"));
    assert!(markdown.contains("| Exe | String | Yes |"));
}

#[test]
fn test_public_tasks_only_filters_documentation() {
    let temp = TempDir::new().unwrap();
    let docs_path = temp.path().join("tasks.md");
    let docs_arg = format!("--documentation={}", docs_path.display());
    let cli = Cli::parse_from(["trellis", "--public-tasks-only", docs_arg.as_str()]);
    run::execute(cli).unwrap();
    // The built-in set is public, so everything is still present
    assert!(fs::read_to_string(&docs_path).unwrap().contains("## Copy"));
}

#[test]
fn test_export_produces_scheduler_manifest() {
    let (workspace, script) = workspace_with_script(two_node_script());
    let export_path = workspace.path().join("export.json");
    let export_arg = format!("--export={}", export_path.display());
    run_trellis(
        workspace.path(),
        &script,
        &["--target=B", export_arg.as_str()],
    )
    .unwrap();

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&export_path).unwrap()).unwrap();
    let nodes = manifest["Groups"][0]["Nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1]["Name"], "B");
    assert_eq!(nodes[1]["DependsOn"][0], "A");
    // Export never executes
    assert!(!is_complete(workspace.path(), "A"));
}

#[test]
fn test_preprocess_output_parses_back() {
    let (workspace, script) = workspace_with_script(
        r#"
        <BuildGraph>
            <Option Name="Config" DefaultValue="Debug" Description="cfg"/>
            <Agent Name="Primary" Type="Linux">
                <ForEach Name="Step" Values="One;Two">
                    <Node Name="$(Step)-$(Config)">
                        <Log Message="step $(Step)"/>
                    </Node>
                </ForEach>
            </Agent>
        </BuildGraph>
        "#,
    );
    let pre_path = workspace.path().join("preprocessed.graph.xml");
    let pre_arg = format!("--preprocess={}", pre_path.display());
    run_trellis(workspace.path(), &script, &[pre_arg.as_str()]).unwrap();

    let rendered = fs::read_to_string(&pre_path).unwrap();
    // Loops unrolled, properties folded
    assert!(rendered.contains("One-Debug"));
    assert!(rendered.contains("Two-Debug"));
    assert!(!rendered.contains("$(Step)"));

    // The preprocessed form is itself a valid script
    run_trellis(workspace.path(), &pre_path, &["--list-only"]).unwrap();
}
