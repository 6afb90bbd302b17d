//! Two nodes, one tag: the producer/consumer contract

use std::fs;

use super::helpers::*;

#[test]
fn test_target_pulls_in_producer() {
    let (workspace, script) = workspace_with_script(two_node_script());

    run_trellis(workspace.path(), &script, &["--target=B"]).unwrap();

    // A ran first and published #Out; B consumed it
    assert!(is_complete(workspace.path(), "A"));
    assert!(is_complete(workspace.path(), "B"));
    assert_eq!(
        fs::read_to_string(workspace.path().join("staged/a.txt")).unwrap(),
        "from A\n"
    );
}

#[test]
fn test_file_list_records_tag_contents() {
    let (workspace, script) = workspace_with_script(two_node_script());
    run_trellis(workspace.path(), &script, &["--target=A"]).unwrap();

    let file_list = fs::read_to_string(
        workspace
            .path()
            .join(trellis::storage::LOCAL_STORAGE_DIR)
            .join("A+Out.filelist"),
    )
    .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&file_list).unwrap();
    assert_eq!(parsed["Files"][0], "out/a.txt");
    assert_eq!(parsed["Blocks"][0]["Node"], "A");
    assert_eq!(parsed["Blocks"][0]["Output"], "Out");
}

#[test]
fn test_target_only_builds_selection() {
    let (workspace, script) = workspace_with_script(two_node_script());
    run_trellis(workspace.path(), &script, &["--target=A"]).unwrap();

    assert!(is_complete(workspace.path(), "A"));
    assert!(!is_complete(workspace.path(), "B"));
}

#[test]
fn test_failing_task_fails_the_run() {
    let (workspace, script) = workspace_with_script(
        r#"
        <BuildGraph>
            <Agent Name="Primary" Type="Linux">
                <Node Name="Broken">
                    <Spawn Exe="sh" Arguments="-c exit_1_is_not_a_command"/>
                </Node>
            </Agent>
        </BuildGraph>
        "#,
    );
    let err = run_trellis(workspace.path(), &script, &["--target=Broken"]).unwrap_err();
    assert!(err.to_string().contains("Broken"), "{err}");
    assert!(!is_complete(workspace.path(), "Broken"));
}

#[test]
fn test_unknown_target_is_an_error() {
    let (workspace, script) = workspace_with_script(two_node_script());
    assert!(run_trellis(workspace.path(), &script, &["--target=Nope"]).is_err());
}

#[test]
fn test_list_only_does_not_execute() {
    let (workspace, script) = workspace_with_script(two_node_script());
    run_trellis(
        workspace.path(),
        &script,
        &["--target=B", "--list-only", "--show-deps"],
    )
    .unwrap();
    assert!(!is_complete(workspace.path(), "A"));
    assert!(!is_complete(workspace.path(), "B"));
}
