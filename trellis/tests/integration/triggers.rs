//! Trigger gating: nodes behind a trigger run only when it is requested

use super::helpers::*;

fn trigger_script() -> &'static str {
    r##"
    <BuildGraph>
        <Agent Name="Primary" Type="Linux">
            <Node Name="A" Produces="#AOut">
                <WriteTextFile File="a.txt" Text="a" Tag="#AOut"/>
            </Node>
        </Agent>
        <Trigger Name="PostSubmit">
            <Agent Name="Late" Type="Linux">
                <Node Name="D" Requires="#AOut">
                    <WriteTextFile File="d.txt" Text="d"/>
                </Node>
            </Agent>
        </Trigger>
    </BuildGraph>
    "##
}

#[test]
fn test_default_run_excludes_triggered_nodes() {
    let (workspace, script) = workspace_with_script(trigger_script());
    run_trellis(workspace.path(), &script, &[]).unwrap();
    assert!(is_complete(workspace.path(), "A"));
    assert!(!is_complete(workspace.path(), "D"));
    assert!(!workspace.path().join("d.txt").exists());
}

#[test]
fn test_requested_trigger_includes_gated_nodes() {
    let (workspace, script) = workspace_with_script(trigger_script());
    run_trellis(workspace.path(), &script, &["--trigger=PostSubmit"]).unwrap();
    assert!(is_complete(workspace.path(), "A"));
    assert!(is_complete(workspace.path(), "D"));
}

#[test]
fn test_skip_triggers_overrides_targeting() {
    let (workspace, script) = workspace_with_script(trigger_script());
    run_trellis(
        workspace.path(),
        &script,
        &["--target=D", "--skip-triggers"],
    )
    .unwrap();
    assert!(!is_complete(workspace.path(), "D"));
}

#[test]
fn test_skip_trigger_by_name() {
    let (workspace, script) = workspace_with_script(trigger_script());
    run_trellis(workspace.path(), &script, &["--skip-trigger=PostSubmit"]).unwrap();
    assert!(is_complete(workspace.path(), "A"));
    assert!(!is_complete(workspace.path(), "D"));
}

#[test]
fn test_unknown_trigger_fails() {
    let (workspace, script) = workspace_with_script(trigger_script());
    assert!(run_trellis(workspace.path(), &script, &["--trigger=Nope"]).is_err());
    assert!(run_trellis(workspace.path(), &script, &["--skip-trigger=Nope"]).is_err());
}
