//! Resume semantics: completed nodes are skipped, not re-run

use std::fs;

use super::helpers::*;

fn chain_script() -> &'static str {
    r##"
    <BuildGraph>
        <Agent Name="Primary" Type="Linux">
            <Node Name="A" Produces="#AOut">
                <WriteTextFile File="a.txt" Text="a" Tag="#AOut"/>
            </Node>
            <Node Name="B" Produces="#BOut" Requires="#AOut">
                <WriteTextFile File="b.txt" Text="b" Tag="#BOut"/>
            </Node>
            <Node Name="C" Requires="#BOut">
                <WriteTextFile File="c.txt" Text="c"/>
            </Node>
        </Agent>
    </BuildGraph>
    "##
}

#[test]
fn test_resume_picks_up_after_interruption() {
    let (workspace, script) = workspace_with_script(chain_script());

    // Simulate an interrupted run: only A and B completed
    run_trellis(workspace.path(), &script, &["--target=B"]).unwrap();
    assert!(is_complete(workspace.path(), "A"));
    assert!(is_complete(workspace.path(), "B"));
    assert!(!is_complete(workspace.path(), "C"));

    // Record A's output timestamp to prove it is not rewritten
    let before = fs::metadata(workspace.path().join("a.txt"))
        .unwrap()
        .modified()
        .unwrap();

    run_trellis(workspace.path(), &script, &["--target=C", "--resume"]).unwrap();
    assert!(is_complete(workspace.path(), "C"));

    let after = fs::metadata(workspace.path().join("a.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(before, after, "A was re-run despite --resume");
}

#[test]
fn test_rerun_of_completed_graph_is_a_noop() {
    let (workspace, script) = workspace_with_script(chain_script());
    run_trellis(workspace.path(), &script, &["--target=C"]).unwrap();

    let before = fs::metadata(workspace.path().join("c.txt"))
        .unwrap()
        .modified()
        .unwrap();
    run_trellis(workspace.path(), &script, &["--target=C", "--resume"]).unwrap();
    let after = fs::metadata(workspace.path().join("c.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_without_resume_local_state_is_fresh() {
    let (workspace, script) = workspace_with_script(chain_script());
    run_trellis(workspace.path(), &script, &["--target=C"]).unwrap();
    assert!(is_complete(workspace.path(), "C"));

    // A fresh run wipes markers before rebuilding
    run_trellis(workspace.path(), &script, &["--target=A"]).unwrap();
    assert!(is_complete(workspace.path(), "A"));
    assert!(!is_complete(workspace.path(), "C"));
}

#[test]
fn test_clean_node_forces_rebuild_of_one_node() {
    let (workspace, script) = workspace_with_script(chain_script());
    run_trellis(workspace.path(), &script, &["--target=C"]).unwrap();

    run_trellis(
        workspace.path(),
        &script,
        &["--target=C", "--resume", "--clean-node=C"],
    )
    .unwrap();
    assert!(is_complete(workspace.path(), "C"));
}
