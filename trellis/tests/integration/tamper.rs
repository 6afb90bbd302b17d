//! Tamper detection: modified upstream outputs abort the consumer

use std::fs;

use super::helpers::*;

#[test]
fn test_modified_input_aborts_consumer() {
    let (workspace, script) = workspace_with_script(two_node_script());
    run_trellis(workspace.path(), &script, &["--target=A"]).unwrap();

    // Someone rewrites A's output behind the tool's back
    fs::write(workspace.path().join("out/a.txt"), "tampered").unwrap();

    let err = run_trellis(workspace.path(), &script, &["--single-node=B"]).unwrap_err();
    assert!(err.to_string().contains("has been modified"), "{err}");
    assert!(!is_complete(workspace.path(), "B"));
    // B never staged anything
    assert!(!workspace.path().join("staged/a.txt").exists());
}

#[test]
fn test_untouched_input_passes() {
    let (workspace, script) = workspace_with_script(two_node_script());
    run_trellis(workspace.path(), &script, &["--target=A"]).unwrap();
    run_trellis(workspace.path(), &script, &["--single-node=B"]).unwrap();
    assert!(is_complete(workspace.path(), "B"));
}

#[test]
fn test_full_rerun_rebuilds_tampered_producer() {
    let (workspace, script) = workspace_with_script(two_node_script());
    run_trellis(workspace.path(), &script, &["--target=B"]).unwrap();

    fs::write(workspace.path().join("out/a.txt"), "tampered").unwrap();

    // The integrity sweep notices the mismatch, cleans A (and therefore B),
    // and the resumed run rebuilds both
    run_trellis(workspace.path(), &script, &["--target=B", "--resume"]).unwrap();
    assert_eq!(
        fs::read_to_string(workspace.path().join("out/a.txt")).unwrap(),
        "from A\n"
    );
    assert!(is_complete(workspace.path(), "B"));
}
