//! Cross-agent transfer through shared storage

use std::fs;

use super::helpers::*;
use tempfile::TempDir;

fn cross_agent_script() -> &'static str {
    r##"
    <BuildGraph>
        <Agent Name="Builder" Type="Linux">
            <Node Name="A" Produces="#Out">
                <WriteTextFile File="out/a.txt" Text="built on agent 1" Tag="#Out"/>
            </Node>
        </Agent>
        <Agent Name="Stager" Type="Linux">
            <Node Name="B">
                <Copy Files="#Out" From="out" To="staged"/>
            </Node>
        </Agent>
    </BuildGraph>
    "##
}

#[test]
fn test_block_travels_between_workspaces() {
    let shared = TempDir::new().unwrap();
    let shared_arg = format!("--shared-storage-dir={}", shared.path().display());

    // First process: agent 1 builds A and publishes to shared storage
    let (producer, script) = workspace_with_script(cross_agent_script());
    run_trellis(
        producer.path(),
        &script,
        &[
            "--target=B",
            "--single-node=A",
            shared_arg.as_str(),
            "--write-to-shared-storage",
        ],
    )
    .unwrap();
    assert!(is_complete(producer.path(), "A"));

    // The archive and its manifest landed in shared storage
    let block_dir = shared.path().join("Unknown/0/A");
    assert!(block_dir.join("A@Out.zip").exists());
    assert!(block_dir.join("A@Out.manifest").exists());

    // Second process: agent 2 retrieves the block and stages it
    let (consumer, script2) = workspace_with_script(cross_agent_script());
    run_trellis(
        consumer.path(),
        &script2,
        &["--target=B", "--single-node=B", shared_arg.as_str()],
    )
    .unwrap();
    assert!(is_complete(consumer.path(), "B"));
    assert_eq!(
        fs::read_to_string(consumer.path().join("staged/a.txt")).unwrap(),
        "built on agent 1\n"
    );
    // The retrieved input was unpacked into the consumer workspace
    assert!(consumer.path().join("out/a.txt").exists());
}

#[test]
fn test_same_agent_nodes_do_not_touch_shared_storage() {
    let shared = TempDir::new().unwrap();
    let shared_arg = format!("--shared-storage-dir={}", shared.path().display());

    let (workspace, script) = workspace_with_script(two_node_script());
    run_trellis(
        workspace.path(),
        &script,
        &["--target=B", shared_arg.as_str(), "--write-to-shared-storage"],
    )
    .unwrap();

    // Both nodes live on one agent, so no block crosses over
    assert!(!shared.path().join("Unknown/0/A/A@Out.zip").exists());
}

#[test]
fn test_missing_shared_block_fails_consumer() {
    let shared = TempDir::new().unwrap();
    let shared_arg = format!("--shared-storage-dir={}", shared.path().display());

    let (consumer, script) = workspace_with_script(cross_agent_script());
    let err = run_trellis(
        consumer.path(),
        &script,
        &["--target=B", "--single-node=B", shared_arg.as_str()],
    )
    .unwrap_err();
    assert!(err.to_string().contains("B"), "{err}");
    assert!(!is_complete(consumer.path(), "B"));
}
