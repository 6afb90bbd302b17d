//! Token arbitration between competing jobs

use std::fs;

use super::helpers::*;
use tempfile::TempDir;

fn token_script() -> &'static str {
    r#"
    <BuildGraph>
        <Option Name="TokenDir" DefaultValue="/tmp/trellis-tokens" Description="Token directory"/>
        <Agent Name="Primary" Type="Linux">
            <Node Name="C">
                <Token Path="$(TokenDir)/exclusive.lock"/>
                <WriteTextFile File="c.txt" Text="c"/>
            </Node>
        </Agent>
    </BuildGraph>
    "#
}

#[test]
fn test_first_job_acquires_and_keeps_token() {
    let locks = TempDir::new().unwrap();
    let set = format!("--set=TokenDir={}", locks.path().display());
    let (workspace, script) = workspace_with_script(token_script());

    run_trellis(
        workspace.path(),
        &script,
        &["--target=C", "--token-signature=J1", set.as_str()],
    )
    .unwrap();

    assert!(is_complete(workspace.path(), "C"));
    // The token survives successful completion, owned for the job's life
    assert_eq!(
        fs::read_to_string(locks.path().join("exclusive.lock")).unwrap(),
        "J1"
    );
}

#[test]
fn test_second_job_conflicts_and_fails() {
    let locks = TempDir::new().unwrap();
    let set = format!("--set=TokenDir={}", locks.path().display());

    let (job1, script1) = workspace_with_script(token_script());
    run_trellis(
        job1.path(),
        &script1,
        &["--target=C", "--token-signature=J1", set.as_str()],
    )
    .unwrap();

    let (job2, script2) = workspace_with_script(token_script());
    let err = run_trellis(
        job2.path(),
        &script2,
        &["--target=C", "--token-signature=J2", set.as_str()],
    )
    .unwrap_err();

    assert!(err.to_string().contains("Token conflict"), "{err}");
    assert!(!is_complete(job2.path(), "C"));
    // The loser did not clobber the holder
    assert_eq!(
        fs::read_to_string(locks.path().join("exclusive.lock")).unwrap(),
        "J1"
    );
}

#[test]
fn test_skip_targets_without_tokens_builds_nothing() {
    let locks = TempDir::new().unwrap();
    let set = format!("--set=TokenDir={}", locks.path().display());

    let (job1, script1) = workspace_with_script(token_script());
    run_trellis(
        job1.path(),
        &script1,
        &["--target=C", "--token-signature=J1", set.as_str()],
    )
    .unwrap();

    let (job2, script2) = workspace_with_script(token_script());
    run_trellis(
        job2.path(),
        &script2,
        &[
            "--target=C",
            "--token-signature=J2",
            "--skip-targets-without-tokens",
            set.as_str(),
        ],
    )
    .unwrap();
    assert!(!is_complete(job2.path(), "C"));
}

#[test]
fn test_same_signature_rerun_is_not_a_conflict() {
    let locks = TempDir::new().unwrap();
    let set = format!("--set=TokenDir={}", locks.path().display());
    let (workspace, script) = workspace_with_script(token_script());

    for _ in 0..2 {
        run_trellis(
            workspace.path(),
            &script,
            &["--target=C", "--token-signature=J1", set.as_str()],
        )
        .unwrap();
    }
    assert!(is_complete(workspace.path(), "C"));
}
