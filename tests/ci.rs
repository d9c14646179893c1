//! Behaviour of the shared CI shell helpers

use std::process::{Command, Output};

/// Source ci/common.sh in a fresh bash and run `script` after it
fn with_common(script: &str) -> Output {
    Command::new("bash")
        .arg("-c")
        .arg(format!("source ci/common.sh; {}", script))
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .output()
        .unwrap()
}

#[test]
fn test_run_exits_on_failed_step() {
    let output = with_common("run 'check things' false; echo unreachable");
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("==> check things"));
    assert!(stderr.contains("error: step 'check things' failed with status 1"));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("unreachable"));
}

#[test]
fn test_run_keeps_step_status() {
    let output = with_common("run 'exit three' bash -c 'exit 3'");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_run_reports_under_errexit() {
    let output = with_common("set -e; run 'strict' false");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("step 'strict' failed"));
}

#[test]
fn test_run_continues_after_success() {
    let output = with_common("run 'say hi' echo hi; echo after");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hi\nafter\n");
}
