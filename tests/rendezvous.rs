use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use sweeprun::proc::{ManagedProcess, ProcHandle, RunOutcome, Timings};
use sweeprun::spec::ProcessSpec;

fn timings() -> Timings {
    Timings {
        unit: Duration::from_millis(20),
    }
}

fn marker_spec(name: &str, command: &str, timeout: Duration, marker: &str) -> ProcessSpec {
    ProcessSpec {
        name: name.into(),
        tokens: vec![command.to_string()],
        timeout,
        terminate_marker: Some(marker.to_string()),
        depends_on: None,
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    format!("/bin/sh {}", path.display())
}

#[tokio::test]
async fn terminates_on_the_kth_marker_not_before() {
    // Two dependents registered; DONE appears at ~0ms and ~500ms, after which
    // the child would sleep another 30s. The terminate must fire on the
    // second occurrence only.
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "emit.sh",
        "echo DONE\nsleep 0.5\necho DONE\nsleep 30",
    );

    let spec = marker_spec("svc", &script, Duration::from_secs(10), "DONE");
    let handle = ProcHandle::new("svc");
    handle.register_dependent();
    handle.register_dependent();

    let proc = ManagedProcess::new(spec, handle.clone(), None, timings());

    let started = Instant::now();
    let outcome = proc.start().await.unwrap();
    let elapsed = started.elapsed();

    // Killed by SIGTERM, so no exit code.
    assert_eq!(outcome, RunOutcome::Exited { code: None });

    // Later than the second DONE, far earlier than the 30s sleep or the
    // 10s timeout.
    assert!(elapsed >= Duration::from_millis(450), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(8), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn single_marker_does_not_satisfy_two_dependents() {
    // One DONE against two registered dependents: the child must be left to
    // exit naturally.
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "emit.sh", "echo DONE\nsleep 1");

    let spec = marker_spec("svc", &script, Duration::from_secs(10), "DONE");
    let handle = ProcHandle::new("svc");
    handle.register_dependent();
    handle.register_dependent();

    let proc = ManagedProcess::new(spec, handle, None, timings());

    let started = Instant::now();
    let outcome = proc.start().await.unwrap();

    assert_eq!(outcome, RunOutcome::Exited { code: Some(0) });
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn marker_with_no_dependents_never_triggers_terminate() {
    // With a zero ref-count the rendezvous threshold is unreachable; the
    // marker lines are just output.
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "emit.sh", "echo DONE\necho DONE\nsleep 1");

    let spec = marker_spec("svc", &script, Duration::from_secs(10), "DONE");
    let proc = ManagedProcess::new(spec, ProcHandle::new("svc"), None, timings());

    let started = Instant::now();
    let outcome = proc.start().await.unwrap();

    assert_eq!(outcome, RunOutcome::Exited { code: Some(0) });
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn marker_lines_on_stderr_count_too() {
    // The scanning loop consumes the combined stream, mirroring the
    // stderr-to-stdout redirect of the underlying programs.
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "emit.sh",
        "echo DONE 1>&2\nsleep 30",
    );

    let spec = marker_spec("svc", &script, Duration::from_secs(10), "DONE");
    let handle = ProcHandle::new("svc");
    handle.register_dependent();

    let proc = ManagedProcess::new(spec, handle, None, timings());

    let started = Instant::now();
    let outcome = proc.start().await.unwrap();

    assert_eq!(outcome, RunOutcome::Exited { code: None });
    assert!(started.elapsed() < Duration::from_secs(8));
}
