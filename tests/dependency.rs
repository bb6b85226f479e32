use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use sweeprun::orchestrator::Orchestrator;
use sweeprun::proc::{ManagedProcess, ProcHandle, RunOutcome, Timings};
use sweeprun::spec::ProcessSpec;

fn timings(unit_ms: u64) -> Timings {
    Timings {
        unit: Duration::from_millis(unit_ms),
    }
}

fn spec(name: &str, tokens: &[&str], timeout: Duration, depends_on: Option<&str>) -> ProcessSpec {
    ProcessSpec {
        name: name.into(),
        tokens: tokens.iter().map(|s| s.to_string()).collect(),
        timeout,
        terminate_marker: None,
        depends_on: depends_on.map(str::to_string),
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    format!("/bin/sh {}", path.display())
}

#[tokio::test]
async fn dependent_registers_once_after_gate_passes() {
    // The dependency is simulated by a handle whose owner is a real child
    // that outlives the grace interval.
    let dep_spec = spec("P", &["/bin/sleep 2"], Duration::from_secs(30), None);
    let dep = ManagedProcess::new(dep_spec, ProcHandle::new("P"), None, timings(20));
    let dep_handle = dep.handle();
    let dep_join = tokio::spawn(dep.start());

    let d_spec = spec("D", &["/bin/true"], Duration::from_secs(10), Some("P"));
    let d = ManagedProcess::new(
        d_spec,
        ProcHandle::new("D"),
        Some(dep_handle.clone()),
        timings(20),
    );

    let outcome = d.start().await.unwrap();
    assert_eq!(outcome, RunOutcome::Exited { code: Some(0) });
    assert_eq!(dep_handle.dependents(), 1);

    dep_join.await.unwrap().unwrap();
}

#[tokio::test]
async fn dependent_skips_workload_when_dependency_never_starts() {
    // Scenario: P's spec is malformed, so it is rejected before launch and
    // never reaches Running; D must back off for the full 55-unit budget and
    // never invoke its workload.
    let dir = tempfile::tempdir().unwrap();
    let witness = dir.path().join("ran.txt");
    let script = write_script(
        dir.path(),
        "touch.sh",
        &format!(r#"echo ran > "{}""#, witness.display()),
    );

    let p = spec("P", &["BROKEN", "/bin/true"], Duration::from_secs(5), None);
    let d = spec("D", &[&script], Duration::from_secs(5), Some("P"));

    let unit = Duration::from_millis(5);
    let orchestrator = Orchestrator::new(timings(5));

    let started = Instant::now();
    let reports = orchestrator.run(vec![p, d]).await.unwrap();
    let elapsed = started.elapsed();

    let p_report = reports.iter().find(|r| r.name == "P").unwrap();
    let d_report = reports.iter().find(|r| r.name == "D").unwrap();

    assert!(matches!(p_report.outcome, RunOutcome::Failed(_)));
    assert_eq!(d_report.outcome, RunOutcome::DependencyUnavailable);

    // Full backoff budget is 10+9+...+1 = 55 units.
    assert!(elapsed >= unit * 55);
    assert!(!witness.exists(), "dependent must not run its workload");
}

#[tokio::test]
async fn independent_siblings_run_despite_one_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let witness = dir.path().join("ok.txt");
    let script = write_script(
        dir.path(),
        "touch.sh",
        &format!(r#"echo ran > "{}""#, witness.display()),
    );

    let broken = spec(
        "broken",
        &["/nonexistent/binary"],
        Duration::from_secs(5),
        None,
    );
    let healthy = spec("healthy", &[&script], Duration::from_secs(5), None);

    let orchestrator = Orchestrator::new(timings(5));
    let reports = orchestrator.run(vec![broken, healthy]).await.unwrap();

    let broken_report = reports.iter().find(|r| r.name == "broken").unwrap();
    let healthy_report = reports.iter().find(|r| r.name == "healthy").unwrap();

    assert!(matches!(broken_report.outcome, RunOutcome::Failed(_)));
    assert_eq!(healthy_report.outcome, RunOutcome::Exited { code: Some(0) });
    assert!(witness.exists());
}

#[tokio::test]
async fn server_and_client_flow_through_the_orchestrator() {
    let dir = tempfile::tempdir().unwrap();
    let witness = dir.path().join("client.txt");
    let client_script = write_script(
        dir.path(),
        "client.sh",
        &format!(r#"echo ran > "{}""#, witness.display()),
    );

    // Server outlives its grace interval (10 * 20ms) and exits on its own.
    let server = spec("server", &["/bin/sleep 1"], Duration::from_secs(30), None);
    let client = spec(
        "client",
        &[&client_script],
        Duration::from_secs(10),
        Some("server"),
    );

    let orchestrator = Orchestrator::new(timings(20));
    let reports = orchestrator.run(vec![server, client]).await.unwrap();

    let client_report = reports.iter().find(|r| r.name == "client").unwrap();
    assert_eq!(client_report.outcome, RunOutcome::Exited { code: Some(0) });
    assert!(witness.exists());
}
