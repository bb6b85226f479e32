// src/proc/mod.rs

//! Managed child processes.
//!
//! A [`ManagedProcess`] owns exactly one operating-system process from launch
//! to exit or forced kill. It is responsible for:
//!
//! - waiting on its dependency (if any) via [`gate`] before launching,
//! - injecting the spec's `KEY=VALUE` pairs into the child's environment
//!   (the child's only, never the harness's own),
//! - the grace-interval readiness heuristic ("alive past the startup window"
//!   means Running),
//! - scanning combined stdout/stderr for the termination marker and sending a
//!   graceful terminate once every registered dependent has voted,
//! - the hard timeout that force-kills the child regardless of progress.
//!
//! State and the dependent ref-count live in a shared [`ProcHandle`] so that
//! other processes' tasks can observe readiness and register themselves
//! without locking.

pub mod gate;

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::spec::ProcessSpec;

/// Units of the base time unit that a child must survive after launch before
/// it is considered Running.
pub const GRACE_UNITS: u32 = 10;

/// Lifecycle state of a managed process.
///
/// Transitions are strictly NotRunning → Running → NotRunning, written only
/// by the owning task; other tasks may read concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    NotRunning,
    Running,
}

impl ProcState {
    fn as_u8(self) -> u8 {
        match self {
            ProcState::NotRunning => 0,
            ProcState::Running => 1,
        }
    }

    fn from_u8(raw: u8) -> ProcState {
        if raw == 1 {
            ProcState::Running
        } else {
            ProcState::NotRunning
        }
    }
}

/// Base time unit for the grace interval and dependency polling.
///
/// Production deployments count in seconds; tests shrink the unit to
/// milliseconds without changing the round structure (grace = 10 units,
/// gate budget = 10 rounds of 10..1 units).
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub unit: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
        }
    }
}

impl Timings {
    pub fn grace(&self) -> Duration {
        self.unit * GRACE_UNITS
    }
}

/// Shared view of one managed process: its readiness state and the count of
/// dependents that registered against it.
///
/// The state is written only by the owning [`ManagedProcess`] task; the
/// dependent count is incremented by dependents' tasks when they pass the
/// dependency gate, and never decremented.
#[derive(Debug)]
pub struct ProcHandle {
    name: String,
    state: AtomicU8,
    dependents: AtomicU32,
}

impl ProcHandle {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: AtomicU8::new(ProcState::NotRunning.as_u8()),
            dependents: AtomicU32::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcState {
        ProcState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ProcState) {
        let prev = self.state.swap(state.as_u8(), Ordering::SeqCst);
        if prev != state.as_u8() {
            info!(proc = %self.name, state = ?state, "state transition");
        }
    }

    /// Record one dependent that passed the gate against this process.
    /// Returns the new count.
    pub fn register_dependent(&self) -> u32 {
        let refs = self.dependents.fetch_add(1, Ordering::SeqCst) + 1;
        info!(proc = %self.name, refs, "dependent registered");
        refs
    }

    pub fn dependents(&self) -> u32 {
        self.dependents.load(Ordering::SeqCst)
    }
}

/// How one managed process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited (naturally, or after a graceful terminate). `code` is
    /// `None` when the child was ended by a signal.
    Exited { code: Option<i32> },
    /// The hard timeout elapsed and the child was force-killed.
    TimedOut,
    /// The dependency never reached Running within the gate budget; the
    /// workload was never launched.
    DependencyUnavailable,
    /// Malformed spec or launch failure; the workload never reached Running.
    Failed(String),
}

/// Runtime wrapper owning one child process described by a [`ProcessSpec`].
pub struct ManagedProcess {
    spec: ProcessSpec,
    handle: Arc<ProcHandle>,
    dependency: Option<Arc<ProcHandle>>,
    timings: Timings,
}

impl ManagedProcess {
    pub fn new(
        spec: ProcessSpec,
        handle: Arc<ProcHandle>,
        dependency: Option<Arc<ProcHandle>>,
        timings: Timings,
    ) -> Self {
        Self {
            spec,
            handle,
            dependency,
            timings,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn handle(&self) -> Arc<ProcHandle> {
        self.handle.clone()
    }

    /// Wait on the dependency (if any), then launch and supervise the child
    /// to completion.
    ///
    /// Errors cover malformed specs and launch failures only; timeouts and an
    /// unavailable dependency are reported through [`RunOutcome`] since they
    /// are designed behaviors, not faults.
    pub async fn start(self) -> Result<RunOutcome> {
        if let Some(dep) = &self.dependency {
            info!(
                proc = %self.spec.name,
                dependency = %dep.name(),
                "waiting for dependency to report Running"
            );
            if !gate::wait_for_running(dep, self.timings.unit).await {
                warn!(
                    proc = %self.spec.name,
                    dependency = %dep.name(),
                    "dependency unavailable; skipping workload"
                );
                return Ok(RunOutcome::DependencyUnavailable);
            }
            dep.register_dependent();
        }

        self.supervise().await
    }

    async fn supervise(self) -> Result<RunOutcome> {
        let plan = self.spec.launch_plan()?;

        for (key, value) in &plan.env {
            debug!(proc = %self.spec.name, key = %key, value = %value, "child environment");
        }

        let mut child = Command::new(&plan.program)
            .args(&plan.args)
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!("launching process '{}' ({})", self.spec.name, plan.program)
            })?;

        info!(proc = %self.spec.name, program = %plan.program, "child launched");

        let mut lines = combined_output_lines(child.stdout.take(), child.stderr.take());

        // One timer per process, armed at launch; expiry kills unconditionally.
        let deadline = sleep(self.spec.timeout);
        tokio::pin!(deadline);

        // Grace interval: survive the startup window => Running. This is a
        // liveness heuristic, not a readiness probe.
        tokio::select! {
            _ = sleep(self.timings.grace()) => {
                let exited = child
                    .try_wait()
                    .with_context(|| {
                        format!("polling process '{}' after grace interval", self.spec.name)
                    })?
                    .is_some();
                if !exited {
                    self.handle.set_state(ProcState::Running);
                }
            }
            _ = &mut deadline => {
                warn!(proc = %self.spec.name, "timeout elapsed during startup; force-killing");
                child.kill().await.with_context(|| {
                    format!("killing process '{}' on timeout", self.spec.name)
                })?;
                self.handle.set_state(ProcState::NotRunning);
                return Ok(RunOutcome::TimedOut);
            }
        }

        let mut marker_hits: u32 = 0;
        let mut terminate_sent = false;

        let outcome = loop {
            tokio::select! {
                maybe_line = lines.recv() => match maybe_line {
                    Some(line) => {
                        debug!(proc = %self.spec.name, "output: {}", line);
                        if let Some(marker) = &self.spec.terminate_marker {
                            if !terminate_sent && line.contains(marker.as_str()) {
                                marker_hits += 1;
                                let needed = self.handle.dependents();
                                info!(
                                    proc = %self.spec.name,
                                    hits = marker_hits,
                                    needed,
                                    "termination marker observed"
                                );
                                if marker_hits == needed {
                                    info!(
                                        proc = %self.spec.name,
                                        "all dependents accounted for; terminating"
                                    );
                                    terminate(&mut child).with_context(|| {
                                        format!("terminating process '{}'", self.spec.name)
                                    })?;
                                    terminate_sent = true;
                                }
                            }
                        }
                    }
                    None => {
                        // Output pipes closed; the timeout still applies
                        // while the child finishes up.
                        tokio::select! {
                            status = child.wait() => {
                                let status = status.with_context(|| {
                                    format!("waiting for process '{}'", self.spec.name)
                                })?;
                                break RunOutcome::Exited {
                                    code: status.code(),
                                };
                            }
                            _ = &mut deadline => {
                                warn!(proc = %self.spec.name, "timeout elapsed; force-killing");
                                child.kill().await.with_context(|| {
                                    format!("killing process '{}' on timeout", self.spec.name)
                                })?;
                                break RunOutcome::TimedOut;
                            }
                        }
                    }
                },
                status = child.wait() => {
                    let status = status.with_context(|| {
                        format!("waiting for process '{}'", self.spec.name)
                    })?;
                    break RunOutcome::Exited {
                        code: status.code(),
                    };
                }
                _ = &mut deadline => {
                    warn!(proc = %self.spec.name, "timeout elapsed; force-killing");
                    child.kill().await.with_context(|| {
                        format!("killing process '{}' on timeout", self.spec.name)
                    })?;
                    break RunOutcome::TimedOut;
                }
            }
        };

        self.handle.set_state(ProcState::NotRunning);
        info!(proc = %self.spec.name, outcome = ?outcome, "process finished");
        Ok(outcome)
    }
}

/// Funnel the child's stdout and stderr into one line channel, the moral
/// equivalent of a stderr-to-stdout redirect.
///
/// The receiver yields `None` once both pipes have closed.
fn combined_output_lines(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(64);

    if let Some(stdout) = stdout {
        let tx = tx.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });
    }

    if let Some(stderr) = stderr {
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}

/// Graceful terminate: SIGTERM on unix so the child can run its shutdown
/// path. The hard timeout remains the backstop if it ignores the signal.
#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).context("sending SIGTERM")?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<()> {
    child.start_kill().context("killing child")?;
    Ok(())
}
