// src/orchestrator.rs

//! Orchestrator: run a set of process specs to completion.
//!
//! Each spec gets its own [`ManagedProcess`] on its own Tokio task, so a
//! slow-starting dependency never blocks the launch of unrelated siblings.
//! Dependencies are wired through shared [`ProcHandle`]s; the orchestrator
//! itself does nothing across processes beyond that wiring and joining all
//! tasks at the end. One process's failure or forced kill never cancels the
//! others.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info};

use crate::proc::{ManagedProcess, ProcHandle, RunOutcome, Timings};
use crate::spec::ProcessSpec;

/// Per-process result collected after all tasks have been joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub name: String,
    pub outcome: RunOutcome,
}

pub struct Orchestrator {
    timings: Timings,
}

impl Orchestrator {
    pub fn new(timings: Timings) -> Self {
        Self { timings }
    }

    /// Launch every spec concurrently and wait for all of them to finish.
    ///
    /// Only the wiring is validated here (unique names, resolvable dependency
    /// references); token-shape problems surface per process so that one
    /// malformed spec cannot abort its siblings — dependents of a rejected
    /// process simply find it NotRunning and give up at the gate.
    pub async fn run(&self, specs: Vec<ProcessSpec>) -> Result<Vec<ProcessReport>> {
        let handles = wire_handles(&specs)?;

        info!(count = specs.len(), "launching process set");

        let mut joins = Vec::with_capacity(specs.len());
        for spec in specs {
            let handle = handles[&spec.name].clone();
            let dependency = spec.depends_on.as_ref().map(|dep| handles[dep].clone());
            let proc = ManagedProcess::new(spec, handle, dependency, self.timings);
            joins.push(tokio::spawn(run_one(proc)));
        }

        let mut reports = Vec::with_capacity(joins.len());
        for join in joins {
            reports.push(join.await.context("joining process task")?);
        }

        info!(count = reports.len(), "process set finished");
        Ok(reports)
    }
}

/// Build one shared handle per spec and check dependency references.
fn wire_handles(specs: &[ProcessSpec]) -> Result<HashMap<String, Arc<ProcHandle>>> {
    let mut handles = HashMap::with_capacity(specs.len());
    for spec in specs {
        if handles
            .insert(spec.name.clone(), ProcHandle::new(&spec.name))
            .is_some()
        {
            return Err(anyhow!("duplicate process name '{}'", spec.name));
        }
    }

    for spec in specs {
        if let Some(dep) = &spec.depends_on {
            if dep == &spec.name {
                return Err(anyhow!("process '{}' cannot depend on itself", spec.name));
            }
            if !handles.contains_key(dep) {
                return Err(anyhow!(
                    "process '{}' depends on unknown process '{}'",
                    spec.name,
                    dep
                ));
            }
        }
    }

    Ok(handles)
}

async fn run_one(proc: ManagedProcess) -> ProcessReport {
    let name = proc.name().to_string();
    let outcome = match proc.start().await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(proc = %name, error = %err, "process error");
            RunOutcome::Failed(format!("{err:#}"))
        }
    };
    ProcessReport { name, outcome }
}
