// src/config/expand.rs

//! Expansion of experiment descriptions into per-batch process specs.
//!
//! Every `scale` value of every experiment becomes one [`Batch`]: the server
//! spec (when configured and needed) plus `scale` client instances. Batches
//! are run sequentially by the caller; the processes inside one batch run
//! concurrently under the orchestrator.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::config::loader::install_root;
use crate::config::model::{ConfigFile, ExperimentSection, ServerSection};
use crate::spec::ProcessSpec;

/// One orchestrator run: a fan-out count and the specs to launch together.
#[derive(Debug, Clone)]
pub struct Batch {
    pub experiment: String,
    pub scale: u32,
    pub specs: Vec<ProcessSpec>,
}

/// Expand a validated config into ordered batches.
///
/// `only` restricts expansion to a single experiment by name. A config with a
/// `[server]` but no (matching) experiments yields one server-only batch.
pub fn expand_batches(cfg: &ConfigFile, only: Option<&str>) -> Result<Vec<Batch>> {
    if let Some(name) = only {
        if !cfg.experiment.contains_key(name) {
            return Err(anyhow!("unknown experiment '{}'", name));
        }
    }

    let root = install_root();
    let mut batches = Vec::new();

    for (name, exp) in cfg.experiment.iter() {
        if only.is_some_and(|wanted| wanted != name.as_str()) {
            continue;
        }

        for &scale in &exp.scale {
            let mut specs = Vec::with_capacity(scale as usize + 1);

            let server_name = if exp.needs_server {
                let server = cfg
                    .server
                    .as_ref()
                    .ok_or_else(|| anyhow!("experiment '{}' needs a [server] section", name))?;
                specs.push(server_spec(server, &root));
                Some(server.name.clone())
            } else {
                None
            };

            for idx in 0..scale {
                specs.push(client_spec(name, exp, scale, idx, server_name.as_deref())?);
            }

            batches.push(Batch {
                experiment: name.clone(),
                scale,
                specs,
            });
        }
    }

    if batches.is_empty() {
        if let Some(server) = &cfg.server {
            batches.push(Batch {
                experiment: server.name.clone(),
                scale: 1,
                specs: vec![server_spec(server, &root)],
            });
        }
    }

    Ok(batches)
}

fn server_spec(server: &ServerSection, root: &Path) -> ProcessSpec {
    let command = if Path::new(&server.command).is_absolute() {
        server.command.clone()
    } else {
        root.join(&server.command).display().to_string()
    };

    let mut tokens = server.env.clone();
    tokens.push(command);

    ProcessSpec {
        name: server.name.clone(),
        tokens,
        timeout: Duration::from_secs(server.timeout_secs),
        terminate_marker: server
            .terminate_marker
            .clone()
            .filter(|marker| !marker.is_empty()),
        depends_on: None,
    }
}

fn client_spec(
    exp_name: &str,
    exp: &ExperimentSection,
    scale: u32,
    idx: u32,
    server_name: Option<&str>,
) -> Result<ProcessSpec> {
    let mut tokens = Vec::with_capacity(exp.env.len() + 1);

    for var in &exp.env {
        tokens.push(render_env_template(exp_name, exp, var, scale)?);
    }

    let mut command = exp.binary.clone();
    if !exp.options.is_empty() {
        command.push(' ');
        command.push_str(&exp.options);
    }
    command.push_str(&format!(
        " -{} {}",
        exp.sweep_flag, exp.sweep_values[idx as usize]
    ));
    tokens.push(command);

    Ok(ProcessSpec {
        name: format!("{}{}", exp_name.to_uppercase(), idx),
        tokens,
        timeout: Duration::from_secs(exp.timeout_secs),
        terminate_marker: None,
        depends_on: server_name.map(str::to_string),
    })
}

/// Copy an env template, dividing the `split_env` variable's value by the
/// batch fan-out so the instances share the configured budget.
fn render_env_template(
    exp_name: &str,
    exp: &ExperimentSection,
    var: &str,
    scale: u32,
) -> Result<String> {
    if let Some(split_key) = &exp.split_env {
        let prefix = format!("{split_key}=");
        if let Some(value) = var.strip_prefix(&prefix) {
            let total: u64 = value.parse().map_err(|_| {
                anyhow!(
                    "experiment '{}' split_env '{}' has non-integer value '{}'",
                    exp_name,
                    split_key,
                    value
                )
            })?;
            return Ok(format!("{}={}", split_key, total / u64::from(scale)));
        }
    }
    Ok(var.to_string())
}
