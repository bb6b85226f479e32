// src/config/validate.rs

use anyhow::{Result, anyhow};

use crate::config::model::{ConfigFile, ExperimentSection};
use crate::spec::is_env_assignment;

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - at least one of `[server]` / `[experiment.*]` is present
/// - `time_unit_ms >= 1`
/// - env templates are `KEY=VALUE` shaped
/// - `scale` values are >= 1 and covered by `sweep_values`
/// - `split_env` names one of the experiment's env templates with an integer
///   value
/// - `needs_server = true` only appears when `[server]` is configured
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    if cfg.server.is_none() && cfg.experiment.is_empty() {
        return Err(anyhow!(
            "config must contain a [server] section or at least one [experiment.<name>]"
        ));
    }

    if cfg.config.time_unit_ms == 0 {
        return Err(anyhow!("[config].time_unit_ms must be >= 1 (got 0)"));
    }

    if let Some(server) = &cfg.server {
        if server.command.trim().is_empty() {
            return Err(anyhow!("[server].command must not be empty"));
        }
        validate_env_templates("server", &server.env)?;
    }

    for (name, exp) in cfg.experiment.iter() {
        validate_experiment(cfg, name, exp)?;
    }

    Ok(())
}

fn validate_experiment(cfg: &ConfigFile, name: &str, exp: &ExperimentSection) -> Result<()> {
    if exp.binary.trim().is_empty() {
        return Err(anyhow!("experiment '{}' has an empty binary path", name));
    }

    if exp.sweep_flag.trim().is_empty() {
        return Err(anyhow!("experiment '{}' has an empty sweep_flag", name));
    }

    if exp.sweep_values.is_empty() {
        return Err(anyhow!("experiment '{}' has no sweep_values", name));
    }

    if exp.scale.is_empty() {
        return Err(anyhow!("experiment '{}' has an empty scale list", name));
    }

    for &scale in &exp.scale {
        if scale == 0 {
            return Err(anyhow!("experiment '{}' has a zero scale value", name));
        }
        if scale as usize > exp.sweep_values.len() {
            return Err(anyhow!(
                "experiment '{}' has scale {} but only {} sweep_values",
                name,
                scale,
                exp.sweep_values.len()
            ));
        }
    }

    validate_env_templates(name, &exp.env)?;

    if let Some(split_key) = &exp.split_env {
        let prefix = format!("{split_key}=");
        let template = exp
            .env
            .iter()
            .find_map(|var| var.strip_prefix(&prefix))
            .ok_or_else(|| {
                anyhow!(
                    "experiment '{}' names split_env '{}' but no env template sets it",
                    name,
                    split_key
                )
            })?;
        template.parse::<u64>().map_err(|_| {
            anyhow!(
                "experiment '{}' split_env '{}' has non-integer value '{}'",
                name,
                split_key,
                template
            )
        })?;
    }

    if exp.needs_server && cfg.server.is_none() {
        return Err(anyhow!(
            "experiment '{}' sets needs_server but no [server] is configured",
            name
        ));
    }

    Ok(())
}

fn validate_env_templates(owner: &str, env: &[String]) -> Result<()> {
    for var in env {
        if !is_env_assignment(var) {
            return Err(anyhow!(
                "'{}' has malformed env template '{}' (expected KEY=VALUE)",
                owner,
                var
            ));
        }
    }
    Ok(())
}
