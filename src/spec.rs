// src/spec.rs

//! Process specifications.
//!
//! A [`ProcessSpec`] is the declarative description of one process the
//! orchestrator should launch: a name, an ordered token list (zero or more
//! `KEY=VALUE` environment assignments followed by exactly one invocation
//! string), a hard timeout, an optional termination-marker substring, and an
//! optional dependency on another process by name.
//!
//! Specs are produced by the config layer (`config::expand`) or constructed
//! directly by tests; the process layer (`proc`) consumes them.

use std::time::Duration;

use thiserror::Error;

/// Errors for malformed process specifications.
///
/// These are caller errors: they are detected before any child process is
/// spawned and never cause a retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("process '{name}' has an empty token list")]
    EmptyTokens { name: String },

    #[error(
        "process '{name}' has malformed environment token '{token}' (expected KEY=VALUE)"
    )]
    MalformedEnvToken { name: String, token: String },

    #[error("process '{name}' has an empty invocation string")]
    EmptyCommand { name: String },
}

/// Declarative description of one process to launch.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Human-readable identifier, used in logs and dependent counting.
    pub name: String,

    /// A prefix of zero or more `KEY=VALUE` assignments followed by exactly
    /// one command-line string (executable + arguments, space-delimited).
    pub tokens: Vec<String>,

    /// Hard wall-clock limit; on expiry the child is force-killed.
    pub timeout: Duration,

    /// Substring counted towards the marker-rendezvous termination threshold
    /// when seen in the child's combined stdout/stderr.
    pub terminate_marker: Option<String>,

    /// Name of the process this one waits for (at most one level deep).
    pub depends_on: Option<String>,
}

/// A validated spec, split into what `tokio::process::Command` needs.
///
/// The environment pairs are applied to the child being launched only; the
/// orchestrator's own environment is never mutated, so concurrently starting
/// siblings cannot race on shared environment state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub env: Vec<(String, String)>,
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    /// Split the token list into environment pairs plus an invocation.
    ///
    /// Every token before the last must be `KEY=VALUE` with a single `=` and
    /// two non-empty parts; the last token is split on whitespace into
    /// program + arguments.
    pub fn launch_plan(&self) -> Result<LaunchPlan, SpecError> {
        let (invocation, env_tokens) = match self.tokens.split_last() {
            Some(split) => split,
            None => {
                return Err(SpecError::EmptyTokens {
                    name: self.name.clone(),
                });
            }
        };

        let mut env = Vec::with_capacity(env_tokens.len());
        for token in env_tokens {
            env.push(split_env_token(&self.name, token)?);
        }

        let mut words = invocation.split_whitespace().map(str::to_string);
        let program = words.next().ok_or_else(|| SpecError::EmptyCommand {
            name: self.name.clone(),
        })?;
        let args: Vec<String> = words.collect();

        Ok(LaunchPlan { env, program, args })
    }
}

/// Whether `token` has the `KEY=VALUE` shape required of non-final spec
/// tokens. Used by config validation before any spec is built.
pub fn is_env_assignment(token: &str) -> bool {
    split_env_token("", token).is_ok()
}

/// Split a single `KEY=VALUE` token, rejecting anything that does not have
/// exactly one `=` with non-empty parts on both sides.
fn split_env_token(proc_name: &str, token: &str) -> Result<(String, String), SpecError> {
    let malformed = || SpecError::MalformedEnvToken {
        name: proc_name.to_string(),
        token: token.to_string(),
    };

    let (key, value) = token.split_once('=').ok_or_else(malformed)?;
    if key.is_empty() || value.is_empty() || value.contains('=') {
        return Err(malformed());
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(tokens: &[&str]) -> ProcessSpec {
        ProcessSpec {
            name: "T".into(),
            tokens: tokens.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(1),
            terminate_marker: None,
            depends_on: None,
        }
    }

    #[test]
    fn plain_command_without_env_pairs() {
        let plan = spec(&["/bin/sleep 5"]).launch_plan().unwrap();
        assert!(plan.env.is_empty());
        assert_eq!(plan.program, "/bin/sleep");
        assert_eq!(plan.args, vec!["5".to_string()]);
    }

    #[test]
    fn env_prefix_is_split_off() {
        let plan = spec(&["A=1", "B=two", "run -x 3"]).launch_plan().unwrap();
        assert_eq!(
            plan.env,
            vec![("A".into(), "1".into()), ("B".into(), "two".into())]
        );
        assert_eq!(plan.program, "run");
        assert_eq!(plan.args, vec!["-x".to_string(), "3".to_string()]);
    }

    #[test]
    fn non_final_token_without_equals_is_rejected() {
        let err = spec(&["NOTENV", "/bin/true"]).launch_plan().unwrap_err();
        assert!(matches!(err, SpecError::MalformedEnvToken { .. }));
    }

    #[test]
    fn double_equals_and_empty_parts_are_rejected() {
        for bad in ["A=B=C", "=V", "K=", "="] {
            let err = spec(&[bad, "/bin/true"]).launch_plan().unwrap_err();
            assert!(matches!(err, SpecError::MalformedEnvToken { .. }), "{bad}");
        }
    }

    #[test]
    fn blank_invocation_is_rejected() {
        let err = spec(&["A=1", "   "]).launch_plan().unwrap_err();
        assert!(matches!(err, SpecError::EmptyCommand { .. }));
    }

    #[test]
    fn empty_token_list_is_rejected() {
        let err = spec(&[]).launch_plan().unwrap_err();
        assert!(matches!(err, SpecError::EmptyTokens { .. }));
    }
}
