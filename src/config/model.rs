// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// time_unit_ms = 1000
///
/// [server]
/// command = "install/bin/map-server"
/// env = ["PAGESIZE=524288"]
/// timeout_secs = 7000
///
/// [experiment.bfs]
/// binary = "/opt/apps/bin/run_bfs"
/// options = "-n 1073741823 -g /data/graph"
/// env = ["PAGESIZE=524288", "BUFSIZE=270336"]
/// scale = [1, 2]
/// sweep_flag = "o"
/// sweep_values = ["2", "4"]
/// split_env = "BUFSIZE"
/// needs_server = true
/// ```
///
/// All sections are optional, but validation requires at least one of
/// `[server]` / `[experiment.*]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// The shared-memory-mapping server, if the workloads need one.
    #[serde(default)]
    pub server: Option<ServerSection>,

    /// All experiments from `[experiment.<name>]`, keyed by name.
    #[serde(default)]
    pub experiment: BTreeMap<String, ExperimentSection>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Length of one harness time unit in milliseconds.
    ///
    /// The grace interval is 10 units and the dependency gate polls for
    /// rounds of 10..1 units; production deployments use 1-second units.
    #[serde(default = "default_time_unit_ms")]
    pub time_unit_ms: u64,
}

fn default_time_unit_ms() -> u64 {
    1000
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            time_unit_ms: default_time_unit_ms(),
        }
    }
}

/// `[server]` section: the long-running service the clients map against.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Process name used in logs and dependency references.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Invocation string. A relative path resolves against the install root
    /// (see [`crate::config::loader::install_root`]).
    pub command: String,

    /// `KEY=VALUE` environment templates applied to the server child.
    #[serde(default)]
    pub env: Vec<String>,

    /// Hard wall-clock limit before the server is force-killed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Output substring counted towards the marker-rendezvous shutdown; the
    /// server terminates itself once every registered client has emitted it.
    #[serde(default = "default_terminate_marker")]
    pub terminate_marker: Option<String>,
}

fn default_server_name() -> String {
    "map-server".to_string()
}

fn default_timeout_secs() -> u64 {
    7000
}

fn default_terminate_marker() -> Option<String> {
    Some("terminate_handler Done".to_string())
}

/// `[experiment.<name>]` section: one sweep workload.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentSection {
    /// Path to the workload binary.
    pub binary: String,

    /// Fixed options appended to every instance's command line.
    #[serde(default)]
    pub options: String,

    /// `KEY=VALUE` environment templates applied to every instance.
    #[serde(default)]
    pub env: Vec<String>,

    /// Fan-out counts; each value is one sequential batch of that many
    /// concurrently running instances.
    #[serde(default = "default_scale")]
    pub scale: Vec<u32>,

    /// Per-instance flag name; instance `i` gets `-<sweep_flag> sweep_values[i]`.
    pub sweep_flag: String,

    /// Ordered sweep values, indexed by instance number.
    pub sweep_values: Vec<String>,

    /// Name of the env template whose integer value is divided by the batch
    /// fan-out before substitution (shared-buffer budget split across
    /// instances).
    #[serde(default)]
    pub split_env: Option<String>,

    /// Hard wall-clock limit per instance.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether instances wait for the `[server]` process to report Running.
    #[serde(default)]
    pub needs_server: bool,
}

fn default_scale() -> Vec<u32> {
    vec![1]
}
