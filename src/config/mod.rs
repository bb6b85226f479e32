// src/config/mod.rs

//! Configuration loading, validation, and sweep expansion for sweeprun.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate sections and cross-references (`validate.rs`).
//! - Expand experiments into per-batch process specs (`expand.rs`).

pub mod expand;
pub mod loader;
pub mod model;
pub mod validate;

pub use expand::{Batch, expand_batches};
pub use loader::{install_root, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, ExperimentSection, ServerSection};
pub use validate::validate_config;
