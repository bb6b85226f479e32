// src/errors.rs

//! Crate-wide error aliases.
//!
//! Application flow uses `anyhow`; the typed spec-rejection taxonomy lives in
//! [`crate::spec::SpecError`].

pub use anyhow::{Error, Result};
