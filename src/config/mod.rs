// src/config/mod.rs

//! Configuration loading and validation for simflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate link order, names and study parameters (`validate.rs`).
//! - Build the described workflow (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::Plan;
pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigFile, LinkConfig, PolicyKind, RawConfigFile, StudyConfig, TaskConfig, WorkflowSection,
};
pub use validate::validate_raw_config;
