// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::dag::TaskId;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job specification: {0}")]
    InvalidJobSpec(String),

    #[error("Unsupported job specification: no task factory registered for strategy '{0}'")]
    UnsupportedJobSpec(String),

    #[error("Task {task} does not produce a file with extension '{ext}'")]
    UnknownProduct { task: TaskId, ext: String },

    #[error("Unsupported extension: '{0}'")]
    UnsupportedExtension(String),

    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Task {task} cannot depend on task {producer}: links may only point to earlier tasks")]
    ForwardLink { task: TaskId, producer: TaskId },

    #[error("Invalid mode: '{0}'")]
    InvalidMode(String),

    #[error("Relative deviation requested with a zero reference value")]
    ZeroReference,

    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    #[error("Some task is still in running/submitted state")]
    NotAllDone,

    #[error("Workflow invariant violated: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;
