// src/dag/product.rs

//! Output artifacts promised by a task.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{FlowError, Result};

/// Input variables a consumer needs so that it reuses an upstream file.
pub type ConfigFragment = BTreeMap<String, i64>;

/// Extension tag → input variable that makes a job read the file.
const EXT_TO_VAR: &[(&str, &str)] = &[
    ("DEN", "irdden"),
    ("WFK", "irdwfk"),
    ("WFQ", "irdwfq"),
    ("SCR", "irdscr"),
    ("QPS", "irdqps"),
    ("1WF", "ird1wf"),
    ("1DEN", "ird1den"),
    ("KSS", "irdkss"),
    ("BSR", "irdbsreso"),
    ("BSC", "irdbscoup"),
    ("HAYDR_SAVE", "irdhaydock"),
];

/// Configuration fragment telling a consumer how to reuse a file tagged `ext`.
pub fn config_for_ext(ext: &str) -> Result<ConfigFragment> {
    let ext = normalize_ext(ext);
    EXT_TO_VAR
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, var)| ConfigFragment::from([(var.to_string(), 1)]))
        .ok_or_else(|| FlowError::UnsupportedExtension(ext.to_string()))
}

/// Extension tags are upper-case without the leading underscore (`_DEN` → `DEN`).
pub fn normalize_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('_').to_uppercase()
}

/// One file produced by a task, tagged by its physical role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    ext: String,
    path: PathBuf,
}

impl Product {
    pub fn new(ext: impl AsRef<str>, path: impl Into<PathBuf>) -> Self {
        Self {
            ext: normalize_ext(ext.as_ref()),
            path: path.into(),
        }
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn required_config(&self) -> Result<ConfigFragment> {
        config_for_ext(&self.ext)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ext = {}, file = {}", self.ext, self.path.display())
    }
}
