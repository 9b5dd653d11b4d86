// src/exec/reader.rs

//! Reading named scalar quantities out of task artifacts.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;

/// A scalar read from an artifact. Failures are explicit; nothing is ever
/// silently replaced by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Finite(f64),
    Unreadable(String),
}

impl Scalar {
    pub fn value(&self) -> Option<f64> {
        match self {
            Scalar::Finite(v) => Some(*v),
            Scalar::Unreadable(_) => None,
        }
    }
}

pub trait ScalarReader: Send + Sync + Debug {
    fn read_scalar(&self, path: &Path, name: &str) -> Scalar;
}

/// Reads `name = value` (or `name: value`) lines from a text artifact.
/// The last matching line wins.
#[derive(Debug, Clone)]
pub struct KeyValueReader {
    fs: Arc<dyn FileSystem>,
}

impl KeyValueReader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl ScalarReader for KeyValueReader {
    fn read_scalar(&self, path: &Path, name: &str) -> Scalar {
        let contents = match self.fs.read_to_string(path) {
            Ok(c) => c,
            Err(e) => return Scalar::Unreadable(format!("{e:#}")),
        };

        let pattern = format!(r"(?m)^\s*{}\s*[=:]\s*(\S+)", regex::escape(name));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => return Scalar::Unreadable(e.to_string()),
        };

        let Some(raw) = re
            .captures_iter(&contents)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            return Scalar::Unreadable(format!(
                "no `{name}` entry in {}",
                path.display()
            ));
        };

        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Scalar::Finite(v),
            Ok(v) => Scalar::Unreadable(format!("`{name}` is not finite ({v})")),
            Err(e) => Scalar::Unreadable(format!("`{name}` = {raw}: {e}")),
        }
    }
}
