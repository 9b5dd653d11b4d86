// src/dag/link.rs

//! Dependency edges between tasks.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dag::TaskId;
use crate::dag::product::{ConfigFragment, Product};
use crate::errors::Result;

/// A producer task plus the subset of its products a consumer needs.
///
/// Links are built by [`crate::engine::Workflow::register_link`], which checks
/// that every product really belongs to the producer. The status of a link is
/// always the live status of its producer and is looked up through the
/// workflow (`Workflow::link_status`); nothing is cached here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    producer: TaskId,
    products: Vec<Product>,
}

impl Link {
    pub(crate) fn new(producer: TaskId, products: Vec<Product>) -> Self {
        Self { producer, products }
    }

    /// Link to a task without any file dependency (ordering only).
    pub(crate) fn to_task(producer: TaskId) -> Self {
        Self::new(producer, Vec::new())
    }

    pub fn producer(&self) -> TaskId {
        self.producer
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Input variables that must be added to the consumer's input so that it
    /// reads the linked files.
    pub fn required_config(&self) -> Result<ConfigFragment> {
        let mut vars = ConfigFragment::new();
        for product in &self.products {
            vars.extend(product.required_config()?);
        }
        Ok(vars)
    }

    pub fn filepaths_and_exts(&self) -> (Vec<PathBuf>, Vec<String>) {
        self.products
            .iter()
            .map(|p| (p.path().to_path_buf(), p.ext().to_string()))
            .unzip()
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {} with products [", self.producer)?;
        for (i, p) in self.products.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str("]")
    }
}
