// src/convergence/monotonic.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// Expected direction of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl FromStr for Direction {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "increasing" | ">" => Ok(Direction::Increasing),
            "decreasing" | "<" => Ok(Direction::Decreasing),
            other => Err(FlowError::InvalidMode(format!(
                "{other} (expected \"increasing\" or \"decreasing\")"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Increasing => f.write_str("increasing"),
            Direction::Decreasing => f.write_str("decreasing"),
        }
    }
}

/// `false` iff some adjacent pair moves against `direction` by more than
/// `tol`. Values closer than `tol` count as equal and never break
/// monotonicity.
pub fn monotonic(values: &[f64], direction: Direction, tol: f64) -> bool {
    values.windows(2).all(|pair| {
        let (v, next) = (pair[0], pair[1]);
        if (next - v).abs() <= tol {
            return true;
        }
        match direction {
            Direction::Increasing => next > v,
            Direction::Decreasing => next < v,
        }
    })
}

/// String-mode convenience used by config-driven callers.
pub fn monotonic_str(values: &[f64], mode: &str, tol: f64) -> Result<bool, FlowError> {
    Ok(monotonic(values, mode.parse()?, tol))
}
