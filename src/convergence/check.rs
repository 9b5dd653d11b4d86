// src/convergence/check.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{FlowError, Result};

/// How the distance from the reference value is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationMode {
    /// `|v - ref|`
    #[default]
    Abs,
    /// `|v - ref| / |ref|`
    Rel,
}

impl FromStr for DeviationMode {
    type Err = FlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abs" | "absolute" => Ok(DeviationMode::Abs),
            "rel" | "relative" => Ok(DeviationMode::Rel),
            other => Err(FlowError::InvalidMode(format!(
                "{other} (expected \"abs\" or \"rel\")"
            ))),
        }
    }
}

/// Deviation of every value from `reference`.
pub fn deviations(values: &[f64], reference: f64, mode: DeviationMode) -> Result<Vec<f64>> {
    match mode {
        DeviationMode::Abs => Ok(values.iter().map(|v| (v - reference).abs()).collect()),
        DeviationMode::Rel => {
            if reference == 0.0 {
                return Err(FlowError::ZeroReference);
            }
            Ok(values
                .iter()
                .map(|v| (v - reference).abs() / reference.abs())
                .collect())
        }
    }
}

/// Leftmost index from which the sequence stays within `tol` of the
/// reference (`reference`, or the last value when `None`).
///
/// Returns `None` (not converged) unless:
/// - there are more than `min_points` values,
/// - the second-to-last deviation is strictly below `tol`,
/// - every deviation from the returned index on is `<= tol`,
/// - at least `min_points` values lie in that converged tail.
///
/// The second-to-last rule rejects a tail made of a single lucky point:
/// a series that only lands on the reference at the very end is reported as
/// not converged.
pub fn check_conv(
    values: &[f64],
    tol: f64,
    min_points: usize,
    mode: DeviationMode,
    reference: Option<f64>,
) -> Result<Option<usize>> {
    let Some(&last) = values.last() else {
        return Ok(None);
    };
    let vdiff = deviations(values, reference.unwrap_or(last), mode)?;
    let n = vdiff.len();

    // Written with negations so that NaN deviations never count as converged.
    if n < 2 || n <= min_points || !(vdiff[n - 2] < tol) {
        return Ok(None);
    }

    let mut first = n;
    for i in (0..n).rev() {
        if !(vdiff[i] <= tol) {
            break;
        }
        first = i;
    }

    if first == n || n - first < min_points {
        return Ok(None);
    }
    Ok(Some(first))
}
