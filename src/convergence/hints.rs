// src/convergence/hints.rs

//! Accuracy-tier hints for a parameter sweep.
//!
//! Given the parameter values of a sweep and the scalar result of each run,
//! find for three tolerance tiers (low, normal, high) the first parameter
//! value from which the results stay converged.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::convergence::check::{DeviationMode, check_conv};
use crate::errors::{FlowError, Result};

/// Hartree → eV.
pub const HA_TO_EV: f64 = 27.211_383_86;

/// Tolerances for the three tiers, expressed in display units.
///
/// `display_per_result` converts a result value into display units
/// (`display = result * display_per_result`), e.g. results in Hartree and
/// tolerances in meV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceTiers {
    pub low: f64,
    pub normal: f64,
    pub high: f64,
    pub display_per_result: f64,
}

impl ToleranceTiers {
    /// Tolerances in meV for results in Hartree.
    pub fn from_mev(atols_mev: [f64; 3]) -> Self {
        let [low, normal, high] = atols_mev;
        Self {
            low,
            normal,
            high,
            display_per_result: 1000.0 * HA_TO_EV,
        }
    }

    /// Tolerances in the same unit as the results.
    pub fn in_result_units(low: f64, normal: f64, high: f64) -> Self {
        Self {
            low,
            normal,
            high,
            display_per_result: 1.0,
        }
    }

    fn to_result_units(self, tol: f64) -> f64 {
        tol / self.display_per_result
    }

    pub fn validate(&self) -> Result<()> {
        let all = [self.low, self.normal, self.high, self.display_per_result];
        if all.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(FlowError::Config(format!(
                "tolerances and unit factor must be positive and finite, got {self:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Normal,
    High,
}

impl Tier {
    pub fn letter(self) -> char {
        match self {
            Tier::Low => 'L',
            Tier::Normal => 'N',
            Tier::High => 'H',
        }
    }
}

/// Where a tier converged, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TierOutcome {
    pub index: Option<usize>,
    pub param: Option<f64>,
}

impl TierOutcome {
    pub fn reached(&self) -> bool {
        self.index.is_some()
    }
}

/// One line of the deviation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintRow {
    pub iter: usize,
    pub param: f64,
    pub value: f64,
    /// `value - final value`, in display units.
    pub deviation: f64,
    /// Letters of the tiers first reached at this row (`"HNL"`, `"N"`, ...).
    pub accuracy: String,
}

/// Outcome of [`compute_hints`].
///
/// Each tier is evaluated on its own: `low` and `normal` may carry a
/// parameter value while `exit` is `false`. Only `exit` (equivalently
/// `high.param`) says the study is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceHints {
    /// `true` iff the high tier converged.
    pub exit: bool,
    pub params: Vec<f64>,
    pub values: Vec<f64>,
    pub rows: Vec<HintRow>,
    pub low: TierOutcome,
    pub normal: TierOutcome,
    pub high: TierOutcome,
    pub tolerances: ToleranceTiers,
}

/// Run [`check_conv`] once per tier over `values`.
///
/// The high tier requires `min_points` converged values; the looser tiers
/// accept a single one.
pub fn compute_hints(
    params: &[f64],
    values: &[f64],
    tiers: &ToleranceTiers,
    min_points: usize,
) -> Result<ConvergenceHints> {
    if params.len() != values.len() {
        return Err(FlowError::LengthMismatch(format!(
            "{} parameter values for {} results",
            params.len(),
            values.len()
        )));
    }
    tiers.validate()?;

    let ihigh = check_conv(values, tiers.to_result_units(tiers.high), min_points, DeviationMode::Abs, None)?;
    let inormal = check_conv(values, tiers.to_result_units(tiers.normal), 1, DeviationMode::Abs, None)?;
    let ilow = check_conv(values, tiers.to_result_units(tiers.low), 1, DeviationMode::Abs, None)?;

    let outcome = |index: Option<usize>| TierOutcome {
        index,
        param: index.map(|i| params[i]),
    };

    let last = values.last().copied().unwrap_or(f64::NAN);
    let rows = params
        .iter()
        .zip(values)
        .enumerate()
        .map(|(iter, (&param, &value))| {
            let accuracy = [(Tier::High, ihigh), (Tier::Normal, inormal), (Tier::Low, ilow)]
                .into_iter()
                .filter(|(_, idx)| *idx == Some(iter))
                .map(|(tier, _)| tier.letter())
                .collect();
            HintRow {
                iter,
                param,
                value,
                deviation: (value - last) * tiers.display_per_result,
                accuracy,
            }
        })
        .collect();

    Ok(ConvergenceHints {
        exit: ihigh.is_some(),
        params: params.to_vec(),
        values: values.to_vec(),
        rows,
        low: outcome(ilow),
        normal: outcome(inormal),
        high: outcome(ihigh),
        tolerances: *tiers,
    })
}

impl ConvergenceHints {
    pub fn tier(&self, tier: Tier) -> &TierOutcome {
        match tier {
            Tier::Low => &self.low,
            Tier::Normal => &self.normal,
            Tier::High => &self.high,
        }
    }

    /// Key/value form for merging into workflow results.
    pub fn to_data(&self) -> Result<BTreeMap<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(FlowError::Invariant(format!(
                "hints serialized to a non-object: {other}"
            ))),
        }
    }

    /// Plain-text deviation table.
    pub fn render_table(&self) -> String {
        let header = ["iter", "param", "value", "deviation", "accuracy"];
        let body: Vec<[String; 5]> = self
            .rows
            .iter()
            .map(|r| {
                [
                    r.iter.to_string(),
                    format!("{:.1}", r.param),
                    format!("{:.7}", r.value),
                    format!("{:.3}", r.deviation),
                    r.accuracy.clone(),
                ]
            })
            .collect();

        let mut widths = header.map(str::len);
        for row in &body {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        let mut line = |cells: &[&str]| {
            let parts: Vec<String> = cells
                .iter()
                .zip(widths)
                .map(|(c, w)| format!("{c:<w$}"))
                .collect();
            let _ = writeln!(out, "{}", parts.join("  ").trim_end());
        };
        line(&header);
        for row in &body {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            line(&cells);
        }
        out
    }
}
