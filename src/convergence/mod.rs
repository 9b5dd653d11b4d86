// src/convergence/mod.rs

//! Pure numeric routines for convergence studies.
//!
//! - [`monotonic`] checks the direction of a noisy sequence.
//! - [`check`] finds where a sequence settles within a tolerance.
//! - [`hints`] runs the check for three accuracy tiers and builds a report.

pub mod check;
pub mod hints;
pub mod monotonic;

pub use check::{DeviationMode, check_conv, deviations};
pub use hints::{
    ConvergenceHints, HA_TO_EV, HintRow, Tier, TierOutcome, ToleranceTiers, compute_hints,
};
pub use monotonic::{Direction, monotonic, monotonic_str};
