// ABOUTME: Glucose unit tags and pure conversion between mg/dL and mmol/L
// ABOUTME: Canonical unit is mg/dL; projection applies display rounding rules

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Glucose unit handling.
//!
//! All measurements are normalized to a single canonical unit (mg/dL) before
//! anything else happens; display values are projected from canonical on
//! every read. Projection is pure and never mutates canonical state, so it is
//! safe to call repeatedly with different preferences.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::MG_PER_DL_PER_MMOL;

/// Display unit for glucose values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlucoseUnit {
    /// Milligrams per deciliter (the canonical unit)
    #[default]
    #[serde(rename = "mg/dL")]
    MgPerDl,
    /// Millimoles per liter
    #[serde(rename = "mmol/L")]
    MmolPerL,
}

impl GlucoseUnit {
    /// Normalize an arbitrary unit hint to one of the two canonical tags.
    ///
    /// Deliberately permissive: case-insensitive substring match on "mmol"
    /// accepts full labels and short codes alike; anything else is mg/dL.
    #[must_use]
    pub fn normalize(hint: &str) -> Self {
        if hint.to_lowercase().contains("mmol") {
            Self::MmolPerL
        } else {
            Self::MgPerDl
        }
    }

    /// Human-readable unit label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MgPerDl => "mg/dL",
            Self::MmolPerL => "mmol/L",
        }
    }
}

impl fmt::Display for GlucoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Project a canonical mg/dL value into the requested display unit.
///
/// mg/dL passes through rounded to the nearest whole unit; mmol/L divides by
/// 18 and rounds to one decimal place.
#[must_use]
pub fn project(mg_per_dl: f64, unit: GlucoseUnit) -> f64 {
    match unit {
        GlucoseUnit::MgPerDl => mg_per_dl.round(),
        GlucoseUnit::MmolPerL => round1(mg_per_dl / MG_PER_DL_PER_MMOL),
    }
}

/// Convert a value expressed in `unit` to canonical mg/dL, unrounded.
#[must_use]
pub fn to_canonical(value: f64, unit: GlucoseUnit) -> f64 {
    match unit {
        GlucoseUnit::MgPerDl => value,
        GlucoseUnit::MmolPerL => value * MG_PER_DL_PER_MMOL,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
