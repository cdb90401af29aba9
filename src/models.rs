// ABOUTME: Canonical and display measurement models plus trend decoding
// ABOUTME: CanonicalMeasurement is the only internally trusted representation

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Measurement data models.
//!
//! [`CanonicalMeasurement`] is the only representation the rest of the system
//! trusts: its value is always mg/dL regardless of what the upstream payload
//! used. [`DisplayMeasurement`] is a projection of canonical through the unit
//! converter at the caller's preferred unit, recomputed on every read and
//! never cached in the display unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::units::{project, GlucoseUnit};

/// Upstream-provided indicator of glucose direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendTag {
    /// Glucose dropping rapidly
    FallingQuickly,
    /// Glucose dropping
    Falling,
    /// Glucose stable
    Steady,
    /// Glucose rising
    Rising,
    /// Glucose rising rapidly
    RisingQuickly,
    /// Trend not reported or unrecognized
    #[default]
    Unknown,
}

impl TrendTag {
    /// Decode a raw trend field.
    ///
    /// The mobile API reports trends either as the numeric codes `1..=5` or
    /// as arrow names; both map here, everything else is `Unknown`.
    #[must_use]
    pub fn from_raw(raw: &Value) -> Self {
        if let Some(code) = raw.as_i64() {
            return match code {
                1 => Self::FallingQuickly,
                2 => Self::Falling,
                3 => Self::Steady,
                4 => Self::Rising,
                5 => Self::RisingQuickly,
                _ => Self::Unknown,
            };
        }
        if let Some(name) = raw.as_str() {
            return match name.to_lowercase().replace([' ', '_'], "").as_str() {
                "fallingquickly" => Self::FallingQuickly,
                "falling" => Self::Falling,
                "flat" | "steady" | "stable" => Self::Steady,
                "rising" => Self::Rising,
                "risingquickly" => Self::RisingQuickly,
                _ => Self::Unknown,
            };
        }
        Self::Unknown
    }
}

/// A glucose reading normalized to the canonical unit (mg/dL)
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalMeasurement {
    /// Glucose value in mg/dL, whatever unit the upstream payload used
    pub mg_per_dl: f64,
    /// Direction indicator, `Unknown` when the payload carried none
    pub trend: TrendTag,
    /// Reading time; absence is preserved, never defaulted to now
    pub timestamp: Option<DateTime<Utc>>,
    /// The raw upstream measurement object this was extracted from
    pub raw: Value,
}

impl CanonicalMeasurement {
    /// Project this reading into the requested display unit.
    #[must_use]
    pub fn project(&self, unit: GlucoseUnit) -> DisplayMeasurement {
        DisplayMeasurement {
            value: project(self.mg_per_dl, unit),
            unit,
            trend: self.trend,
            timestamp: self.timestamp,
        }
    }
}

/// A glucose reading rendered in the caller's preferred unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMeasurement {
    /// Glucose value in `unit`, rounded per the unit's display rule
    pub value: f64,
    /// Display unit the value is expressed in
    pub unit: GlucoseUnit,
    /// Direction indicator
    pub trend: TrendTag,
    /// Reading time, if the upstream payload carried one
    pub timestamp: Option<DateTime<Utc>>,
}

/// Change between the last two readings of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesDelta {
    /// Last value minus the previous one, rounded to two decimals
    pub delta: f64,
    /// Unit the delta is expressed in (the unit of the last reading)
    pub unit: GlucoseUnit,
}

/// Compute the delta between the last two readings of a display series.
///
/// Returns `None` for series shorter than two readings.
#[must_use]
pub fn series_delta(series: &[DisplayMeasurement]) -> Option<SeriesDelta> {
    if series.len() < 2 {
        return None;
    }
    let last = &series[series.len() - 1];
    let prev = &series[series.len() - 2];
    Some(SeriesDelta {
        delta: ((last.value - prev.value) * 100.0).round() / 100.0,
        unit: last.unit,
    })
}
