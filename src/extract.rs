// ABOUTME: Measurement normalizer for the unstable LibreLinkUp graph payloads
// ABOUTME: Ordered container/field fallbacks, unit decoding, series extraction

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Measurement extraction.
//!
//! The upstream service is not contractually stable about which shape it
//! returns from the graph endpoint: the same logical payload has been
//! observed under several container paths, several measurement field names,
//! and several value/unit encodings. Extraction therefore works through fixed
//! ordered fallback lists, and the value decoding itself is an ordered list
//! of pure strategies tried in sequence until one yields a canonical mg/dL
//! value. Each strategy is independently testable.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use crate::constants::{GLUCOSE_UNITS_MGDL, GLUCOSE_UNITS_MMOL, MG_PER_DL_PER_MMOL};
use crate::errors::{TelemetryError, TelemetryResult};
use crate::models::{CanonicalMeasurement, TrendTag};

/// Measurement field aliases holding a single reading, in preference order
const LATEST_KEYS: [&str; 2] = ["glucoseMeasurement", "glucoseItem"];

/// Measurement field aliases holding a reading history, in preference order
const SERIES_KEYS: [&str; 5] = [
    "glucoseMeasurementHistory",
    "glucoseMeasurements",
    "measurements",
    "glucoseData",
    "graphData",
];

/// Numeric value aliases inside a measurement object, in preference order
const VALUE_KEYS: [&str; 4] = ["Value", "value", "GlucoseValue", "glucose"];

/// Trend aliases inside a measurement object, in preference order
const TREND_KEYS: [&str; 4] = ["TrendArrow", "trendArrow", "Trend", "trend"];

/// Timestamp aliases inside a measurement object, in preference order
const TIMESTAMP_KEYS: [&str; 6] = [
    "Timestamp",
    "MeasurementDate",
    "TimeStamp",
    "FactoryTimestamp",
    "ReadingDate",
    "timestamp",
];

/// Extract the single most recent measurement from a graph response.
///
/// Searches the candidate containers in order; within each, the known
/// single-reading fields and then the head of the known history fields. The
/// first container yielding a usable numeric value wins.
///
/// # Errors
///
/// Returns [`TelemetryError::MeasurementMissing`] when no candidate container
/// yields a usable value.
pub fn extract_latest(response: &Value) -> TelemetryResult<CanonicalMeasurement> {
    for container in candidate_containers(response) {
        let Some(measurement) = latest_candidate(container) else {
            continue;
        };
        if let Some(canonical) = measurement_from(measurement) {
            debug!(mg_per_dl = canonical.mg_per_dl, "extracted latest measurement");
            return Ok(canonical);
        }
    }
    Err(TelemetryError::MeasurementMissing)
}

/// Extract the chronological measurement series from a graph response.
///
/// Entries lacking a usable numeric value or a parseable timestamp are
/// dropped; the rest are sorted ascending by timestamp. An absent or empty
/// series container yields an empty vec, never an error.
#[must_use]
pub fn extract_series(response: &Value) -> Vec<CanonicalMeasurement> {
    let mut containers = candidate_containers(response);
    containers.push(response);

    let mut items: Vec<&Value> = Vec::new();
    for container in containers {
        for key in SERIES_KEYS {
            if let Some(entries) = container.get(key).and_then(Value::as_array) {
                items.extend(entries.iter());
            }
        }
        if let Some(single) = container.get("glucoseMeasurement").filter(|v| v.is_object()) {
            items.push(single);
        }
    }

    let mut series: Vec<CanonicalMeasurement> = items
        .into_iter()
        .filter_map(measurement_from)
        .filter(|m| m.timestamp.is_some())
        .collect();
    series.sort_by_key(|m| m.timestamp);
    debug!(readings = series.len(), "extracted measurement series");
    series
}

/// Candidate containers in the fixed search order.
fn candidate_containers(response: &Value) -> Vec<&Value> {
    let mut out = Vec::with_capacity(4);
    if let Some(v) = response.pointer("/data/connection") {
        out.push(v);
    }
    if let Some(v) = response.get("data") {
        out.push(v);
    }
    if let Some(v) = response.get("connection") {
        out.push(v);
    }
    if let Some(v) = response.pointer("/graph/connection") {
        out.push(v);
    }
    out
}

/// Most-recent measurement object within a container, if any.
fn latest_candidate(container: &Value) -> Option<&Value> {
    for key in LATEST_KEYS {
        if let Some(m) = container.get(key).filter(|v| v.is_object()) {
            return Some(m);
        }
    }
    // graphData is a series-only alias: its head is the oldest point, not
    // the most recent reading.
    for key in &SERIES_KEYS[..4] {
        if let Some(m) = container.get(*key).and_then(|v| v.get(0)) {
            return Some(m);
        }
    }
    None
}

/// Build a canonical measurement from one raw measurement object.
///
/// Returns `None` when no strategy yields a numeric value.
fn measurement_from(measurement: &Value) -> Option<CanonicalMeasurement> {
    let mg_per_dl = VALUE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(measurement))?;
    Some(CanonicalMeasurement {
        mg_per_dl,
        trend: extract_trend(measurement),
        timestamp: extract_timestamp(measurement),
        raw: measurement.clone(),
    })
}

/// Ordered value-extraction strategies, each a pure function from the raw
/// measurement object to a canonical mg/dL value.
const VALUE_STRATEGIES: [fn(&Value) -> Option<f64>; 2] = [explicit_mgdl, value_with_unit];

/// Strategy 1: an explicit mg/dL-denominated field wins outright.
///
/// When both this field and a differently-labeled generic value are present
/// and disagree, the explicit field is preferred. That tie-break matches
/// observed upstream behavior, not any published contract.
fn explicit_mgdl(measurement: &Value) -> Option<f64> {
    measurement.get("ValueInMgPerDl").and_then(Value::as_f64)
}

/// Strategy 2: a generic numeric value plus an explicit or inferred unit tag.
///
/// The unit comes from a string `Unit`/`unit` field (substring match on
/// "mmol") or the enumerated `GlucoseUnits` code (0 = mmol/L, 1 = mg/dL).
/// With no recognizable unit the raw value is assumed already canonical.
fn value_with_unit(measurement: &Value) -> Option<f64> {
    let raw = VALUE_KEYS
        .iter()
        .find_map(|key| measurement.get(key).and_then(Value::as_f64))?;

    let unit_label = measurement
        .get("Unit")
        .or_else(|| measurement.get("unit"))
        .and_then(Value::as_str);
    if let Some(label) = unit_label {
        if label.to_lowercase().contains("mmol") {
            return Some(raw * MG_PER_DL_PER_MMOL);
        }
        return Some(raw);
    }

    match measurement.get("GlucoseUnits").and_then(Value::as_i64) {
        Some(code) if code == GLUCOSE_UNITS_MMOL => Some(raw * MG_PER_DL_PER_MMOL),
        Some(code) if code == GLUCOSE_UNITS_MGDL => Some(raw),
        // Unknown unit: the raw value is assumed already canonical.
        _ => Some(raw),
    }
}

fn extract_trend(measurement: &Value) -> TrendTag {
    for key in TREND_KEYS {
        if let Some(raw) = measurement.get(key).filter(|v| !v.is_null()) {
            return TrendTag::from_raw(raw);
        }
    }
    TrendTag::Unknown
}

fn extract_timestamp(measurement: &Value) -> Option<DateTime<Utc>> {
    for key in TIMESTAMP_KEYS {
        if let Some(raw) = measurement.get(key).and_then(Value::as_str) {
            if let Some(parsed) = parse_timestamp(raw) {
                return Some(parsed);
            }
        }
    }
    None
}

/// Parse the two timestamp shapes the upstream is known to emit: RFC 3339
/// and the mobile app's `M/D/YYYY h:mm:ss AM` form (taken as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%m/%d/%Y %I:%M:%S %p") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}
