// ABOUTME: Unit tests for glucose unit normalization and projection
// ABOUTME: Covers rounding rules, round trips, and unit hint parsing

// SPDX-License-Identifier: MIT OR Apache-2.0
#![allow(missing_docs)]

use glucolink::{project, to_canonical, GlucoseUnit};

#[test]
fn test_mgdl_projection_rounds_to_nearest_integer() {
    assert_eq!(project(104.4, GlucoseUnit::MgPerDl), 104.0);
    assert_eq!(project(104.5, GlucoseUnit::MgPerDl), 105.0);
    assert_eq!(project(104.0, GlucoseUnit::MgPerDl), 104.0);
}

#[test]
fn test_mmol_projection_divides_by_18_and_rounds_to_one_decimal() {
    assert_eq!(project(104.0, GlucoseUnit::MmolPerL), 5.8);
    assert_eq!(project(180.0, GlucoseUnit::MmolPerL), 10.0);
    assert_eq!(project(99.0, GlucoseUnit::MmolPerL), 5.5);
}

#[test]
fn test_mmol_round_trip_within_rounding_tolerance() {
    let source_mmol = 6.2;
    let canonical = to_canonical(source_mmol, GlucoseUnit::MmolPerL);
    assert!((canonical - source_mmol * 18.0).abs() < f64::EPSILON);

    let back = project(canonical, GlucoseUnit::MgPerDl);
    assert!((back - (source_mmol * 18.0).round()).abs() < f64::EPSILON);

    // And back to mmol lands on the source within one rounding step.
    assert!((project(canonical, GlucoseUnit::MmolPerL) - source_mmol).abs() < 0.05 + f64::EPSILON);
}

#[test]
fn test_unit_normalization_is_permissive() {
    assert_eq!(GlucoseUnit::normalize("mmol/L"), GlucoseUnit::MmolPerL);
    assert_eq!(GlucoseUnit::normalize("MMOL"), GlucoseUnit::MmolPerL);
    assert_eq!(GlucoseUnit::normalize("millimoles (mmol)"), GlucoseUnit::MmolPerL);
    assert_eq!(GlucoseUnit::normalize("mg/dL"), GlucoseUnit::MgPerDl);
    assert_eq!(GlucoseUnit::normalize("mgdl"), GlucoseUnit::MgPerDl);
    assert_eq!(GlucoseUnit::normalize(""), GlucoseUnit::MgPerDl);
    assert_eq!(GlucoseUnit::normalize("anything else"), GlucoseUnit::MgPerDl);
}

#[test]
fn test_unit_labels() {
    assert_eq!(GlucoseUnit::MgPerDl.label(), "mg/dL");
    assert_eq!(GlucoseUnit::MmolPerL.label(), "mmol/L");
    assert_eq!(GlucoseUnit::default(), GlucoseUnit::MgPerDl);
}

#[test]
fn test_projection_is_pure() {
    let canonical = 123.0;
    let a = project(canonical, GlucoseUnit::MmolPerL);
    let b = project(canonical, GlucoseUnit::MgPerDl);
    let c = project(canonical, GlucoseUnit::MmolPerL);
    assert_eq!(a, c);
    assert_eq!(b, 123.0);
}
