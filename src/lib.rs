// ABOUTME: LibreLinkUp glucose telemetry client library
// ABOUTME: Session management, consent-aware login, measurement normalization, unit projection

// SPDX-License-Identifier: MIT OR Apache-2.0

#![deny(unsafe_code)]

//! # Glucolink
//!
//! Client for the LibreLinkUp continuous-glucose-monitoring cloud service,
//! speaking its undocumented mobile-app protocol. The client authenticates
//! (including the nested consent-step sub-flow), maintains a bearer-token
//! session with correct expiry arithmetic, resolves the monitored patient,
//! and normalizes the service's heterogeneous graph payloads into a single
//! canonical measurement representation with user-selectable display units.
//!
//! ## Modules
//!
//! - **client**: the telemetry facade ([`LinkUpClient`]) and auth state machine
//! - **config**: credential store (inline override or env defaults)
//! - **session**: bearer token, expiry, account and patient identifiers
//! - **extract**: measurement normalizer for the unstable graph payloads
//! - **units**: canonical mg/dL and pure display-unit projection
//! - **models**: canonical/display measurements, trend tags, series delta
//! - **errors**: typed failure kinds; nothing is silently swallowed
//!
//! ## Example
//!
//! ```rust,no_run
//! use glucolink::{Credentials, LinkUpClient};
//!
//! # async fn example() -> Result<(), glucolink::TelemetryError> {
//! let client = LinkUpClient::new();
//! client
//!     .configure_credentials(Credentials {
//!         email: "user@example.com".to_owned(),
//!         password: "secret".to_owned(),
//!         region: Some("eu2".to_owned()),
//!         tld: None,
//!         unit: Some("mmol".to_owned()),
//!     })
//!     .await?;
//! let reading = client.fetch_latest_reading().await?;
//! println!("{} {}", reading.value, reading.unit);
//! # Ok(())
//! # }
//! ```

/// Telemetry facade and auth state machine
pub mod client;
/// Credential store: inline overrides, environment defaults, redacted status
pub mod config;
/// Protocol constants for the upstream mobile-app API
pub mod constants;
/// Typed error kinds
pub mod errors;
/// Measurement normalizer for heterogeneous graph payloads
pub mod extract;
/// Measurement models and trend decoding
pub mod models;
/// Session cache: token, expiry, account and patient identifiers
pub mod session;
/// Glucose units and pure projection
pub mod units;

pub use client::{LinkUpClient, LinkUpClientConfig};
pub use config::{mask_email, CredentialSource, CredentialStatus, Credentials};
pub use errors::{TelemetryError, TelemetryResult};
pub use extract::{extract_latest, extract_series};
pub use models::{series_delta, CanonicalMeasurement, DisplayMeasurement, SeriesDelta, TrendTag};
pub use units::{project, to_canonical, GlucoseUnit};
