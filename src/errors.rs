// ABOUTME: Typed error kinds for the glucose telemetry client
// ABOUTME: Distinguishes configuration, auth protocol, consent, and transport failures

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types surfaced by the telemetry facade.
//!
//! Every public operation fails with a [`TelemetryError`]; nothing is
//! silently swallowed. The only automatic retries in the client are the two
//! bounded ones designed into the login protocol (one region redirect hop,
//! and the capped consent-accept loop). Transport failures are never retried
//! here; backoff policy belongs to the caller.

use thiserror::Error;

/// Result alias for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors produced by the glucose telemetry client
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Credentials are missing or invalid
    #[error("credentials missing or invalid: {reason}")]
    Configuration {
        /// What was wrong with the configuration
        reason: String,
    },

    /// Login returned an upstream status code outside the known protocol
    #[error("login failed with upstream status {status}")]
    Authentication {
        /// Status code reported by the upstream service
        status: i64,
    },

    /// Upstream demanded consent but supplied no step type or ticket to act on
    #[error("upstream requires consent but provided no step to accept")]
    ConsentRequired,

    /// The consent continuation endpoint rejected the acceptance
    #[error("consent acceptance rejected with upstream status {status}")]
    ConsentRejected {
        /// Status code reported by the continuation endpoint
        status: i64,
    },

    /// Upstream kept demanding consent steps beyond the configured cap
    #[error("too many consecutive consent steps demanded by upstream")]
    TooManyConsentSteps,

    /// No patient identifier could be read from the connections response
    #[error("no patient identifier found in connections response")]
    PatientNotFound,

    /// No known measurement field was present in the graph response
    #[error("no glucose measurement found in response")]
    MeasurementMissing,

    /// Upstream returned a non-JSON or otherwise malformed body
    #[error("upstream returned a malformed response: {body}")]
    UpstreamProtocol {
        /// Truncated response body (or a description of the protocol breach)
        body: String,
    },

    /// Network-level failure, not an upstream-coded error
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

impl TelemetryError {
    /// Build a `Configuration` error from any displayable reason
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Build an `UpstreamProtocol` error, truncating long bodies
    pub fn upstream_protocol(body: &str) -> Self {
        const MAX_BODY: usize = 256;
        let body = if body.len() > MAX_BODY {
            let cut = body
                .char_indices()
                .take_while(|(i, _)| *i < MAX_BODY)
                .last()
                .map_or(0, |(i, c)| i + c.len_utf8());
            format!("{}...", &body[..cut])
        } else {
            body.to_owned()
        };
        Self::UpstreamProtocol { body }
    }
}
