// ABOUTME: Protocol constants for the LibreLinkUp mobile-app API
// ABOUTME: Product identifiers, status codes, endpoint paths, and retry caps

// SPDX-License-Identifier: MIT OR Apache-2.0

//! LibreLinkUp protocol constants
//!
//! The upstream service speaks an undocumented mobile-app protocol. These
//! constants pin down the identifiers and status codes it is known to use,
//! avoiding magic values in the client code.

// =============================================================================
// Product identification
// =============================================================================

/// Product identifier sent with every request (mimics the Android app)
pub const APP_PRODUCT: &str = "llu.android";

/// App version sent with every request
pub const APP_VERSION: &str = "4.16.0";

// =============================================================================
// Upstream status protocol
// =============================================================================

/// Upstream status code: request succeeded
pub const STATUS_OK: i64 = 0;

/// Upstream status code: a consent step must be accepted before proceeding
pub const STATUS_CONSENT_REQUIRED: i64 = 4;

/// Enumerated glucose unit code: mmol/L
pub const GLUCOSE_UNITS_MMOL: i64 = 0;

/// Enumerated glucose unit code: mg/dL
pub const GLUCOSE_UNITS_MGDL: i64 = 1;

// =============================================================================
// Session and retry policy
// =============================================================================

/// Seconds before token expiry at which the token is treated as invalid
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// Maximum consecutive consent steps accepted before failing closed
pub const MAX_CONSENT_STEPS: u8 = 2;

/// Maximum region redirect hops followed during login
pub const MAX_REGION_REDIRECTS: u8 = 1;

// =============================================================================
// Units
// =============================================================================

/// Conversion factor between mmol/L and mg/dL
pub const MG_PER_DL_PER_MMOL: f64 = 18.0;

// =============================================================================
// Endpoints
// =============================================================================

/// Upstream domain (second-level); the TLD suffix is configurable
pub const UPSTREAM_DOMAIN: &str = "libreview";

/// Default top-level domain suffix
pub const DEFAULT_TLD: &str = "io";

/// Login endpoint path
pub const LOGIN_PATH: &str = "/llu/auth/login";

/// Consent continuation endpoint prefix; the step type is appended
pub const CONSENT_PATH_PREFIX: &str = "/auth/continue";

/// Connections list endpoint path
pub const CONNECTIONS_PATH: &str = "/llu/connections";

// =============================================================================
// Environment variables
// =============================================================================

/// Env var holding the default account email
pub const ENV_EMAIL: &str = "LLU_EMAIL";

/// Env var holding the default account password
pub const ENV_PASSWORD: &str = "LLU_PASSWORD";

/// Env var holding the default region (e.g. "eu2"); empty means no region
pub const ENV_REGION: &str = "LLU_REGION";

/// Env var holding the default domain suffix
pub const ENV_TLD: &str = "LLU_TLD";
