// ABOUTME: In-memory session state for the authenticated LibreLinkUp account
// ABOUTME: Bearer token, expiry arithmetic, account id, and cached patient id

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session cache.
//!
//! Owned exclusively by the client, never persisted externally. The token and
//! expiry are refreshed on every login; the patient id is populated lazily on
//! first data access and retained until credentials change.

use crate::constants::TOKEN_EXPIRY_BUFFER_SECS;

/// Mutable session state behind the client's locks
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Current bearer token, if any login has succeeded
    pub token: Option<String>,
    /// Token expiry as epoch seconds; 0 means no expiry recorded
    pub expires_at: i64,
    /// Authenticated account identifier (hashed into the Account-Id header)
    pub account_id: Option<String>,
    /// Resolved patient identifier, cached after the first connections call
    pub patient_id: Option<String>,
}

impl Session {
    /// Whether the cached token is still usable at `now` (epoch seconds).
    ///
    /// The token must outlive `now` by more than the fixed expiry buffer;
    /// tokens about to lapse are treated as already invalid so an in-flight
    /// request cannot straddle the expiry.
    #[must_use]
    pub fn is_token_valid(&self, now: i64) -> bool {
        match &self.token {
            Some(token) if !token.is_empty() && self.expires_at != 0 => {
                self.expires_at - TOKEN_EXPIRY_BUFFER_SECS > now
            }
            _ => false,
        }
    }

    /// Install a fresh auth ticket.
    pub fn install_ticket(&mut self, token: String, expires_at: i64) {
        self.token = Some(token);
        self.expires_at = expires_at;
    }

    /// Drop all session state; the next call re-authenticates from scratch.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
