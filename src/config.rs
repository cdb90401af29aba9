// ABOUTME: Credential resolution from inline overrides or environment defaults
// ABOUTME: Region/TLD caching, unit preference, and redacted status reporting

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential store.
//!
//! Credentials come from one of two sources: an explicit override set through
//! [`CredentialStore::configure`] (which persists until replaced), or
//! process-level environment defaults read on each access. The store also
//! owns the cached region / domain-suffix used to build the upstream base URL
//! and the caller's preferred display unit.
//!
//! The store itself is plain data; the client wraps it in a lock and is
//! responsible for invalidating the session whenever credentials change.

use serde::Serialize;
use std::env;

use crate::constants::{
    DEFAULT_TLD, ENV_EMAIL, ENV_PASSWORD, ENV_REGION, ENV_TLD, UPSTREAM_DOMAIN,
};
use crate::errors::{TelemetryError, TelemetryResult};
use crate::units::GlucoseUnit;

/// Credentials for the upstream account
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// Optional region (e.g. "eu2"); falls back to the cached value
    pub region: Option<String>,
    /// Optional domain suffix; falls back to the cached value
    pub tld: Option<String>,
    /// Optional display-unit hint, normalized on configure
    pub unit: Option<String>,
}

/// Where the active credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Explicitly configured override
    Inline,
    /// Process environment defaults
    Environment,
}

/// Redacted credential view, safe to expose to callers
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    /// Whether a usable email+password pair is available
    pub configured: bool,
    /// Masked email: first two characters of the local part plus domain
    pub email: String,
    /// Active region, empty when unset
    pub region: String,
    /// Active domain suffix
    pub tld: String,
    /// Which source supplies the active credentials
    pub source: CredentialSource,
    /// Current preferred display unit
    pub unit: GlucoseUnit,
}

/// Resolved email+password pair ready for a login request
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

/// Credential store backing one client instance
#[derive(Debug)]
pub struct CredentialStore {
    override_credentials: Option<Credentials>,
    cached_region: String,
    cached_tld: String,
    preferred_unit: GlucoseUnit,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self {
            override_credentials: None,
            cached_region: String::new(),
            cached_tld: DEFAULT_TLD.to_owned(),
            preferred_unit: GlucoseUnit::default(),
        }
    }
}

impl CredentialStore {
    /// Install an explicit credential override, replacing any prior one.
    ///
    /// Region and TLD fall back to the previously cached values ("eu2" and
    /// "com" respectively when nothing was ever cached). A unit hint, when
    /// present, updates the preferred display unit.
    ///
    /// The caller must invalidate the session after a successful configure so
    /// the next call re-authenticates under the new identity.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Configuration`] when email or password is
    /// empty.
    pub fn configure(&mut self, credentials: Credentials) -> TelemetryResult<()> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(TelemetryError::configuration(
                "email and password are required",
            ));
        }

        let region = credentials
            .region
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| {
                if self.cached_region.is_empty() {
                    "eu2".to_owned()
                } else {
                    self.cached_region.clone()
                }
            });
        let tld = credentials
            .tld
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| {
                if self.cached_tld.is_empty() {
                    "com".to_owned()
                } else {
                    self.cached_tld.clone()
                }
            });

        if let Some(hint) = &credentials.unit {
            self.preferred_unit = GlucoseUnit::normalize(hint);
        }

        self.cached_region = region.trim().to_owned();
        self.cached_tld = tld.trim().to_owned();
        self.override_credentials = Some(Credentials {
            email: credentials.email,
            password: credentials.password,
            region: Some(self.cached_region.clone()),
            tld: Some(self.cached_tld.clone()),
            unit: None,
        });
        Ok(())
    }

    /// Resolve the active credentials: override first, env defaults second.
    ///
    /// Also refreshes the cached region/TLD from whichever source supplied
    /// the credentials, so the base URL tracks the active identity.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Configuration`] when neither source supplies
    /// both email and password.
    pub fn resolve(&mut self) -> TelemetryResult<ResolvedCredentials> {
        let (email, password, region, tld) = match &self.override_credentials {
            Some(creds) => (
                Some(creds.email.clone()),
                Some(creds.password.clone()),
                creds.region.clone(),
                creds.tld.clone(),
            ),
            None => (
                env::var(ENV_EMAIL).ok(),
                env::var(ENV_PASSWORD).ok(),
                env::var(ENV_REGION).ok(),
                env::var(ENV_TLD).ok(),
            ),
        };

        let email = email.filter(|e| !e.trim().is_empty());
        let password = password.filter(|p| !p.is_empty());
        let (Some(email), Some(password)) = (email, password) else {
            return Err(TelemetryError::configuration(format!(
                "credentials missing: set {ENV_EMAIL} and {ENV_PASSWORD} or configure inline",
            )));
        };

        if let Some(region) = region {
            self.cached_region = region.trim().to_owned();
        }
        if let Some(tld) = tld {
            let tld = tld.trim();
            self.cached_tld = if tld.is_empty() {
                DEFAULT_TLD.to_owned()
            } else {
                tld.to_owned()
            };
        }

        Ok(ResolvedCredentials { email, password })
    }

    /// Base URL for the upstream API given the cached region and TLD.
    ///
    /// The region segment is omitted when no region is set.
    #[must_use]
    pub fn base_url(&self) -> String {
        let region = self.cached_region.trim();
        let tld = self.cached_tld.trim();
        let tld = if tld.is_empty() { DEFAULT_TLD } else { tld };
        if region.is_empty() {
            format!("https://api.{UPSTREAM_DOMAIN}.{tld}")
        } else {
            format!("https://api-{region}.{UPSTREAM_DOMAIN}.{tld}")
        }
    }

    /// Override the cached region (used for login region redirects).
    pub fn set_region(&mut self, region: &str) {
        self.cached_region = region.trim().to_owned();
    }

    /// Current preferred display unit.
    #[must_use]
    pub const fn preferred_unit(&self) -> GlucoseUnit {
        self.preferred_unit
    }

    /// Update only the display-unit preference.
    pub fn set_preferred_unit(&mut self, hint: &str) {
        self.preferred_unit = GlucoseUnit::normalize(hint);
    }

    /// Redacted status view. Never exposes the password or unmasked email.
    #[must_use]
    pub fn status(&self) -> CredentialStatus {
        let (email, password, region, tld, source) = match &self.override_credentials {
            Some(creds) => (
                Some(creds.email.clone()),
                Some(creds.password.clone()),
                creds.region.clone(),
                creds.tld.clone(),
                CredentialSource::Inline,
            ),
            None => (
                env::var(ENV_EMAIL).ok(),
                env::var(ENV_PASSWORD).ok(),
                env::var(ENV_REGION).ok(),
                env::var(ENV_TLD).ok(),
                CredentialSource::Environment,
            ),
        };

        let configured = email.as_ref().is_some_and(|e| !e.trim().is_empty())
            && password.as_ref().is_some_and(|p| !p.is_empty());

        CredentialStatus {
            configured,
            email: mask_email(email.as_deref()),
            region: region.unwrap_or_default(),
            tld: tld.unwrap_or_else(|| DEFAULT_TLD.to_owned()),
            source,
            unit: self.preferred_unit,
        }
    }
}

/// Mask an email to at most its first two local-part characters plus domain.
#[must_use]
pub fn mask_email(email: Option<&str>) -> String {
    let Some(email) = email.filter(|e| !e.is_empty()) else {
        return String::new();
    };
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{visible}***@{domain}")
        }
        None => "***".to_owned(),
    }
}
