// ABOUTME: LibreLinkUp client: login state machine, consent flow, patient resolution
// ABOUTME: Telemetry facade returning unit-projected glucose readings

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telemetry facade.
//!
//! [`LinkUpClient`] owns the session and credential state for one upstream
//! account and composes the full flow: ensure a valid session (logging in
//! through the consent sub-flow when the upstream demands it), resolve the
//! monitored patient, fetch the graph payload, normalize it, and project the
//! readings into the caller's preferred unit.
//!
//! Authentication is single-flight: the first caller to observe an invalid
//! token performs the login while concurrent callers wait on the same lock
//! instead of racing duplicate logins. The consent sub-flow authorizes the
//! continuation request with the temporary ticket token directly, so the
//! shared session token is never transiently swapped and in-flight data
//! requests cannot observe the wrong token.

use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use crate::config::{CredentialStatus, CredentialStore, Credentials};
use crate::constants::{
    APP_PRODUCT, APP_VERSION, CONNECTIONS_PATH, CONSENT_PATH_PREFIX, LOGIN_PATH,
    MAX_CONSENT_STEPS, MAX_REGION_REDIRECTS, STATUS_CONSENT_REQUIRED, STATUS_OK,
};
use crate::errors::{TelemetryError, TelemetryResult};
use crate::extract;
use crate::models::DisplayMeasurement;
use crate::session::Session;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Client configuration
#[derive(Debug, Clone)]
pub struct LinkUpClientConfig {
    /// Overrides the region/TLD-derived base URL when set (used in tests and
    /// for proxied deployments)
    pub base_url_override: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for LinkUpClientConfig {
    fn default() -> Self {
        Self {
            base_url_override: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// LibreLinkUp telemetry client for a single upstream account
pub struct LinkUpClient {
    http: Client,
    config: LinkUpClientConfig,
    store: RwLock<CredentialStore>,
    session: RwLock<Session>,
    /// Serializes the whole ensure-authenticated / consent / retry sequence
    auth_lock: Mutex<()>,
}

impl Default for LinkUpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkUpClient {
    /// Create a client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LinkUpClientConfig::default())
    }

    /// Create a client with custom configuration.
    #[must_use]
    pub fn with_config(config: LinkUpClientConfig) -> Self {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            config,
            store: RwLock::new(CredentialStore::default()),
            session: RwLock::new(Session::default()),
            auth_lock: Mutex::new(()),
        }
    }

    // -------------------------------------------------------------------
    // Credential management
    // -------------------------------------------------------------------

    /// Install an explicit credential override and invalidate the session.
    ///
    /// The next authenticated call re-triggers login under the new identity.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Configuration`] when email or password is
    /// empty.
    #[instrument(skip(self, credentials), fields(provider = "librelinkup"))]
    pub async fn configure_credentials(&self, credentials: Credentials) -> TelemetryResult<()> {
        {
            let mut store = self.store.write().await;
            store.configure(credentials)?;
        }
        self.session.write().await.clear();
        debug!("credentials replaced, session invalidated");
        Ok(())
    }

    /// Redacted credential status, safe to expose to callers.
    pub async fn credential_status(&self) -> CredentialStatus {
        self.store.read().await.status()
    }

    /// Update only the preferred display unit.
    pub async fn set_preferred_unit(&self, hint: &str) {
        self.store.write().await.set_preferred_unit(hint);
    }

    // -------------------------------------------------------------------
    // Telemetry facade
    // -------------------------------------------------------------------

    /// Fetch the most recent glucose reading, projected into the caller's
    /// preferred unit.
    ///
    /// # Errors
    ///
    /// Surfaces every failure kind in [`TelemetryError`]; notably
    /// [`TelemetryError::MeasurementMissing`] when the graph payload carries
    /// no recognizable reading.
    #[instrument(
        skip(self),
        fields(provider = "librelinkup", api_call = "fetch_latest_reading")
    )]
    pub async fn fetch_latest_reading(&self) -> TelemetryResult<DisplayMeasurement> {
        let response = self.fetch_graph().await?;
        let canonical = extract::extract_latest(&response)?;
        let unit = self.store.read().await.preferred_unit();
        Ok(canonical.project(unit))
    }

    /// Fetch the chronological glucose series, projected into the caller's
    /// preferred unit. An empty upstream series yields an empty vec.
    ///
    /// # Errors
    ///
    /// Surfaces authentication, consent, patient-resolution, and transport
    /// failures; an absent series container is not an error.
    #[instrument(
        skip(self),
        fields(provider = "librelinkup", api_call = "fetch_glucose_series")
    )]
    pub async fn fetch_glucose_series(&self) -> TelemetryResult<Vec<DisplayMeasurement>> {
        let response = self.fetch_graph().await?;
        let unit = self.store.read().await.preferred_unit();
        Ok(extract::extract_series(&response)
            .iter()
            .map(|canonical| canonical.project(unit))
            .collect())
    }

    async fn fetch_graph(&self) -> TelemetryResult<Value> {
        let patient_id = self.ensure_patient_id().await?;
        self.authed_get(&format!("{CONNECTIONS_PATH}/{patient_id}/graph"))
            .await
    }

    // -------------------------------------------------------------------
    // Auth state machine
    // -------------------------------------------------------------------

    /// Make sure a valid bearer token is cached, logging in when needed.
    ///
    /// Single-flight: validity is re-checked after acquiring the auth lock so
    /// callers that queued behind an in-flight login return without issuing
    /// their own.
    async fn ensure_authenticated(&self) -> TelemetryResult<()> {
        let now = chrono::Utc::now().timestamp();
        if self.session.read().await.is_token_valid(now) {
            return Ok(());
        }

        let _guard = self.auth_lock.lock().await;
        let now = chrono::Utc::now().timestamp();
        if self.session.read().await.is_token_valid(now) {
            return Ok(());
        }
        self.login().await
    }

    /// Drive the login state machine to completion.
    ///
    /// Caller must hold `auth_lock`. Follows at most one region redirect and
    /// accepts at most [`MAX_CONSENT_STEPS`] consecutive consent steps before
    /// failing closed.
    async fn login(&self) -> TelemetryResult<()> {
        let mut redirects: u8 = 0;
        let mut consent_steps: u8 = 0;
        let mut redirect_region: Option<String> = None;

        loop {
            let credentials = {
                let mut store = self.store.write().await;
                let credentials = store.resolve()?;
                // Applied after resolve so the redirect target is not
                // clobbered by the credential source's own region.
                if let Some(region) = redirect_region.take() {
                    store.set_region(&region);
                }
                credentials
            };
            let url = format!("{}{}", self.base_url().await, LOGIN_PATH);
            let account_id = self.session.read().await.account_id.clone();

            debug!(%url, "posting login");
            let request = self
                .apply_headers(self.http.post(&url), None, account_id.as_deref())
                .json(&LoginRequest {
                    email: &credentials.email,
                    password: &credentials.password,
                });
            let body = Self::parse_body(request.send().await?).await?;
            let status = body.get("status").and_then(Value::as_i64).unwrap_or(-1);

            match status {
                STATUS_OK => {
                    let data = body.get("data");
                    if let Some(user_id) = data
                        .and_then(|d| d.pointer("/user/id"))
                        .and_then(value_to_string)
                    {
                        self.session.write().await.account_id = Some(user_id);
                    }
                    if let Some((token, expires_at)) = data.and_then(ticket_from) {
                        self.session.write().await.install_ticket(token, expires_at);
                    }

                    let redirect = data
                        .and_then(|d| d.get("redirect"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    let region = data
                        .and_then(|d| d.get("region"))
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                    if let (true, Some(region)) = (redirect, region) {
                        if redirects < MAX_REGION_REDIRECTS {
                            redirects += 1;
                            debug!(%region, "login redirected to region");
                            redirect_region = Some(region);
                            continue;
                        }
                        warn!(%region, "ignoring second region redirect");
                    }
                    return Ok(());
                }
                STATUS_CONSENT_REQUIRED => {
                    consent_steps += 1;
                    if consent_steps > MAX_CONSENT_STEPS {
                        warn!("upstream demanded more consent steps than the cap allows");
                        return Err(TelemetryError::TooManyConsentSteps);
                    }
                    let data = body.get("data");
                    if let Some(user_id) = data
                        .and_then(|d| d.pointer("/user/id"))
                        .and_then(value_to_string)
                    {
                        self.session.write().await.account_id = Some(user_id);
                    }
                    let (temp_token, _) =
                        data.and_then(ticket_from).ok_or(TelemetryError::ConsentRequired)?;
                    let step_type = data
                        .and_then(|d| d.pointer("/step/type"))
                        .and_then(Value::as_str)
                        .ok_or(TelemetryError::ConsentRequired)?
                        .to_owned();
                    self.accept_step(&step_type, &temp_token).await?;
                    // Retry login now that the step is accepted.
                    continue;
                }
                other => {
                    warn!(status = other, "login failed with unexpected status");
                    return Err(TelemetryError::Authentication { status: other });
                }
            }
        }
    }

    /// Consent sub-flow: accept one upstream-mandated step.
    ///
    /// Authorized with the short-lived ticket token from the consent-required
    /// response, passed explicitly instead of being swapped into the shared
    /// session.
    async fn accept_step(&self, step_type: &str, temp_token: &str) -> TelemetryResult<()> {
        let url = format!(
            "{}{}/{}",
            self.base_url().await,
            CONSENT_PATH_PREFIX,
            step_type
        );
        let account_id = self.session.read().await.account_id.clone();
        debug!(%step_type, "accepting consent step");

        let request = self.apply_headers(self.http.post(&url), Some(temp_token), account_id.as_deref());
        let body = Self::parse_body(request.send().await?).await?;
        let status = body.get("status").and_then(Value::as_i64).unwrap_or(-1);
        if status != STATUS_OK {
            return Err(TelemetryError::ConsentRejected { status });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Patient resolver
    // -------------------------------------------------------------------

    /// Cached patient id, resolving via the connections list on first use.
    async fn ensure_patient_id(&self) -> TelemetryResult<String> {
        if let Some(id) = self.session.read().await.patient_id.clone() {
            return Ok(id);
        }
        self.fetch_connections().await
    }

    /// Resolve and cache the monitored patient from the connections list.
    ///
    /// Takes the first connection in the returned collection (array or single
    /// object) and reads the patient identifier from its known aliases.
    async fn fetch_connections(&self) -> TelemetryResult<String> {
        let body = self.authed_get(CONNECTIONS_PATH).await?;

        let data = body.get("data");
        let collection = data.and_then(|d| d.get("connections")).or(data);
        let first = match collection {
            Some(Value::Array(entries)) => entries.first(),
            Some(value) if value.is_object() => Some(value),
            _ => None,
        };
        let patient_id = first
            .and_then(|connection| {
                connection
                    .get("patientId")
                    .or_else(|| connection.pointer("/patient/id"))
                    .or_else(|| connection.get("id"))
            })
            .and_then(value_to_string)
            .ok_or(TelemetryError::PatientNotFound)?;

        debug!(%patient_id, "resolved monitored patient");
        self.session.write().await.patient_id = Some(patient_id.clone());
        Ok(patient_id)
    }

    // -------------------------------------------------------------------
    // Request plumbing
    // -------------------------------------------------------------------

    /// Authenticated GET with the shared consent-required handling.
    ///
    /// A status-4 response on a data endpoint runs the same consent sub-flow
    /// as login and retries the request, bounded by the same cap.
    async fn authed_get(&self, path: &str) -> TelemetryResult<Value> {
        let mut consent_steps: u8 = 0;

        loop {
            self.ensure_authenticated().await?;
            let (token, account_id) = {
                let session = self.session.read().await;
                (session.token.clone(), session.account_id.clone())
            };
            let token = token.ok_or(TelemetryError::Authentication { status: -1 })?;

            let url = format!("{}{}", self.base_url().await, path);
            let request =
                self.apply_headers(self.http.get(&url), Some(&token), account_id.as_deref());
            let body = Self::parse_body(request.send().await?).await?;
            let status = body.get("status").and_then(Value::as_i64).unwrap_or(-1);

            match status {
                STATUS_OK => return Ok(body),
                STATUS_CONSENT_REQUIRED => {
                    consent_steps += 1;
                    if consent_steps > MAX_CONSENT_STEPS {
                        return Err(TelemetryError::TooManyConsentSteps);
                    }
                    let data = body.get("data");
                    let (temp_token, _) =
                        data.and_then(ticket_from).ok_or(TelemetryError::ConsentRequired)?;
                    let step_type = data
                        .and_then(|d| d.pointer("/step/type"))
                        .and_then(Value::as_str)
                        .ok_or(TelemetryError::ConsentRequired)?
                        .to_owned();
                    // Consent acceptance is part of the auth critical section.
                    let _guard = self.auth_lock.lock().await;
                    self.accept_step(&step_type, &temp_token).await?;
                }
                other => {
                    return Err(TelemetryError::UpstreamProtocol {
                        body: format!("{path} returned unexpected status {other}"),
                    });
                }
            }
        }
    }

    /// Fixed product headers, plus bearer token and hashed account id when
    /// available.
    fn apply_headers(
        &self,
        request: RequestBuilder,
        token: Option<&str>,
        account_id: Option<&str>,
    ) -> RequestBuilder {
        let mut request = request
            .header("product", APP_PRODUCT)
            .header("version", APP_VERSION)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        if let Some(account_id) = account_id {
            request = request.header("Account-Id", sha256_hex(account_id));
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn base_url(&self) -> String {
        if let Some(base) = &self.config.base_url_override {
            return base.trim_end_matches('/').to_owned();
        }
        self.store.read().await.base_url()
    }

    /// Read the body as JSON, surfacing non-JSON payloads as a protocol
    /// error carrying the (truncated) raw body.
    async fn parse_body(response: reqwest::Response) -> TelemetryResult<Value> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|_| TelemetryError::upstream_protocol(&text))
    }
}

/// Auth ticket (token, expiry) from a response `data` object, if present.
fn ticket_from(data: &Value) -> Option<(String, i64)> {
    let token = data
        .pointer("/authTicket/token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())?;
    let expires_at = data
        .pointer("/authTicket/expires")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    Some((token.to_owned(), expires_at))
}

/// Identifiers arrive as strings or numbers depending on the payload shape.
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
