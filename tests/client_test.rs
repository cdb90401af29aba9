// ABOUTME: Integration tests for the login state machine and telemetry facade
// ABOUTME: Drives the upstream protocol against a wiremock server

// SPDX-License-Identifier: MIT OR Apache-2.0
#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use glucolink::{Credentials, GlucoseUnit, LinkUpClient, LinkUpClientConfig, TelemetryError};

fn future_expiry() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

fn login_ok_body(token: &str) -> serde_json::Value {
    json!({
        "status": 0,
        "data": {
            "authTicket": { "token": token, "expires": future_expiry() },
            "user": { "id": "acct-1" }
        }
    })
}

fn connections_body(patient_id: &str) -> serde_json::Value {
    json!({
        "status": 0,
        "data": { "connections": [ { "patientId": patient_id } ] }
    })
}

fn graph_body() -> serde_json::Value {
    json!({
        "status": 0,
        "data": {
            "connection": {
                "glucoseMeasurement": {
                    "ValueInMgPerDl": 104,
                    "TrendArrow": 3,
                    "Timestamp": "2025-10-01T08:15:22Z"
                },
                "graphData": [
                    { "Value": 98, "GlucoseUnits": 1, "Timestamp": "2025-10-01T07:15:22Z" },
                    { "Value": 101, "GlucoseUnits": 1, "Timestamp": "2025-10-01T07:45:22Z" }
                ]
            }
        }
    })
}

async fn configured_client(server: &MockServer) -> LinkUpClient {
    let client = LinkUpClient::with_config(LinkUpClientConfig {
        base_url_override: Some(server.uri()),
        ..LinkUpClientConfig::default()
    });
    client
        .configure_credentials(Credentials {
            email: "user@example.com".to_owned(),
            password: "secret".to_owned(),
            region: None,
            tld: None,
            unit: None,
        })
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn test_login_success_caches_token_and_fetches_latest_reading() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .and(header("product", "llu.android"))
        .and(header("version", "4.16.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("^/auth/continue/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 0 })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = configured_client(&server).await;

    let reading = client.fetch_latest_reading().await.unwrap();
    assert!((reading.value - 104.0).abs() < f64::EPSILON);
    assert_eq!(reading.unit, GlucoseUnit::MgPerDl);

    // Second call reuses the cached token and patient id: no second login,
    // no second connections request.
    let reading = client.fetch_latest_reading().await.unwrap();
    assert!((reading.value - 104.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_account_id_header_carries_hashed_account_identifier() {
    let server = MockServer::start().await;
    let hashed = hex::encode(Sha256::digest(b"acct-1"));

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .and(header("Account-Id", hashed.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .and(header("Account-Id", hashed.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    client.fetch_latest_reading().await.unwrap();
}

#[tokio::test]
async fn test_login_consent_step_accepted_then_retry_succeeds() {
    let server = MockServer::start().await;

    // First login demands a terms-of-use step; the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 4,
            "data": {
                "authTicket": { "token": "temp-tok", "expires": future_expiry() },
                "step": { "type": "tou" },
                "user": { "id": "acct-1" }
            }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // The continuation is authorized with the temporary ticket token.
    Mock::given(method("POST"))
        .and(path("/auth/continue/tou"))
        .and(header("Authorization", "Bearer temp-tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 0 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .and(header("Authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .and(header("Authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let reading = client.fetch_latest_reading().await.unwrap();
    assert!((reading.value - 104.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_endless_consent_demands_fail_closed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 4,
            "data": {
                "authTicket": { "token": "temp-tok", "expires": future_expiry() },
                "step": { "type": "tou" }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/continue/tou"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 0 })))
        .expect(2)
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let err = client.fetch_latest_reading().await.unwrap_err();
    assert!(matches!(err, TelemetryError::TooManyConsentSteps));
}

#[tokio::test]
async fn test_consent_rejection_surfaces_typed_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 4,
            "data": {
                "authTicket": { "token": "temp-tok", "expires": future_expiry() },
                "step": { "type": "tou" }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/continue/tou"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let err = client.fetch_latest_reading().await.unwrap_err();
    assert!(matches!(err, TelemetryError::ConsentRejected { status: 1 }));
}

#[tokio::test]
async fn test_consent_without_step_type_fails_consent_required() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 4,
            "data": {
                "authTicket": { "token": "temp-tok", "expires": future_expiry() }
            }
        })))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let err = client.fetch_latest_reading().await.unwrap_err();
    assert!(matches!(err, TelemetryError::ConsentRequired));
}

#[tokio::test]
async fn test_unexpected_login_status_carries_upstream_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 2 })))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let err = client.fetch_latest_reading().await.unwrap_err();
    assert!(matches!(err, TelemetryError::Authentication { status: 2 }));
}

#[tokio::test]
async fn test_region_redirect_is_followed_exactly_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "data": { "redirect": true, "region": "eu2" }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-redir")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let reading = client.fetch_latest_reading().await.unwrap();
    assert!((reading.value - 104.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_second_region_redirect_is_not_followed() {
    let server = MockServer::start().await;

    // The upstream keeps redirecting; only one hop is followed and the
    // session from the second response is kept as-is.
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "data": {
                "redirect": true,
                "region": "eu2",
                "authTicket": { "token": "tok-loop", "expires": future_expiry() },
                "user": { "id": "acct-1" }
            }
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let reading = client.fetch_latest_reading().await.unwrap();
    assert!((reading.value - 104.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_reconfiguring_credentials_invalidates_the_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-1")))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    client.fetch_latest_reading().await.unwrap();

    client
        .configure_credentials(Credentials {
            email: "other@example.com".to_owned(),
            password: "other-secret".to_owned(),
            region: None,
            tld: None,
            unit: None,
        })
        .await
        .unwrap();

    // Token and patient id are gone: the next call logs in and resolves the
    // patient again.
    client.fetch_latest_reading().await.unwrap();
}

#[tokio::test]
async fn test_consent_demand_on_connections_endpoint_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 4,
            "data": {
                "authTicket": { "token": "temp-tok", "expires": future_expiry() },
                "step": { "type": "pp" }
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/continue/pp"))
        .and(header("Authorization", "Bearer temp-tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 0 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let reading = client.fetch_latest_reading().await.unwrap();
    assert!((reading.value - 104.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_concurrent_callers_share_a_single_login() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(login_ok_body("tok-1"))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let (latest, series) = tokio::join!(
        client.fetch_latest_reading(),
        client.fetch_glucose_series()
    );
    latest.unwrap();
    assert_eq!(series.unwrap().len(), 3);
}

#[tokio::test]
async fn test_series_is_projected_in_the_preferred_unit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_body("pat-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections/pat-1/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_body()))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    client.set_preferred_unit("mmol/L").await;

    let series = client.fetch_glucose_series().await.unwrap();
    // graphData (98, 101) plus the lone latest measurement (104), ascending.
    assert_eq!(series.len(), 3);
    assert!(series.iter().all(|m| m.unit == GlucoseUnit::MmolPerL));
    assert!((series[0].value - 5.4).abs() < 1e-9);
    assert!((series[2].value - 5.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_empty_connections_list_fails_patient_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_ok_body("tok-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/llu/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "data": { "connections": [] }
        })))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let err = client.fetch_latest_reading().await.unwrap_err();
    assert!(matches!(err, TelemetryError::PatientNotFound));
}

#[tokio::test]
async fn test_non_json_body_surfaces_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = configured_client(&server).await;
    let err = client.fetch_latest_reading().await.unwrap_err();
    assert!(matches!(err, TelemetryError::UpstreamProtocol { .. }));
}

#[tokio::test]
async fn test_unconfigured_client_fails_with_configuration_error() {
    let server = MockServer::start().await;
    let client = LinkUpClient::with_config(LinkUpClientConfig {
        base_url_override: Some(server.uri()),
        ..LinkUpClientConfig::default()
    });

    // No override configured; env defaults may or may not be present in the
    // test environment, so only assert when they are absent.
    if std::env::var("LLU_EMAIL").is_err() {
        let err = client.fetch_latest_reading().await.unwrap_err();
        assert!(matches!(err, TelemetryError::Configuration { .. }));
    }
}
