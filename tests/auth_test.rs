// SPDX-License-Identifier: MIT OR Apache-2.0

use http::Method;
use odahu_api_rs::config::DEFAULT_SECTION;
use odahu_api_rs::testkit::{MockResponse, MockServer};
use odahu_api_rs::{ApiClient, ConfigStore, OdahuError};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

const CONNECTION: &str = "/api/v1/connection/c1";

fn store_for(server: &MockServer, dir: &tempfile::TempDir) -> ConfigStore {
    let store = ConfigStore::new(dir.path().join("config"));
    store
        .update(
            DEFAULT_SECTION,
            [
                ("API_URL", Some(server.url())),
                ("API_TOKEN", Some("expired".to_string())),
                ("API_REFRESH_TOKEN", Some("r0".to_string())),
                ("API_ISSUING_URL", Some(format!("{}/token", server.url()))),
                ("ODAHUFLOWCTL_NONINTERACTIVE", Some("true".to_string())),
                ("BACKOFF_FACTOR", Some("0".to_string())),
            ],
        )
        .unwrap();
    store
}

#[tokio::test]
async fn test_refreshed_credentials_are_persisted() {
    let server = MockServer::start();
    server
        .on("GET", CONNECTION, MockResponse::json(401, json!({})))
        .on("GET", CONNECTION, MockResponse::json(200, json!({"id": "c1"})));
    server.on(
        "POST",
        "/token",
        MockResponse::json(
            200,
            json!({"id_token": "fresh", "access_token": "acc", "refresh_token": "r1"}),
        ),
    );

    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&server, &dir);

    let mut api = ApiClient::from_store(store.clone()).unwrap();
    let body = assert_ok!(
        api.query("/api/{version}/connection/c1", None, Method::GET)
            .await
    );
    assert_eq!(body["id"], "c1");

    let section = store.section(DEFAULT_SECTION).unwrap();
    assert_eq!(section["API_TOKEN"], "fresh");
    assert_eq!(section["API_REFRESH_TOKEN"], "r1");
    assert_eq!(section["API_ACCESS_TOKEN"], "acc");
    assert_eq!(section["API_URL"], server.url());
    // Untouched keys survive the rewrite.
    assert_eq!(section["ODAHUFLOWCTL_NONINTERACTIVE"], "true");

    // A client built later starts from the renewed token.
    let next = ApiClient::from_store(store).unwrap();
    assert_eq!(next.token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_second_rejection_is_reported() {
    let server = MockServer::start();
    server.on("GET", CONNECTION, MockResponse::json(401, json!({})));
    server.on(
        "POST",
        "/token",
        MockResponse::json(200, json!({"access_token": "still-bad"})),
    );

    let dir = tempfile::tempdir().unwrap();
    let mut api = ApiClient::from_store(store_for(&server, &dir)).unwrap();

    let err = assert_err!(
        api.query("/api/{version}/connection/c1", None, Method::GET)
            .await
    );
    assert!(matches!(err, OdahuError::IncorrectAuthorizationToken(_)));
    assert_eq!(
        err.to_string(),
        "Credentials are not correct even after refreshing. Please try to log in again"
    );
    assert_eq!(server.hits("GET", CONNECTION), 2);
    assert_eq!(server.hits("POST", "/token"), 1);
}

#[tokio::test]
async fn test_rejected_refresh_token() {
    let server = MockServer::start();
    server.on("GET", CONNECTION, MockResponse::json(401, json!({})));
    server.on(
        "POST",
        "/token",
        MockResponse::json(400, json!({"error": "invalid_grant"})),
    );

    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&server, &dir);
    let mut api = ApiClient::from_store(store.clone()).unwrap();

    let err = assert_err!(
        api.query("/api/{version}/connection/c1", None, Method::GET)
            .await
    );
    assert_eq!(
        err.to_string(),
        "Refresh token is not correct. Please login again"
    );
    assert_eq!(server.hits("GET", CONNECTION), 1);
    assert_eq!(store.section(DEFAULT_SECTION).unwrap()["API_TOKEN"], "expired");
}
