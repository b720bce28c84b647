// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider gateway: quota accounting, auth headers and error mapping.

mod common;

use activity_sync::config::Config;
use activity_sync::error::SyncError;
use activity_sync::services::gateway::http_client;
use activity_sync::services::{
    EndpointClass, KmsService, ProviderGateway, ProviderRequest, QuotaWindow, RateLimitGovernor,
    TokenVault, UsageStore,
};
use common::USER;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(config: &Config) -> (ProviderGateway, RateLimitGovernor) {
    let http = http_client().unwrap();
    let vault = TokenVault::new(http.clone(), config, Arc::new(KmsService::new_mock()));
    let governor = RateLimitGovernor::new(
        config.rate_limit_windows.clone(),
        Arc::new(UsageStore::new(config.usage_store_capacity)),
    );
    let gateway = ProviderGateway::new(
        http,
        config.provider_api_base.clone(),
        vault,
        governor.clone(),
    );
    (gateway, governor)
}

#[tokio::test]
async fn test_success_sends_bearer_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(header("authorization", "Bearer valid-access"))
        .and(query_param("page", "2"))
        .and(query_param("per_page", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, governor) = gateway(&common::test_config(&server));
    let request = ProviderRequest::get("/athlete/activities", EndpointClass::List)
        .query("page", 2)
        .query("per_page", 50);

    let reply = gateway
        .call::<Value>(USER, &common::fresh_bundle(), &request)
        .await;

    assert_eq!(reply.payload.unwrap(), json!([{"id": 1}]));
    assert!(reply.refreshed_credential.is_none());
    assert_eq!(governor.usage().recorded(USER), 1);
}

#[tokio::test]
async fn test_error_status_still_consumes_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/activities/42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Record Not Found"))
        .mount(&server)
        .await;

    let (gateway, governor) = gateway(&common::test_config(&server));
    let reply = gateway
        .call::<Value>(
            USER,
            &common::fresh_bundle(),
            &ProviderRequest::get("/activities/42", EndpointClass::Detail),
        )
        .await;

    match reply.payload {
        Err(SyncError::Provider { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Record Not Found");
        }
        other => panic!("expected provider error, got {:?}", other),
    }
    assert_eq!(governor.usage().recorded(USER), 1);
}

#[tokio::test]
async fn test_denied_preflight_sends_nothing() {
    let server = MockServer::start().await;
    let mut config = common::test_config(&server);
    config.rate_limit_windows = vec![QuotaWindow::new("daily", 0, 24 * 60 * 60 * 1000)];

    let (gateway, governor) = gateway(&config);
    let reply = gateway
        .call::<Value>(
            USER,
            &common::fresh_bundle(),
            &ProviderRequest::get("/athlete/activities", EndpointClass::List),
        )
        .await;

    match reply.payload {
        Err(SyncError::RateLimited { window, .. }) => assert_eq!(window, "daily"),
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(governor.usage().recorded(USER), 0);
}

#[tokio::test]
async fn test_transport_failure_is_network_error() {
    let mut config = Config::test_default();
    config.provider_api_base = "http://127.0.0.1:1/api/v3".to_string();

    let (gateway, governor) = gateway(&config);
    let reply = gateway
        .call::<Value>(
            USER,
            &common::fresh_bundle(),
            &ProviderRequest::get("/athlete/activities", EndpointClass::List),
        )
        .await;

    assert!(matches!(reply.payload, Err(SyncError::Network(_))));
    assert_eq!(governor.usage().recorded(USER), 0);
}

#[tokio::test]
async fn test_retry_after_header_sets_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
        .mount(&server)
        .await;

    let (gateway, _) = gateway(&common::test_config(&server));
    let before = chrono::Utc::now();
    let reply = gateway
        .call::<Value>(
            USER,
            &common::fresh_bundle(),
            &ProviderRequest::get("/athlete/activities", EndpointClass::List),
        )
        .await;

    match reply.payload {
        Err(SyncError::RateLimited { retry_after, .. }) => {
            let wait = retry_after - before;
            assert!(wait >= chrono::Duration::seconds(119));
            assert!(wait <= chrono::Duration::seconds(125));
        }
        other => panic!("expected rate limit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/activities/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let (gateway, _) = gateway(&common::test_config(&server));
    let reply = gateway
        .call::<Value>(
            USER,
            &common::fresh_bundle(),
            &ProviderRequest::get("/activities/7", EndpointClass::Detail),
        )
        .await;

    assert!(matches!(
        reply.payload,
        Err(SyncError::Provider { status: 200, .. })
    ));
}

#[tokio::test]
async fn test_unauthorized_retry_uses_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete"))
        .and(header("authorization", "Bearer valid-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9})))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    common::mount_token_grant(&server, common::VALID_TOKEN, 1).await;

    let (gateway, governor) = gateway(&common::test_config(&server));
    let reply = gateway
        .call::<Value>(
            USER,
            &common::bundle_with("stale-access"),
            &ProviderRequest::get("/athlete", EndpointClass::Detail),
        )
        .await;

    assert_eq!(reply.payload.unwrap()["id"], 9);
    assert_eq!(
        reply.refreshed_credential.map(|b| b.access_token),
        Some(common::VALID_TOKEN.to_string())
    );
    // Both attempts reached the provider; the token endpoint is not counted.
    assert_eq!(governor.usage().recorded(USER), 2);
}
