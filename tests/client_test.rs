//! Integration tests for UpstreamClient using wiremock

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowhome_bridge::client::{ClientConfig, UpstreamApi, UpstreamClient, UpstreamError};
use flowhome_bridge::endpoint::resolve;
use flowhome_bridge::error::UnavailableCause;

fn client_for(server: &MockServer, api_key: Option<&str>) -> UpstreamClient {
    let endpoint = resolve(&server.uri(), None, None).unwrap();
    let mut config = ClientConfig::new(endpoint).with_timeout(Duration::from_millis(500));
    if let Some(key) = api_key {
        config = config.with_api_key(key);
    }
    UpstreamClient::new(config).unwrap()
}

#[tokio::test]
async fn test_bearer_header_sent_when_key_configured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1.0"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, Some("s3cret"));
    let info = client.get_info().await.unwrap();
    assert_eq!(info["version"], "1.0");
}

#[tokio::test]
async fn test_no_auth_header_without_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/chores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    for key in [None, Some("")] {
        let client = client_for(&mock_server, key);
        assert!(!client.has_api_key());
        client.get_chores().await.unwrap();
    }

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| !r.headers.contains_key("authorization")));
}

#[tokio::test]
async fn test_auth_rejection_maps_to_authentication_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, Some("wrong"));

    assert_eq!(
        client.get_users().await.unwrap_err(),
        UpstreamError::AuthenticationRejected { status: 401 }
    );
    assert_eq!(
        client.validate().await.unwrap_err(),
        UpstreamError::AuthenticationRejected { status: 403 }
    );
}

#[tokio::test]
async fn test_server_error_maps_to_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/chores"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, None).get_chores().await.unwrap_err();
    assert_eq!(
        err,
        UpstreamError::Unavailable {
            cause: UnavailableCause::Status {
                status: 503,
                body: "maintenance".to_string(),
            },
        }
    );
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_timeout_maps_to_unavailable_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, None).get_info().await.unwrap_err();
    assert_eq!(err, UpstreamError::timeout());
}

#[tokio::test]
async fn test_invalid_body_maps_to_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, None).get_users().await.unwrap_err();
    assert!(matches!(
        err,
        UpstreamError::Unavailable {
            cause: UnavailableCause::InvalidBody(_)
        }
    ));
}

#[tokio::test]
async fn test_transport_failure_maps_to_unavailable() {
    let endpoint = resolve("127.0.0.1", Some(9), None).unwrap();
    let client =
        UpstreamClient::new(ClientConfig::new(endpoint).with_timeout(Duration::from_secs(2)))
            .unwrap();

    let err = client.get_info().await.unwrap_err();
    assert!(err.is_unavailable(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_missing_leaderboard_is_absent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/leaderboard"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, None);
    assert_eq!(client.get_leaderboard().await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_leaderboard_is_absent() {
    for body in [json!({}), json!([]), json!(null)] {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/leaderboard"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, None);
        assert_eq!(client.get_leaderboard().await.unwrap(), None, "{body}");
    }
}

#[tokio::test]
async fn test_leaderboard_present() {
    let mock_server = MockServer::start().await;
    let board = json!({"users": {"u1": {"points": 10}}});

    Mock::given(method("GET"))
        .and(path("/api/leaderboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(board.clone()))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, None);
    assert_eq!(client.get_leaderboard().await.unwrap(), Some(board));
}

#[tokio::test]
async fn test_complete_and_skip_post_expected_bodies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chores/c1/complete"))
        .and(body_json(json!({"user_id": "u1"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chores/c1/skip"))
        .and(body_json(json!({"user_id": "u1", "reason": "away"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, None);
    client.complete_chore("c1", "u1").await.unwrap();
    client.skip_chore("c1", "u1", "away").await.unwrap();
}

#[tokio::test]
async fn test_mutation_failure_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chores/c9/complete"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such chore"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, None)
        .complete_chore("c9", "u1")
        .await
        .unwrap_err();
    assert_eq!(err, UpstreamError::status(404, "no such chore"));
}

#[tokio::test]
async fn test_validate_uses_household_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"household_name": "Casa Verde", "version": 3})),
        )
        .mount(&mock_server)
        .await;

    let info = client_for(&mock_server, None).validate().await.unwrap();
    assert_eq!(info.title, "Casa Verde");
    assert_eq!(info.version.as_deref(), Some("3"));
}
