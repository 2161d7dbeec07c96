//! Catalog client behavior against a mock server

use catwatch_catalog::{ApiError, ClientConfig, Credentials, RateLimitedClient};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> RateLimitedClient {
    RateLimitedClient::new(ClientConfig {
        base_url: server.uri(),
        credentials: Credentials {
            token_url: format!("{}/oauth/token", server.uri()),
            client_id: "1234".to_string(),
            client_secret: "secret".to_string(),
            scope: "public".to_string(),
        },
        requests_per_window: 100,
        cooldown: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

async fn mount_token(server: &MockServer, expires_in: u64, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": expires_in,
            "access_token": "test-token-abcdef"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_item_with_bearer_token() {
    let server = MockServer::start().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/catalog/77"))
        .and(header("authorization", "Bearer test-token-abcdef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 77,
            "owner_id": 5,
            "creator": "mapper",
            "title": "Song",
            "artist": "Band",
            "files": [{ "id": 1001, "version": "Hard" }],
            "last_updated": "2024-03-01T12:00:00Z"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let item = client.item(77).await.unwrap();
    assert_eq!(item.owner_id, 5);
    assert_eq!(item.files[0].id, 1001);

    // Cached token is reused
    client.item(77).await.unwrap();
}

#[tokio::test]
async fn expired_token_is_refreshed() {
    let server = MockServer::start().await;
    mount_token(&server, 0, 2).await;

    Mock::given(method("GET"))
        .and(path("/accounts/someone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "username": "someone"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.account("someone").await.unwrap().id, 5);
    assert_eq!(client.account("someone").await.unwrap().username, "someone");
}

#[tokio::test]
async fn non_success_carries_body() {
    let server = MockServer::start().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/catalog/1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such item"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    match client.item(1).await {
        Err(ApiError::Status { status, body, route }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such item");
            assert_eq!(route, "/catalog/1");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn failed_token_exchange_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(matches!(client.item(1).await, Err(ApiError::Auth(_))));
}

#[tokio::test]
async fn activity_page_skips_malformed_records() {
    let server = MockServer::start().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/accounts/5/activity"))
        .and(query_param("limit", "50"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 12, "type": "contentUpload", "created_at": "2024-03-01T12:00:00Z" },
            { "id": "broken" },
            { "id": 11, "type": "achievement", "created_at": "2024-03-01T11:00:00Z" }
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let page = client.activity(5, 50, 0).await.unwrap();
    assert_eq!(page.fetched, 3);
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].id, 12);
    assert!(page.records[0].is_interesting());
}

#[tokio::test]
async fn pending_listing_decodes_items() {
    let server = MockServer::start().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/catalog/search"))
        .and(query_param("status", "pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": 1, "owner_id": 5, "last_updated": "2024-03-01T12:00:00Z" },
                { "id": 2 }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items = client.pending().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, 1);
}

#[tokio::test]
async fn download_streams_to_disk() {
    let server = MockServer::start().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/files/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"[HitObjects]\n1,1\n".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("1001.osu");
    let client = client_for(&server);

    let written = client.download_file(1001, &target).await.unwrap();
    assert_eq!(written, 17);
    assert_eq!(std::fs::read(&target).unwrap(), b"[HitObjects]\n1,1\n");
}

#[tokio::test]
async fn concurrent_callers_share_one_token_exchange() {
    let server = MockServer::start().await;
    // Slow exchange so every caller arrives while it is in flight
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "access_token": "test-token-abcdef"
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/catalog/77"))
        .and(header("authorization", "Bearer test-token-abcdef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 77,
            "owner_id": 5,
            "creator": "mapper",
            "title": "Song",
            "artist": "Band",
            "files": [],
            "last_updated": "2024-03-01T12:00:00Z"
        })))
        .expect(10)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let results = futures::future::join_all((0..10).map(|_| client.item(77))).await;
    for result in results {
        assert_eq!(result.unwrap().id, 77);
    }
}
