//! HTTP client retry matrix against a mock server.

use serde_json::json;
use sluice_core::client::{HttpClient, HttpClientConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_with_attempts(max_attempts: u32) -> HttpClient {
    HttpClient::new(HttpClientConfig {
        max_attempts,
        ..HttpClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn transient_500s_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_attempts(5);
    let body = client
        .get(&format!("{}/flaky", server.uri()), 0.0, None, &[])
        .await
        .unwrap();
    assert_eq!(body["ok"], json!(true));
}

#[tokio::test]
async fn retry_after_header_is_honored_for_429() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_attempts(3);
    let body = client
        .get(&format!("{}/limited", server.uri()), 0.0, None, &[])
        .await
        .unwrap();
    assert_eq!(body["ok"], json!(1));
}

#[tokio::test]
async fn non_retriable_4xx_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_attempts(5);
    let error = client
        .get(&format!("{}/missing", server.uri()), 0.0, None, &[])
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(404));
}

#[tokio::test]
async fn bad_request_fails_fast_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_attempts(5);
    let error = client
        .get(&format!("{}/bad", server.uri()), 0.0, None, &[])
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(400));
    assert_eq!(error.error_code(), "http_status");
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_with_attempts(2);
    let error = client
        .get(&format!("{}/down", server.uri()), 0.0, None, &[])
        .await
        .unwrap_err();
    assert_eq!(error.error_code(), "http_retries_exhausted");
    assert!(error.to_string().contains("503"), "{error}");
}

#[tokio::test]
async fn post_sends_json_body_and_decodes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(wiremock::matchers::body_partial_json(json!({"query": "{ items { id } }"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"items": [{"id": 1}]}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_attempts(3);
    let body = client
        .post(
            &format!("{}/graphql", server.uri()),
            0.0,
            None,
            &[],
            Some(&json!({"query": "{ items { id } }", "variables": {}})),
        )
        .await
        .unwrap();
    assert_eq!(body["data"]["items"][0]["id"], json!(1));
}
