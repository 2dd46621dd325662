//! HTTP-level tests for the reqwest transport against a wiremock admin API.

use http::{Method, StatusCode};
use konfig_client::{Auth, ClientConfig, HttpTransport, Transport};
use konfig_core::RequestBody;
use konfig_errors::TransportError;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer, auth: Auth) -> HttpTransport {
    HttpTransport::new(&ClientConfig::new(server.uri()).with_auth(auth)).unwrap()
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn sends_basic_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consumers/c1"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1"})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Auth::Basic {
        username: "admin".into(),
        password: "secret".into(),
    };
    let response = transport(&server, auth)
        .request(Method::GET, "consumers/c1", RequestBody::Empty)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/plugins/p1"))
        .and(header("authorization", "Bearer eyJhbGciOi"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(&server, Auth::Bearer("eyJhbGciOi".into()))
        .request(Method::DELETE, "plugins/p1", RequestBody::Empty)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_empty());
}

// =============================================================================
// Bodies
// =============================================================================

#[tokio::test]
async fn sends_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "billing", "url": "http://billing:8080"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "s1"})))
        .expect(1)
        .mount(&server)
        .await;

    let body = RequestBody::Json(json!({"name": "billing", "url": "http://billing:8080"}));
    let response = transport(&server, Auth::None)
        .request(Method::POST, "services", body)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.reason(), Some("Created"));
}

#[tokio::test]
async fn sends_form_bodies_with_dotted_keys() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apis/legacy/plugins"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("name=key-auth&config.key_names%5B1%5D=apikey"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p1"})))
        .expect(1)
        .mount(&server)
        .await;

    let body = RequestBody::Form(vec![
        ("name".into(), "key-auth".into()),
        ("config.key_names[1]".into(), "apikey".into()),
    ]);
    let response = transport(&server, Auth::None)
        .request(Method::POST, "apis/legacy/plugins", body)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::CREATED);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn error_statuses_are_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/routes/r1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not found"})))
        .mount(&server)
        .await;

    let response = transport(&server, Auth::None)
        .request(Method::GET, "routes/r1", RequestBody::Empty)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(&response.body[..], br#"{"message":"Not found"}"#);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = ClientConfig::new(server.uri()).with_timeout(Duration::from_millis(100));
    let err = HttpTransport::new(&config)
        .unwrap()
        .request(Method::GET, "services", RequestBody::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
    let config = ClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_secs(2));
    let err = HttpTransport::new(&config)
        .unwrap()
        .request(Method::GET, "services", RequestBody::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Request { .. } | TransportError::Timeout { .. }), "{err:?}");
}
