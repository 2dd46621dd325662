//! End-to-end reconciliation against a wiremock admin API through the real
//! reqwest transport.

use konfig_client::{Auth, ClientConfig};
use konfig_core::{parse, DeclaredResource, EntityKind, EntityState, FieldValue, Snapshot};
use konfig_errors::{ReconcileError, ValidationError};
use konfig_reconcile::{CreateOutcome, DeleteOutcome, Provider, ReadOutcome, UpdateOutcome};
use serde_json::json;
use wiremock::matchers::{any, body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROUTE_ID: &str = "5f2d8d1c-3a4e-4b7f-9c61-0d2e8a7b6c55";
const SERVICE_ID: &str = "0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";
const PLUGIN_ID: &str = "d9a4b7c2-1e3f-4a5b-8c6d-7e8f9a0b1c2d";

fn provider(server: &MockServer) -> Provider {
    Provider::new(&ClientConfig::new(server.uri())).unwrap()
}

fn key_auth_on_route() -> DeclaredResource {
    DeclaredResource::new(EntityKind::Plugin)
        .with("name", "key-auth")
        .with("route", ROUTE_ID)
        .with("config", FieldValue::from_json(json!({"key_names": ["apikey"]})).unwrap())
}

// =============================================================================
// Scenario A / B: create, then create again
// =============================================================================

#[tokio::test]
async fn create_scoped_plugin_then_conflict_needs_import() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/plugins"))
        .and(body_json(json!({
            "name": "key-auth",
            "route": {"id": ROUTE_ID},
            "config": {"key_names": ["apikey"]}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": PLUGIN_ID,
            "name": "key-auth",
            "enabled": true,
            "route": {"id": ROUTE_ID},
            "service": null,
            "consumer": null,
            "config": {"key_names": ["apikey"], "anonymous": null},
            "created_at": 1700000000
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/plugins"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": 5,
            "name": "unique constraint violation",
            "message": "UNIQUE violation detected on '{consumer=null,name=\"key-auth\",route={id=\"5f2d8d1c\"}}'"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let plugins = provider(&server).reconciler(EntityKind::Plugin);
    let declared = key_auth_on_route();

    let mut state = EntityState::Absent;
    let outcome = plugins.create(&declared, &mut state).await.unwrap();
    let CreateOutcome::Created { snapshot } = outcome else {
        panic!("expected creation, got {outcome:?}");
    };
    assert_eq!(snapshot.id, PLUGIN_ID);
    assert_eq!(snapshot.fields["config"], declared.fields["config"]);
    assert_eq!(snapshot.get_str("route"), Some(ROUTE_ID));
    assert_eq!(state.id(), Some(PLUGIN_ID));
    assert!(plugins.drift(&declared, &snapshot).is_empty());

    let mut again = EntityState::Absent;
    match plugins.create(&declared, &mut again).await.unwrap() {
        CreateOutcome::NeedsImport { status_line, body } => {
            assert_eq!(status_line, "409 Conflict");
            assert!(body.contains("unique constraint violation"));
        }
        other => panic!("expected needs-import, got {other:?}"),
    }
    assert_eq!(again, EntityState::Absent);
}

// =============================================================================
// Scenario C: out-of-band deletion
// =============================================================================

#[tokio::test]
async fn read_of_deleted_entity_clears_tracked_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/plugins/{PLUGIN_ID}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut state = EntityState::Present(Snapshot::new(PLUGIN_ID));
    let outcome = provider(&server)
        .reconciler(EntityKind::Plugin)
        .read(&key_auth_on_route(), &mut state)
        .await
        .unwrap();
    assert_eq!(outcome, ReadOutcome::Gone);
    assert_eq!(state, EntityState::Absent);
}

// =============================================================================
// Scenario D: composite import
// =============================================================================

#[tokio::test]
async fn composite_import_hydrates_acl_group() {
    let key = parse("consumer-123/acl-group-1").unwrap();
    assert_eq!(key.parent, "consumer-123");
    assert_eq!(key.child, "acl-group-1");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consumers/consumer-123/acls/acl-group-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "acl-group-1",
            "group": "admins",
            "consumer": {"id": "consumer-123"},
            "tags": ["team-a"],
            "created_at": 1700000000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let imported = provider(&server)
        .reconciler(EntityKind::AclGroup)
        .import("consumer-123/acl-group-1")
        .await
        .unwrap();

    let snapshot = imported.state.snapshot().unwrap();
    assert_eq!(snapshot.id, "acl-group-1");
    assert_eq!(snapshot.get_str("group"), Some("admins"));
    assert_eq!(snapshot.get_str("consumer"), Some("consumer-123"));
    assert_eq!(snapshot.fields["tags"], FieldValue::strings(["team-a"]));
    assert!(matches!(imported.outcome, ReadOutcome::Present { .. }));
}

#[tokio::test]
async fn route_import_by_id_adopts_service_linkage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/routes/{ROUTE_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": ROUTE_ID,
            "paths": ["/billing"],
            "service": {"id": SERVICE_ID}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = provider(&server).reconciler(EntityKind::Route);
    let mut imported = reconciler.import(ROUTE_ID).await.unwrap();

    assert!(imported.declared.fields.is_empty());
    let snapshot = imported.state.snapshot().unwrap();
    assert_eq!(snapshot.id, ROUTE_ID);
    assert_eq!(snapshot.get_str("service"), Some(SERVICE_ID));
    assert_eq!(snapshot.fields["paths"], FieldValue::strings(["/billing"]));

    // The adopted route can be dropped before its declaration names a service.
    Mock::given(method("DELETE"))
        .and(path(format!("/routes/{ROUTE_ID}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let outcome = reconciler.delete(&imported.declared, &mut imported.state).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(!imported.state.is_present());
}

#[tokio::test]
async fn plugin_import_by_id_adopts_service_scope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/plugins/{PLUGIN_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": PLUGIN_ID,
            "name": "rate-limiting",
            "service": {"id": SERVICE_ID},
            "route": null,
            "consumer": null,
            "config": {"minute": 20}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let imported = provider(&server).reconciler(EntityKind::Plugin).import(PLUGIN_ID).await.unwrap();

    let snapshot = imported.state.snapshot().unwrap();
    assert_eq!(snapshot.id, PLUGIN_ID);
    assert_eq!(snapshot.get_str("name"), Some("rate-limiting"));
    assert_eq!(snapshot.get_str("service"), Some(SERVICE_ID));
    assert_eq!(snapshot.get("route"), None);
    assert_eq!(snapshot.get("consumer"), None);
}

// =============================================================================
// Scenario E: ambiguous scope
// =============================================================================

#[tokio::test]
async fn two_scopes_fail_locally_without_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let declared = DeclaredResource::new(EntityKind::Plugin)
        .with("name", "key-auth")
        .with("service", SERVICE_ID)
        .with("route", ROUTE_ID);
    let mut state = EntityState::Absent;
    let err = provider(&server)
        .reconciler(EntityKind::Plugin)
        .create(&declared, &mut state)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Validation(ValidationError::AmbiguousScope { .. })
    ));
    assert_eq!(state, EntityState::Absent);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Other paths
// =============================================================================

#[tokio::test]
async fn legacy_api_plugin_is_form_encoded_under_parent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apis/legacy-api/plugins"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("config.key_names%5B1%5D=apikey"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": PLUGIN_ID,
            "name": "key-auth",
            "api_id": "legacy-api",
            "config": {"key_names": ["apikey"]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let declared = DeclaredResource::new(EntityKind::Plugin)
        .with("name", "key-auth")
        .with("api", "legacy-api")
        .with("config", FieldValue::from_json(json!({"key_names": ["apikey"]})).unwrap());
    let mut state = EntityState::Absent;
    provider(&server)
        .reconciler(EntityKind::Plugin)
        .create(&declared, &mut state)
        .await
        .unwrap();
    assert_eq!(state.snapshot().unwrap().get_str("api"), Some("legacy-api"));
}

#[tokio::test]
async fn service_shorthand_url_does_not_drift_after_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services"))
        .and(body_json(json!({"name": "billing", "url": "https://billing.internal:8443/v1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": SERVICE_ID,
            "name": "billing",
            "protocol": "https",
            "host": "billing.internal",
            "port": 8443,
            "path": "/v1",
            "retries": 5,
            "connect_timeout": 60000,
            "write_timeout": 60000,
            "read_timeout": 60000
        })))
        .mount(&server)
        .await;

    let declared = DeclaredResource::new(EntityKind::Service)
        .with("name", "billing")
        .with("url", "https://billing.internal:8443/v1");
    let services = provider(&server).reconciler(EntityKind::Service);
    let mut state = EntityState::Absent;
    services.create(&declared, &mut state).await.unwrap();

    let snapshot = state.snapshot().unwrap();
    assert!(snapshot.get("url").is_none());
    assert!(services.drift(&declared, snapshot).is_empty());

    let moved = declared.clone().with("url", "https://billing.internal:8443/v2");
    assert_eq!(services.drift(&moved, snapshot), vec!["url"]);
}

#[tokio::test]
async fn update_failure_reports_remote_body_and_keeps_snapshot() {
    let server = MockServer::start().await;
    let error = json!({
        "code": 2,
        "name": "schema violation",
        "message": "schema violation (paths: should start with: /)",
        "fields": {"paths": ["should start with: /"]}
    });
    Mock::given(method("PATCH"))
        .and(path("/routes/r1"))
        .and(header("authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::new(server.uri()).with_auth(Auth::Bearer("admin-token".into()));
    let routes = Provider::new(&config).unwrap().reconciler(EntityKind::Route);
    let declared = DeclaredResource::new(EntityKind::Route)
        .with("service", SERVICE_ID)
        .with("paths", FieldValue::strings(["billing"]));
    let before = EntityState::Present(Snapshot::new("r1"));
    let mut state = before.clone();

    let err = routes.update(&declared, &mut state).await.unwrap_err();
    match &err {
        ReconcileError::Remote { status, status_line, body, payload } => {
            assert_eq!(*status, 400);
            assert_eq!(status_line, "400 Bad Request");
            assert_eq!(body, &error.to_string());
            assert_eq!(payload.as_ref(), Some(&error));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(state, before);
}

#[tokio::test]
async fn update_then_delete_route() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/routes/r1"))
        .and(body_json(json!({
            "paths": ["/billing"],
            "service": {"id": SERVICE_ID}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "r1",
            "paths": ["/billing"],
            "protocols": ["http", "https"],
            "strip_path": true,
            "service": {"id": SERVICE_ID}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/routes/r1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let routes = provider(&server).reconciler(EntityKind::Route);
    let declared = DeclaredResource::new(EntityKind::Route)
        .with("service", SERVICE_ID)
        .with("paths", FieldValue::strings(["/billing"]));
    let mut state = EntityState::Present(Snapshot::new("r1"));

    let UpdateOutcome::Updated { snapshot } = routes.update(&declared, &mut state).await.unwrap() else {
        panic!("route update is supported");
    };
    assert!(routes.drift(&declared, &snapshot).is_empty());

    assert_eq!(routes.delete(&declared, &mut state).await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(state, EntityState::Absent);
}
