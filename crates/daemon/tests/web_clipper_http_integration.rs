use std::time::Duration;

use notetally_daemon::engine::{CycleOutcome, EngineConfig, TodoEngine};
use notetally_daemon::provider::{NoteProvider, ProviderError, WebClipperClient, WebClipperProvider};
use serde_json::json;
use tokio::sync::watch;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "secret";

fn provider(server: &MockServer) -> WebClipperProvider {
    let client = WebClipperClient::new(&server.uri(), TOKEN, Duration::from_secs(5))
        .expect("mock server uri should be a valid base url");
    WebClipperProvider::new(client)
}

async fn mount_page(server: &MockServer, page: &str, ids: &[&str], has_more: bool) {
    let items: Vec<_> = ids.iter().map(|id| json!({ "id": id, "parent_id": "inbox" })).collect();
    Mock::given(method("GET"))
        .and(path("/notes"))
        .and(query_param("token", TOKEN))
        .and(query_param("page", page))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "items": items, "has_more": has_more })),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_note(server: &MockServer, id: &str, title: &str, body: &str, parent_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/notes/{id}")))
        .and(query_param("token", TOKEN))
        .and(query_param("fields", "id,parent_id,body,title"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "parent_id": parent_id,
            "title": title,
            "body": body,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn listing_follows_pages_until_has_more_is_false() {
    let server = MockServer::start().await;
    mount_page(&server, "1", &["a", "b"], true).await;
    mount_page(&server, "2", &["c"], false).await;

    let names = provider(&server).list_names().await.expect("listing should succeed");
    assert_eq!(names, vec!["a.md", "b.md", "c.md"]);
}

#[tokio::test]
async fn get_maps_fields_onto_a_note() {
    let server = MockServer::start().await;
    mount_note(&server, "abc", "Shopping", "- [ ] !milk", "inbox").await;

    let note = provider(&server).get("abc.md").await.expect("get should succeed");
    assert_eq!(note.name, "abc.md");
    assert_eq!(note.header, "Shopping");
    assert_eq!(note.body, "- [ ] !milk");
    assert_eq!(note.note_id(), "abc");
    assert!(note.is_child_of("inbox"));
}

#[tokio::test]
async fn missing_note_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Not Found" })))
        .mount(&server)
        .await;

    let err = provider(&server).get("gone.md").await.expect_err("get should fail");
    assert!(matches!(err, ProviderError::NotFound { ref name } if name == "gone.md"));
}

#[tokio::test]
async fn server_errors_surface_as_transport_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = provider(&server).list_names().await.expect_err("listing should fail");
    match err {
        ProviderError::Transport { operation, message } => {
            assert_eq!(operation, "list");
            assert!(message.contains("503"), "unexpected message: {message}");
        }
        other => panic!("expected a transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_request_carries_the_service_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes/abc"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "error": "Invalid token" })))
        .mount(&server)
        .await;

    let err = provider(&server).get("abc.md").await.expect_err("get should fail");
    assert!(err.to_string().contains("Invalid token"), "unexpected error: {err}");
}

#[tokio::test]
async fn put_sends_body_as_json() {
    let server = MockServer::start().await;
    mount_note(&server, "abc", "Todo", "old", "inbox").await;
    Mock::given(method("PUT"))
        .and(path("/notes/abc"))
        .and(query_param("token", TOKEN))
        .and(body_json(json!({ "body": "new body" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "abc" })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let mut note = provider.get("abc.md").await.expect("get should succeed");
    note.set_body("new body").expect("web clipper notes carry no timestamps");
    provider.put(&note).await.expect("put should succeed");
}

#[tokio::test]
async fn failed_put_is_a_write_error() {
    let server = MockServer::start().await;
    mount_note(&server, "abc", "Todo", "old", "inbox").await;
    Mock::given(method("PUT"))
        .and(path("/notes/abc"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let note = provider.get("abc.md").await.expect("get should succeed");
    let err = provider.put(&note).await.expect_err("put should fail");
    assert!(matches!(err, ProviderError::Write { ref name, .. } if name == "abc.md"));
}

#[tokio::test]
async fn full_cycle_against_the_web_clipper() {
    let server = MockServer::start().await;
    mount_page(&server, "1", &["target", "a", "b"], false).await;
    mount_note(&server, "target", "Todo", "stale", "inbox").await;
    mount_note(&server, "a", "Alpha", "- [ ] !low\n- [x] !!!done", "inbox").await;
    mount_note(&server, "b", "Beta", "- [ ] !!!!elsewhere", "archive").await;
    Mock::given(method("PUT"))
        .and(path("/notes/target"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "target" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = EngineConfig {
        holder: "node-a".into(),
        note_id: "target".into(),
        parent_id: "inbox".into(),
        release_wait: Duration::from_secs(1),
        lock_timeout: Duration::from_secs(1),
        call_timeout: Duration::from_secs(5),
        cycle_timeout: Duration::from_secs(30),
        release_timeout: Duration::from_secs(1),
    };
    let mut engine = TodoEngine::new(provider(&server), config);
    let (_tx, rx) = watch::channel(false);
    let outcome = engine.run_cycle(&rx).await.expect("cycle should succeed");
    assert!(matches!(outcome, CycleOutcome::Written { entries: 2, .. }));

    let requests = server.received_requests().await.expect("request recording should be enabled");
    let put = requests
        .iter()
        .find(|request| request.method.as_str() == "PUT")
        .expect("target should have been written");
    let sent: serde_json::Value = serde_json::from_slice(&put.body).expect("PUT body should be JSON");
    let body = sent["body"].as_str().expect("PUT body should carry a string body");
    assert!(
        body.starts_with("- [x] **done** (Alpha)\n- [ ] **low** (Alpha)\n\n\nDO NOT EDIT\ngenerated at "),
        "unexpected body: {body:?}"
    );
}
