use std::sync::Arc;

use pvk::courses::{Selection, Signup, SignupStatus};
use pvk::{ApiRequest, ClientConfig, HttpTransport, ResourceStore, Session, Transport, User};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session() -> Arc<Session> {
    Arc::new(Session::new(
        User {
            identifier: "jdoe".to_string(),
            name: None,
        },
        "secret",
    ))
}

fn transport(server: &MockServer, session: Arc<Session>) -> Arc<HttpTransport> {
    let config = ClientConfig {
        api_url: format!("{}/api", server.uri()),
        ..ClientConfig::default()
    };
    Arc::new(HttpTransport::new(&config, session).unwrap())
}

fn eve_page(items: serde_json::Value, total: u64, max_results: u64, page: u64) -> serde_json::Value {
    json!({
        "_items": items,
        "_meta": { "total": total, "max_results": max_results, "page": page },
    })
}

#[tokio::test]
async fn test_sends_token_and_json_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/selections"))
        .and(header("Authorization", "Token secret"))
        .and(query_param("where", r#"{"nethz":"jdoe"}"#))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(eve_page(json!([]), 0, 25, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server, session());
    let value = transport
        .request(
            ApiRequest::get("selections")
                .with_param("where", json!({ "nethz": "jdoe" }))
                .with_param("page", json!(1)),
        )
        .await
        .unwrap();

    assert_eq!(value["_meta"]["total"], 0);
}

#[tokio::test]
async fn test_anonymous_requests_carry_no_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/lectures"))
        .respond_with(ResponseTemplate::new(200).set_body_json(eve_page(json!([]), 0, 25, 1)))
        .mount(&server)
        .await;

    let transport = transport(&server, Arc::new(Session::anonymous()));
    transport.request(ApiRequest::get("lectures")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_unauthorized_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/signups"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "_status": "ERR",
            "_error": { "code": 401, "message": "Please provide proper credentials" }
        })))
        .mount(&server)
        .await;

    let session = session();
    let transport = transport(&server, session.clone());

    let err = transport.request(ApiRequest::get("signups")).await.unwrap_err();
    assert!(err.needs_reauth());
    assert!(!session.is_active());
    assert!(err.to_string().contains("Please provide proper credentials"));

    // the next request goes out without the dropped token
    let _ = transport.request(ApiRequest::get("signups")).await;
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_some());
    assert!(requests[1].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_server_error_uses_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let transport = transport(&server, session());
    let err = transport
        .request(ApiRequest::post("payments").with_data(json!({ "signups": [] })))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(502));
    assert!(err.is_retryable());
    assert!(err.to_string().ends_with("Bad Gateway"));
}

#[tokio::test]
async fn test_store_pages_over_http() {
    let server = MockServer::start().await;
    for page in 1..=3u64 {
        let items: Vec<_> = (0..2)
            .map(|i| (page - 1) * 2 + i)
            .filter(|n| *n < 5)
            .map(|n| json!({ "_id": format!("sel-{n}"), "_etag": "e", "nethz": "jdoe", "course": format!("c{n}") }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/selections"))
            .and(query_param("page", page.to_string()))
            .and(query_param("max_results", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(eve_page(json!(items), 5, 2, page)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let store: ResourceStore<Selection> =
        ResourceStore::new("selections", transport(&server, session())).with_page_size(2);
    let page = store.fetch_all().await.unwrap();

    assert_eq!(page.items.len(), 5);
    let courses: Vec<String> = store.list().into_iter().map(|s| s.course).collect();
    assert_eq!(courses, vec!["c0", "c1", "c2", "c3", "c4"]);
}

#[tokio::test]
async fn test_precondition_failure_resynchronizes_store() {
    let server = MockServer::start().await;
    let stale = json!({ "_id": "s1", "_etag": "v1", "nethz": "jdoe", "course": "c1", "status": "reserved" });
    let fresh = json!({ "_id": "s1", "_etag": "v2", "nethz": "jdoe", "course": "c1", "status": "accepted" });

    Mock::given(method("GET"))
        .and(path("/api/signups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(eve_page(json!([stale]), 1, 25, 1)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/signups/s1"))
        .and(header("If-Match", "v1"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({
            "_status": "ERR",
            "_error": { "code": 412, "message": "Client and server etags don't match" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/signups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(eve_page(json!([fresh]), 1, 25, 1)))
        .mount(&server)
        .await;

    let store: ResourceStore<Signup> = ResourceStore::new("signups", transport(&server, session()));
    store.fetch_all().await.unwrap();

    let err = store.delete("s1").await.unwrap_err();
    assert!(err.is_precondition_failed());

    let signup = store.get("s1").unwrap();
    assert_eq!(signup.etag.as_deref(), Some("v2"));
    assert_eq!(signup.status, SignupStatus::Accepted);
    assert!(!store.is_busy());
}

#[tokio::test]
async fn test_update_and_empty_delete_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/selections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(eve_page(
            json!([{ "_id": "s1", "_etag": "v1", "nethz": "jdoe", "course": "c1" }]),
            1,
            25,
            1,
        )))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/selections/s1"))
        .and(header("If-Match", "v1"))
        .and(body_json(json!({ "course": "c2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "s1", "_etag": "v2", "nethz": "jdoe", "course": "c2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/selections/s1"))
        .and(header("If-Match", "v2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store: ResourceStore<Selection> =
        ResourceStore::new("selections", transport(&server, session()));
    store.fetch_all().await.unwrap();

    let updated = store.update("s1", json!({ "course": "c2" })).await.unwrap();
    assert_eq!(updated.course, "c2");
    assert_eq!(updated.etag.as_deref(), Some("v2"));

    store.delete("s1").await.unwrap();
    assert!(store.list().is_empty());
}
