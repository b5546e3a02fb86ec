use std::sync::Arc;

use axum::http::StatusCode;
use axum_extra::extract::cookie::Cookie;
use axum_test::{TestResponse, TestServer};
use keyhub_server::{
    auth::{Bcrypt, CredentialGate, SESSION_COOKIE},
    build_app,
    manager::Manager,
    render::Templates,
    store::CredentialFile,
    upstream::{build_client, Endpoints, TransportOptions},
    AppState,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: TestServer,
    upstream: MockServer,
    _dir: TempDir,
}

fn key(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("user-{id}"),
        "password": "pw",
        "port": 61081,
        "method": "chacha20-ietf-poly1305",
        "accessUrl": format!("ss://k{id}@10.0.0.1:61081/?outline=1")
    })
}

async fn upstream() -> MockServer {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secret/server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "tokyo",
            "serverId": "abc",
            "metricsEnabled": true,
            "createdTimestampMs": 1700000000000u64,
            "portForNewAccessKeys": 61081
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/secret/access-keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessKeys": [key("10"), key("2"), key("1")]
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/secret/metrics/transfer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bytesTransferredByUserId": { "1": 1024, "2": 2048 }
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/go/manager"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": [
                { "id": "1", "ip": "", "enabled": true, "online": false, "days_left": 10, "limit": 5 }
            ]
        })))
        .mount(&mock)
        .await;
    mock
}

async fn harness() -> Harness {
    let upstream = upstream().await;
    let dir = tempfile::tempdir().unwrap();

    let gate = CredentialGate::from_config(
        Some("admin".into()),
        Some("s3cret".into()),
        CredentialFile::in_dir(dir.path()),
        Arc::new(Bcrypt::new(4)),
    )
    .await
    .unwrap();

    let client = build_client(&TransportOptions::default()).unwrap();
    let endpoints = Endpoints::from_parts(
        format!("{}/secret", upstream.uri()),
        format!("{}/status", upstream.uri()),
    );
    let manager = Manager::bootstrap_endpoints(vec![Ok(endpoints)], client, "hub")
        .await
        .unwrap();

    let state = AppState {
        gate: Arc::new(gate),
        manager: Arc::new(manager),
        templates: Arc::new(Templates::new().unwrap()),
    };

    Harness {
        server: TestServer::new(build_app(state)).unwrap(),
        upstream,
        _dir: dir,
    }
}

async fn login(h: &Harness, user: &str, pass: &str) -> TestResponse {
    h.server
        .post("/login")
        .add_query_param("user", user)
        .add_query_param("pass", pass)
        .await
}

#[tokio::test]
async fn login_page_is_public() {
    let h = harness().await;
    let resp = h.server.get("/login").await;
    resp.assert_status_ok();
    assert!(resp.text().contains("data-home="));
}

#[tokio::test]
async fn wrong_credentials_look_like_a_missing_page() {
    let h = harness().await;
    login(&h, "admin", "nope").await.assert_status(StatusCode::NOT_FOUND);
    login(&h, "root", "s3cret").await.assert_status(StatusCode::NOT_FOUND);
    h.server.post("/login").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn console_requires_a_session() {
    let h = harness().await;
    h.server
        .get("/outline/manager/1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .get("/outline/manager/1")
        .add_cookie(Cookie::new(SESSION_COOKIE, "forged"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dashboard_lists_accounts_in_id_order() {
    let h = harness().await;
    let session = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    let resp = h.server.get("/outline/manager/1").add_cookie(session).await;
    resp.assert_status_ok();

    let html = resp.text();
    let one = html.find(r#"data-id="1""#).unwrap();
    let two = html.find(r#"data-id="2""#).unwrap();
    let ten = html.find(r#"data-id="10""#).unwrap();
    assert!(one < two && two < ten);
    assert!(html.contains("#hub"));
    assert!(html.contains("3.00 KB"));
}

#[tokio::test]
async fn index_links_the_managed_server() {
    let h = harness().await;
    let session = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    let resp = h.server.get("/outline/manager").add_cookie(session).await;
    resp.assert_status_ok();
    assert!(resp.text().contains("tokyo"));
}

#[tokio::test]
async fn unknown_routes_wrong_methods_and_missing_params_are_404() {
    let h = harness().await;
    let session = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    h.server
        .get("/nowhere")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .get("/outline/manager/7")
        .add_cookie(session.clone())
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .get("/outline/manager/1/id")
        .add_cookie(session.clone())
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .delete("/outline/manager/1/id")
        .add_cookie(session.clone())
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .put("/outline/manager/1/data")
        .add_query_param("id", "1")
        .add_query_param("allowance", "lots")
        .add_cookie(session)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_the_account_from_the_primary() {
    let h = harness().await;
    Mock::given(method("DELETE"))
        .and(path("/secret/access-keys/2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.upstream)
        .await;
    let session = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    h.server
        .delete("/outline/manager/1/id")
        .add_query_param("id", "2")
        .add_cookie(session)
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn toggle_and_deadline_go_to_the_status_api() {
    let h = harness().await;
    Mock::given(method("PATCH"))
        .and(path("/status/go/manager"))
        .and(query_param("id", "1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.upstream)
        .await;
    Mock::given(method("PUT"))
        .and(path("/status/go/manager"))
        .and(query_param("id", "1"))
        .and(query_param("deadline", "45"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.upstream)
        .await;
    let session = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    h.server
        .patch("/outline/manager/1/status")
        .add_query_param("id", "1")
        .add_cookie(session.clone())
        .await
        .assert_status_ok();
    h.server
        .put("/outline/manager/1/deadline")
        .add_query_param("id", "1")
        .add_query_param("days", "45")
        .add_cookie(session)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn upstream_failure_surfaces_as_404() {
    let h = harness().await;
    Mock::given(method("PUT"))
        .and(path("/secret/access-keys/1/name"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.upstream)
        .await;
    let session = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    h.server
        .put("/outline/manager/1/name")
        .add_query_param("id", "1")
        .add_query_param("name", "alice")
        .add_cookie(session)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn changing_the_credential_invalidates_old_sessions() {
    let h = harness().await;
    let old = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    let resp = h
        .server
        .post("/outline/manager/set/admin")
        .add_query_param("user", "ops")
        .add_query_param("pass", "n3w")
        .add_cookie(old.clone())
        .await;
    resp.assert_status_ok();
    let fresh = resp.cookie(SESSION_COOKIE);

    h.server
        .get("/outline/manager")
        .add_cookie(old)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .get("/outline/manager")
        .add_cookie(fresh)
        .await
        .assert_status_ok();
    login(&h, "admin", "s3cret").await.assert_status(StatusCode::NOT_FOUND);
    login(&h, "ops", "n3w").await.assert_status_ok();
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let h = harness().await;
    let session = login(&h, "admin", "s3cret").await.cookie(SESSION_COOKIE);

    let resp = h.server.post("/logout").add_cookie(session).await;
    resp.assert_status(StatusCode::NO_CONTENT);
    assert_eq!(resp.cookie(SESSION_COOKIE).value(), "");
}

#[tokio::test]
async fn logout_without_a_session_is_still_accepted() {
    let h = harness().await;
    h.server
        .post("/logout")
        .await
        .assert_status(StatusCode::NO_CONTENT);
}
