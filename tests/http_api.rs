//! End-to-end tests against the assembled `/api` router
//!
//! Each test builds an isolated coordinator (own hub, proxy registry,
//! experiment store under a temp dir) and drives it through the router,
//! the way a remote client would.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use zeromq::{Socket, SocketRecv, SocketSend, ZmqMessage};

use cogrelay::experiments::ExperimentService;
use cogrelay::proxy::{ProxyConfig, ProxyRegistry};
use cogrelay::server::{router, AppState};
use cogrelay::BroadcastHub;

fn test_state(dir: &Path) -> AppState {
    let proxy_config = ProxyConfig::new(Duration::from_millis(200))
        .handshake_timeout(Duration::from_secs(2))
        .retry_interval(Duration::from_millis(20));

    AppState {
        hub: Arc::new(BroadcastHub::new()),
        proxies: Arc::new(ProxyRegistry::new(proxy_config)),
        experiments: Arc::new(ExperimentService::open(dir).unwrap()),
        status: Default::default(),
    }
}

async fn request(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    request(app, Method::GET, uri, Body::empty()).await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    request(app, Method::POST, uri, Body::from(body.to_string())).await
}

/// First SSE chunk of a streaming response
async fn first_sse_chunk(app: &Router, uri: &str) -> String {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("stream produced no event in time")
        .expect("stream ended unexpectedly")
        .unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}

#[tokio::test]
async fn broadcast_create_publish_subscribe() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, _) = post_json(&app, "/api/broadcast/data", json!({"name": "t1"})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = get(&app, "/api/broadcast/data").await;
    assert_eq!(status, StatusCode::OK);
    let mut names: Vec<String> = body["broadcast_endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["default".to_string(), "t1".to_string()]);

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/broadcast/data/t1",
        Body::from("hello"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The subscriber replays the published payload from history
    let chunk = first_sse_chunk(&app, "/api/broadcast/data/t1").await;
    assert!(chunk.contains("event: message"));
    assert!(chunk.contains("data: hello"));
}

#[tokio::test]
async fn broadcast_duplicate_create_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    post_json(&app, "/api/broadcast/data", json!({"name": "t1"})).await;
    let (status, body) = post_json(&app, "/api/broadcast/data", json!({"name": "t1"})).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("t1"));
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn broadcast_create_requires_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, body) = post_json(&app, "/api/broadcast/data", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "without valid broadcast name");
}

#[tokio::test]
async fn broadcast_unknown_topic_is_enveloped_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/broadcast/data/nope",
        Body::from("x"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = request(&app, Method::DELETE, "/api/broadcast/data/nope", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn broadcast_live_delivery_after_replay() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let app = router(state.clone());

    post_json(&app, "/api/broadcast/data", json!({"name": "t1"})).await;
    request(
        &app,
        Method::POST,
        "/api/broadcast/data/t1",
        Body::from("a"),
    )
    .await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/broadcast/data/t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let mut body = response.into_body().into_data_stream();

    // Replayed history first
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&chunk).contains("data: a"));

    // Then a live publish, delivered through the same open response
    state
        .hub
        .publish("t1", bytes::Bytes::from_static(b"b"))
        .unwrap();
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&chunk).contains("data: b"));
}

#[tokio::test]
async fn mock_stream_is_event_stream() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/broadcast/data/mock")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("no trial record in time")
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("trial_id"));
    assert!(text.contains("trial_result"));
}

/// Bind a REP worker on an ephemeral loopback port. It answers the
/// Hello/World handshake, then echoes `replies` further requests before
/// dropping its socket and unbinding the port.
async fn spawn_echo_worker(replies: usize) -> u16 {
    let mut rep = zeromq::RepSocket::new();
    let endpoint = rep.bind("tcp://127.0.0.1:0").await.unwrap();
    let port = match endpoint {
        zeromq::Endpoint::Tcp(_, port) => port,
        other => panic!("unexpected endpoint: {}", other),
    };

    tokio::spawn(async move {
        let _greeting = rep.recv().await.unwrap();
        let reply = serde_json::to_vec(&json!({"response": "World"})).unwrap();
        rep.send(ZmqMessage::from(reply)).await.unwrap();

        for _ in 0..replies {
            let Ok(request) = rep.recv().await else {
                break;
            };
            if rep.send(request).await.is_err() {
                break;
            }
        }
    });

    port
}

/// Poll `GET /api/cmds/proxies` until the background handshake has
/// finished and the session is listed
async fn wait_until_listed(app: &Router) {
    for _ in 0..100 {
        let (status, _) = get(app, "/api/cmds/proxies").await;
        if status == StatusCode::OK {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("proxy never appeared in the list");
}

#[tokio::test]
async fn proxies_empty_list_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, body) = get(&app, "/api/cmds/proxies").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no command proxies found");
}

#[tokio::test]
async fn proxy_roundtrip_against_echo_worker() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));
    let port = spawn_echo_worker(usize::MAX).await;

    let (status, _) = post_json(
        &app,
        "/api/cmds/proxies",
        json!({"nickname": "w", "hostname": "127.0.0.1", "port": port}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Wait for the background handshake to finish
    wait_until_listed(&app).await;

    // Duplicate nickname conflicts while the session lives
    let (status, _) = post_json(
        &app,
        "/api/cmds/proxies",
        json!({"nickname": "w", "hostname": "127.0.0.1", "port": port}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Commands echo back; send until the handshake has finished
    let mut echoed = false;
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/cmds/proxies/w")
                    .body(Body::from("PING"))
                    .unwrap(),
            )
            .await
            .unwrap();
        if response.status() == StatusCode::CREATED {
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json"
            );
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&bytes[..], b"PING");
            echoed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(echoed, "command was never echoed");

    let (status, _) = request(&app, Method::DELETE, "/api/cmds/proxies/w", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(&app, Method::DELETE, "/api/cmds/proxies/w", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(&app, Method::DELETE, "/api/cmds/proxies", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn proxy_retries_exhausted_returns_504_and_destroys_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    // The worker answers the handshake and then drops its socket, so by
    // the time a command goes out nothing is listening on the port.
    let port = spawn_echo_worker(0).await;

    let (status, _) = post_json(
        &app,
        "/api/cmds/proxies",
        json!({"nickname": "w", "hostname": "127.0.0.1", "port": port}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    wait_until_listed(&app).await;
    // Give the worker task a moment to finish and unbind
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Every lazy-pirate attempt times out or fails to reconnect, so the
    // command comes back as a gateway timeout after
    // max_retries x (msg_timeout + retry_interval) at worst
    let (status, _) = request(
        &app,
        Method::POST,
        "/api/cmds/proxies/w",
        Body::from("PING"),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

    // The exhausted session was destroyed: the registry is empty again
    let (status, body) = get(&app, "/api/cmds/proxies").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no command proxies found");
}

#[tokio::test]
async fn proxy_send_to_unknown_nickname_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/cmds/proxies/ghost",
        Body::from("PING"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn local_experiment(workdir: &Path) -> Value {
    json!({
        "nickname": "x",
        "type": "local",
        "address": workdir.to_string_lossy(),
        "data_path": null,
        "execs": [{"nickname": null, "exec": "sleep 30"}],
    })
}

#[tokio::test]
async fn experiment_lifecycle_start_conflict_stop() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, record) = post_json(&app, "/api/exps", local_experiment(workdir.path())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["status"], "ok");
    let id = record["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(&app, &format!("/api/exps/{}/start", id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["pid"].as_u64().unwrap() > 0);

    // A second start conflicts while the first process is alive
    let (status, _) = post_json(&app, &format!("/api/exps/{}/start", id), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post_json(&app, &format!("/api/exps/{}/stop", id), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    // The slot is free again
    let (status, _) = post_json(&app, &format!("/api/exps/{}/start", id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post_json(&app, &format!("/api/exps/{}/stop", id), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    // Nothing left to stop
    let (status, _) = post_json(&app, &format!("/api/exps/{}/stop", id), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn experiment_crud_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, _) = get(&app, &format!("/api/exps/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, record) = post_json(&app, "/api/exps", local_experiment(workdir.path())).await;
    let id = record["id"].as_str().unwrap().to_string();

    let (status, fetched) = get(&app, &format!("/api/exps/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["experiment"]["nickname"], "x");

    // Replace the meta-information
    let mut updated = local_experiment(workdir.path());
    updated["nickname"] = json!("x2");
    let (status, body) = request(
        &app,
        Method::PUT,
        &format!("/api/exps/{}", id),
        Body::from(updated.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["experiment"]["nickname"], "x2");

    // Upsert under a fresh id
    let fresh = uuid::Uuid::new_v4();
    let mut third = local_experiment(workdir.path());
    third["nickname"] = json!("x3");
    let (status, _) = request(
        &app,
        Method::PUT,
        &format!("/api/exps/{}", fresh),
        Body::from(third.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, list) = get(&app, "/api/exps").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);

    let (status, _) = request(
        &app,
        Method::DELETE,
        &format!("/api/exps/{}", id),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(&app, Method::DELETE, "/api/exps", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let (_, list) = get(&app, "/api/exps").await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn experiment_duplicate_nickname_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    post_json(&app, "/api/exps", local_experiment(workdir.path())).await;
    let (status, _) = post_json(&app, "/api/exps", local_experiment(workdir.path())).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

fn multipart_zip_body(boundary: &str, filename: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"artifact\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/zip\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn test_zip_bytes() -> Vec<u8> {
    use std::io::Write;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("main.py", options).unwrap();
        writer.write_all(b"print('hello')\n").unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

#[tokio::test]
async fn artifacts_on_git_experiment_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (_, record) = post_json(
        &app,
        "/api/exps",
        json!({
            "nickname": "g",
            "type": "git",
            "address": "https://example.com/g.git",
            "data_path": null,
            "execs": [{"nickname": null, "exec": "python main.py"}],
        }),
    )
    .await;
    let id = record["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        Method::POST,
        &format!("/api/exps/{}/artifacts", id),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "experiment type is not archive");
    assert_eq!(body["detail"], "experiment type is git");

    // Git operations on an uninitialized record are rejected with the
    // envelope, not a transport error
    let (status, _) = request(
        &app,
        Method::PUT,
        &format!("/api/exps/{}/git", id),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn artifacts_install_unpacks_archive() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (_, record) = post_json(
        &app,
        "/api/exps",
        json!({
            "nickname": "arc",
            "type": "archive",
            "address": null,
            "data_path": null,
            "execs": [{"nickname": null, "exec": "python main.py"}],
        }),
    )
    .await;
    let id = record["id"].as_str().unwrap().to_string();
    assert_eq!(record["status"], "uninitialized");

    let boundary = "cogrelay-test-boundary";
    let body = multipart_zip_body(boundary, "exp.zip", &test_zip_bytes());
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/api/exps/{}/artifacts", id))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(dir.path().join("arc/main.py").exists());

    let (_, fetched) = get(&app, &format!("/api/exps/{}", id)).await;
    assert_eq!(fetched["status"], "ok");

    // Wrong extension is rejected as an invalid archive
    let body = multipart_zip_body(boundary, "exp.tar.gz", b"not a zip");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(format!("/api/exps/{}/artifacts", id))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn alive_returns_a_monkey() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, body) = get(&app, "/api/alive").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("( ( o o ) )"));
}

#[tokio::test]
async fn status_board_patch_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, body) = get(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_running"], false);

    let (status, body) = request(
        &app,
        Method::PATCH,
        "/api/status",
        Body::from(json!({"id": "exp-1", "is_running": true}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "exp-1");
    assert_eq!(body["is_running"], true);

    let (status, body) = request(
        &app,
        Method::PATCH,
        "/api/status",
        Body::from(json!({"is_running": "yes"}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "is_running field must be a boolean");
}
