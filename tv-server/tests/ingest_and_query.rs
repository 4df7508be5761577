//! End-to-end: upload a bracket-PLC trace in two chunks, complete the upload, start a session,
//! and query it back out over HTTP. Grounded on `ferrex-server/tests/integration_test.rs`'s
//! in-process router style, adapted to `tower::ServiceExt::oneshot` rather than a live `reqwest`
//! client against a spawned server, since this crate's router needs no TLS/auth setup to drive.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use tv_server::config::Settings;

fn sample_trace() -> &'static str {
    "2024-01-01 00:00:00.000 [INFO] [SYS/DEV-1] [key:Running] (Boolean) : true\n\
     2024-01-01 00:00:00.500 [INFO] [SYS/DEV-1] [key:Count] (Int) : 42\n\
     2024-01-01 00:00:01.000 [INFO] [SYS/DEV-2] [key:State] (String) : IDLE\n"
}

async fn build_router() -> (tempfile::TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        upload_dir: dir.path().join("uploads"),
        parsed_dir: dir.path().join("parsed"),
        temp_dir: dir.path().join("tmp"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
    };
    let (_state, app) = tv_server::build(settings).await.unwrap();
    (dir, app)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn uploads_a_trace_then_parses_and_queries_it() {
    let (_dir, app) = build_router().await;
    let trace = sample_trace();
    let (first_half, second_half) = trace.split_at(trace.len() / 2);

    for (index, chunk) in [first_half, second_half].into_iter().enumerate() {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/files/upload/chunk?upload_id=up1&index={index}"))
                    .body(Body::from(chunk.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let complete_body = json!({
        "upload_id": "up1",
        "name": "trace.log",
        "total_chunks": 2,
        "original_size": trace.len(),
        "compressed_size": trace.len(),
        "encoding": "none",
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/files/upload/complete")
                .header("content-type", "application/json")
                .body(Body::from(complete_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await;
    let job_id = job["job_id"].as_str().unwrap().to_string();

    let file_id = loop {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(format!("/api/v1/jobs/{job_id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let job = body_json(response).await;
        match job["stage"].as_str().unwrap() {
            "complete" => break job["file_info"]["id"].as_str().unwrap().to_string(),
            "error" => panic!("upload job errored: {job:?}"),
            _ => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
        }
    };

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/sessions")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "fileId": file_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let started = body_json(response).await;
    let session_id = started["session_id"].as_str().unwrap().to_string();

    loop {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(format!("/api/v1/sessions/{session_id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let session = body_json(response).await;
        match session["status"].as_str().unwrap() {
            "complete" => break,
            "error" => panic!("session errored: {session:?}"),
            _ => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
        }
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/sessions/{session_id}/entries?pageSize=10"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total_matching"], 3);
    assert_eq!(page["entries"].as_array().unwrap().len(), 3);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/sessions/{session_id}/signals"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let signals = body_json(response).await;
    assert_eq!(signals["signals"].as_array().unwrap().len(), 3);
}
