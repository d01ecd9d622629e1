//! Front API contract tests, driven through the router in-process.

mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use cf_gateway::api::build_router;
use cf_gateway::runtime::spawn_workers;

use support::{state_with, StubLlm, StubRetriever};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_chat(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Submission validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn submit_validates_input() {
    let state = state_with(StubLlm::happy(), StubRetriever::with_passages()).await;
    let router = build_router(state);

    // Empty message.
    let response = router
        .clone()
        .oneshot(post_chat(serde_json::json!({ "message": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Over-long message.
    let response = router
        .clone()
        .oneshot(post_chat(serde_json::json!({ "message": "x".repeat(4001) })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Malformed thread id.
    let response = router
        .clone()
        .oneshot(post_chat(
            serde_json::json!({ "message": "q", "thread_id": "not-a-uuid" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was enqueued for any of the rejected submissions.
    assert_eq!(
        router
            .clone()
            .oneshot(get("/healthz"))
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn submit_mints_ids_and_enqueues() {
    let state = state_with(StubLlm::happy(), StubRetriever::with_passages()).await;
    let router = build_router(state.clone());

    let response = router
        .oneshot(post_chat(
            serde_json::json!({ "message": "what is prior authorization" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    let cid = body["correlation_id"].as_str().unwrap();
    assert!(cid.parse::<uuid::Uuid>().is_ok());
    assert!(body["thread_id"].as_str().unwrap().parse::<uuid::Uuid>().is_ok());

    // The request is actually on the queue.
    let popped = state.queue.consume().await.unwrap();
    assert_eq!(popped.correlation_id.to_string(), cid);
    assert_eq!(popped.message, "what is prior authorization");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-thread serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn second_submission_on_busy_thread_is_rejected() {
    // No workers: the first turn never reaches a terminal response.
    let state = state_with(StubLlm::happy(), StubRetriever::with_passages()).await;
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(post_chat(serde_json::json!({ "message": "first" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let thread_id = body_json(response).await["thread_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = router
        .clone()
        .oneshot(post_chat(
            serde_json::json!({ "message": "second", "thread_id": thread_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A fresh thread is unaffected.
    let response = router
        .oneshot(post_chat(serde_json::json!({ "message": "other thread" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Poll
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn poll_reports_pending_then_terminal() {
    let state = state_with(StubLlm::happy(), StubRetriever::with_passages()).await;
    let router = build_router(state.clone());

    let response = router
        .clone()
        .oneshot(post_chat(serde_json::json!({ "message": "what is prior authorization" })))
        .await
        .unwrap();
    let cid = body_json(response).await["correlation_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Nothing processed yet.
    let response = router
        .clone()
        .oneshot(get(&format!("/chat/response/{cid}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "pending");

    // Let a worker drain the queue.
    let workers = spawn_workers(state.clone());
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let response = router
            .clone()
            .oneshot(get(&format!("/chat/response/{cid}")))
            .await
            .unwrap();
        let body = body_json(response).await;
        if body["status"] == "completed" {
            assert!(body["thinking_log"]
                .as_array()
                .unwrap()
                .iter()
                .any(|l| l == "Plan ready"));
            assert_eq!(body["sources"].as_array().unwrap().len(), 2);
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "turn never completed; last body: {body}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    for worker in workers {
        worker.abort();
    }
}

#[tokio::test]
async fn poll_rejects_malformed_correlation_id() {
    let state = state_with(StubLlm::happy(), StubRetriever::with_passages()).await;
    let router = build_router(state);

    let response = router
        .oneshot(get("/chat/response/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Live stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn stream_relays_events_to_terminal() {
    let state = state_with(StubLlm::happy(), StubRetriever::with_passages()).await;
    let router = build_router(state.clone());

    let response = router
        .clone()
        .oneshot(post_chat(serde_json::json!({ "message": "what is prior authorization" })))
        .await
        .unwrap();
    let cid = body_json(response).await["correlation_id"]
        .as_str()
        .unwrap()
        .to_string();

    let workers = spawn_workers(state.clone());

    // The SSE body ends once the terminal event is relayed, so reading
    // it to completion is safe.
    let response = router
        .oneshot(get(&format!("/chat/stream/{cid}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let raw = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&raw);
    assert!(text.contains("event: thinking"));
    assert!(text.contains("event: message"));
    assert!(text.contains("event: completed"));
    // Frames arrive in seq order: the first frame is id 1.
    let first_id = text
        .lines()
        .find(|l| l.starts_with("id:"))
        .unwrap()
        .trim_start_matches("id:")
        .trim()
        .to_string();
    assert_eq!(first_id, "1");

    for worker in workers {
        worker.abort();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History projections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn history_endpoints_reflect_completed_turns() {
    let state = state_with(StubLlm::happy(), StubRetriever::with_passages()).await;
    let router = build_router(state.clone());

    // Run one full turn directly.
    let req = support::request("what is prior authorization", cf_domain::ids::ThreadId::mint());
    cf_gateway::runtime::run_turn(state.clone(), req).await;

    let response = router
        .clone()
        .oneshot(get("/chat/history/recent?limit=5"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["turns"].as_array().unwrap().len(), 1);
    assert_eq!(body["turns"][0]["question"], "what is prior authorization");

    let response = router
        .clone()
        .oneshot(get("/chat/history/most-helpful-searches?limit=5"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["searches"][0]["query"], "what is prior authorization");

    let response = router
        .oneshot(get("/chat/history/most-helpful-documents?limit=5"))
        .await
        .unwrap();
    let body = body_json(response).await;
    let docs = body["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
}
