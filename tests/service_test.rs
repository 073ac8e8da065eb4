//! Integration tests for the HTTP ingress.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use taskq::broker::MemoryBroker;
use taskq::exec::{Config, Executor};
use taskq::queue::Queue;
use taskq::service::{Service, ServiceConfig};
use taskq::task::{TaskFunc, TaskResult};
use taskq::worklog::{MemoryWorklog, State, Worklog};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn harness() -> (Service, Arc<MemoryWorklog>, MemoryBroker) {
    let broker = MemoryBroker::new();
    let worklog = Arc::new(MemoryWorklog::new());
    let queue = Arc::new(Queue::new(
        Arc::new(broker.clone()),
        Some(worklog.clone() as Arc<dyn Worklog>),
    ));

    let mut exec = Executor::with_config(Config {
        queue: Some(queue.clone()),
        subscription: "workers".to_string(),
        entry_ttl: Duration::from_secs(60),
        nodename: Some("test-node".to_string()),
        ..Config::default()
    })
    .expect("executor config");
    exec.add(
        "test://tasks/{name}",
        Arc::new(TaskFunc(|_cancel, req: taskq::task::Request, _params| async move {
            Ok(TaskResult::with_state(req.entity))
        })),
    );

    let service = Service::with_config(ServiceConfig {
        addr: String::new(),
        prefix: String::new(),
        queue: Some(queue),
        exec: Some(Arc::new(exec)),
    });
    (service, worklog, broker)
}

#[tokio::test]
async fn status_reports_ok() {
    let (service, _, _) = harness();
    let res = service.router().oneshot(get("/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn missing_queue_is_service_unavailable() {
    let service = Service::with_config(ServiceConfig::default());
    let res = service
        .router()
        .oneshot(post_json("/v1/queue", json!({"utd": "test://tasks/x"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let res = service
        .router()
        .oneshot(post_json("/v1/tasks", json!({"utd": "test://tasks/x"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn publish_validates_its_input() {
    let (service, _, _) = harness();

    // empty descriptor
    let res = service
        .router()
        .oneshot(post_json("/v1/queue", json!({"type": "managed", "utd": ""})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // not a message at all
    let res = service
        .router()
        .oneshot(post_json("/v1/queue", json!({"seq": "not-a-number"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // bad query parameter
    let res = service
        .router()
        .oneshot(post_json(
            "/v1/queue?state_seq=zap",
            json!({"utd": "test://tasks/x"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn publish_enqueues_seeds_and_echoes() {
    let (service, worklog, broker) = harness();

    let res = service
        .router()
        .oneshot(post_json(
            "/v1/queue?state_seq=2",
            json!({"type": "managed", "utd": "test://tasks/report"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let echoed = body_json(res).await;
    let id = echoed["id"].as_str().expect("assigned id");
    assert_ne!(id, "00000000000000000000");

    assert_eq!(broker.len(), 1, "message reached the broker");
    let entry = worklog
        .fetch_latest_entry_for_task(id.parse().unwrap())
        .await
        .unwrap();
    assert_eq!(entry.state, State::Pending);
    assert_eq!(entry.state_seq, 2);
}

#[tokio::test]
async fn tasks_endpoint_executes_synchronously() {
    let (service, _, _) = harness();

    let res = service
        .router()
        .oneshot(post_json(
            "/v1/tasks",
            json!({"type": "oneshot", "utd": "test://tasks/echo", "data": "aGVsbG8="}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["state"], "aGVsbG8=");

    // no route for the descriptor surfaces as a gateway failure
    let res = service
        .router()
        .oneshot(post_json(
            "/v1/tasks",
            json!({"type": "oneshot", "utd": "nope://missing"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn routes_honor_a_prefix() {
    let broker = MemoryBroker::new();
    let queue = Arc::new(Queue::new(Arc::new(broker), None));
    let service = Service::with_config(ServiceConfig {
        addr: String::new(),
        prefix: "/tasks".to_string(),
        queue: Some(queue),
        exec: None,
    });

    let res = service.router().oneshot(get("/tasks/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = service.router().oneshot(get("/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
