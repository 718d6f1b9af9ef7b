//! Router tests against an in-memory store and a recording transport.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use vmgrid_api::build_router;
use vmgrid_scheduler::{Scheduler, SchedulerConfig, TaskEntry};
use vmgrid_state::{StateStore, TaskPhase};
use vmgrid_transport::testing::RecordingSender;

fn setup(sender: RecordingSender) -> (Router, Arc<Scheduler>, Arc<RecordingSender>) {
    let sender = Arc::new(sender);
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let scheduler = Arc::new(Scheduler::new(
        sender.clone(),
        store.clone(),
        store,
        SchedulerConfig::default(),
    ));
    (build_router(scheduler.clone()), scheduler, sender)
}

fn app_json(id: &str, instances: u32) -> String {
    serde_json::json!({
        "id": id,
        "instances": instances,
        "kvm": { "cpus": 1.0, "mem": 1024.0, "image": "/images/base.qcow2" }
    })
    .to_string()
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn list_applications_empty() {
    let (router, _, _) = setup(RecordingSender::forbidden());
    let resp = router.oneshot(empty("GET", "/v1/apps")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn create_and_fetch_application() {
    let (router, _, _) = setup(RecordingSender::forbidden());

    let resp = router
        .clone()
        .oneshot(post_json("/v1/apps", app_json("web", 2)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router.oneshot(empty("GET", "/v1/apps/web")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["data"]["id"], "web");
    assert_eq!(body["data"]["instances"], 2);
}

#[tokio::test]
async fn create_application_twice_keeps_one_record() {
    let (router, _, _) = setup(RecordingSender::forbidden());
    for _ in 0..2 {
        let resp = router
            .clone()
            .oneshot(post_json("/v1/apps", app_json("web", 1)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }
    let resp = router.oneshot(empty("GET", "/v1/apps")).await.unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_application_rejects_zero_resources() {
    let (router, _, _) = setup(RecordingSender::forbidden());
    let body = serde_json::json!({
        "id": "web",
        "instances": 1,
        "kvm": { "cpus": 0.0, "mem": 1024.0, "image": "/images/base.qcow2" }
    })
    .to_string();
    let resp = router.oneshot(post_json("/v1/apps", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fetch_missing_application_is_404() {
    let (router, _, _) = setup(RecordingSender::forbidden());
    let resp = router.oneshot(empty("GET", "/v1/apps/ghost")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_application_is_idempotent() {
    let (router, scheduler, _) = setup(RecordingSender::forbidden());
    router
        .clone()
        .oneshot(post_json("/v1/apps", app_json("web", 2)))
        .await
        .unwrap();
    router
        .clone()
        .oneshot(post_json("/tasks", r#"{"app_id":"web"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(scheduler.pending_count().await, 2);

    for _ in 0..2 {
        let resp = router
            .clone()
            .oneshot(empty("DELETE", "/v1/apps/web"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(scheduler.pending_count().await, 0);
    assert!(scheduler.directory().list_for_app("web").await.is_empty());

    let resp = router.oneshot(empty("GET", "/v1/apps/web")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn add_tasks_queues_instances() {
    let (router, scheduler, _) = setup(RecordingSender::forbidden());
    router
        .clone()
        .oneshot(post_json("/v1/apps", app_json("web", 3)))
        .await
        .unwrap();

    let resp = router
        .oneshot(post_json("/tasks", r#"{"app_id":"web"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    assert_eq!(body["data"]["task_ids"].as_array().unwrap().len(), 3);
    assert_eq!(scheduler.pending_count().await, 3);
}

#[tokio::test]
async fn add_tasks_for_unknown_application_is_404() {
    let (router, _, _) = setup(RecordingSender::forbidden());
    let resp = router
        .oneshot(post_json("/tasks", r#"{"app_id":"ghost"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn control_placed_task_sends_message() {
    let (router, scheduler, sender) = setup(RecordingSender::accepting());
    scheduler
        .directory()
        .insert(TaskEntry {
            agent_id: "a1".to_string(),
            executor_id: "e1".to_string(),
            phase: TaskPhase::Running,
            ..TaskEntry::pending("t1", "web")
        })
        .await;

    let resp = router
        .oneshot(empty("POST", "/v1/tasks/t1/stop"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let calls = sender.calls();
    assert_eq!(calls.len(), 1);
    let msg = calls[0].message.as_ref().unwrap();
    assert_eq!(msg.agent_id.value, "a1");
    assert_eq!(msg.executor_id.value, "e1");
}

#[tokio::test]
async fn control_unplaced_task_is_accepted_without_message() {
    let (router, _, _) = setup(RecordingSender::forbidden());
    let resp = router
        .oneshot(empty("POST", "/v1/tasks/t1/start"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn unsupported_operation_is_400() {
    let (router, _, _) = setup(RecordingSender::forbidden());
    let resp = router
        .oneshot(empty("POST", "/v1/tasks/t1/reboot"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rejected_control_is_502() {
    let (router, scheduler, _) = setup(RecordingSender::with_status(StatusCode::INTERNAL_SERVER_ERROR));
    scheduler
        .directory()
        .insert(TaskEntry {
            agent_id: "a1".to_string(),
            executor_id: "e1".to_string(),
            ..TaskEntry::pending("t1", "web")
        })
        .await;

    let resp = router
        .oneshot(empty("POST", "/v1/tasks/t1/resume"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
