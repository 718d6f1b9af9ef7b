//! REST API handlers.
//!
//! Each handler calls one scheduler or registry entry point and returns a
//! JSON envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vmgrid_scheduler::SchedulerError;
use vmgrid_state::{Application, Registry};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn status_for(e: &SchedulerError) -> StatusCode {
    match e {
        SchedulerError::State(s) if s.is_not_found() => StatusCode::NOT_FOUND,
        SchedulerError::UnsupportedOperation(_) | SchedulerError::InvalidTaskName(_) => {
            StatusCode::BAD_REQUEST
        }
        SchedulerError::Transport(_) | SchedulerError::NotSubscribed => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn scheduler_error(e: SchedulerError) -> axum::response::Response {
    error_response(&e.to_string(), status_for(&e)).into_response()
}

// ── Tasks ──────────────────────────────────────────────────────

/// Task submission body.
#[derive(Deserialize)]
pub struct AddTasksRequest {
    pub app_id: String,
}

#[derive(Serialize)]
struct AddTasksResponse {
    app_id: String,
    task_ids: Vec<String>,
}

/// POST /tasks
pub async fn add_tasks(
    State(state): State<ApiState>,
    Json(req): Json<AddTasksRequest>,
) -> impl IntoResponse {
    match state.scheduler.submit_application(&req.app_id).await {
        Ok(task_ids) => (
            StatusCode::CREATED,
            ApiResponse::ok(AddTasksResponse {
                app_id: req.app_id,
                task_ids,
            }),
        )
            .into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// POST /v1/tasks/{id}/{operation}
pub async fn control_task(
    State(state): State<ApiState>,
    Path((task_id, operation)): Path<(String, String)>,
) -> impl IntoResponse {
    match state
        .scheduler
        .lifecycle()
        .control_task(&task_id, &operation)
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            ApiResponse::ok(serde_json::json!({
                "task_id": task_id,
                "operation": operation.to_ascii_lowercase(),
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(%task_id, %operation, error = %e, "task control failed");
            scheduler_error(e)
        }
    }
}

// ── Applications ───────────────────────────────────────────────

/// POST /v1/apps
pub async fn create_application(
    State(state): State<ApiState>,
    Json(app): Json<Application>,
) -> impl IntoResponse {
    if app.id.is_empty() || app.id.contains(':') {
        return error_response("invalid application id", StatusCode::BAD_REQUEST).into_response();
    }
    if app.kvm.cpus <= 0.0 || app.kvm.mem <= 0.0 {
        return error_response("cpus and mem must be positive", StatusCode::BAD_REQUEST)
            .into_response();
    }

    let registry = state.scheduler.registry();
    if let Err(e) = registry.register_application(&app) {
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
    }
    info!(app_id = %app.id, instances = app.instances, "application registered");
    match registry.fetch_application(&app.id) {
        Ok(stored) => (StatusCode::CREATED, ApiResponse::ok(stored)).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /v1/apps
pub async fn list_applications(State(state): State<ApiState>) -> impl IntoResponse {
    match state.scheduler.registry().list_applications() {
        Ok(apps) => ApiResponse::ok(apps).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /v1/apps/{id}
pub async fn fetch_application(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.registry().fetch_application(&id) {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) if e.is_not_found() => {
            error_response("application not found", StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /v1/apps/{id}
///
/// Idempotent. Queued tasks of the application are dropped together with
/// their task records; running tasks are left to the caller.
pub async fn delete_application(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let dropped = match state.scheduler.cancel_pending(&id).await {
        Ok(dropped) => dropped,
        Err(e) => {
            warn!(app_id = %id, error = %e, "failed to cancel pending tasks");
            return scheduler_error(e);
        }
    };
    match state.scheduler.registry().delete_application(&id) {
        Ok(()) => {
            info!(app_id = %id, dropped, "application deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
