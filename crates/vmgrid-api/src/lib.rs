//! vmgrid-api — REST surface for the vmgrid scheduler.
//!
//! Thin routing onto the scheduler's entry points; all scheduling semantics
//! live in `vmgrid-scheduler`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/tasks` | Queue one task per instance of an application |
//! | POST | `/v1/apps` | Register (create or overwrite) an application |
//! | GET | `/v1/apps` | List applications |
//! | GET | `/v1/apps/{id}` | Fetch one application |
//! | DELETE | `/v1/apps/{id}` | Delete an application and drop its queued tasks |
//! | POST | `/v1/tasks/{id}/{operation}` | Start, stop, suspend or resume a task |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use vmgrid_scheduler::Scheduler;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<Scheduler>,
}

/// Build the API router.
pub fn build_router(scheduler: Arc<Scheduler>) -> Router {
    let state = ApiState { scheduler };

    Router::new()
        .route("/tasks", post(handlers::add_tasks))
        .route(
            "/v1/apps",
            get(handlers::list_applications).post(handlers::create_application),
        )
        .route(
            "/v1/apps/{id}",
            get(handlers::fetch_application).delete(handlers::delete_application),
        )
        .route("/v1/tasks/{id}/{operation}", post(handlers::control_task))
        .with_state(state)
}
