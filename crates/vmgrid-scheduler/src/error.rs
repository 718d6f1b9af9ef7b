//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during scheduling and task control.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("launch batch has no tasks")]
    EmptyBatch,

    #[error("launch batch has no offers")]
    NoOffers,

    #[error("invalid task name {0:?}: expected \"<index>.<app_id>\"")]
    InvalidTaskName(String),

    #[error("batch mixes applications: expected {expected}, found {found}")]
    MixedApplications { expected: String, found: String },

    #[error("unsupported kvm task operation: {0}")]
    UnsupportedOperation(String),

    #[error("task not placed: {0}")]
    NotPlaced(String),

    #[error("scheduler is not subscribed: no framework id")]
    NotSubscribed,

    #[error("task {task_id} did not confirm within {timeout:?}")]
    ConfirmationTimeout { task_id: String, timeout: Duration },

    #[error("status stream closed")]
    StatusStreamClosed,

    #[error("state store error: {0}")]
    State(#[from] vmgrid_state::StateError),

    #[error("transport error: {0}")]
    Transport(#[from] vmgrid_transport::TransportError),

    #[error("codec error: {0}")]
    Proto(#[from] vmgrid_proto::ProtoError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    /// Whether the process must stop rather than continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::State(vmgrid_state::StateError::FrameworkIdMismatch { .. })
        )
    }
}
