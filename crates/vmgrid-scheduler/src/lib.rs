//! vmgrid-scheduler — offer-to-launch binding and KVM task lifecycle control.
//!
//! Turns resource offers plus pending tasks into launch calls, keeps the
//! local task database in step with what was placed, and relays lifecycle
//! operations to running executors.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── pending queue (submitted tasks awaiting an offer)
//!   ├── Launcher — bind batch to first offer's agent, ACCEPT/LAUNCH, DECLINE, KILL
//!   ├── LifecycleController — start/stop/suspend/resume as MESSAGE calls
//!   ├── StatusHub — UPDATE routing and bounded-wait confirmation
//!   ├── TaskDirectory — task_id → agent/executor/phase
//!   └── Registry (framework id, applications) + TaskDatabase (task records)
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod launcher;
pub mod lifecycle;
pub mod registration;
pub mod scheduler;
pub mod status;
pub mod task;

pub use config::SchedulerConfig;
pub use directory::{TaskDirectory, TaskEntry};
pub use error::{SchedulerError, SchedulerResult};
pub use launcher::{LaunchReport, Launcher};
pub use lifecycle::LifecycleController;
pub use registration::ensure_framework_id;
pub use scheduler::Scheduler;
pub use status::StatusHub;
pub use task::{Task, TaskDescriptor, app_id_from_name};
