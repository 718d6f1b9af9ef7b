//! Process-scoped scheduler settings.

use std::time::Duration;

/// Settings handed to every scheduler component at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Refuse filter attached to launch calls.
    pub refuse_seconds: f64,
    /// Deadline for every call sent to the resource manager.
    pub call_timeout: Duration,
    /// Refuse filter attached to declined offers.
    pub decline_refuse_seconds: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refuse_seconds: 1.0,
            call_timeout: Duration::from_secs(10),
            decline_refuse_seconds: 5.0,
        }
    }
}
