//! Domain types persisted by the vmgrid state store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for an application.
pub type AppId = String;

// ── Framework ─────────────────────────────────────────────────────

/// The framework identity registered for a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameworkRecord {
    pub cluster: String,
    pub framework_id: String,
    /// Unix timestamp (seconds) of first registration.
    pub registered_at: u64,
}

// ── Application ───────────────────────────────────────────────────

/// A named workload grouping one or more KVM tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub id: AppId,
    /// Number of task instances to run.
    pub instances: u32,
    /// Template every task of this application is built from.
    pub kvm: KvmSpec,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Unix timestamp (seconds) when this record was created.
    #[serde(default)]
    pub created_at: u64,
    /// Unix timestamp (seconds) when this record was last written.
    #[serde(default)]
    pub updated_at: u64,
}

/// Resource and image settings for one KVM guest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KvmSpec {
    pub cpus: f64,
    /// Memory in MiB.
    pub mem: f64,
    /// Disk in MiB.
    #[serde(default)]
    pub disk: f64,
    /// Guest disk image (path or URI on the agent).
    pub image: String,
    /// Console port exposed by the guest, if any.
    #[serde(default)]
    pub vnc_port: Option<u16>,
}

// ── Task ──────────────────────────────────────────────────────────

/// Abstract lifecycle phase of a task.
///
/// Phases only move forward; a `Terminal` task is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Pending,
    Placed,
    Running,
    Controlled,
    Terminal,
}

/// Local database record for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    /// Structured name `"{instance_index}.{app_id}"`.
    pub name: String,
    pub app_id: AppId,
    pub kvm: KvmSpec,
    pub phase: TaskPhase,
    /// Empty until placement.
    #[serde(default)]
    pub agent_id: String,
    /// Empty until the executor reports in.
    #[serde(default)]
    pub executor_id: String,
    /// Hostname of the agent the task was placed on.
    #[serde(default)]
    pub ip_addr: String,
    /// Console endpoint, filled in after the guest boots.
    #[serde(default)]
    pub vnc_addr: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl TaskRecord {
    /// Build the composite key for the tasks table.
    pub fn table_key(&self) -> String {
        task_key(&self.app_id, &self.id)
    }

    /// Advance the phase; moves backwards are ignored.
    pub fn advance(&mut self, phase: TaskPhase) -> bool {
        if phase > self.phase {
            self.phase = phase;
            true
        } else {
            false
        }
    }
}

/// Composite key for a task record.
pub fn task_key(app_id: &str, task_id: &str) -> String {
    format!("{app_id}:{task_id}")
}
