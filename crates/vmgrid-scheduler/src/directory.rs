//! In-memory index of live tasks.
//!
//! Answers "where does this task run" for lifecycle control without a
//! database round trip. Entries are created on submission, filled in at
//! placement, and refreshed by status updates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use vmgrid_proto::{TaskState, TaskStatus};
use vmgrid_state::TaskPhase;

/// Placement and liveness of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEntry {
    pub task_id: String,
    pub app_id: String,
    /// Empty until placement.
    pub agent_id: String,
    /// Empty until the executor reports a status.
    pub executor_id: String,
    pub phase: TaskPhase,
    pub last_state: Option<TaskState>,
}

impl TaskEntry {
    pub fn pending(task_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            app_id: app_id.into(),
            agent_id: String::new(),
            executor_id: String::new(),
            phase: TaskPhase::Pending,
            last_state: None,
        }
    }

    fn advance(&mut self, phase: TaskPhase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }
}

/// Shared task index: task_id → entry.
#[derive(Debug, Clone, Default)]
pub struct TaskDirectory {
    entries: Arc<RwLock<HashMap<String, TaskEntry>>>,
}

impl TaskDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry.
    pub async fn insert(&self, entry: TaskEntry) {
        self.entries
            .write()
            .await
            .insert(entry.task_id.clone(), entry);
    }

    pub async fn get(&self, task_id: &str) -> Option<TaskEntry> {
        self.entries.read().await.get(task_id).cloned()
    }

    /// `(agent_id, executor_id)` for a task; empty strings when unknown.
    pub async fn placement(&self, task_id: &str) -> (String, String) {
        self.entries
            .read()
            .await
            .get(task_id)
            .map(|e| (e.agent_id.clone(), e.executor_id.clone()))
            .unwrap_or_default()
    }

    /// Record placement on an agent.
    pub async fn mark_placed(&self, task_id: &str, app_id: &str, agent_id: &str) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(task_id.to_string())
            .or_insert_with(|| TaskEntry::pending(task_id, app_id));
        entry.agent_id = agent_id.to_string();
        entry.advance(TaskPhase::Placed);
    }

    /// Record that a control operation was issued.
    pub async fn mark_controlled(&self, task_id: &str) {
        if let Some(entry) = self.entries.write().await.get_mut(task_id) {
            entry.advance(TaskPhase::Controlled);
        }
    }

    /// Fold a status update into the entry. Returns the updated entry, or
    /// `None` for tasks this scheduler does not know.
    pub async fn apply_status(&self, status: &TaskStatus) -> Option<TaskEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&status.task_id.value)?;

        if let Some(agent_id) = &status.agent_id {
            entry.agent_id = agent_id.value.clone();
        }
        if let Some(executor_id) = &status.executor_id {
            entry.executor_id = executor_id.value.clone();
        }

        let state = status.state();
        entry.last_state = Some(state);
        if state.is_terminal() {
            entry.advance(TaskPhase::Terminal);
        } else if state == TaskState::TaskRunning {
            entry.advance(TaskPhase::Running);
        }
        Some(entry.clone())
    }

    /// Forget a task, e.g. once it is terminal or its application is gone.
    pub async fn remove(&self, task_id: &str) -> Option<TaskEntry> {
        self.entries.write().await.remove(task_id)
    }

    /// Snapshot of every entry for one application.
    pub async fn list_for_app(&self, app_id: &str) -> Vec<TaskEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.app_id == app_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
