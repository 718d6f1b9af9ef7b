//! Routing of task status updates to waiters.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};
use vmgrid_proto::TaskStatus;
use vmgrid_state::{StateResult, TaskDatabase, TaskPhase};

use crate::directory::{TaskDirectory, TaskEntry};
use crate::error::{SchedulerError, SchedulerResult};

const CHANNEL_CAPACITY: usize = 256;

/// Fans status updates out to anything awaiting a task's confirmation.
#[derive(Clone)]
pub struct StatusHub {
    tx: broadcast::Sender<TaskStatus>,
    directory: TaskDirectory,
    db: Arc<dyn TaskDatabase>,
}

impl StatusHub {
    pub fn new(directory: TaskDirectory, db: Arc<dyn TaskDatabase>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, directory, db }
    }

    /// Receiver for every status published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskStatus> {
        self.tx.subscribe()
    }

    /// Fold a status into the directory and database, then notify waiters.
    pub async fn publish(&self, status: TaskStatus) {
        let task_id = status.task_id.value.clone();
        let state = status.state();
        debug!(%task_id, ?state, "task status");

        match self.directory.apply_status(&status).await {
            Some(entry) => {
                if let Err(e) = self.sync_record(&entry.app_id, &task_id, &entry) {
                    warn!(%task_id, error = %e, "failed to record task status");
                }
                if entry.phase == TaskPhase::Terminal {
                    self.directory.remove(&task_id).await;
                    debug!(%task_id, "terminal task dropped from directory");
                }
            }
            None => debug!(%task_id, "status for task not in directory"),
        }

        // No receivers is fine.
        let _ = self.tx.send(status);
    }

    fn sync_record(&self, app_id: &str, task_id: &str, entry: &TaskEntry) -> StateResult<()> {
        let mut record = self.db.get_task(app_id, task_id)?;
        if !entry.agent_id.is_empty() {
            record.agent_id = entry.agent_id.clone();
        }
        if !entry.executor_id.is_empty() {
            record.executor_id = entry.executor_id.clone();
        }
        match entry.phase {
            TaskPhase::Running | TaskPhase::Terminal => {
                record.advance(entry.phase);
            }
            _ => {}
        }
        self.db.update_task(app_id, &record)
    }

    /// Wait on `rx` for a status of `task_id` satisfying `predicate`.
    ///
    /// `rx` must be obtained before the triggering call is sent so no update
    /// is missed.
    pub async fn wait_for<F>(
        mut rx: broadcast::Receiver<TaskStatus>,
        task_id: &str,
        timeout: Duration,
        predicate: F,
    ) -> SchedulerResult<TaskStatus>
    where
        F: Fn(&TaskStatus) -> bool,
    {
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(status) if status.task_id.value == task_id && predicate(&status) => {
                        return Ok(status);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%task_id, skipped, "status waiter lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(SchedulerError::StatusStreamClosed);
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| SchedulerError::ConfirmationTimeout {
                task_id: task_id.to_string(),
                timeout,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::task;
    use vmgrid_proto::{AgentId, ExecutorId, TaskId, TaskState};
    use vmgrid_state::StateStore;

    fn status(task_id: &str, state: TaskState) -> TaskStatus {
        TaskStatus {
            task_id: TaskId::new(task_id),
            state: state as i32,
            agent_id: Some(AgentId::new("a1")),
            executor_id: Some(ExecutorId::new("e1")),
            ..Default::default()
        }
    }

    fn hub() -> (StatusHub, TaskDirectory, Arc<StateStore>) {
        let directory = TaskDirectory::new();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        (StatusHub::new(directory.clone(), store.clone()), directory, store)
    }

    #[tokio::test]
    async fn publish_updates_directory_and_record() {
        let (hub, directory, store) = hub();
        let t = task("t1", "0.web");
        store.update_task("web", &t.pending_record()).unwrap();
        directory.insert(TaskEntry::pending("t1", "web")).await;

        hub.publish(status("t1", TaskState::TaskRunning)).await;

        assert_eq!(directory.placement("t1").await, ("a1".to_string(), "e1".to_string()));
        let record = store.get_task("web", "t1").unwrap();
        assert_eq!(record.executor_id, "e1");
        assert_eq!(record.phase, TaskPhase::Running);
    }

    #[tokio::test]
    async fn terminal_status_drops_directory_entry() {
        let (hub, directory, store) = hub();
        let t = task("t1", "0.web");
        store.update_task("web", &t.pending_record()).unwrap();
        directory.insert(TaskEntry::pending("t1", "web")).await;

        hub.publish(status("t1", TaskState::TaskRunning)).await;
        hub.publish(status("t1", TaskState::TaskFailed)).await;

        assert!(directory.get("t1").await.is_none());
        assert_eq!(store.get_task("web", "t1").unwrap().phase, TaskPhase::Terminal);
    }

    #[tokio::test]
    async fn waiter_sees_matching_status() {
        let (hub, _, _) = hub();
        let rx = hub.subscribe();

        let publisher = hub.clone();
        tokio::spawn(async move {
            publisher.publish(status("t2", TaskState::TaskFinished)).await;
            publisher.publish(status("t1", TaskState::TaskRunning)).await;
            publisher.publish(status("t1", TaskState::TaskFinished)).await;
        });

        let got = StatusHub::wait_for(rx, "t1", Duration::from_secs(5), |s| {
            s.state().is_terminal()
        })
        .await
        .unwrap();
        assert_eq!(got.task_id.value, "t1");
        assert_eq!(got.state(), TaskState::TaskFinished);
    }

    #[tokio::test]
    async fn waiter_times_out() {
        let (hub, _, _) = hub();
        let rx = hub.subscribe();
        let err = StatusHub::wait_for(rx, "t1", Duration::from_millis(20), |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ConfirmationTimeout { .. }));
    }
}
