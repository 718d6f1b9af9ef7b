//! KVM task lifecycle control.
//!
//! Each operation is a MESSAGE call carrying one opcode to the task's
//! executor. Acknowledgement means the resource manager accepted the message
//! for delivery, not that the guest changed state; use
//! [`LifecycleController::control_and_wait`] when the effect must be observed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use vmgrid_proto::{AgentId, ControlOp, ExecutorId, TaskStatus, calls};
use vmgrid_transport::{CallSender, StatusCode, send_expecting};

use crate::config::SchedulerConfig;
use crate::directory::TaskDirectory;
use crate::error::{SchedulerError, SchedulerResult};
use crate::status::StatusHub;

/// Sends start/stop/suspend/resume to task executors.
#[derive(Clone)]
pub struct LifecycleController {
    sender: Arc<dyn CallSender>,
    directory: TaskDirectory,
    hub: StatusHub,
    config: SchedulerConfig,
}

impl LifecycleController {
    pub fn new(
        sender: Arc<dyn CallSender>,
        directory: TaskDirectory,
        hub: StatusHub,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            sender,
            directory,
            hub,
            config,
        }
    }

    pub async fn start(&self, task_id: &str, agent_id: &str, executor_id: &str) -> SchedulerResult<()> {
        self.control(ControlOp::Start, task_id, agent_id, executor_id).await
    }

    pub async fn stop(&self, task_id: &str, agent_id: &str, executor_id: &str) -> SchedulerResult<()> {
        self.control(ControlOp::Stop, task_id, agent_id, executor_id).await
    }

    pub async fn suspend(&self, task_id: &str, agent_id: &str, executor_id: &str) -> SchedulerResult<()> {
        self.control(ControlOp::Suspend, task_id, agent_id, executor_id).await
    }

    pub async fn resume(&self, task_id: &str, agent_id: &str, executor_id: &str) -> SchedulerResult<()> {
        self.control(ControlOp::Resume, task_id, agent_id, executor_id).await
    }

    /// Dispatch by operation name (`start`, `stop`, `suspend`, `resume`).
    ///
    /// An unknown name fails before any placement check.
    pub async fn control_named(
        &self,
        operation: &str,
        task_id: &str,
        agent_id: &str,
        executor_id: &str,
    ) -> SchedulerResult<()> {
        let op = parse_op(operation)?;
        self.control(op, task_id, agent_id, executor_id).await
    }

    /// Control a task using the placement recorded in the directory.
    ///
    /// Unknown or unplaced tasks are a logged no-op.
    pub async fn control_task(&self, task_id: &str, operation: &str) -> SchedulerResult<()> {
        let op = parse_op(operation)?;
        let (agent_id, executor_id) = self.directory.placement(task_id).await;
        self.control(op, task_id, &agent_id, &executor_id).await
    }

    /// Send `op` and return once the resource manager acknowledges it.
    ///
    /// Empty `agent_id` or `executor_id` means the task is not placed yet;
    /// the call succeeds without touching the transport.
    pub async fn control(
        &self,
        op: ControlOp,
        task_id: &str,
        agent_id: &str,
        executor_id: &str,
    ) -> SchedulerResult<()> {
        info!(%task_id, %agent_id, operation = %op, "controlling kvm task");

        if agent_id.is_empty() || executor_id.is_empty() {
            warn!(%task_id, operation = %op, "agent or executor id is empty; ignoring");
            return Ok(());
        }

        self.send_control(op, task_id, agent_id, executor_id).await
    }

    /// Send `op`, then wait until a status for the task satisfies `confirmed`.
    ///
    /// Unlike [`LifecycleController::control`], an unplaced task is an error
    /// here since no confirmation could ever arrive.
    pub async fn control_and_wait<F>(
        &self,
        op: ControlOp,
        task_id: &str,
        agent_id: &str,
        executor_id: &str,
        timeout: Duration,
        confirmed: F,
    ) -> SchedulerResult<TaskStatus>
    where
        F: Fn(&TaskStatus) -> bool,
    {
        if agent_id.is_empty() || executor_id.is_empty() {
            return Err(SchedulerError::NotPlaced(task_id.to_string()));
        }

        let rx = self.hub.subscribe();
        self.send_control(op, task_id, agent_id, executor_id).await?;
        let status = StatusHub::wait_for(rx, task_id, timeout, confirmed).await?;
        info!(%task_id, operation = %op, state = ?status.state(), "operation confirmed");
        Ok(status)
    }

    async fn send_control(
        &self,
        op: ControlOp,
        task_id: &str,
        agent_id: &str,
        executor_id: &str,
    ) -> SchedulerResult<()> {
        let framework_id = self
            .sender
            .framework_id()
            .ok_or(SchedulerError::NotSubscribed)?;
        let call = calls::control(
            &framework_id,
            AgentId::new(agent_id),
            ExecutorId::new(executor_id),
            op,
        );

        if let Err(e) = send_expecting(
            self.sender.as_ref(),
            &call,
            StatusCode::ACCEPTED,
            self.config.call_timeout,
        )
        .await
        {
            error!(%task_id, operation = %op, error = %e, "control message failed");
            return Err(e.into());
        }

        self.directory.mark_controlled(task_id).await;
        Ok(())
    }
}

fn parse_op(operation: &str) -> SchedulerResult<ControlOp> {
    operation
        .parse()
        .map_err(|_| SchedulerError::UnsupportedOperation(operation.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmgrid_proto::{TaskId, TaskState, call};
    use vmgrid_state::{StateStore, TaskPhase};
    use vmgrid_transport::TransportError;
    use vmgrid_transport::testing::RecordingSender;

    use crate::directory::TaskEntry;

    fn controller(sender: RecordingSender) -> (LifecycleController, Arc<RecordingSender>, TaskDirectory, StatusHub) {
        let sender = Arc::new(sender);
        let directory = TaskDirectory::new();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let hub = StatusHub::new(directory.clone(), store);
        let ctl = LifecycleController::new(
            sender.clone(),
            directory.clone(),
            hub.clone(),
            SchedulerConfig::default(),
        );
        (ctl, sender, directory, hub)
    }

    #[tokio::test]
    async fn unplaced_task_is_noop_for_every_operation() {
        let (ctl, _, _, _) = controller(RecordingSender::forbidden());
        for (agent, executor) in [("", "e1"), ("a1", ""), ("", "")] {
            ctl.start("t1", agent, executor).await.unwrap();
            ctl.stop("t1", agent, executor).await.unwrap();
            ctl.suspend("t1", agent, executor).await.unwrap();
            ctl.resume("t1", agent, executor).await.unwrap();
        }
    }

    #[tokio::test]
    async fn stop_sends_stop_opcode() {
        let (ctl, sender, _, _) = controller(RecordingSender::accepting());
        ctl.stop("t1", "a1", "e1").await.unwrap();

        let sent = sender.calls();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].r#type(), call::Type::Message);
        let msg = sent[0].message.as_ref().unwrap();
        assert_eq!(msg.agent_id.value, "a1");
        assert_eq!(msg.executor_id.value, "e1");
        assert_eq!(msg.data, ControlOp::Stop.opcode());
    }

    #[tokio::test]
    async fn each_operation_sends_its_own_opcode() {
        let (ctl, sender, _, _) = controller(RecordingSender::accepting());
        ctl.start("t1", "a1", "e1").await.unwrap();
        ctl.stop("t1", "a1", "e1").await.unwrap();
        ctl.suspend("t1", "a1", "e1").await.unwrap();
        ctl.resume("t1", "a1", "e1").await.unwrap();

        let sent: Vec<Vec<u8>> = sender
            .calls()
            .into_iter()
            .map(|c| c.message.unwrap().data)
            .collect();
        let expected: Vec<Vec<u8>> = ControlOp::ALL.iter().map(|op| op.opcode().to_vec()).collect();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn unknown_operation_fails_without_transport() {
        let (ctl, _, _, _) = controller(RecordingSender::forbidden());
        let err = ctl
            .control_named("reboot", "t1", "a1", "e1")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnsupportedOperation(op) if op == "reboot"));

        // Parsing happens before the placement guard.
        let err = ctl.control_named("reboot", "t1", "", "").await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn named_operations_are_case_insensitive() {
        let (ctl, sender, _, _) = controller(RecordingSender::accepting());
        ctl.control_named("Suspend", "t1", "a1", "e1").await.unwrap();
        assert_eq!(
            sender.calls()[0].message.as_ref().unwrap().data,
            ControlOp::Suspend.opcode()
        );
    }

    #[tokio::test]
    async fn rejected_message_is_error() {
        let (ctl, _, _, _) = controller(RecordingSender::with_status(StatusCode::BAD_REQUEST));
        let err = ctl.start("t1", "a1", "e1").await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Transport(TransportError::UnexpectedStatus { .. })
        ));
    }

    #[tokio::test]
    async fn control_task_resolves_placement_from_directory() {
        let (ctl, sender, directory, _) = controller(RecordingSender::accepting());
        directory
            .insert(TaskEntry {
                executor_id: "e7".to_string(),
                agent_id: "a7".to_string(),
                phase: TaskPhase::Running,
                ..TaskEntry::pending("t1", "web")
            })
            .await;

        ctl.control_task("t1", "stop").await.unwrap();

        let msg = sender.calls()[0].message.clone().unwrap();
        assert_eq!(msg.agent_id.value, "a7");
        assert_eq!(msg.executor_id.value, "e7");
        assert_eq!(directory.get("t1").await.unwrap().phase, TaskPhase::Controlled);
    }

    #[tokio::test]
    async fn control_task_for_unknown_task_is_noop() {
        let (ctl, _, _, _) = controller(RecordingSender::forbidden());
        ctl.control_task("ghost", "start").await.unwrap();
    }

    #[tokio::test]
    async fn repeated_operation_is_sent_each_time() {
        let (ctl, sender, _, _) = controller(RecordingSender::accepting());
        ctl.stop("t1", "a1", "e1").await.unwrap();
        ctl.stop("t1", "a1", "e1").await.unwrap();
        assert_eq!(sender.calls().len(), 2);
    }

    #[tokio::test]
    async fn control_and_wait_returns_confirming_status() {
        let (ctl, _, _, hub) = controller(RecordingSender::accepting());

        let publisher = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher
                .publish(TaskStatus {
                    task_id: TaskId::new("t1"),
                    state: TaskState::TaskFinished as i32,
                    ..Default::default()
                })
                .await;
        });

        let status = ctl
            .control_and_wait(
                ControlOp::Stop,
                "t1",
                "a1",
                "e1",
                Duration::from_secs(5),
                |s| s.state().is_terminal(),
            )
            .await
            .unwrap();
        assert_eq!(status.state(), TaskState::TaskFinished);
    }

    #[tokio::test]
    async fn control_and_wait_times_out() {
        let (ctl, sender, _, _) = controller(RecordingSender::accepting());
        let err = ctl
            .control_and_wait(
                ControlOp::Suspend,
                "t1",
                "a1",
                "e1",
                Duration::from_millis(20),
                |_| true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ConfirmationTimeout { .. }));
        assert_eq!(sender.calls().len(), 1);
    }

    #[tokio::test]
    async fn control_and_wait_requires_placement() {
        let (ctl, _, _, _) = controller(RecordingSender::forbidden());
        let err = ctl
            .control_and_wait(ControlOp::Start, "t1", "", "e1", Duration::from_secs(1), |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotPlaced(_)));
    }
}
