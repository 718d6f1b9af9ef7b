//! Scheduler — the long-lived owner of every scheduling component.
//!
//! The `Scheduler` holds the pending-task queue and drives it from the
//! resource manager's event stream:
//! - SUBSCRIBED records the framework identity in the registry
//! - OFFERS launch the next application's pending tasks, or are declined
//! - UPDATE feeds the status hub and is acknowledged
//! - everything else is logged

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use vmgrid_proto::{AgentId, Event, Offer, TaskId, TaskStatus, calls, event};
use vmgrid_state::{Application, Registry, TaskDatabase, TaskPhase, TaskRecord};
use vmgrid_transport::{CallSender, StatusCode, send_expecting};

use crate::config::SchedulerConfig;
use crate::directory::{TaskDirectory, TaskEntry};
use crate::error::{SchedulerError, SchedulerResult};
use crate::launcher::{LaunchReport, Launcher};
use crate::lifecycle::LifecycleController;
use crate::registration::ensure_framework_id;
use crate::status::StatusHub;
use crate::task::Task;

/// The scheduling core.
pub struct Scheduler {
    sender: Arc<dyn CallSender>,
    registry: Arc<dyn Registry>,
    db: Arc<dyn TaskDatabase>,
    directory: TaskDirectory,
    hub: StatusHub,
    launcher: Launcher,
    lifecycle: LifecycleController,
    /// Submitted tasks awaiting an offer, in submission order.
    pending: Mutex<VecDeque<Task>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        sender: Arc<dyn CallSender>,
        registry: Arc<dyn Registry>,
        db: Arc<dyn TaskDatabase>,
        config: SchedulerConfig,
    ) -> Self {
        let directory = TaskDirectory::new();
        let hub = StatusHub::new(directory.clone(), Arc::clone(&db));
        let launcher = Launcher::new(
            Arc::clone(&sender),
            Arc::clone(&db),
            directory.clone(),
            config.clone(),
        );
        let lifecycle = LifecycleController::new(
            Arc::clone(&sender),
            directory.clone(),
            hub.clone(),
            config.clone(),
        );
        Self {
            sender,
            registry,
            db,
            directory,
            hub,
            launcher,
            lifecycle,
            pending: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn directory(&self) -> &TaskDirectory {
        &self.directory
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn status_hub(&self) -> &StatusHub {
        &self.hub
    }

    // ── Submission ─────────────────────────────────────────────────

    /// Record a pending task and queue it for the next offer.
    pub async fn submit(&self, task: Task) -> SchedulerResult<()> {
        self.db.update_task(task.app_id(), &task.pending_record())?;
        self.directory
            .insert(TaskEntry::pending(&task.task_id().value, task.app_id()))
            .await;
        debug!(task_id = %task.task_id(), app_id = %task.app_id(), "task queued");
        self.pending.lock().await.push_back(task);
        Ok(())
    }

    /// Queue one task per instance of a registered application.
    pub async fn submit_application(&self, app_id: &str) -> SchedulerResult<Vec<String>> {
        let app: Application = self.registry.fetch_application(app_id)?;
        let mut ids = Vec::with_capacity(app.instances as usize);
        for index in 0..app.instances {
            let task = Task::for_instance(&app, index);
            ids.push(task.task_id().value.clone());
            self.submit(task).await?;
        }
        info!(%app_id, tasks = ids.len(), "application tasks submitted");
        Ok(ids)
    }

    /// Drop every queued task of an application, along with its task record
    /// and directory entry, so a restart does not queue it again. Returns
    /// how many were removed.
    pub async fn cancel_pending(&self, app_id: &str) -> SchedulerResult<usize> {
        let cancelled: Vec<Task> = {
            let mut pending = self.pending.lock().await;
            let (cancelled, kept): (VecDeque<Task>, VecDeque<Task>) =
                pending.drain(..).partition(|t| t.app_id() == app_id);
            *pending = kept;
            cancelled.into()
        };

        for task in &cancelled {
            let task_id = &task.task_id().value;
            self.db.remove_task(app_id, task_id)?;
            self.directory.remove(task_id).await;
        }
        if !cancelled.is_empty() {
            info!(%app_id, tasks = cancelled.len(), "pending tasks cancelled");
        }
        Ok(cancelled.len())
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Rebuild the queue and directory from persisted task records.
    ///
    /// Pending records are queued again; placed and running records are
    /// indexed so lifecycle control works across restarts. Terminal records
    /// are skipped. Returns the number of requeued tasks.
    pub async fn restore(&self, records: Vec<TaskRecord>) -> usize {
        let mut requeued = 0;
        for record in records {
            match record.phase {
                TaskPhase::Terminal => continue,
                TaskPhase::Pending => match Task::new(&record.id, &record.name, record.kvm.clone()) {
                    Ok(task) => {
                        self.directory
                            .insert(TaskEntry::pending(&record.id, &record.app_id))
                            .await;
                        self.pending.lock().await.push_back(task);
                        requeued += 1;
                    }
                    Err(e) => warn!(task_id = %record.id, error = %e, "skipping unrecoverable task"),
                },
                phase => {
                    self.directory
                        .insert(TaskEntry {
                            agent_id: record.agent_id.clone(),
                            executor_id: record.executor_id.clone(),
                            phase,
                            ..TaskEntry::pending(&record.id, &record.app_id)
                        })
                        .await;
                }
            }
        }
        info!(requeued, indexed = self.directory.len().await, "task state restored");
        requeued
    }

    /// Remove the queued tasks of the application at the head of the queue.
    async fn next_batch(&self) -> Vec<Task> {
        let mut pending = self.pending.lock().await;
        let Some(app_id) = pending.front().map(|t| t.app_id().to_string()) else {
            return Vec::new();
        };
        let (batch, rest): (VecDeque<Task>, VecDeque<Task>) =
            pending.drain(..).partition(|t| t.app_id() == app_id);
        *pending = rest;
        batch.into()
    }

    async fn requeue(&self, tasks: Vec<Task>) {
        let mut pending = self.pending.lock().await;
        for task in tasks.into_iter().rev() {
            pending.push_front(task);
        }
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Handle one event from the subscription stream.
    pub async fn handle_event(&self, ev: Event) -> SchedulerResult<()> {
        match ev.r#type() {
            event::Type::Subscribed => match ev.subscribed {
                Some(subscribed) => {
                    ensure_framework_id(self.registry.as_ref(), &subscribed.framework_id.value)?;
                    Ok(())
                }
                None => {
                    warn!("SUBSCRIBED event without body");
                    Ok(())
                }
            },
            event::Type::Offers => {
                let offers = ev.offers.map(|o| o.offers).unwrap_or_default();
                self.handle_offers(offers).await.map(|_| ())
            }
            event::Type::Update => match ev.update {
                Some(update) => self.handle_update(update.status).await,
                None => Ok(()),
            },
            event::Type::Rescind => {
                if let Some(rescind) = ev.rescind {
                    debug!(offer_id = %rescind.offer_id, "offer rescinded");
                }
                Ok(())
            }
            event::Type::Message => {
                if let Some(message) = ev.message {
                    debug!(
                        agent_id = %message.agent_id,
                        executor_id = %message.executor_id,
                        bytes = message.data.len(),
                        "executor message"
                    );
                }
                Ok(())
            }
            event::Type::Failure => {
                if let Some(failure) = ev.failure {
                    warn!(
                        agent_id = ?failure.agent_id.map(|a| a.value),
                        executor_id = ?failure.executor_id.map(|e| e.value),
                        status = ?failure.status,
                        "agent or executor failure"
                    );
                }
                Ok(())
            }
            event::Type::Error => {
                let message = ev.error.map(|e| e.message).unwrap_or_default();
                error!(%message, "resource manager reported an error");
                Ok(())
            }
            event::Type::Heartbeat => {
                debug!("heartbeat");
                Ok(())
            }
            event::Type::Unknown => {
                debug!(raw_type = ?ev.r#type, "ignoring unknown event");
                Ok(())
            }
        }
    }

    /// Launch the next pending batch on `offers`, or decline them.
    ///
    /// A failed launch puts the batch back at the head of the queue so the
    /// next offers retry it.
    pub async fn handle_offers(&self, offers: Vec<Offer>) -> SchedulerResult<Option<LaunchReport>> {
        if offers.is_empty() {
            return Ok(None);
        }

        let mut batch = self.next_batch().await;
        if batch.is_empty() {
            let ids = offers.into_iter().map(|o| o.id).collect();
            self.launcher.decline_offers(ids).await?;
            return Ok(None);
        }

        match self.launcher.launch_batch(&offers, &mut batch).await {
            Ok(report) => {
                if !report.bookkeeping_failures.is_empty() {
                    warn!(
                        app_id = %report.app_id,
                        failures = report.bookkeeping_failures.len(),
                        "launched with incomplete bookkeeping"
                    );
                }
                Ok(Some(report))
            }
            Err(e) => {
                self.requeue(batch).await;
                Err(e)
            }
        }
    }

    /// Route a status update and acknowledge it when it carries a uuid.
    pub async fn handle_update(&self, status: TaskStatus) -> SchedulerResult<()> {
        let ack = match (&status.uuid, &status.agent_id) {
            (Some(uuid), Some(agent_id)) if !uuid.is_empty() => {
                Some((agent_id.clone(), status.task_id.clone(), uuid.clone()))
            }
            _ => None,
        };

        self.hub.publish(status).await;

        if let Some((agent_id, task_id, uuid)) = ack {
            self.acknowledge(agent_id, task_id, uuid).await?;
        }
        Ok(())
    }

    async fn acknowledge(
        &self,
        agent_id: AgentId,
        task_id: TaskId,
        uuid: Vec<u8>,
    ) -> SchedulerResult<()> {
        let framework_id = self
            .sender
            .framework_id()
            .ok_or(SchedulerError::NotSubscribed)?;
        let call = calls::acknowledge(&framework_id, agent_id, task_id, uuid);
        send_expecting(
            self.sender.as_ref(),
            &call,
            StatusCode::ACCEPTED,
            self.config.call_timeout,
        )
        .await?;
        Ok(())
    }
}
