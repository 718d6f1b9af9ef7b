//! Offer-to-launch binding.
//!
//! A batch of pending tasks for one application is bound to the agent of the
//! first offer, recorded in the task database on a best-effort basis, and
//! launched with a single ACCEPT call that consumes every offer in the batch.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use vmgrid_proto::{AgentId, FrameworkId, Offer, OfferId, TaskId, calls};
use vmgrid_state::{StateError, TaskDatabase, TaskPhase};
use vmgrid_transport::{CallSender, StatusCode, send_expecting};

use crate::config::SchedulerConfig;
use crate::directory::TaskDirectory;
use crate::error::{SchedulerError, SchedulerResult};
use crate::task::Task;

/// Auxiliary result of a launched batch.
#[derive(Debug, Default)]
pub struct LaunchReport {
    pub app_id: String,
    pub agent_id: String,
    pub offer_ids: Vec<String>,
    pub task_ids: Vec<String>,
    /// Per-task bookkeeping failures; the launch was sent regardless.
    pub bookkeeping_failures: Vec<(String, StateError)>,
}

/// Binds pending tasks to offers and sends the launch call.
#[derive(Clone)]
pub struct Launcher {
    sender: Arc<dyn CallSender>,
    db: Arc<dyn TaskDatabase>,
    directory: TaskDirectory,
    config: SchedulerConfig,
}

impl Launcher {
    pub fn new(
        sender: Arc<dyn CallSender>,
        db: Arc<dyn TaskDatabase>,
        directory: TaskDirectory,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            sender,
            db,
            directory,
            config,
        }
    }

    fn framework_id(&self) -> SchedulerResult<FrameworkId> {
        self.sender
            .framework_id()
            .ok_or(SchedulerError::NotSubscribed)
    }

    /// Launch `tasks` on the first offer's agent.
    ///
    /// All tasks must belong to one application. Every task is bound before
    /// the call is sent, and the binding is kept even when the call fails.
    /// No retry is attempted.
    pub async fn launch_batch(
        &self,
        offers: &[Offer],
        tasks: &mut [Task],
    ) -> SchedulerResult<LaunchReport> {
        let first_task = tasks.first().ok_or(SchedulerError::EmptyBatch)?;
        let offer = offers.first().ok_or(SchedulerError::NoOffers)?;
        let app_id = first_task.app_id().to_string();
        if let Some(other) = tasks.iter().find(|t| t.app_id() != app_id) {
            return Err(SchedulerError::MixedApplications {
                expected: app_id,
                found: other.app_id().to_string(),
            });
        }
        let framework_id = self.framework_id()?;

        for task in tasks.iter_mut() {
            task.bind(offer.agent_id.clone());
        }

        let mut report = LaunchReport {
            app_id: app_id.clone(),
            agent_id: offer.agent_id.value.clone(),
            offer_ids: offers.iter().map(|o| o.id.value.clone()).collect(),
            task_ids: tasks.iter().map(|t| t.task_id().value.clone()).collect(),
            bookkeeping_failures: Vec::new(),
        };

        for task in tasks.iter() {
            let task_id = &task.task_id().value;
            if let Err(e) = self.record_placement(&app_id, task_id, offer) {
                warn!(%app_id, %task_id, error = %e, "placement bookkeeping failed; continuing");
                report.bookkeeping_failures.push((task_id.clone(), e));
            }
        }

        let offer_ids: Vec<OfferId> = offers.iter().map(|o| o.id.clone()).collect();
        let task_infos = tasks
            .iter()
            .filter_map(|t| t.descriptor().cloned())
            .map(|d| d.into_task_info())
            .collect();
        let call = calls::launch(&framework_id, offer_ids, task_infos, self.config.refuse_seconds);

        info!(
            %app_id,
            agent_id = %offer.agent_id,
            hostname = %offer.hostname,
            tasks = tasks.len(),
            offers = offers.len(),
            "launching kvm tasks"
        );

        if let Err(e) = send_expecting(
            self.sender.as_ref(),
            &call,
            StatusCode::ACCEPTED,
            self.config.call_timeout,
        )
        .await
        {
            error!(%app_id, error = %e, "launch call failed");
            return Err(e.into());
        }

        // Records stay Pending until the launch is acknowledged.
        for task in tasks.iter() {
            let task_id = &task.task_id().value;
            self.directory
                .mark_placed(task_id, &app_id, &offer.agent_id.value)
                .await;
            if report.bookkeeping_failures.iter().any(|(id, _)| id == task_id) {
                continue;
            }
            if let Err(e) = self.advance_record(&app_id, task_id) {
                warn!(%app_id, %task_id, error = %e, "failed to mark task placed");
                report.bookkeeping_failures.push((task_id.clone(), e));
            }
        }

        Ok(report)
    }

    /// Write the agent and host of the chosen offer. The phase is untouched.
    fn record_placement(&self, app_id: &str, task_id: &str, offer: &Offer) -> Result<(), StateError> {
        let mut record = self.db.get_task(app_id, task_id)?;
        record.agent_id = offer.agent_id.value.clone();
        record.ip_addr = offer.hostname.clone();
        record.vnc_addr = String::new();
        self.db.update_task(app_id, &record)?;
        debug!(%app_id, %task_id, agent_id = %record.agent_id, "placement recorded");
        Ok(())
    }

    fn advance_record(&self, app_id: &str, task_id: &str) -> Result<(), StateError> {
        let mut record = self.db.get_task(app_id, task_id)?;
        if record.advance(TaskPhase::Placed) {
            self.db.update_task(app_id, &record)?;
        }
        Ok(())
    }

    /// Decline offers that match no pending work.
    pub async fn decline_offers(&self, offer_ids: Vec<OfferId>) -> SchedulerResult<()> {
        if offer_ids.is_empty() {
            return Ok(());
        }
        let framework_id = self.framework_id()?;
        let count = offer_ids.len();
        let call = calls::decline(&framework_id, offer_ids, self.config.decline_refuse_seconds);
        send_expecting(
            self.sender.as_ref(),
            &call,
            StatusCode::ACCEPTED,
            self.config.call_timeout,
        )
        .await?;
        debug!(count, "declined offers");
        Ok(())
    }

    /// Ask the resource manager to kill a task.
    pub async fn kill(&self, task_id: &str, agent_id: Option<&str>) -> SchedulerResult<()> {
        let framework_id = self.framework_id()?;
        let call = calls::kill(
            &framework_id,
            TaskId::new(task_id),
            agent_id.filter(|a| !a.is_empty()).map(AgentId::new),
        );
        send_expecting(
            self.sender.as_ref(),
            &call,
            StatusCode::ACCEPTED,
            self.config.call_timeout,
        )
        .await?;
        info!(%task_id, "kill requested");
        Ok(())
    }
}
