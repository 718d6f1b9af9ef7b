//! The `Task` aggregate and its build-once launch descriptor.

use vmgrid_proto::{AgentId, CommandInfo, ExecutorId, ExecutorInfo, Resource, TaskId, TaskInfo};
use vmgrid_state::{Application, KvmSpec, TaskPhase, TaskRecord};

use crate::error::{SchedulerError, SchedulerResult};

/// Command the agent runs to host a KVM guest.
pub const KVM_EXECUTOR_COMMAND: &str = "./vmgrid-kvm-executor";

/// Extract the application ID from a `"<index>.<app_id>"` task name.
///
/// Splits at the first `.` only, so application IDs may contain dots.
pub fn app_id_from_name(name: &str) -> SchedulerResult<&str> {
    match name.split_once('.') {
        Some((_, app_id)) if !app_id.is_empty() => Ok(app_id),
        _ => Err(SchedulerError::InvalidTaskName(name.to_string())),
    }
}

/// A single schedulable KVM task.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    task_id: TaskId,
    name: String,
    app_id: String,
    kvm: KvmSpec,
    agent_id: Option<AgentId>,
    descriptor: Option<TaskDescriptor>,
}

impl Task {
    /// Create a pending task. The application ID is derived from `name`.
    pub fn new(task_id: impl Into<String>, name: impl Into<String>, kvm: KvmSpec) -> SchedulerResult<Self> {
        let name = name.into();
        let app_id = app_id_from_name(&name)?.to_string();
        Ok(Self {
            task_id: TaskId::new(task_id),
            name,
            app_id,
            kvm,
            agent_id: None,
            descriptor: None,
        })
    }

    /// Create the `index`-th instance of an application with a fresh ID.
    pub fn for_instance(app: &Application, index: u32) -> Self {
        Self {
            task_id: TaskId::new(uuid::Uuid::new_v4().to_string()),
            name: format!("{index}.{}", app.id),
            app_id: app.id.clone(),
            kvm: app.kvm.clone(),
            agent_id: None,
            descriptor: None,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn kvm(&self) -> &KvmSpec {
        &self.kvm
    }

    /// Agent the task was bound to; `None` while pending.
    pub fn agent_id(&self) -> Option<&AgentId> {
        self.agent_id.as_ref()
    }

    /// Launch descriptor; `None` until [`Task::bind`] has run.
    pub fn descriptor(&self) -> Option<&TaskDescriptor> {
        self.descriptor.as_ref()
    }

    /// Bind the task to an agent, then build its descriptor for that agent.
    ///
    /// Rebinding replaces both the agent and the descriptor.
    pub fn bind(&mut self, agent_id: AgentId) -> &TaskDescriptor {
        let descriptor = TaskDescriptor::build(self, &agent_id);
        self.agent_id = Some(agent_id);
        self.descriptor.insert(descriptor)
    }

    /// Database record for this task in the `Pending` phase.
    pub fn pending_record(&self) -> TaskRecord {
        TaskRecord {
            id: self.task_id.value.clone(),
            name: self.name.clone(),
            app_id: self.app_id.clone(),
            kvm: self.kvm.clone(),
            phase: TaskPhase::Pending,
            agent_id: String::new(),
            executor_id: String::new(),
            ip_addr: String::new(),
            vnc_addr: String::new(),
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Protocol descriptor for a bound task.
///
/// Only constructible with an agent ID, so a descriptor can never describe
/// an unplaced task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    info: TaskInfo,
}

impl TaskDescriptor {
    pub fn build(task: &Task, agent_id: &AgentId) -> Self {
        let kvm = &task.kvm;
        let mut resources = vec![
            Resource::scalar("cpus", kvm.cpus),
            Resource::scalar("mem", kvm.mem),
        ];
        if kvm.disk > 0.0 {
            resources.push(Resource::scalar("disk", kvm.disk));
        }

        // KvmSpec holds only numbers and strings; encoding cannot fail.
        let data = serde_json::to_vec(kvm).unwrap_or_default();

        let executor = ExecutorInfo {
            executor_id: ExecutorId::new(format!("vmgrid-kvm-{}", task.task_id)),
            name: Some(format!("kvm {}", task.name)),
            command: CommandInfo {
                value: Some(KVM_EXECUTOR_COMMAND.to_string()),
                shell: Some(true),
                ..Default::default()
            },
            data: Some(data.clone()),
            ..Default::default()
        };

        Self {
            info: TaskInfo {
                name: task.name.clone(),
                task_id: task.task_id.clone(),
                agent_id: agent_id.clone(),
                resources,
                executor: Some(executor),
                data: Some(data),
                command: None,
            },
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.info.agent_id
    }

    pub fn task_info(&self) -> &TaskInfo {
        &self.info
    }

    pub fn into_task_info(self) -> TaskInfo {
        self.info
    }
}
