//! Shared protocol value types.
//!
//! Field tags match `mesos/v1/mesos.proto` so the encoded bytes are
//! accepted by a stock resource manager. Only the fields vmgrid reads or
//! writes are declared; unknown fields are skipped on decode.

use std::fmt;

macro_rules! id_message {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
        pub struct $name {
            #[prost(string, required, tag = "1")]
            pub value: String,
        }

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self { value: value.into() }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.value)
            }
        }
    };
}

id_message!(
    /// Identity of this framework, assigned by the resource manager.
    FrameworkId
);
id_message!(
    /// Identity of a resource offer.
    OfferId
);
id_message!(
    /// Identity of an agent (worker host).
    AgentId
);
id_message!(
    /// Identity of a task.
    TaskId
);
id_message!(
    /// Identity of an executor running on an agent.
    ExecutorId
);

// ── Values and resources ──────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ValueType {
    Scalar = 0,
    Ranges = 1,
    Set = 2,
    Text = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Scalar {
    #[prost(double, required, tag = "1")]
    pub value: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Range {
    #[prost(uint64, required, tag = "1")]
    pub begin: u64,
    #[prost(uint64, required, tag = "2")]
    pub end: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ranges {
    #[prost(message, repeated, tag = "1")]
    pub range: Vec<Range>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Text {
    #[prost(string, required, tag = "1")]
    pub value: String,
}

/// A named quantity of agent capacity (`cpus`, `mem`, `disk`, `ports`).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(enumeration = "ValueType", required, tag = "2")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub scalar: Option<Scalar>,
    #[prost(message, optional, tag = "4")]
    pub ranges: Option<Ranges>,
    #[prost(string, optional, tag = "6")]
    pub role: Option<String>,
}

impl Resource {
    /// Build a scalar resource for the default `*` role.
    pub fn scalar(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            r#type: ValueType::Scalar as i32,
            scalar: Some(Scalar { value }),
            ranges: None,
            role: Some("*".to_string()),
        }
    }
}

/// Agent attribute advertised alongside an offer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Attribute {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(enumeration = "ValueType", required, tag = "2")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub scalar: Option<Scalar>,
    #[prost(message, optional, tag = "5")]
    pub text: Option<Text>,
}

// ── Offers ────────────────────────────────────────────────────────

/// An ephemeral grant of capacity on one agent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Offer {
    #[prost(message, required, tag = "1")]
    pub id: OfferId,
    #[prost(message, required, tag = "2")]
    pub framework_id: FrameworkId,
    #[prost(message, required, tag = "3")]
    pub agent_id: AgentId,
    #[prost(string, required, tag = "4")]
    pub hostname: String,
    #[prost(message, repeated, tag = "5")]
    pub resources: Vec<Resource>,
    #[prost(message, repeated, tag = "6")]
    pub executor_ids: Vec<ExecutorId>,
    #[prost(message, repeated, tag = "7")]
    pub attributes: Vec<Attribute>,
}

impl Offer {
    /// Sum of all scalar resources named `name` in this offer.
    pub fn scalar_total(&self, name: &str) -> f64 {
        self.resources
            .iter()
            .filter(|r| r.name == name)
            .filter_map(|r| r.scalar.as_ref())
            .map(|s| s.value)
            .sum()
    }
}

pub mod offer {
    /// An operation applied to accepted offers.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Operation {
        #[prost(enumeration = "operation::Type", optional, tag = "1")]
        pub r#type: Option<i32>,
        #[prost(message, optional, tag = "2")]
        pub launch: Option<operation::Launch>,
    }

    pub mod operation {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            Launch = 1,
            Reserve = 2,
            Unreserve = 3,
            Create = 4,
            Destroy = 5,
            LaunchGroup = 6,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Launch {
            #[prost(message, repeated, tag = "1")]
            pub task_infos: Vec<super::super::TaskInfo>,
        }
    }
}

/// Offer filter returned with accept/decline calls.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Filters {
    #[prost(double, optional, tag = "1")]
    pub refuse_seconds: Option<f64>,
}

// ── Tasks and executors ───────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandInfo {
    #[prost(message, repeated, tag = "1")]
    pub uris: Vec<command_info::Uri>,
    #[prost(string, optional, tag = "3")]
    pub value: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub user: Option<String>,
    #[prost(bool, optional, tag = "6")]
    pub shell: Option<bool>,
    #[prost(string, repeated, tag = "7")]
    pub arguments: Vec<String>,
}

pub mod command_info {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Uri {
        #[prost(string, required, tag = "1")]
        pub value: String,
        #[prost(bool, optional, tag = "2")]
        pub executable: Option<bool>,
        #[prost(bool, optional, tag = "3")]
        pub extract: Option<bool>,
        #[prost(bool, optional, tag = "4")]
        pub cache: Option<bool>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecutorInfo {
    #[prost(message, required, tag = "1")]
    pub executor_id: ExecutorId,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub data: Option<Vec<u8>>,
    #[prost(message, repeated, tag = "5")]
    pub resources: Vec<Resource>,
    #[prost(message, required, tag = "7")]
    pub command: CommandInfo,
    #[prost(message, optional, tag = "8")]
    pub framework_id: Option<FrameworkId>,
    #[prost(string, optional, tag = "9")]
    pub name: Option<String>,
}

/// Launch descriptor for a single task.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskInfo {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, required, tag = "2")]
    pub task_id: TaskId,
    #[prost(message, required, tag = "3")]
    pub agent_id: AgentId,
    #[prost(message, repeated, tag = "4")]
    pub resources: Vec<Resource>,
    #[prost(message, optional, tag = "5")]
    pub executor: Option<ExecutorInfo>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub data: Option<Vec<u8>>,
    #[prost(message, optional, tag = "7")]
    pub command: Option<CommandInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TaskState {
    TaskStaging = 6,
    TaskStarting = 0,
    TaskRunning = 1,
    TaskKilling = 8,
    TaskFinished = 2,
    TaskFailed = 3,
    TaskKilled = 4,
    TaskError = 7,
    TaskLost = 5,
    TaskDropped = 9,
    TaskUnreachable = 10,
    TaskGone = 11,
    TaskGoneByOperator = 12,
    TaskUnknown = 13,
}

impl TaskState {
    /// Whether no further transitions follow this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::TaskFinished
                | TaskState::TaskFailed
                | TaskState::TaskKilled
                | TaskState::TaskError
                | TaskState::TaskLost
                | TaskState::TaskDropped
                | TaskState::TaskGone
                | TaskState::TaskGoneByOperator
        )
    }
}

/// Status update for a task, delivered on the event stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskStatus {
    #[prost(message, required, tag = "1")]
    pub task_id: TaskId,
    #[prost(enumeration = "TaskState", required, tag = "2")]
    pub state: i32,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub data: Option<Vec<u8>>,
    #[prost(string, optional, tag = "4")]
    pub message: Option<String>,
    #[prost(message, optional, tag = "5")]
    pub agent_id: Option<AgentId>,
    #[prost(double, optional, tag = "6")]
    pub timestamp: Option<f64>,
    #[prost(message, optional, tag = "7")]
    pub executor_id: Option<ExecutorId>,
    #[prost(bool, optional, tag = "8")]
    pub healthy: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "11")]
    pub uuid: Option<Vec<u8>>,
}

// ── Framework ─────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FrameworkInfo {
    #[prost(string, required, tag = "1")]
    pub user: String,
    #[prost(string, required, tag = "2")]
    pub name: String,
    #[prost(message, optional, tag = "3")]
    pub id: Option<FrameworkId>,
    #[prost(double, optional, tag = "4")]
    pub failover_timeout: Option<f64>,
    #[prost(bool, optional, tag = "5")]
    pub checkpoint: Option<bool>,
    #[prost(string, optional, tag = "6")]
    pub role: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub hostname: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub principal: Option<String>,
}
