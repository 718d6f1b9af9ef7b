//! Scheduler API envelopes: outbound `Call`s and inbound `Event`s.
//!
//! Tags follow `mesos/v1/scheduler/scheduler.proto`.

use crate::mesos::{FrameworkId, OfferId};

/// Outbound message from the scheduler to the resource manager.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Call {
    #[prost(message, optional, tag = "1")]
    pub framework_id: Option<FrameworkId>,
    #[prost(enumeration = "call::Type", required, tag = "2")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub subscribe: Option<call::Subscribe>,
    #[prost(message, optional, tag = "4")]
    pub accept: Option<call::Accept>,
    #[prost(message, optional, tag = "5")]
    pub decline: Option<call::Decline>,
    #[prost(message, optional, tag = "6")]
    pub kill: Option<call::Kill>,
    #[prost(message, optional, tag = "8")]
    pub acknowledge: Option<call::Acknowledge>,
    #[prost(message, optional, tag = "10")]
    pub message: Option<call::Message>,
}

pub mod call {
    use crate::mesos::{AgentId, ExecutorId, Filters, FrameworkInfo, OfferId, TaskId, offer};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Subscribe = 1,
        Teardown = 2,
        Accept = 3,
        Decline = 4,
        Revive = 5,
        Kill = 6,
        Shutdown = 7,
        Acknowledge = 8,
        Reconcile = 9,
        Message = 10,
        Request = 11,
        Suppress = 12,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Subscribe {
        #[prost(message, required, tag = "1")]
        pub framework_info: FrameworkInfo,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Accept {
        #[prost(message, repeated, tag = "1")]
        pub offer_ids: Vec<OfferId>,
        #[prost(message, repeated, tag = "2")]
        pub operations: Vec<offer::Operation>,
        #[prost(message, optional, tag = "3")]
        pub filters: Option<Filters>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Decline {
        #[prost(message, repeated, tag = "1")]
        pub offer_ids: Vec<OfferId>,
        #[prost(message, optional, tag = "2")]
        pub filters: Option<Filters>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Kill {
        #[prost(message, required, tag = "1")]
        pub task_id: TaskId,
        #[prost(message, optional, tag = "2")]
        pub agent_id: Option<AgentId>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Acknowledge {
        #[prost(message, required, tag = "1")]
        pub agent_id: AgentId,
        #[prost(message, required, tag = "2")]
        pub task_id: TaskId,
        #[prost(bytes = "vec", required, tag = "3")]
        pub uuid: Vec<u8>,
    }

    /// Opaque payload relayed to one executor.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Message {
        #[prost(message, required, tag = "1")]
        pub agent_id: AgentId,
        #[prost(message, required, tag = "2")]
        pub executor_id: ExecutorId,
        #[prost(bytes = "vec", required, tag = "3")]
        pub data: Vec<u8>,
    }
}

/// Inbound message on the subscription stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(enumeration = "event::Type", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(message, optional, tag = "2")]
    pub subscribed: Option<event::Subscribed>,
    #[prost(message, optional, tag = "3")]
    pub offers: Option<event::Offers>,
    #[prost(message, optional, tag = "4")]
    pub rescind: Option<event::Rescind>,
    #[prost(message, optional, tag = "5")]
    pub update: Option<event::Update>,
    #[prost(message, optional, tag = "6")]
    pub message: Option<event::Message>,
    #[prost(message, optional, tag = "7")]
    pub failure: Option<event::Failure>,
    #[prost(message, optional, tag = "8")]
    pub error: Option<event::Error>,
}

pub mod event {
    use crate::mesos::{AgentId, ExecutorId, FrameworkId, Offer, OfferId, TaskStatus};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Subscribed = 1,
        Offers = 2,
        Rescind = 3,
        Update = 4,
        Message = 5,
        Failure = 6,
        Error = 7,
        Heartbeat = 8,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Subscribed {
        #[prost(message, required, tag = "1")]
        pub framework_id: FrameworkId,
        #[prost(double, optional, tag = "2")]
        pub heartbeat_interval_seconds: Option<f64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Offers {
        #[prost(message, repeated, tag = "1")]
        pub offers: Vec<Offer>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Rescind {
        #[prost(message, required, tag = "1")]
        pub offer_id: OfferId,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Update {
        #[prost(message, required, tag = "1")]
        pub status: TaskStatus,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Message {
        #[prost(message, required, tag = "1")]
        pub agent_id: AgentId,
        #[prost(message, required, tag = "2")]
        pub executor_id: ExecutorId,
        #[prost(bytes = "vec", required, tag = "3")]
        pub data: Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Failure {
        #[prost(message, optional, tag = "1")]
        pub agent_id: Option<AgentId>,
        #[prost(message, optional, tag = "2")]
        pub executor_id: Option<ExecutorId>,
        #[prost(int32, optional, tag = "3")]
        pub status: Option<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Error {
        #[prost(string, required, tag = "1")]
        pub message: String,
    }
}

impl Call {
    /// Offer IDs carried by an ACCEPT or DECLINE call.
    pub fn offer_ids(&self) -> Vec<&OfferId> {
        if let Some(accept) = &self.accept {
            return accept.offer_ids.iter().collect();
        }
        if let Some(decline) = &self.decline {
            return decline.offer_ids.iter().collect();
        }
        Vec::new()
    }
}
