//! Pure builders for every outbound call vmgrid sends.

use prost::Message;

use crate::control::ControlOp;
use crate::error::ProtoResult;
use crate::mesos::{
    AgentId, ExecutorId, Filters, FrameworkId, FrameworkInfo, OfferId, TaskId, TaskInfo, offer,
};
use crate::scheduler::{Call, Event, call};

/// Media type for protobuf-encoded calls and events.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

fn envelope(framework_id: Option<&FrameworkId>, kind: call::Type) -> Call {
    Call {
        framework_id: framework_id.cloned(),
        r#type: kind as i32,
        ..Default::default()
    }
}

/// SUBSCRIBE — carries `info.id` when re-registering a known framework.
pub fn subscribe(info: FrameworkInfo) -> Call {
    let mut c = envelope(info.id.as_ref(), call::Type::Subscribe);
    c.subscribe = Some(call::Subscribe {
        framework_info: info,
    });
    c
}

/// ACCEPT with a single LAUNCH operation.
///
/// Every offer ID is listed, including offers that hold none of the tasks, so
/// the resource manager reclaims their unused capacity under `refuse_seconds`.
pub fn launch(
    framework_id: &FrameworkId,
    offer_ids: Vec<OfferId>,
    task_infos: Vec<TaskInfo>,
    refuse_seconds: f64,
) -> Call {
    let mut c = envelope(Some(framework_id), call::Type::Accept);
    c.accept = Some(call::Accept {
        offer_ids,
        operations: vec![offer::Operation {
            r#type: Some(offer::operation::Type::Launch as i32),
            launch: Some(offer::operation::Launch { task_infos }),
        }],
        filters: Some(Filters {
            refuse_seconds: Some(refuse_seconds),
        }),
    });
    c
}

/// DECLINE a set of offers.
pub fn decline(framework_id: &FrameworkId, offer_ids: Vec<OfferId>, refuse_seconds: f64) -> Call {
    let mut c = envelope(Some(framework_id), call::Type::Decline);
    c.decline = Some(call::Decline {
        offer_ids,
        filters: Some(Filters {
            refuse_seconds: Some(refuse_seconds),
        }),
    });
    c
}

/// MESSAGE relaying opaque bytes to one executor.
pub fn message(
    framework_id: &FrameworkId,
    agent_id: AgentId,
    executor_id: ExecutorId,
    data: Vec<u8>,
) -> Call {
    let mut c = envelope(Some(framework_id), call::Type::Message);
    c.message = Some(call::Message {
        agent_id,
        executor_id,
        data,
    });
    c
}

/// MESSAGE carrying a lifecycle control opcode.
pub fn control(
    framework_id: &FrameworkId,
    agent_id: AgentId,
    executor_id: ExecutorId,
    op: ControlOp,
) -> Call {
    message(framework_id, agent_id, executor_id, op.opcode().to_vec())
}

/// ACKNOWLEDGE a status update that carried a uuid.
pub fn acknowledge(
    framework_id: &FrameworkId,
    agent_id: AgentId,
    task_id: TaskId,
    uuid: Vec<u8>,
) -> Call {
    let mut c = envelope(Some(framework_id), call::Type::Acknowledge);
    c.acknowledge = Some(call::Acknowledge {
        agent_id,
        task_id,
        uuid,
    });
    c
}

/// KILL a task.
pub fn kill(framework_id: &FrameworkId, task_id: TaskId, agent_id: Option<AgentId>) -> Call {
    let mut c = envelope(Some(framework_id), call::Type::Kill);
    c.kill = Some(call::Kill { task_id, agent_id });
    c
}

/// Serialize a call for the HTTP request body.
pub fn encode_call(call: &Call) -> Vec<u8> {
    call.encode_to_vec()
}

/// Decode a call (used by test doubles inspecting what was sent).
pub fn decode_call(bytes: &[u8]) -> ProtoResult<Call> {
    Ok(Call::decode(bytes)?)
}

/// Decode a single unframed event.
pub fn decode_event(bytes: &[u8]) -> ProtoResult<Event> {
    Ok(Event::decode(bytes)?)
}
