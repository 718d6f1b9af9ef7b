//! vmgrid-proto — wire codec for the resource-manager scheduler API.
//!
//! Pure and stateless. Holds the prost message definitions for the subset
//! of the Mesos v1 scheduler protocol vmgrid speaks, plus builders for every
//! outbound call and a decoder for the RecordIO-framed event stream.
//!
//! # Architecture
//!
//! ```text
//! mesos      — shared value types (IDs, Offer, TaskInfo, TaskStatus, Filters)
//! scheduler  — Call / Event envelopes and their nested bodies
//! calls      — pure builders: subscribe, launch, decline, message, ack, kill
//! control    — the closed executor control opcode table
//! recordio   — `<len>\n<bytes>` stream framing
//! ```

pub mod calls;
pub mod control;
pub mod error;
pub mod mesos;
pub mod recordio;
pub mod scheduler;

pub use control::ControlOp;
pub use error::{ProtoError, ProtoResult};
pub use mesos::*;
pub use recordio::RecordIoDecoder;
pub use scheduler::{Call, Event, call, event};
