//! vmgrid-transport — the channel between the scheduler and the resource manager.
//!
//! Every outbound call goes through a [`CallSender`]. The sender is the only
//! point of contention on the resource-manager connection: writes are
//! serialized, but each caller awaits its own acknowledgement, and every
//! call is bounded by a caller-supplied deadline.
//!
//! # Architecture
//!
//! ```text
//! CallSender (trait)
//!   ├── HttpCallSender — POST /api/v1/scheduler over one hyper http1 connection
//!   └── RecordingSender — scripted test double (feature `testing`)
//! send_expecting() — maps any status other than the expected one to an error
//! Subscription — long-lived SUBSCRIBE response decoded into events
//! ```

pub mod error;
pub mod http;
pub mod sender;
pub mod subscription;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{TransportError, TransportResult};
pub use http::HttpCallSender;
pub use sender::{CallSender, send_expecting};
pub use subscription::Subscription;

pub use ::http::StatusCode;
