//! The `CallSender` seam.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{debug, error};
use vmgrid_proto::{Call, FrameworkId};

use crate::error::{TransportError, TransportResult};

/// Delivers calls to the resource manager.
#[async_trait]
pub trait CallSender: Send + Sync {
    /// Send one call and return the acknowledgement status.
    ///
    /// Must return `TransportError::Timeout` rather than block past `timeout`.
    async fn send(&self, call: &Call, timeout: Duration) -> TransportResult<StatusCode>;

    /// Framework ID assigned at subscription, if subscribed.
    fn framework_id(&self) -> Option<FrameworkId>;
}

/// Send `call` and require the `expected` acknowledgement.
///
/// No retries: any other status, and any transport failure, is returned to
/// the caller.
pub async fn send_expecting(
    sender: &dyn CallSender,
    call: &Call,
    expected: StatusCode,
    timeout: Duration,
) -> TransportResult<()> {
    let kind = call.r#type();
    match sender.send(call, timeout).await {
        Ok(status) if status == expected => {
            debug!(?kind, %status, "call acknowledged");
            Ok(())
        }
        Ok(actual) => {
            error!(?kind, %expected, %actual, "call rejected");
            Err(TransportError::UnexpectedStatus { expected, actual })
        }
        Err(e) => {
            error!(?kind, error = %e, "call failed");
            Err(e)
        }
    }
}
