//! In-memory `CallSender` double for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use vmgrid_proto::{Call, FrameworkId};

use crate::error::TransportResult;
use crate::sender::CallSender;

/// Records every call and answers from a script.
///
/// Scripted responses are consumed in order; once exhausted, every call is
/// answered with the default status.
pub struct RecordingSender {
    framework_id: Option<FrameworkId>,
    default_status: StatusCode,
    script: Mutex<VecDeque<TransportResult<StatusCode>>>,
    calls: Mutex<Vec<Call>>,
    forbidden: bool,
}

impl RecordingSender {
    /// Answers 202 Accepted with framework ID `fw-test`.
    pub fn accepting() -> Self {
        Self::with_status(StatusCode::ACCEPTED)
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            framework_id: Some(FrameworkId::new("fw-test")),
            default_status: status,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            forbidden: false,
        }
    }

    /// Panics if any call is sent.
    pub fn forbidden() -> Self {
        Self {
            forbidden: true,
            ..Self::accepting()
        }
    }

    pub fn without_framework_id(mut self) -> Self {
        self.framework_id = None;
        self
    }

    /// Queue a response for the next unanswered call.
    pub fn push_response(&self, response: TransportResult<StatusCode>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Calls sent so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallSender for RecordingSender {
    async fn send(&self, call: &Call, _timeout: Duration) -> TransportResult<StatusCode> {
        assert!(!self.forbidden, "transport invoked: {:?}", call.r#type());
        self.calls.lock().unwrap().push(call.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.default_status))
    }

    fn framework_id(&self) -> Option<FrameworkId> {
        self.framework_id.clone()
    }
}
