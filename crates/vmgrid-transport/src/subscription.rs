//! The SUBSCRIBE event stream.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1::SendRequest;
use tracing::{debug, info};
use vmgrid_proto::{Event, RecordIoDecoder, event};

use crate::error::{TransportError, TransportResult};
use crate::http::Session;

/// Decodes events from an open subscription response.
pub struct Subscription {
    body: Incoming,
    decoder: RecordIoDecoder,
    session: Arc<Session>,
    stream_id: String,
    // Keeps the dedicated connection alive for as long as the stream is read.
    _conn: SendRequest<Full<Bytes>>,
}

impl Subscription {
    pub(crate) fn new(
        body: Incoming,
        session: Arc<Session>,
        stream_id: String,
        conn: SendRequest<Full<Bytes>>,
    ) -> Self {
        Self {
            body,
            decoder: RecordIoDecoder::new(),
            session,
            stream_id,
            _conn: conn,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Wait for the next event.
    ///
    /// Returns `Ok(None)` when the resource manager closes the stream
    /// cleanly, and `StreamClosed` when it closes mid-record. A SUBSCRIBED
    /// event records the assigned framework ID on the owning sender.
    pub async fn next_event(&mut self) -> TransportResult<Option<Event>> {
        loop {
            if let Some(event) = self.decoder.next_event()? {
                self.observe(&event);
                return Ok(Some(event));
            }

            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.decoder.push(&data);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None if self.decoder.is_empty() => {
                    debug!(stream_id = %self.stream_id, "event stream ended");
                    return Ok(None);
                }
                None => return Err(TransportError::StreamClosed),
            }
        }
    }

    fn observe(&self, event: &Event) {
        if event.r#type() != event::Type::Subscribed {
            return;
        }
        if let Some(subscribed) = &event.subscribed {
            info!(
                framework_id = %subscribed.framework_id,
                stream_id = %self.stream_id,
                "framework id assigned"
            );
            self.session
                .set_framework_id(subscribed.framework_id.clone());
        }
    }
}
