//! HTTP call sender for the resource-manager scheduler endpoint.
//!
//! Calls are POSTed as protobuf to `/api/v1/scheduler` over a single
//! keep-alive http1 connection. http1 carries one exchange at a time: the
//! connection mutex is held until the connection is ready for a new request,
//! which happens only after the previous acknowledgement has been read. Calls
//! are therefore serialized end to end, and each caller waits at most its own
//! deadline.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HOST};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vmgrid_proto::calls::{PROTOBUF_CONTENT_TYPE, encode_call};
use vmgrid_proto::{Call, FrameworkId};

use crate::error::{TransportError, TransportResult};
use crate::sender::CallSender;
use crate::subscription::Subscription;

/// Path of the scheduler API on the resource manager.
pub const SCHEDULER_PATH: &str = "/api/v1/scheduler";

/// Header carrying the subscription stream ID on every non-subscribe call.
pub const STREAM_ID_HEADER: &str = "Mesos-Stream-Id";

type Connection = SendRequest<Full<Bytes>>;

/// Identity learned from the subscription, shared with the event stream.
#[derive(Debug, Default)]
pub(crate) struct Session {
    framework_id: RwLock<Option<FrameworkId>>,
    stream_id: RwLock<Option<String>>,
}

impl Session {
    pub(crate) fn framework_id(&self) -> Option<FrameworkId> {
        self.framework_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_framework_id(&self, id: FrameworkId) {
        *self
            .framework_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    fn stream_id(&self) -> Option<String> {
        self.stream_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_stream_id(&self, id: String) {
        *self.stream_id.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }
}

/// Sends scheduler calls over HTTP.
pub struct HttpCallSender {
    /// `host:port` of the resource manager.
    address: String,
    session: Arc<Session>,
    conn: Mutex<Option<Connection>>,
}

impl HttpCallSender {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            session: Arc::new(Session::default()),
            conn: Mutex::new(None),
        }
    }

    /// Pre-seed the framework ID, e.g. from the registry before subscribing.
    pub fn with_framework_id(self, id: FrameworkId) -> Self {
        self.session.set_framework_id(id);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open the event stream with a SUBSCRIBE call.
    ///
    /// Uses a dedicated connection that stays open for the lifetime of the
    /// returned [`Subscription`]. `timeout` bounds only the wait for the
    /// response head.
    pub async fn subscribe(&self, call: &Call, timeout: Duration) -> TransportResult<Subscription> {
        let mut conn = open_connection(&self.address).await?;
        let req = self.build_request(call, false)?;

        let response = tokio::time::timeout(timeout, async {
            conn.ready().await?;
            conn.send_request(req).await
        })
        .await
        .map_err(|_| TransportError::Timeout(timeout))??;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(address = %self.address, %status, "subscribe rejected");
            return Err(TransportError::UnexpectedStatus {
                expected: StatusCode::OK,
                actual: status,
            });
        }

        let stream_id = response
            .headers()
            .get(STREAM_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_default();
        if stream_id.is_empty() {
            warn!(address = %self.address, "subscribe response carried no stream id");
        } else {
            self.session.set_stream_id(stream_id.clone());
        }
        info!(address = %self.address, %stream_id, "subscribed");

        // The stream must outlive this call; the dedicated sender is moved in
        // so the connection is not torn down.
        Ok(Subscription::new(
            response.into_body(),
            Arc::clone(&self.session),
            stream_id,
            conn,
        ))
    }

    fn build_request(&self, call: &Call, with_stream_id: bool) -> TransportResult<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(SCHEDULER_PATH)
            .header(HOST, &self.address)
            .header(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .header(ACCEPT, PROTOBUF_CONTENT_TYPE);
        if with_stream_id {
            if let Some(stream_id) = self.session.stream_id() {
                builder = builder.header(STREAM_ID_HEADER, stream_id);
            }
        }
        Ok(builder.body(Full::new(Bytes::from(encode_call(call))))?)
    }

    /// Write the request on the shared connection, reconnecting if it closed.
    async fn dispatch(
        &self,
        req: Request<Full<Bytes>>,
    ) -> TransportResult<impl Future<Output = hyper::Result<hyper::Response<hyper::body::Incoming>>>> {
        let mut guard = self.conn.lock().await;
        if guard.as_ref().is_none_or(|c| c.is_closed()) {
            *guard = Some(open_connection(&self.address).await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(TransportError::Connect {
                address: self.address.clone(),
                reason: "connection unavailable".to_string(),
            });
        };
        if let Err(e) = conn.ready().await {
            *guard = None;
            return Err(e.into());
        }
        Ok(conn.send_request(req))
    }
}

#[async_trait]
impl CallSender for HttpCallSender {
    async fn send(&self, call: &Call, timeout: Duration) -> TransportResult<StatusCode> {
        let req = self.build_request(call, true)?;
        let kind = call.r#type();

        tokio::time::timeout(timeout, async {
            let pending = self.dispatch(req).await?;
            let response = pending.await?;
            let status = response.status();
            // Drain the body so the connection can be reused.
            let body = response.into_body().collect().await?.to_bytes();
            if !status.is_success() {
                debug!(
                    ?kind,
                    %status,
                    body = %String::from_utf8_lossy(&body),
                    "resource manager returned error body"
                );
            }
            Ok::<_, TransportError>(status)
        })
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
    }

    fn framework_id(&self) -> Option<FrameworkId> {
        self.session.framework_id()
    }
}

async fn open_connection(address: &str) -> TransportResult<Connection> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| TransportError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
    let io = TokioIo::new(stream);
    let (sender, conn) = hyper::client::conn::http1::handshake(io).await?;
    let address = address.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(%address, error = %e, "scheduler connection closed");
        }
    });
    Ok(sender)
}
