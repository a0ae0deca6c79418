//! Service errors and replies.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use federa_codec::{Value, ValueMap};
use futures::channel::oneshot;
use serde::Serialize;

const DEFAULT_ERROR_NAME: &str = "Error";

/// Outcome of a service call.
pub type ServiceResult = std::result::Result<Value, ServiceError>;

/// A serializable service failure.
///
/// Travels on the wire as the reason map `{name, message, stack}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ServiceError {
    pub name: String,
    pub message: String,
    pub stack: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::named(DEFAULT_ERROR_NAME, message)
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    /// Rejection of every in-flight request when the connection closes.
    pub fn connection_closed() -> Self {
        Self::new("connection closed")
    }

    /// Rejection of a request whose federation was left.
    pub fn federation_not_found() -> Self {
        Self::new("federation not found")
    }

    pub(crate) fn unknown_federation(federation: &str) -> Self {
        Self::new(format!("unknown federation: {federation}"))
    }

    pub(crate) fn unknown_service(service: &str) -> Self {
        Self::new(format!("unknown service: {service}"))
    }

    pub(crate) fn no_session(service: &str) -> Self {
        Self::named("NoSession", format!("no session for service request: {service}"))
    }

    /// The wire form of this error.
    pub fn to_reason(&self) -> Value {
        let mut reason = ValueMap::new();
        reason.insert("name".into(), Value::from(self.name.as_str()));
        reason.insert("message".into(), Value::from(self.message.as_str()));
        reason.insert("stack".into(), Value::from(self.stack.as_str()));
        Value::Map(reason)
    }

    /// Interpret a rejection reason received from a peer.
    ///
    /// A map carrying a `message` string keeps its fields. Anything else
    /// becomes an error whose message is the value rendered as JSON.
    pub fn from_reason(reason: &Value) -> Self {
        let text = |key: &str| reason.get(key).and_then(Value::as_str);
        if let Some(message) = text("message").filter(|m| !m.is_empty()) {
            return Self {
                name: text("name").unwrap_or(DEFAULT_ERROR_NAME).to_string(),
                message: message.to_string(),
                stack: text("stack").unwrap_or_default().to_string(),
            };
        }
        let rendered = serde_json::to_string(reason).unwrap_or_else(|_| "null".to_string());
        Self::new(format!("service rejected with {rendered}"))
    }
}

impl From<&str> for ServiceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ServiceError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

enum ReplyState {
    Ready(Option<ServiceResult>),
    Pending(oneshot::Receiver<ServiceResult>),
}

/// The eventual result of [`Federation::request_service`](crate::Federation::request_service).
///
/// Local providers answer immediately. Remote requests complete once the
/// runtime receives the matching fulfil or reject. The reply can be polled
/// with [`try_take`](Self::try_take) or awaited.
pub struct ServiceReply {
    state: ReplyState,
}

impl ServiceReply {
    pub(crate) fn ready(result: ServiceResult) -> Self {
        Self {
            state: ReplyState::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<ServiceResult>) -> Self {
        Self {
            state: ReplyState::Pending(rx),
        }
    }

    /// Take the result if it has arrived. Returns `None` while pending and
    /// after the result has been taken.
    pub fn try_take(&mut self) -> Option<ServiceResult> {
        match &mut self.state {
            ReplyState::Ready(result) => result.take(),
            ReplyState::Pending(rx) => match rx.try_recv() {
                Ok(Some(result)) => {
                    self.state = ReplyState::Ready(None);
                    Some(result)
                }
                Ok(None) => None,
                Err(oneshot::Canceled) => {
                    self.state = ReplyState::Ready(None);
                    Some(Err(ServiceError::connection_closed()))
                }
            },
        }
    }
}

impl Future for ServiceReply {
    type Output = ServiceResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            ReplyState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => Poll::Ready(Err(ServiceError::new("service reply already taken"))),
            },
            ReplyState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(result) => {
                    this.state = ReplyState::Ready(None);
                    Poll::Ready(result.unwrap_or_else(|_| Err(ServiceError::connection_closed())))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl fmt::Debug for ServiceReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            ReplyState::Ready(Some(_)) => "ready",
            ReplyState::Ready(None) => "taken",
            ReplyState::Pending(_) => "pending",
        };
        f.debug_struct("ServiceReply").field("state", &state).finish()
    }
}
