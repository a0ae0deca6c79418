//! One connection multiplexed across many federations.

use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use federa_codec::{ObjectIdGenerator, Value};
use federa_transport::{
    Connection, ConnectionEvent, Credentials, MemoryConnection, Message, Payload, StreamConnection,
};
use futures::channel::oneshot;
use indexmap::IndexMap;
use tracing::{debug, error, info, trace, warn};

use crate::config::{RetryPolicy, RuntimeConfig};
use crate::error::{Result, RuntimeError};
use crate::federation::{Federation, Outgoing};
use crate::service::{ServiceError, ServiceResult};

struct PendingServiceRequest {
    federation: String,
    service: String,
    reply: oneshot::Sender<ServiceResult>,
}

/// Owns a connection and the federations that share it.
///
/// The runtime is driven by its owner: [`pump`](Self::pump) applies every
/// ready connection event and then [`flush`](Self::flush)es, which gathers
/// each federation's outgoing messages into a single `Messages` packet.
/// Control packets (handshake, authentication, joins and leaves) are sent
/// immediately, after anything already queued.
pub struct Runtime {
    config: RuntimeConfig,
    ids: Arc<ObjectIdGenerator>,
    connection: Option<Box<dyn Connection>>,
    open: bool,
    federations: IndexMap<String, Federation>,
    requests: HashMap<u32, PendingServiceRequest>,
    last_request_id: u32,
    credentials: Option<Credentials>,
    queued: Vec<Message>,
}

impl Runtime {
    /// Create a runtime. The configuration is validated first.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ids: Arc::new(ObjectIdGenerator::new()),
            connection: None,
            open: false,
            federations: IndexMap::new(),
            requests: HashMap::new(),
            last_request_id: 0,
            credentials: None,
            queued: Vec::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn process_id(&self) -> &str {
        &self.config.process_id
    }

    /// Attach a connection and start opening it. A previously attached
    /// connection is closed first.
    pub fn connect<C: Connection + 'static>(&mut self, connection: C) -> Result<()> {
        if self.connection.is_some() {
            self.close()?;
        }
        let mut connection: Box<dyn Connection> = Box::new(connection);
        connection.open()?;
        self.connection = Some(connection);
        debug!(process_id = %self.config.process_id, "runtime connecting");
        Ok(())
    }

    /// Connect over TCP with the configured codec and framing.
    pub fn connect_tcp(&mut self, addr: impl ToSocketAddrs) -> Result<()> {
        let connection =
            StreamConnection::connect_tcp(addr, self.config.codec.clone(), self.config.frame.clone())?;
        self.connect(connection)
    }

    /// Connect to a Unix domain socket with the configured codec and framing.
    #[cfg(unix)]
    pub fn connect_unix(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let stream = std::os::unix::net::UnixStream::connect(path)
            .map_err(federa_transport::TransportError::from)?;
        let connection =
            StreamConnection::unix_with_config(stream, self.config.codec.clone(), self.config.frame.clone())?;
        self.connect(connection)
    }

    /// Connect to an in-process peer built with the configured codec.
    /// Returns the peer's end, not yet opened.
    pub fn connect_memory(&mut self, peer: impl Into<String>) -> Result<MemoryConnection> {
        let (local, remote) =
            MemoryConnection::pair_with_config(self.config.process_id.clone(), peer, self.config.codec.clone());
        self.connect(local)?;
        Ok(remote)
    }

    /// Reopen the attached connection after it closed. Federations are
    /// announced again once it reports `Opened`.
    pub fn reconnect(&mut self) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| RuntimeError::NoSession("reconnect".into()))?;
        connection.open()?;
        Ok(())
    }

    /// Close and detach the connection. In-flight requests are rejected.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        let closed = connection.close();
        self.handle_closed();
        closed.map_err(Into::into)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the attached connection has reported `Opened`.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Store credentials and send them now if the connection is open.
    /// They are sent again after every handshake.
    pub fn authenticate(
        &mut self,
        access_token: impl Into<String>,
        subject_id: impl Into<String>,
        nickname: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Result<()> {
        let credentials = Credentials {
            access_token: access_token.into(),
            subject_id: subject_id.into(),
            nickname: nickname.into(),
            image_url: image_url.into(),
        };
        self.credentials = Some(credentials.clone());
        if self.open {
            self.send_control(Payload::Authenticate(credentials))?;
        }
        Ok(())
    }

    /// Join a federation, announcing it if the connection is open.
    /// Joining twice returns the existing federation.
    pub fn join_federation(&mut self, id: &str) -> Result<&mut Federation> {
        if !self.federations.contains_key(id) {
            self.federations
                .insert(id.to_string(), Federation::new(id, Arc::clone(&self.ids)));
            info!(federation = %id, "joined federation");
            if self.open {
                let added = self.federation_added(id);
                self.send_control(added)?;
            }
        }
        self.federations
            .get_mut(id)
            .ok_or_else(|| RuntimeError::FederationNotFound(id.to_string()))
    }

    /// Leave a federation. Its queued messages are sent first and its
    /// in-flight requests are rejected.
    pub fn leave_federation(&mut self, id: &str) -> Result<()> {
        if !self.federations.contains_key(id) {
            return Err(RuntimeError::FederationNotFound(id.to_string()));
        }
        self.collect_outgoing();
        self.federations.shift_remove(id);
        info!(federation = %id, "left federation");

        let orphaned: Vec<u32> = self
            .requests
            .iter()
            .filter(|(_, request)| request.federation == id)
            .map(|(request_id, _)| *request_id)
            .collect();
        for request_id in orphaned {
            if let Some(request) = self.requests.remove(&request_id) {
                let _ = request.reply.send(Err(ServiceError::federation_not_found()));
            }
        }

        if self.open {
            self.send_control(Payload::FederationRemoved {
                federation: id.to_string(),
                process_id: self.config.process_id.clone(),
            })?;
        }
        Ok(())
    }

    pub fn federation(&self, id: &str) -> Option<&Federation> {
        self.federations.get(id)
    }

    pub fn federation_mut(&mut self, id: &str) -> Option<&mut Federation> {
        self.federations.get_mut(id)
    }

    /// Joined federations in join order.
    pub fn federations(&self) -> impl Iterator<Item = &Federation> {
        self.federations.values()
    }

    /// Number of requests waiting for a reply from the peer.
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn heartbeat(&mut self) -> Result<()> {
        self.send_control(Payload::Heartbeat)
    }

    /// Apply a single connection event.
    pub fn handle_event(&mut self, event: ConnectionEvent) -> Result<()> {
        match event {
            ConnectionEvent::Opened => self.handle_opened(),
            ConnectionEvent::Closed => {
                self.handle_closed();
                Ok(())
            }
            ConnectionEvent::Packet(payload) => {
                self.handle_packet(payload);
                Ok(())
            }
        }
    }

    /// Apply every ready event, then flush. Returns the number of events applied.
    ///
    /// A connection error is logged and returned after the remaining events
    /// (including the `Closed` that follows a fatal error) have been applied.
    pub fn pump(&mut self) -> Result<usize> {
        let mut applied = 0;
        let mut failure = None;
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return Err(RuntimeError::NoSession("pump".into()));
            };
            match connection.poll_event() {
                Ok(Some(event)) => {
                    applied += 1;
                    self.handle_event(event)?;
                }
                Ok(None) => break,
                Err(err) => {
                    error!(error = %err, "connection failed");
                    if failure.is_some() {
                        return Err(err.into());
                    }
                    failure = Some(err);
                }
            }
        }
        self.flush()?;
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(applied),
        }
    }

    /// Send everything the federations have queued as one `Messages` packet.
    pub fn flush(&mut self) -> Result<()> {
        self.forget_abandoned();
        self.collect_outgoing();
        if self.queued.is_empty() {
            return Ok(());
        }
        let Some(connection) = self.connection.as_mut() else {
            warn!(dropped = self.queued.len(), "no session, dropping outgoing messages");
            self.queued.clear();
            return Err(RuntimeError::NoSession("flush".into()));
        };
        let messages = std::mem::take(&mut self.queued);
        trace!(messages = messages.len(), "flushing messages");
        connection.send_packet(&Payload::Messages(messages))?;
        Ok(())
    }

    /// Request a service and drive the connection until the reply arrives.
    pub fn request_service_blocking(
        &mut self,
        federation: &str,
        service: &str,
        value: impl Into<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let mut reply = self
            .federations
            .get_mut(federation)
            .ok_or_else(|| RuntimeError::FederationNotFound(federation.to_string()))?
            .request_service(service, value);
        if let Some(result) = reply.try_take() {
            return result.map_err(RuntimeError::from);
        }
        if self.connection.is_none() {
            self.collect_outgoing();
            return Err(RuntimeError::NoSession(format!("request {service}")));
        }

        let deadline = Instant::now() + timeout;
        loop {
            self.flush()?;
            if let Some(result) = reply.try_take() {
                return result.map_err(RuntimeError::from);
            }
            let now = Instant::now();
            if now >= deadline {
                drop(reply);
                self.forget_abandoned();
                return Err(RuntimeError::Timeout(timeout));
            }
            let Some(connection) = self.connection.as_mut() else {
                drop(reply);
                self.forget_abandoned();
                return Err(RuntimeError::NoSession(format!("request {service}")));
            };
            match connection.wait_event(deadline - now) {
                Ok(Some(event)) => self.handle_event(event)?,
                Ok(None) => {}
                Err(err) => {
                    error!(error = %err, "connection failed, rejecting in-flight requests");
                    self.handle_closed();
                    return Err(err.into());
                }
            }
        }
    }

    /// [`request_service_blocking`](Self::request_service_blocking) retried
    /// under the configured [`RetryPolicy`]. The last failure is returned.
    pub fn request_with_retry(
        &mut self,
        federation: &str,
        service: &str,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let policy = self.config.retry;
        self.request_with_policy(federation, service, value, policy)
    }

    /// Like [`request_with_retry`](Self::request_with_retry) with an explicit policy.
    pub fn request_with_policy(
        &mut self,
        federation: &str,
        service: &str,
        value: impl Into<Value>,
        policy: RetryPolicy,
    ) -> Result<Value> {
        let value = value.into();
        let timeout = self.config.request_timeout;
        let mut attempt = 1;
        loop {
            match self.request_service_blocking(federation, service, value.clone(), timeout) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= policy.max_attempts => return Err(err),
                Err(err) => {
                    debug!(service, attempt, error = %err, "service request failed, retrying");
                    attempt += 1;
                    thread::sleep(policy.delay);
                }
            }
        }
    }

    fn federation_added(&self, id: &str) -> Payload {
        Payload::FederationAdded {
            federation: id.to_string(),
            process_id: self.config.process_id.clone(),
        }
    }

    fn handle_opened(&mut self) -> Result<()> {
        self.open = true;
        info!(process_id = %self.config.process_id, federations = self.federations.len(), "connection open");
        self.send_control(Payload::Handshake {
            process_id: self.config.process_id.clone(),
            process_type: self.config.process_type,
        })?;
        let announcements: Vec<Payload> = self
            .federations
            .keys()
            .map(|id| self.federation_added(id))
            .collect();
        for payload in announcements {
            self.send_control(payload)?;
        }
        if let Some(credentials) = self.credentials.clone() {
            self.send_control(Payload::Authenticate(credentials))?;
        }
        Ok(())
    }

    fn handle_closed(&mut self) {
        if self.open {
            info!("connection closed");
        }
        self.open = false;
        for (request_id, request) in self.requests.drain() {
            trace!(request_id, service = %request.service, "rejecting in-flight request");
            let _ = request.reply.send(Err(ServiceError::connection_closed()));
        }
    }

    fn send_control(&mut self, payload: Payload) -> Result<()> {
        if self.connection.is_none() {
            return Err(RuntimeError::NoSession(format!("{:?}", payload.packet_type())));
        }
        self.flush()?;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| RuntimeError::NoSession(format!("{:?}", payload.packet_type())))?;
        trace!(packet = ?payload.packet_type(), "sending control packet");
        connection.send_packet(&payload)?;
        Ok(())
    }

    /// Move every federation's outbox into the send queue, giving remote
    /// service requests their ids.
    fn collect_outgoing(&mut self) {
        let attached = self.connection.is_some();
        for (federation_id, federation) in self.federations.iter_mut() {
            for outgoing in federation.take_outgoing() {
                match outgoing {
                    Outgoing::Message(message) => self.queued.push(message),
                    Outgoing::Request { service, reply, .. } if !attached => {
                        warn!(federation = %federation_id, service = %service, "no session, rejecting service request");
                        let _ = reply.send(Err(ServiceError::no_session(&service)));
                    }
                    Outgoing::Request {
                        service,
                        value,
                        reply,
                    } => {
                        let request_id = next_request_id(&mut self.last_request_id, &self.requests);
                        self.queued.push(Message::ServiceRequest {
                            federation: federation_id.clone(),
                            service: service.clone(),
                            request_id,
                            value,
                        });
                        self.requests.insert(
                            request_id,
                            PendingServiceRequest {
                                federation: federation_id.clone(),
                                service,
                                reply,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Drop pending requests whose caller no longer holds the reply.
    fn forget_abandoned(&mut self) {
        let before = self.requests.len();
        self.requests.retain(|_, request| !request.reply.is_canceled());
        let forgotten = before - self.requests.len();
        if forgotten > 0 {
            debug!(forgotten, "forgot abandoned service requests");
        }
    }

    fn handle_packet(&mut self, payload: Payload) {
        match payload {
            Payload::Messages(messages) => {
                for message in messages {
                    self.handle_message(message);
                }
            }
            other => trace!(packet = ?other.packet_type(), "ignoring control packet"),
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Null => {}
            Message::ObjectChanges(changes) => match self.federations.get_mut(&changes.federation) {
                Some(federation) => federation.apply_changes(changes),
                None => debug!(federation = %changes.federation, "object changes for unknown federation"),
            },
            Message::EventDispatch {
                federation,
                event,
                value,
            } => match self.federations.get_mut(&federation) {
                Some(target) => target.receive_event(&event, value),
                None => debug!(federation = %federation, event = %event, "event for unknown federation"),
            },
            Message::ServiceRequest {
                federation,
                service,
                request_id,
                value,
            } => {
                let result = match self.federations.get_mut(&federation) {
                    None => Err(ServiceError::unknown_federation(&federation)),
                    Some(target) => target
                        .serve(&service, value)
                        .unwrap_or_else(|| Err(ServiceError::unknown_service(&service))),
                };
                let reply = match result {
                    Ok(value) => Message::ServiceFulfill { request_id, value },
                    Err(err) => {
                        debug!(request_id, service = %service, error = %err, "rejecting service request");
                        Message::ServiceReject {
                            request_id,
                            reason: err.to_reason(),
                        }
                    }
                };
                self.queued.push(reply);
            }
            Message::ServiceFulfill { request_id, value } => self.complete(request_id, Ok(value)),
            Message::ServiceReject { request_id, reason } => {
                self.complete(request_id, Err(ServiceError::from_reason(&reason)))
            }
        }
    }

    fn complete(&mut self, request_id: u32, result: ServiceResult) {
        let Some(request) = self.requests.remove(&request_id) else {
            warn!(request_id, "reply for unknown service request");
            return;
        };
        let result = match self.federations.get_mut(&request.federation) {
            Some(federation) => federation.receive_result(result),
            None => Err(ServiceError::federation_not_found()),
        };
        if request.reply.send(result).is_err() {
            trace!(request_id, service = %request.service, "service reply dropped by caller");
        }
    }
}

/// Next id after `last`, skipping 0 and ids still waiting for a reply.
fn next_request_id(last: &mut u32, pending: &HashMap<u32, PendingServiceRequest>) -> u32 {
    loop {
        *last = last.wrapping_add(1);
        if *last != 0 && !pending.contains_key(last) {
            return *last;
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("process_id", &self.config.process_id)
            .field("connected", &self.connection.is_some())
            .field("open", &self.open)
            .field("federations", &self.federations.len())
            .field("requests", &self.requests.len())
            .field("queued", &self.queued.len())
            .finish()
    }
}
