//! The replication engine for one federation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use federa_codec::{ObjectId, ObjectIdGenerator, Value, ValueMap};
use federa_transport::{Message, ObjectChange, ObjectChanges};
use futures::channel::oneshot;
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::error::{Result, RuntimeError};
use crate::object::ObjectInstance;
use crate::object_class::ObjectClass;
use crate::service::{ServiceError, ServiceReply, ServiceResult};

/// Callback for a named event.
pub type EventObserver = Box<dyn FnMut(&Value) + Send>;

/// Synchronous handler for a named service.
pub type ServiceProvider = Box<dyn Fn(Value) -> ServiceResult + Send>;

/// Work a federation hands to its runtime.
pub enum Outgoing {
    Message(Message),
    /// A service request that still needs a request id.
    Request {
        service: String,
        value: Value,
        reply: oneshot::Sender<ServiceResult>,
    },
}

impl fmt::Debug for Outgoing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outgoing::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Outgoing::Request { service, value, .. } => f
                .debug_struct("Request")
                .field("service", service)
                .field("value", value)
                .finish(),
        }
    }
}

/// A namespace of replicated objects, events and services.
///
/// Incoming changes go through [`apply_changes`](Self::apply_changes).
/// Local mutations, events and remote service requests are queued in an
/// outbox that the owning [`Runtime`](crate::Runtime) drains on flush.
pub struct Federation {
    id: String,
    ids: Arc<ObjectIdGenerator>,
    instances: IndexMap<ObjectId, ObjectInstance>,
    pending: Vec<ObjectId>,
    classes: HashMap<String, ObjectClass>,
    event_observers: HashMap<String, EventObserver>,
    providers: HashMap<String, ServiceProvider>,
    outbox: Vec<Outgoing>,
}

impl Federation {
    pub fn new(id: impl Into<String>, ids: Arc<ObjectIdGenerator>) -> Self {
        Self {
            id: id.into(),
            ids,
            instances: IndexMap::new(),
            pending: Vec::new(),
            classes: HashMap::new(),
            event_observers: HashMap::new(),
            providers: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The class named `name`, created on first use.
    pub fn object_class(&mut self, name: &str) -> &mut ObjectClass {
        self.classes
            .entry(name.to_string())
            .or_insert_with(|| ObjectClass::new(name))
    }

    pub fn class(&self, name: &str) -> Option<&ObjectClass> {
        self.classes.get(name)
    }

    /// Apply one incoming change message.
    pub fn apply_changes(&mut self, changes: ObjectChanges) {
        let ObjectChanges {
            object: id,
            class_name,
            change,
            properties,
            ..
        } = changes;
        trace!(federation = %self.id, object = %id, change = ?change, "applying object changes");

        for value in properties.values() {
            self.register_refs(value);
        }

        let instance = self
            .instances
            .entry(id)
            .or_insert_with(|| ObjectInstance::stub(id));
        if instance.assign_class(&class_name) {
            self.classes
                .entry(class_name.clone())
                .or_insert_with(|| ObjectClass::new(class_name.as_str()));
        }

        let deleted = change == ObjectChange::Delete;
        match change {
            ObjectChange::Create if instance.is_defined() => {
                warn!(federation = %self.id, object = %id, "create for an already defined object");
            }
            ObjectChange::Create => {
                if !self.pending.contains(&id) {
                    self.pending.push(id);
                }
            }
            ObjectChange::Delete => instance.set_defined(false),
            ObjectChange::Update => {}
        }

        for (name, value) in properties {
            if change != ObjectChange::Create {
                instance.mark_changed(&name);
            }
            instance.set(name, value);
        }

        if deleted || instance.is_defined() {
            self.notify(id);
        }
        if deleted {
            self.instances.shift_remove(&id);
            self.pending.retain(|pending| *pending != id);
        } else if let Some(instance) = self.instances.get_mut(&id) {
            instance.settle();
        }

        self.define_pending();
    }

    fn register_refs(&mut self, value: &Value) {
        let instances = &mut self.instances;
        value.for_each_object(&mut |id| {
            instances
                .entry(id)
                .or_insert_with(|| ObjectInstance::stub(id));
        });
    }

    fn is_defined(&self, id: ObjectId) -> bool {
        self.instances.get(&id).is_some_and(ObjectInstance::is_defined)
    }

    fn notify(&mut self, id: ObjectId) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        let Some(class_name) = instance.class_name() else {
            return;
        };
        if let Some(class) = self.classes.get_mut(class_name) {
            class.notify(instance);
        }
    }

    /// Define pending instances whose references are all defined.
    ///
    /// Ready instances are taken one at a time in pending order. When none
    /// is ready, the largest group of pending instances that only reference
    /// defined instances or each other is defined together.
    fn define_pending(&mut self) {
        loop {
            let ready = self.pending.iter().position(|id| {
                self.instances
                    .get(id)
                    .is_some_and(|instance| !instance.has_unresolved(&mut |other| self.is_defined(other)))
            });
            if let Some(index) = ready {
                let id = self.pending.remove(index);
                self.define(&[id]);
                continue;
            }

            let group = self.closed_group();
            if group.is_empty() {
                return;
            }
            debug!(federation = %self.id, objects = group.len(), "defining mutually referencing objects");
            self.pending.retain(|id| !group.contains(id));
            self.define(&group);
        }
    }

    /// Largest subset of pending instances closed under references to
    /// undefined instances.
    fn closed_group(&self) -> Vec<ObjectId> {
        let mut group: HashSet<ObjectId> = self
            .pending
            .iter()
            .copied()
            .filter(|id| self.instances.contains_key(id))
            .collect();
        loop {
            let before = group.len();
            let excluded: Vec<ObjectId> = group
                .iter()
                .copied()
                .filter(|id| {
                    self.instances.get(id).is_some_and(|instance| {
                        instance.has_unresolved(&mut |other| self.is_defined(other) || group.contains(&other))
                    })
                })
                .collect();
            for id in excluded {
                group.remove(&id);
            }
            if group.len() == before {
                break;
            }
        }
        self.pending
            .iter()
            .copied()
            .filter(|id| group.contains(id))
            .collect()
    }

    fn define(&mut self, group: &[ObjectId]) {
        for id in group {
            if let Some(instance) = self.instances.get_mut(id) {
                instance.set_defined(true);
            }
        }
        for id in group {
            let declared = self
                .instances
                .get(id)
                .and_then(ObjectInstance::class_name)
                .and_then(|name| self.classes.get(name))
                .map(|class| class.property_names().to_vec())
                .unwrap_or_default();
            if let Some(instance) = self.instances.get_mut(id) {
                instance.mark_all_changed(&declared);
            }
            trace!(federation = %self.id, object = %id, "object defined");
            self.notify(*id);
            if let Some(instance) = self.instances.get_mut(id) {
                instance.settle();
            }
        }
    }

    /// Create a local instance. It is defined immediately; the peer receives
    /// a CREATE followed by one UPDATE per property.
    pub fn create(&mut self, class_name: &str, properties: ValueMap) -> ObjectId {
        let id = self.ids.generate();
        self.object_class(class_name);

        let mut instance = ObjectInstance::stub(id);
        instance.assign_class(class_name);
        instance.set_defined(true);
        instance.settle();
        self.instances.insert(id, instance);

        self.emit(Message::ObjectChanges(ObjectChanges::new(
            self.id.as_str(),
            id,
            class_name,
            ObjectChange::Create,
        )));
        for (name, value) in properties {
            self.write_property(id, class_name, name, value);
        }
        id
    }

    /// Write one property locally and send it to the peer.
    pub fn set_property(&mut self, id: ObjectId, name: &str, value: impl Into<Value>) -> Result<()> {
        let class_name = self
            .instances
            .get(&id)
            .ok_or(RuntimeError::ObjectNotFound(id))?
            .class_name()
            .unwrap_or_default()
            .to_string();
        self.write_property(id, &class_name, name.to_string(), value.into());
        Ok(())
    }

    fn write_property(&mut self, id: ObjectId, class_name: &str, name: String, value: Value) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.set(name.clone(), value.clone());
        }
        self.emit(Message::ObjectChanges(
            ObjectChanges::new(self.id.as_str(), id, class_name, ObjectChange::Update)
                .with_property(name, value),
        ));
    }

    /// Delete a local instance and tell the peer. Local observers are not notified.
    pub fn delete(&mut self, id: ObjectId) -> Result<()> {
        let instance = self
            .instances
            .shift_remove(&id)
            .ok_or(RuntimeError::ObjectNotFound(id))?;
        self.pending.retain(|pending| *pending != id);
        self.emit(Message::ObjectChanges(ObjectChanges::new(
            self.id.as_str(),
            id,
            instance.class_name().unwrap_or_default(),
            ObjectChange::Delete,
        )));
        Ok(())
    }

    /// Any known instance, defined or not.
    pub fn get(&self, id: ObjectId) -> Option<&ObjectInstance> {
        self.instances.get(&id)
    }

    /// Defined instances of `class_name`, in the order they became known.
    pub fn instances<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a ObjectInstance> + 'a {
        self.instances
            .values()
            .filter(move |instance| instance.is_defined() && instance.class_name() == Some(class_name))
    }

    pub fn find(
        &self,
        class_name: &str,
        mut predicate: impl FnMut(&ObjectInstance) -> bool,
    ) -> Option<&ObjectInstance> {
        self.instances.values().find(|instance| {
            instance.is_defined() && instance.class_name() == Some(class_name) && predicate(instance)
        })
    }

    /// First instance of any class, defined or not, matching `predicate`.
    pub fn find_object(&self, mut predicate: impl FnMut(&ObjectInstance) -> bool) -> Option<&ObjectInstance> {
        self.instances.values().find(|instance| predicate(instance))
    }

    /// Number of instances known, including stubs.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Register the observer for `name`, replacing any previous one.
    pub fn observe_event(&mut self, name: impl Into<String>, observer: impl FnMut(&Value) + Send + 'static) {
        self.event_observers.insert(name.into(), Box::new(observer));
    }

    /// Deliver an event to the local observer and to the peer.
    pub fn dispatch_event(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        self.deliver_event(name, &value);
        self.emit(Message::EventDispatch {
            federation: self.id.clone(),
            event: name.to_string(),
            value,
        });
    }

    pub(crate) fn receive_event(&mut self, name: &str, value: Value) {
        self.register_refs(&value);
        self.deliver_event(name, &value);
    }

    fn deliver_event(&mut self, name: &str, value: &Value) {
        match self.event_observers.get_mut(name) {
            Some(observer) => observer(value),
            None => trace!(federation = %self.id, event = name, "no observer for event"),
        }
    }

    /// Register the provider for `name`, replacing any previous one.
    pub fn provide_service(
        &mut self,
        name: impl Into<String>,
        provider: impl Fn(Value) -> ServiceResult + Send + 'static,
    ) {
        self.providers.insert(name.into(), Box::new(provider));
    }

    /// Call a service. A local provider answers immediately; otherwise the
    /// request is sent to the peer on the next flush.
    pub fn request_service(&mut self, name: &str, value: impl Into<Value>) -> ServiceReply {
        let value = value.into();
        if let Some(provider) = self.providers.get(name) {
            return ServiceReply::ready(provider(value));
        }
        let (reply, rx) = oneshot::channel();
        self.outbox.push(Outgoing::Request {
            service: name.to_string(),
            value,
            reply,
        });
        ServiceReply::pending(rx)
    }

    /// Run a request from the peer. `None` means no provider is registered.
    pub(crate) fn serve(&mut self, name: &str, value: Value) -> Option<ServiceResult> {
        self.register_refs(&value);
        let provider = self.providers.get(name)?;
        Some(provider(value))
    }

    pub(crate) fn receive_result(&mut self, result: ServiceResult) -> ServiceResult {
        if let Ok(value) = &result {
            self.register_refs(value);
        }
        result
    }

    fn emit(&mut self, message: Message) {
        self.outbox.push(Outgoing::Message(message));
    }

    /// Whether anything is waiting to be sent.
    pub fn has_outgoing(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Take everything queued for the peer, in submission order.
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }
}

impl fmt::Debug for Federation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Federation")
            .field("id", &self.id)
            .field("instances", &self.instances.len())
            .field("pending", &self.pending.len())
            .field("classes", &self.classes.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}
