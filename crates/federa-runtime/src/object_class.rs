//! Per-class property declarations and observers.

use std::fmt;

use crate::object::ObjectInstance;

/// Callback invoked when an instance of a class is defined, updated or deleted.
pub type Observer = Box<dyn FnMut(&ObjectInstance) + Send>;

/// Handle returned by [`ObjectClass::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A named class within one federation.
///
/// Holds the declared property names and the observers notified about the
/// class's instances. Instances themselves live in the federation.
pub struct ObjectClass {
    name: String,
    property_names: Vec<String>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl ObjectClass {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property_names: Vec::new(),
            observers: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare property names. Already declared names are ignored.
    pub fn define<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.property_names.contains(&name) {
                self.property_names.push(name);
            }
        }
        self
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&ObjectInstance) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn notify(&mut self, instance: &ObjectInstance) {
        for (_, observer) in &mut self.observers {
            observer(instance);
        }
    }
}

impl fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectClass")
            .field("name", &self.name)
            .field("property_names", &self.property_names)
            .field("observers", &self.observers.len())
            .finish()
    }
}
