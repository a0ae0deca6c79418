//! Replicated object instances.

use std::collections::HashSet;

use federa_codec::{ObjectId, Value, ValueMap};

/// One replicated object as seen by its federation.
///
/// An instance starts as a stub the first time its id is referenced and
/// becomes defined once it has been created and everything it references
/// is defined. The `changed` flags are only set while observers run.
#[derive(Debug, Clone)]
pub struct ObjectInstance {
    id: ObjectId,
    class_name: Option<String>,
    properties: ValueMap,
    changed: HashSet<String>,
    defined: bool,
    defined_changed: bool,
}

impl ObjectInstance {
    pub(crate) fn stub(id: ObjectId) -> Self {
        Self {
            id,
            class_name: None,
            properties: ValueMap::new(),
            changed: HashSet::new(),
            defined: false,
            defined_changed: false,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Class name, once known. The first message naming a class wins.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &ValueMap {
        &self.properties
    }

    /// Whether `name` changed in the notification being delivered.
    pub fn is_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// True during the notification that defines or deletes this instance.
    pub fn defined_changed(&self) -> bool {
        self.defined_changed
    }

    /// True during the notification that deletes this instance.
    pub fn is_deleted(&self) -> bool {
        self.defined_changed && !self.defined
    }

    pub(crate) fn assign_class(&mut self, class_name: &str) -> bool {
        if self.class_name.is_some() || class_name.is_empty() {
            return false;
        }
        self.class_name = Some(class_name.to_string());
        true
    }

    pub(crate) fn set(&mut self, name: String, value: Value) {
        self.properties.insert(name, value);
    }

    pub(crate) fn mark_changed(&mut self, name: &str) {
        self.changed.insert(name.to_string());
    }

    /// Flag every declared and every held property as changed.
    pub(crate) fn mark_all_changed(&mut self, declared: &[String]) {
        self.changed.extend(declared.iter().cloned());
        self.changed.extend(self.properties.keys().cloned());
    }

    pub(crate) fn set_defined(&mut self, defined: bool) {
        self.defined = defined;
        self.defined_changed = true;
    }

    /// Reset the per-notification flags.
    pub(crate) fn settle(&mut self) {
        self.changed.clear();
        self.defined_changed = false;
    }

    /// Whether any held reference, however deeply nested, fails `resolved`.
    pub(crate) fn has_unresolved(&self, resolved: &mut impl FnMut(ObjectId) -> bool) -> bool {
        self.properties
            .values()
            .any(|value| value.any_object(&mut |id| !resolved(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; 12])
    }

    #[test]
    fn class_is_assigned_once() {
        let mut instance = ObjectInstance::stub(id(1));
        assert!(!instance.assign_class(""));
        assert!(instance.assign_class("Unit"));
        assert!(!instance.assign_class("Tile"));
        assert_eq!(instance.class_name(), Some("Unit"));
    }

    #[test]
    fn nested_references_are_checked() {
        let mut instance = ObjectInstance::stub(id(1));
        let mut inner = ValueMap::new();
        inner.insert("target".into(), Value::Object(id(3)));
        instance.set("path".into(), Value::Array(vec![Value::Object(id(2)), Value::Map(inner)]));

        assert!(instance.has_unresolved(&mut |other| other == id(2)));
        assert!(!instance.has_unresolved(&mut |other| other == id(2) || other == id(3)));
    }

    #[test]
    fn flags_settle_after_notification() {
        let mut instance = ObjectInstance::stub(id(1));
        instance.set("hp".into(), Value::from(3));
        instance.mark_all_changed(&["name".to_string()]);
        instance.set_defined(true);
        assert!(instance.is_changed("hp") && instance.is_changed("name"));
        assert!(instance.defined_changed() && !instance.is_deleted());

        instance.settle();
        assert!(!instance.is_changed("hp") && !instance.defined_changed());
        assert!(instance.is_defined());
    }
}
