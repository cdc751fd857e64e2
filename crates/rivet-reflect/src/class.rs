//! Reflected class metadata.
//!
//! A `ClassDef` describes what instances of a class expose to dynamic
//! callers: typed read-write attributes, declared read-only string
//! properties, methods, events, and handler slots. Definitions are built
//! through `ClassBuilder` and registered in a `ClassRegistry`; lookups by
//! member name are O(1) through per-kind index maps.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::func::{DynFunc, Method};
use crate::object::ObjectId;
use crate::signature::Signature;
use crate::value::{DynValue, TypeTag};

/// Id of a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Index into the class registry.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Typed read-write attribute declaration.
#[derive(Debug, Clone)]
pub struct AttrDef {
    /// Member name
    pub name: String,
    /// Declared type tag
    pub tag: TypeTag,
    /// Value a fresh instance starts with
    pub initial: DynValue,
}

/// Declared read-only string property.
#[derive(Debug, Clone)]
pub struct PropDef {
    /// Member name
    pub name: String,
    /// Property text
    pub value: String,
}

/// Named class method.
pub struct MethodDef {
    /// Member name
    pub name: String,
    /// The bound callable
    pub method: Method,
}

/// Named event declaration; each instance owns one event per declaration.
#[derive(Debug, Clone)]
pub struct EventDef {
    /// Member name
    pub name: String,
    /// The event's signature
    pub signature: Signature,
}

/// Factory producing a slot's callable for a given receiver.
pub type SlotFactory = Arc<dyn Fn(ObjectId) -> DynFunc + Send + Sync>;

/// Named handler slot declaration; each instance owns one handler per
/// declaration, optionally backed by a receiver-bound callable.
pub struct SlotDef {
    /// Member name
    pub name: String,
    pub(crate) factory: Option<SlotFactory>,
}

/// Immutable description of a reflected class.
pub struct ClassDef {
    name: String,
    attrs: Vec<AttrDef>,
    props: Vec<PropDef>,
    methods: Vec<MethodDef>,
    events: Vec<EventDef>,
    slots: Vec<SlotDef>,
    attr_index: FxHashMap<String, usize>,
    prop_index: FxHashMap<String, usize>,
    method_index: FxHashMap<String, usize>,
    event_index: FxHashMap<String, usize>,
    slot_index: FxHashMap<String, usize>,
}

impl ClassDef {
    /// Start building a class definition.
    pub fn builder(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_string(),
            attrs: Vec::new(),
            props: Vec::new(),
            methods: Vec::new(),
            events: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute declarations in declaration order.
    pub fn attrs(&self) -> &[AttrDef] {
        &self.attrs
    }

    /// Event declarations in declaration order.
    pub fn events(&self) -> &[EventDef] {
        &self.events
    }

    /// Slot declarations in declaration order.
    pub fn slots(&self) -> &[SlotDef] {
        &self.slots
    }

    /// Attribute index by name.
    pub fn attr_index(&self, name: &str) -> Option<usize> {
        self.attr_index.get(name).copied()
    }

    /// Attribute declaration at index.
    pub fn attr_at(&self, index: usize) -> Option<&AttrDef> {
        self.attrs.get(index)
    }

    /// Declared property text by name.
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.prop_index
            .get(name)
            .map(|i| self.props[*i].value.as_str())
    }

    /// Method index by name.
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.method_index.get(name).copied()
    }

    /// Method declaration at index.
    pub fn method_at(&self, index: usize) -> Option<&MethodDef> {
        self.methods.get(index)
    }

    /// Method declaration by name.
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.method_index(name).and_then(|i| self.methods.get(i))
    }

    /// Event index by name.
    pub fn event_index(&self, name: &str) -> Option<usize> {
        self.event_index.get(name).copied()
    }

    /// Slot index by name.
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slot_index.get(name).copied()
    }
}

/// Fluent builder for `ClassDef`.
pub struct ClassBuilder {
    name: String,
    attrs: Vec<AttrDef>,
    props: Vec<PropDef>,
    methods: Vec<MethodDef>,
    events: Vec<EventDef>,
    slots: Vec<SlotDef>,
}

impl ClassBuilder {
    /// Declare a typed attribute starting at the tag's default value.
    pub fn attr(self, name: &str, tag: TypeTag) -> Self {
        let initial = DynValue::default_for(tag);
        self.attr_with(name, initial)
    }

    /// Declare a typed attribute with an explicit initial value.
    pub fn attr_with(mut self, name: &str, initial: DynValue) -> Self {
        self.attrs.push(AttrDef {
            name: name.to_string(),
            tag: initial.tag(),
            initial,
        });
        self
    }

    /// Declare a read-only string property.
    pub fn prop(mut self, name: &str, value: &str) -> Self {
        self.props.push(PropDef {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Declare a method.
    pub fn method(mut self, name: &str, method: Method) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            method,
        });
        self
    }

    /// Declare an event.
    pub fn event(mut self, name: &str, signature: Signature) -> Self {
        self.events.push(EventDef {
            name: name.to_string(),
            signature,
        });
        self
    }

    /// Declare a handler slot with no callable (observable but inert).
    pub fn slot(mut self, name: &str) -> Self {
        self.slots.push(SlotDef {
            name: name.to_string(),
            factory: None,
        });
        self
    }

    /// Declare a handler slot whose callable is built per receiver.
    pub fn slot_with(
        mut self,
        name: &str,
        factory: impl Fn(ObjectId) -> DynFunc + Send + Sync + 'static,
    ) -> Self {
        self.slots.push(SlotDef {
            name: name.to_string(),
            factory: Some(Arc::new(factory)),
        });
        self
    }

    /// Finalize the definition, building the name lookup maps.
    pub fn build(self) -> ClassDef {
        let index_of = |names: Vec<(usize, String)>| -> FxHashMap<String, usize> {
            names.into_iter().map(|(i, n)| (n, i)).collect()
        };
        let attr_index = index_of(
            self.attrs
                .iter()
                .enumerate()
                .map(|(i, a)| (i, a.name.clone()))
                .collect(),
        );
        let prop_index = index_of(
            self.props
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.name.clone()))
                .collect(),
        );
        let method_index = index_of(
            self.methods
                .iter()
                .enumerate()
                .map(|(i, m)| (i, m.name.clone()))
                .collect(),
        );
        let event_index = index_of(
            self.events
                .iter()
                .enumerate()
                .map(|(i, e)| (i, e.name.clone()))
                .collect(),
        );
        let slot_index = index_of(
            self.slots
                .iter()
                .enumerate()
                .map(|(i, s)| (i, s.name.clone()))
                .collect(),
        );
        ClassDef {
            name: self.name,
            attrs: self.attrs,
            props: self.props,
            methods: self.methods,
            events: self.events,
            slots: self.slots,
            attr_index,
            prop_index,
            method_index,
            event_index,
            slot_index,
        }
    }
}

/// Registry of class definitions with name lookup.
#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<ClassDef>,
    by_name: FxHashMap<String, ClassId>,
}

impl ClassRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class definition. Re-registering a name points the name
    /// at the newest definition.
    pub fn register(&mut self, def: ClassDef) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        if self.by_name.insert(def.name().to_string(), id).is_some() {
            log::warn!("class '{}' re-registered; name now maps to the newest definition", def.name());
        }
        self.classes.push(def);
        id
    }

    /// Definition by id.
    pub fn get(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.index())
    }

    /// Id by class name.
    pub fn by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookups() {
        let def = ClassDef::builder("Unit")
            .attr("hp", TypeTag::Int)
            .attr_with("name", DynValue::Str("grunt".into()))
            .prop("kind", "unit")
            .event("OnChanged", Signature::default())
            .slot("OnNotify")
            .build();

        assert_eq!(def.name(), "Unit");
        assert_eq!(def.attr_index("hp"), Some(0));
        assert_eq!(def.attr_at(1).map(|a| a.tag), Some(TypeTag::Str));
        assert_eq!(def.prop("kind"), Some("unit"));
        assert_eq!(def.event_index("OnChanged"), Some(0));
        assert_eq!(def.slot_index("OnNotify"), Some(0));
        assert_eq!(def.attr_index("missing"), None);
        assert_eq!(def.prop("missing"), None);
    }

    #[test]
    fn test_registry_lookup() {
        let mut reg = ClassRegistry::new();
        let a = reg.register(ClassDef::builder("A").build());
        let b = reg.register(ClassDef::builder("B").build());
        assert_ne!(a, b);
        assert_eq!(reg.by_name("A"), Some(a));
        assert_eq!(reg.by_name("C"), None);
        assert_eq!(reg.get(b).map(|d| d.name()), Some("B"));
        assert_eq!(reg.len(), 2);
    }
}
