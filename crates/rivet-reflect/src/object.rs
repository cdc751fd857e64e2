//! Reflected object instances and the `World` facade.
//!
//! Objects live in a generational arena with per-slot strong reference
//! counts. Destruction is explicit and synchronous: `destroy` tears down
//! the instance's events and handler slots before returning, so no caller
//! can observe a half-destroyed object. A destroyed slot stays pinned
//! while strong references remain (a script wrapper holds one), and is
//! recycled only when the count reaches zero.

use std::fmt;

use crate::class::{ClassDef, ClassId, ClassRegistry, SlotFactory};
use crate::encode::ParamMap;
use crate::error::ReflectError;
use crate::signal::{EventId, HandlerId, SignalHub};
use crate::value::DynValue;

/// Generation-checked id of a reflected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    index: u32,
    gen: u32,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.gen)
    }
}

struct ObjectBody {
    class: ClassId,
    attrs: Vec<DynValue>,
    events: Vec<EventId>,
    slots: Vec<HandlerId>,
}

struct ObjectSlot {
    gen: u32,
    strong: u32,
    body: Option<ObjectBody>,
}

/// Generational arena of object instances.
#[derive(Default)]
pub struct ObjectRegistry {
    slots: Vec<ObjectSlot>,
    free: Vec<u32>,
}

impl ObjectRegistry {
    fn reserve(&mut self) -> ObjectId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.strong = 1;
                ObjectId {
                    index,
                    gen: slot.gen,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(ObjectSlot {
                    gen: 0,
                    strong: 1,
                    body: None,
                });
                ObjectId { index, gen: 0 }
            }
        }
    }

    fn slot(&self, id: ObjectId) -> Option<&ObjectSlot> {
        self.slots.get(id.index as usize).filter(|s| s.gen == id.gen)
    }

    fn slot_mut(&mut self, id: ObjectId) -> Option<&mut ObjectSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.gen == id.gen)
    }

    fn body(&self, id: ObjectId) -> Option<&ObjectBody> {
        self.slot(id).and_then(|s| s.body.as_ref())
    }

    fn body_mut(&mut self, id: ObjectId) -> Option<&mut ObjectBody> {
        self.slot_mut(id).and_then(|s| s.body.as_mut())
    }

    /// Whether the id refers to a live (not destroyed) object.
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.body(id).is_some()
    }

    /// Strong reference count of the slot; 0 for stale ids.
    pub fn strong_count(&self, id: ObjectId) -> u32 {
        self.slot(id).map(|s| s.strong).unwrap_or(0)
    }

    /// Take one strong reference. Allowed on destroyed-but-pinned slots;
    /// false for stale ids.
    pub fn retain(&mut self, id: ObjectId) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.strong += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one strong reference. When the count reaches zero the body (if
    /// any remains) is returned for teardown and the slot is recycled.
    fn release_raw(&mut self, id: ObjectId) -> Option<ObjectBody> {
        let slot = self.slot_mut(id)?;
        if slot.strong == 0 {
            return None;
        }
        slot.strong -= 1;
        if slot.strong > 0 {
            return None;
        }
        let body = slot.body.take();
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(id.index);
        body
    }

    /// Take the body out for explicit destruction, keeping the slot pinned
    /// while strong references remain.
    fn destroy_raw(&mut self, id: ObjectId) -> Option<ObjectBody> {
        let slot = self.slot_mut(id)?;
        let body = slot.body.take()?;
        if slot.strong == 0 {
            slot.gen = slot.gen.wrapping_add(1);
            self.free.push(id.index);
        }
        Some(body)
    }

    /// Class of a live object.
    pub fn class_of(&self, id: ObjectId) -> Option<ClassId> {
        self.body(id).map(|b| b.class)
    }

    /// Number of slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// The native side of the bridge: class registry, object arena, and the
/// signal hub, behind one explicit handle (no hidden statics).
#[derive(Default)]
pub struct World {
    classes: ClassRegistry,
    objects: ObjectRegistry,
    signals: SignalHub,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class definition.
    pub fn register_class(&mut self, def: ClassDef) -> ClassId {
        self.classes.register(def)
    }

    /// Class definition by id.
    pub fn class(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id)
    }

    /// Class id by name.
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.classes.by_name(name)
    }

    /// The signal hub.
    pub fn signals(&self) -> &SignalHub {
        &self.signals
    }

    /// The signal hub, mutably.
    pub fn signals_mut(&mut self) -> &mut SignalHub {
        &mut self.signals
    }

    /// The object arena (read access).
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    /// Spawn an instance of a class. The caller holds the initial strong
    /// reference; instance events and handler slots are created here.
    pub fn spawn(&mut self, class: ClassId) -> Result<ObjectId, ReflectError> {
        // Clone what the instance needs out of the definition first; the
        // definition borrow cannot be held across arena mutation.
        let (attrs, event_sigs, slot_factories) = {
            let def = self
                .classes
                .get(class)
                .ok_or_else(|| ReflectError::UnknownClass(format!("#{}", class.index())))?;
            let attrs: Vec<DynValue> = def.attrs().iter().map(|a| a.initial.clone()).collect();
            let event_sigs: Vec<_> = def.events().iter().map(|e| e.signature.clone()).collect();
            let slot_factories: Vec<Option<SlotFactory>> =
                def.slots().iter().map(|s| s.factory.clone()).collect();
            (attrs, event_sigs, slot_factories)
        };

        let id = self.objects.reserve();
        let events = event_sigs
            .into_iter()
            .map(|sig| self.signals.create_event(sig))
            .collect();
        let slots = slot_factories
            .into_iter()
            .map(|factory| self.signals.create_handler(factory.map(|f| f(id))))
            .collect();
        if let Some(slot) = self.objects.slot_mut(id) {
            slot.body = Some(ObjectBody {
                class,
                attrs,
                events,
                slots,
            });
        }
        Ok(id)
    }

    /// Spawn by class name.
    pub fn spawn_by_name(&mut self, name: &str) -> Result<ObjectId, ReflectError> {
        let class = self
            .class_by_name(name)
            .ok_or_else(|| ReflectError::UnknownClass(name.to_string()))?;
        self.spawn(class)
    }

    /// Whether the id refers to a live object.
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.objects.is_alive(id)
    }

    /// Take one strong reference.
    pub fn retain(&mut self, id: ObjectId) -> bool {
        self.objects.retain(id)
    }

    /// Drop one strong reference; the last one destroys the object.
    pub fn release(&mut self, id: ObjectId) {
        if let Some(body) = self.objects.release_raw(id) {
            self.teardown(body);
        }
    }

    /// Strong reference count.
    pub fn strong_count(&self, id: ObjectId) -> u32 {
        self.objects.strong_count(id)
    }

    /// Explicitly destroy an object. Instance events and handler slots are
    /// torn down synchronously before this returns; outstanding strong
    /// references keep the slot pinned (wrappers observe an orphan, never
    /// a recycled slot).
    pub fn destroy(&mut self, id: ObjectId) {
        if let Some(body) = self.objects.destroy_raw(id) {
            self.teardown(body);
        }
    }

    fn teardown(&mut self, body: ObjectBody) {
        for event in body.events {
            self.signals.destroy_event(event);
        }
        for handler in body.slots {
            self.signals.destroy_handler(handler);
        }
    }

    /// Read an attribute by name.
    pub fn attr(&self, id: ObjectId, name: &str) -> Option<DynValue> {
        let body = self.objects.body(id)?;
        let def = self.classes.get(body.class)?;
        let index = def.attr_index(name)?;
        body.attrs.get(index).cloned()
    }

    /// Write an attribute by name; the value is coerced to the declared
    /// tag.
    pub fn set_attr(&mut self, id: ObjectId, name: &str, value: DynValue) -> Result<(), ReflectError> {
        let class = self
            .objects
            .class_of(id)
            .ok_or(ReflectError::DeadObject(id))?;
        let (index, tag) = {
            let def = self
                .classes
                .get(class)
                .ok_or(ReflectError::DeadObject(id))?;
            let index = def
                .attr_index(name)
                .ok_or_else(|| ReflectError::UnknownAttribute {
                    class: def.name().to_string(),
                    name: name.to_string(),
                })?;
            (index, def.attr_at(index).map(|a| a.tag))
        };
        let coerced = match tag {
            Some(tag) => value.coerce(tag),
            None => value,
        };
        if let Some(body) = self.objects.body_mut(id) {
            if let Some(slot) = body.attrs.get_mut(index) {
                *slot = coerced;
            }
        }
        Ok(())
    }

    /// Read a declared property by name.
    pub fn prop(&self, id: ObjectId, name: &str) -> Option<&str> {
        let body = self.objects.body(id)?;
        self.classes.get(body.class)?.prop(name)
    }

    /// Instance event id by declaration name.
    pub fn event(&self, id: ObjectId, name: &str) -> Option<EventId> {
        let body = self.objects.body(id)?;
        let def = self.classes.get(body.class)?;
        let index = def.event_index(name)?;
        body.events.get(index).copied()
    }

    /// Instance handler slot id by declaration name.
    pub fn slot_handler(&self, id: ObjectId, name: &str) -> Option<HandlerId> {
        let body = self.objects.body(id)?;
        let def = self.classes.get(body.class)?;
        let index = def.slot_index(name)?;
        body.slots.get(index).copied()
    }

    /// Invoke a method by name with positional arguments.
    pub fn call_method(
        &mut self,
        id: ObjectId,
        name: &str,
        args: &[DynValue],
    ) -> Result<DynValue, ReflectError> {
        let class = self
            .objects
            .class_of(id)
            .ok_or(ReflectError::DeadObject(id))?;
        let method = {
            let def = self
                .classes
                .get(class)
                .ok_or(ReflectError::DeadObject(id))?;
            def.method(name)
                .map(|m| m.method.clone())
                .ok_or_else(|| ReflectError::UnknownMethod {
                    class: def.name().to_string(),
                    name: name.to_string(),
                })?
        };
        Ok(method.call_args(self, id, args))
    }

    /// Emit an instance event by name with typed arguments.
    pub fn emit(&self, id: ObjectId, name: &str, args: &[DynValue]) -> Result<(), ReflectError> {
        let event = self.event(id, name).ok_or(ReflectError::DeadEvent)?;
        self.signals.emit(event, args);
        Ok(())
    }

    /// Emit an instance event with string-encoded arguments.
    pub fn emit_encoded(&self, id: ObjectId, name: &str, text: &str) -> Result<(), ReflectError> {
        let event = self.event(id, name).ok_or(ReflectError::DeadEvent)?;
        self.signals.emit_encoded(event, text);
        Ok(())
    }

    /// Emit an instance event with document-encoded arguments.
    pub fn emit_doc(&self, id: ObjectId, name: &str, doc: &ParamMap) -> Result<(), ReflectError> {
        let event = self.event(id, name).ok_or(ReflectError::DeadEvent)?;
        self.signals.emit_doc(event, doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassDef;
    use crate::func::{DynFunc, Method};
    use crate::signature::Signature;
    use crate::value::TypeTag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn unit_class() -> ClassDef {
        ClassDef::builder("Unit")
            .attr_with("hp", DynValue::Int(100))
            .prop("kind", "unit")
            .event("OnChanged", Signature::default())
            .build()
    }

    #[test]
    fn test_spawn_and_attr_access() {
        let mut world = World::new();
        let class = world.register_class(unit_class());
        let id = world.spawn(class).unwrap();

        assert!(world.is_alive(id));
        assert_eq!(world.attr(id, "hp"), Some(DynValue::Int(100)));
        assert_eq!(world.prop(id, "kind"), Some("unit"));

        world.set_attr(id, "hp", DynValue::Int(42)).unwrap();
        assert_eq!(world.attr(id, "hp"), Some(DynValue::Int(42)));

        // Writes are coerced to the declared tag.
        world.set_attr(id, "hp", DynValue::Str("7".into())).unwrap();
        assert_eq!(world.attr(id, "hp"), Some(DynValue::Int(7)));
    }

    #[test]
    fn test_destroy_is_synchronous_and_safe() {
        let mut world = World::new();
        let class = world.register_class(unit_class());
        let id = world.spawn(class).unwrap();
        let event = world.event(id, "OnChanged").unwrap();

        world.retain(id); // simulate a wrapper's strong reference
        world.destroy(id);

        assert!(!world.is_alive(id));
        assert!(!world.signals().is_event_alive(event));
        assert_eq!(world.attr(id, "hp"), None);
        assert!(world.set_attr(id, "hp", DynValue::Int(1)).is_err());
        // Slot stays pinned by the outstanding strong reference.
        assert_eq!(world.strong_count(id), 2);
    }

    #[test]
    fn test_release_to_zero_destroys() {
        let mut world = World::new();
        let class = world.register_class(unit_class());
        let id = world.spawn(class).unwrap();
        let event = world.event(id, "OnChanged").unwrap();

        world.release(id);
        assert!(!world.is_alive(id));
        assert!(!world.signals().is_event_alive(event));
        assert_eq!(world.strong_count(id), 0);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut world = World::new();
        let class = world.register_class(unit_class());
        let a = world.spawn(class).unwrap();
        world.release(a);
        let b = world.spawn(class).unwrap();
        assert_ne!(a, b);
        assert!(!world.is_alive(a));
        assert!(world.is_alive(b));
        assert_eq!(world.objects().capacity(), 1);
    }

    #[test]
    fn test_method_call_mutates_receiver() {
        let heal = Method::new(
            Signature::new(TypeTag::Int, &[TypeTag::Int]),
            |world, receiver, params| {
                let amount = params.arg_int(0);
                let hp = world
                    .attr(receiver, "hp")
                    .map(|v| v.as_int())
                    .unwrap_or(0);
                let healed = hp + amount;
                let _ = world.set_attr(receiver, "hp", DynValue::Int(healed));
                params.set_return(DynValue::Int(healed));
            },
        );
        let class_def = ClassDef::builder("Unit")
            .attr_with("hp", DynValue::Int(10))
            .method("Heal", heal)
            .build();

        let mut world = World::new();
        let class = world.register_class(class_def);
        let id = world.spawn(class).unwrap();
        let out = world.call_method(id, "Heal", &[DynValue::Int(5)]).unwrap();
        assert_eq!(out, DynValue::Int(15));
        assert_eq!(world.attr(id, "hp"), Some(DynValue::Int(15)));
    }

    #[test]
    fn test_slot_factory_binds_receiver() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let class_def = ClassDef::builder("Listener")
            .slot_with("OnNotify", move |receiver| {
                let h = h.clone();
                DynFunc::wrap0(move || {
                    // The receiver id is baked into the callable.
                    let _ = receiver;
                    h.fetch_add(1, Ordering::SeqCst);
                })
            })
            .build();

        let mut world = World::new();
        let class = world.register_class(class_def);
        let id = world.spawn(class).unwrap();
        let handler = world.slot_handler(id, "OnNotify").unwrap();

        let event = world.signals_mut().create_event(Signature::default());
        world.signals_mut().connect(event, handler).unwrap();
        world.signals().emit(event, &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_by_name() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let mut world = World::new();
        let class = world.register_class(unit_class());
        let id = world.spawn(class).unwrap();

        let f = DynFunc::wrap0(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let handler = world.signals_mut().create_handler(Some(f));
        let event = world.event(id, "OnChanged").unwrap();
        world.signals_mut().connect(event, handler).unwrap();

        world.emit(id, "OnChanged", &[]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(world.emit(id, "NoSuchEvent", &[]).is_err());
    }
}
