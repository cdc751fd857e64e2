//! Event/handler dispatch: the observer-pattern primitive.
//!
//! Events and handlers live in owning arenas inside `SignalHub` and are
//! addressed by generation-checked ids, so a stale id can never reach a
//! recycled slot. An event keeps an ordered connection list of handler
//! ids (duplicates allowed — connection count is a linear count); each
//! handler keeps the symmetric list of event ids. Connect and disconnect
//! always update both sides within the same call.

use crate::encode::{self, ParamMap};
use crate::error::ReflectError;
use crate::func::DynFunc;
use crate::signature::Signature;
use crate::value::DynValue;

/// Generation-checked id of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    index: u32,
    gen: u32,
}

/// Generation-checked id of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId {
    index: u32,
    gen: u32,
}

struct EventNode {
    sig: Signature,
    connections: Vec<HandlerId>,
}

struct HandlerNode {
    callable: Option<DynFunc>,
    attached: Vec<EventId>,
}

struct EventSlot {
    gen: u32,
    node: Option<EventNode>,
}

struct HandlerSlot {
    gen: u32,
    node: Option<HandlerNode>,
}

/// Owning arena for events and handlers.
#[derive(Default)]
pub struct SignalHub {
    events: Vec<EventSlot>,
    free_events: Vec<u32>,
    handlers: Vec<HandlerSlot>,
    free_handlers: Vec<u32>,
}

impl SignalHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event with the given signature.
    pub fn create_event(&mut self, sig: Signature) -> EventId {
        let node = EventNode {
            sig,
            connections: Vec::new(),
        };
        match self.free_events.pop() {
            Some(index) => {
                let slot = &mut self.events[index as usize];
                slot.node = Some(node);
                EventId {
                    index,
                    gen: slot.gen,
                }
            }
            None => {
                let index = self.events.len() as u32;
                self.events.push(EventSlot {
                    gen: 0,
                    node: Some(node),
                });
                EventId { index, gen: 0 }
            }
        }
    }

    /// Create a handler. A handler without a callable is a valid observer
    /// that is skipped at emission time.
    pub fn create_handler(&mut self, callable: Option<DynFunc>) -> HandlerId {
        let node = HandlerNode {
            callable,
            attached: Vec::new(),
        };
        match self.free_handlers.pop() {
            Some(index) => {
                let slot = &mut self.handlers[index as usize];
                slot.node = Some(node);
                HandlerId {
                    index,
                    gen: slot.gen,
                }
            }
            None => {
                let index = self.handlers.len() as u32;
                self.handlers.push(HandlerSlot {
                    gen: 0,
                    node: Some(node),
                });
                HandlerId { index, gen: 0 }
            }
        }
    }

    fn event_node(&self, id: EventId) -> Option<&EventNode> {
        let slot = self.events.get(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.node.as_ref()
    }

    fn handler_node(&self, id: HandlerId) -> Option<&HandlerNode> {
        let slot = self.handlers.get(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.node.as_ref()
    }

    /// Whether the event id refers to a live event.
    pub fn is_event_alive(&self, id: EventId) -> bool {
        self.event_node(id).is_some()
    }

    /// Whether the handler id refers to a live handler.
    pub fn is_handler_alive(&self, id: HandlerId) -> bool {
        self.handler_node(id).is_some()
    }

    /// The event's signature, when alive.
    pub fn event_signature(&self, id: EventId) -> Option<&Signature> {
        self.event_node(id).map(|n| &n.sig)
    }

    /// The handler's callable signature; None when the handler is dead or
    /// has no callable.
    pub fn handler_signature(&self, id: HandlerId) -> Option<&Signature> {
        self.handler_node(id)?
            .callable
            .as_ref()
            .map(|f| f.signature())
    }

    /// A copy of the handler's callable, when it has one.
    pub fn handler_callable(&self, id: HandlerId) -> Option<DynFunc> {
        self.handler_node(id)?.callable.clone()
    }

    /// Destroy an event, severing every connection from both sides.
    pub fn destroy_event(&mut self, id: EventId) {
        let Some(slot) = self.events.get_mut(id.index as usize) else {
            return;
        };
        if slot.gen != id.gen {
            return;
        }
        let Some(node) = slot.node.take() else {
            return;
        };
        slot.gen = slot.gen.wrapping_add(1);
        self.free_events.push(id.index);
        for hid in node.connections {
            if let Some(hslot) = self.handlers.get_mut(hid.index as usize) {
                if hslot.gen == hid.gen {
                    if let Some(hnode) = hslot.node.as_mut() {
                        // One pass removes every pair entry for this event.
                        hnode.attached.retain(|e| *e != id);
                    }
                }
            }
        }
    }

    /// Destroy a handler, severing every connection from both sides.
    pub fn destroy_handler(&mut self, id: HandlerId) {
        let Some(slot) = self.handlers.get_mut(id.index as usize) else {
            return;
        };
        if slot.gen != id.gen {
            return;
        }
        let Some(node) = slot.node.take() else {
            return;
        };
        slot.gen = slot.gen.wrapping_add(1);
        self.free_handlers.push(id.index);
        for eid in node.attached {
            if let Some(eslot) = self.events.get_mut(eid.index as usize) {
                if eslot.gen == eid.gen {
                    if let Some(enode) = eslot.node.as_mut() {
                        enode.connections.retain(|h| *h != id);
                    }
                }
            }
        }
    }

    /// Connect a handler to an event. Connecting twice creates two
    /// observable entries; emission then invokes the handler twice.
    pub fn connect(&mut self, event: EventId, handler: HandlerId) -> Result<(), ReflectError> {
        if self.handler_node(handler).is_none() {
            return Err(ReflectError::DeadHandler);
        }
        match self
            .events
            .get_mut(event.index as usize)
            .filter(|s| s.gen == event.gen)
            .and_then(|s| s.node.as_mut())
        {
            Some(enode) => enode.connections.push(handler),
            None => return Err(ReflectError::DeadEvent),
        }
        if let Some(hnode) = self
            .handlers
            .get_mut(handler.index as usize)
            .filter(|s| s.gen == handler.gen)
            .and_then(|s| s.node.as_mut())
        {
            hnode.attached.push(event);
        }
        Ok(())
    }

    /// Disconnect one connection pair; removes the first matching entry
    /// from both sides. No-op when the pair is not connected.
    pub fn disconnect(&mut self, event: EventId, handler: HandlerId) {
        let Some(eslot) = self.events.get_mut(event.index as usize) else {
            return;
        };
        if eslot.gen != event.gen {
            return;
        }
        let Some(enode) = eslot.node.as_mut() else {
            return;
        };
        let Some(pos) = enode.connections.iter().position(|h| *h == handler) else {
            return;
        };
        enode.connections.remove(pos);

        if let Some(hslot) = self.handlers.get_mut(handler.index as usize) {
            if hslot.gen == handler.gen {
                if let Some(hnode) = hslot.node.as_mut() {
                    if let Some(pos) = hnode.attached.iter().position(|e| *e == event) {
                        hnode.attached.remove(pos);
                    }
                }
            }
        }
    }

    /// Number of connections on an event (a linear count — duplicates
    /// included); 0 when the event is dead.
    pub fn connection_count(&self, event: EventId) -> usize {
        self.event_node(event).map(|n| n.connections.len()).unwrap_or(0)
    }

    /// The event's connection list in connection order.
    pub fn connections(&self, event: EventId) -> &[HandlerId] {
        self.event_node(event)
            .map(|n| n.connections.as_slice())
            .unwrap_or(&[])
    }

    /// The events a handler is attached to, in attachment order.
    pub fn attachments(&self, handler: HandlerId) -> &[EventId] {
        self.handler_node(handler)
            .map(|n| n.attached.as_slice())
            .unwrap_or(&[])
    }

    /// Emit an event with typed arguments. Handlers run in connection
    /// order; handlers without a callable are skipped.
    pub fn emit(&self, event: EventId, args: &[DynValue]) {
        let Some(node) = self.event_node(event) else {
            return;
        };
        for hid in &node.connections {
            if let Some(hnode) = self.handler_node(*hid) {
                if let Some(callable) = &hnode.callable {
                    callable.call_args(args);
                }
            }
        }
    }

    /// Emit with string-encoded arguments; malformed text fills defaults.
    pub fn emit_encoded(&self, event: EventId, text: &str) {
        let Some(sig) = self.event_signature(event) else {
            return;
        };
        let args = encode::decode_args(sig, text);
        self.emit(event, &args);
    }

    /// Emit with document-encoded arguments.
    pub fn emit_doc(&self, event: EventId, doc: &ParamMap) {
        let Some(sig) = self.event_signature(event) else {
            return;
        };
        let args = encode::decode_doc(sig, doc);
        self.emit(event, &args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeTag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_handler(hub: &mut SignalHub) -> (HandlerId, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let f = DynFunc::wrap0(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hub.create_handler(Some(f)), hits)
    }

    #[test]
    fn test_connect_is_symmetric() {
        let mut hub = SignalHub::new();
        let e = hub.create_event(Signature::default());
        let (h, _) = counting_handler(&mut hub);

        hub.connect(e, h).unwrap();
        assert_eq!(hub.connections(e), &[h]);
        assert_eq!(hub.attachments(h), &[e]);

        hub.disconnect(e, h);
        assert!(hub.connections(e).is_empty());
        assert!(hub.attachments(h).is_empty());
    }

    #[test]
    fn test_duplicate_connections_count_and_fire_twice() {
        let mut hub = SignalHub::new();
        let e = hub.create_event(Signature::default());
        let (h, hits) = counting_handler(&mut hub);

        hub.connect(e, h).unwrap();
        hub.connect(e, h).unwrap();
        assert_eq!(hub.connection_count(e), 2);

        hub.emit(e, &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        // Disconnect removes exactly one pair entry.
        hub.disconnect(e, h);
        assert_eq!(hub.connection_count(e), 1);
        assert_eq!(hub.attachments(h).len(), 1);
    }

    #[test]
    fn test_disconnect_unconnected_is_noop() {
        let mut hub = SignalHub::new();
        let e = hub.create_event(Signature::default());
        let (h, _) = counting_handler(&mut hub);
        hub.disconnect(e, h);
        assert_eq!(hub.connection_count(e), 0);
    }

    #[test]
    fn test_callable_less_handler_is_skipped() {
        let mut hub = SignalHub::new();
        let e = hub.create_event(Signature::default());
        let silent = hub.create_handler(None);
        let (h, hits) = counting_handler(&mut hub);
        hub.connect(e, silent).unwrap();
        hub.connect(e, h).unwrap();
        hub.emit(e, &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_event_severs_both_sides() {
        let mut hub = SignalHub::new();
        let e = hub.create_event(Signature::default());
        let (h, _) = counting_handler(&mut hub);
        hub.connect(e, h).unwrap();
        hub.connect(e, h).unwrap();

        hub.destroy_event(e);
        assert!(!hub.is_event_alive(e));
        assert!(hub.attachments(h).is_empty());
        // Stale id operations are safe no-ops.
        assert_eq!(hub.connection_count(e), 0);
        hub.emit(e, &[]);
    }

    #[test]
    fn test_destroy_handler_severs_both_sides() {
        let mut hub = SignalHub::new();
        let e = hub.create_event(Signature::default());
        let (h, _) = counting_handler(&mut hub);
        hub.connect(e, h).unwrap();
        hub.destroy_handler(h);
        assert!(!hub.is_handler_alive(h));
        assert_eq!(hub.connection_count(e), 0);
    }

    #[test]
    fn test_stale_generation_does_not_reach_recycled_slot() {
        let mut hub = SignalHub::new();
        let e1 = hub.create_event(Signature::default());
        hub.destroy_event(e1);
        let e2 = hub.create_event(Signature::new(TypeTag::Void, &[TypeTag::Int]));
        // Slot is reused, generation differs.
        assert!(!hub.is_event_alive(e1));
        assert!(hub.is_event_alive(e2));
        assert_ne!(e1, e2);
    }

    #[test]
    fn test_emit_encoded_fills_defaults() {
        let mut hub = SignalHub::new();
        let seen = Arc::new(AtomicUsize::new(123));
        let s = seen.clone();
        let f = DynFunc::wrap1(move |v: i32| {
            s.store(v as usize, Ordering::SeqCst);
        });
        let e = hub.create_event(Signature::new(TypeTag::Void, &[TypeTag::Int]));
        let h = hub.create_handler(Some(f));
        hub.connect(e, h).unwrap();

        hub.emit_encoded(e, "garbage ; not json");
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        hub.emit_encoded(e, r#"{"arg0":55}"#);
        assert_eq!(seen.load(Ordering::SeqCst), 55);
    }
}
