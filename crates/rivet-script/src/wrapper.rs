//! Script-visible wrappers for native reflected entities, with pooled
//! backing storage.
//!
//! A wrapper value held by the script engine is a lightweight
//! `WrapperHandle` — kind, slot index, generation — plus a shared drop
//! guard. The actual state (`WrapperBody`) lives in a per-kind pool slot.
//! When the last handle clone drops, the guard enqueues the slot on the
//! release queue; the bridge drains that queue after every evaluation and
//! returns the slot to its pool's free list. Drop timing therefore only
//! decides *when* a slot is recycled, never whether an access is safe:
//! every access is generation-checked.
//!
//! Pool policy is the fast-pool one: slots are created on demand past the
//! initial capacity and are never deallocated; checkout and reclaim are
//! O(1) against the free list.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use rivet_reflect::{ClassId, EventId, HandlerId, ObjectId};

/// The five wrapper kinds, one pool each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    /// Wraps a native object (holds a strong reference while checked out)
    Object,
    /// Wraps a method of a wrapped object
    Method,
    /// Wraps an instance event of a wrapped object
    Event,
    /// Wraps a handler
    Handler,
    /// Composite connect/disconnect accessor of an event wrapper
    EventMethod,
}

impl WrapperKind {
    /// All kinds, in pool order.
    pub const ALL: [WrapperKind; 5] = [
        WrapperKind::Object,
        WrapperKind::Method,
        WrapperKind::Event,
        WrapperKind::Handler,
        WrapperKind::EventMethod,
    ];

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            WrapperKind::Object => "object",
            WrapperKind::Method => "method",
            WrapperKind::Event => "event",
            WrapperKind::Handler => "handler",
            WrapperKind::EventMethod => "event-method",
        }
    }

    const fn pool_index(self) -> usize {
        match self {
            WrapperKind::Object => 0,
            WrapperKind::Method => 1,
            WrapperKind::Event => 2,
            WrapperKind::Handler => 3,
            WrapperKind::EventMethod => 4,
        }
    }
}

/// Built-in operation an `EventMethod` wrapper performs when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOp {
    Connect,
    Disconnect,
}

/// Pool-resident wrapper state.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WrapperBody {
    Object {
        target: ObjectId,
    },
    Method {
        target: ObjectId,
        class: ClassId,
        index: usize,
    },
    Event {
        event: EventId,
    },
    Handler {
        handler: HandlerId,
    },
    EventMethod {
        event: EventId,
        op: EventOp,
    },
}

impl WrapperBody {
    pub(crate) fn kind(&self) -> WrapperKind {
        match self {
            WrapperBody::Object { .. } => WrapperKind::Object,
            WrapperBody::Method { .. } => WrapperKind::Method,
            WrapperBody::Event { .. } => WrapperKind::Event,
            WrapperBody::Handler { .. } => WrapperKind::Handler,
            WrapperBody::EventMethod { .. } => WrapperKind::EventMethod,
        }
    }
}

/// A wrapper slot queued for reclamation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReleasedWrapper {
    kind: WrapperKind,
    index: u32,
    gen: u32,
}

/// Shared queue of released wrapper slots, drained by the bridge.
pub(crate) type ReleaseQueue = Arc<Mutex<Vec<ReleasedWrapper>>>;

struct WrapperGuard {
    kind: WrapperKind,
    index: u32,
    gen: u32,
    queue: ReleaseQueue,
}

impl Drop for WrapperGuard {
    fn drop(&mut self) {
        self.queue.lock().push(ReleasedWrapper {
            kind: self.kind,
            index: self.index,
            gen: self.gen,
        });
    }
}

/// Script-side wrapper value: generation-checked address of a pool slot.
///
/// Clones share one drop guard; the slot is queued for reclamation when
/// the last clone is dropped.
#[derive(Clone)]
pub struct WrapperHandle {
    kind: WrapperKind,
    index: u32,
    gen: u32,
    guard: Arc<WrapperGuard>,
}

impl WrapperHandle {
    /// The wrapper's kind.
    pub fn kind(&self) -> WrapperKind {
        self.kind
    }

    /// Index of the backing pool slot. Stable for the lifetime of the
    /// handle; exposed for identity checks.
    pub fn slot_index(&self) -> u32 {
        self.index
    }

    pub(crate) fn generation(&self) -> u32 {
        self.gen
    }
}

impl PartialEq for WrapperHandle {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.index == other.index && self.gen == other.gen
    }
}

impl fmt::Debug for WrapperHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WrapperHandle({} #{}@{})",
            self.kind.name(),
            self.index,
            self.gen
        )
    }
}

struct WrapperSlot {
    gen: u32,
    body: Option<WrapperBody>,
}

/// Fixed-kind wrapper pool: a slot arena plus a free list.
pub(crate) struct WrapperPool {
    kind: WrapperKind,
    slots: Vec<WrapperSlot>,
    free: Vec<u32>,
}

impl WrapperPool {
    fn new(kind: WrapperKind, initial_capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(initial_capacity);
        let mut free = Vec::with_capacity(initial_capacity);
        for i in 0..initial_capacity {
            slots.push(WrapperSlot { gen: 0, body: None });
            free.push(i as u32);
        }
        Self { kind, slots, free }
    }

    fn checkout(&mut self, body: WrapperBody, queue: &ReleaseQueue) -> WrapperHandle {
        debug_assert_eq!(body.kind(), self.kind);
        let (index, gen) = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.body = Some(body);
                (index, slot.gen)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(WrapperSlot {
                    gen: 0,
                    body: Some(body),
                });
                (index, 0)
            }
        };
        WrapperHandle {
            kind: self.kind,
            index,
            gen,
            guard: Arc::new(WrapperGuard {
                kind: self.kind,
                index,
                gen,
                queue: queue.clone(),
            }),
        }
    }

    fn body(&self, index: u32, gen: u32) -> Option<&WrapperBody> {
        self.slots
            .get(index as usize)
            .filter(|s| s.gen == gen)
            .and_then(|s| s.body.as_ref())
    }

    /// Return a slot to the free list. Stale (generation-mismatched)
    /// releases are ignored, so a slot can never be freed twice.
    fn reclaim(&mut self, index: u32, gen: u32) -> Option<WrapperBody> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.gen != gen {
            return None;
        }
        let body = slot.body.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(index);
        Some(body)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// One pool per wrapper kind, sharing a single release queue.
pub(crate) struct WrapperPools {
    pools: [WrapperPool; 5],
    queue: ReleaseQueue,
}

impl WrapperPools {
    pub(crate) fn new(initial_capacity: usize) -> Self {
        Self {
            pools: [
                WrapperPool::new(WrapperKind::Object, initial_capacity),
                WrapperPool::new(WrapperKind::Method, initial_capacity),
                WrapperPool::new(WrapperKind::Event, initial_capacity),
                WrapperPool::new(WrapperKind::Handler, initial_capacity),
                WrapperPool::new(WrapperKind::EventMethod, initial_capacity),
            ],
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn checkout(&mut self, body: WrapperBody) -> WrapperHandle {
        let kind = body.kind();
        let queue = self.queue.clone();
        self.pools[kind.pool_index()].checkout(body, &queue)
    }

    pub(crate) fn body_of(&self, handle: &WrapperHandle) -> Option<&WrapperBody> {
        self.pools[handle.kind().pool_index()].body(handle.slot_index(), handle.generation())
    }

    /// Drain the release queue, returning the reclaimed bodies so the
    /// caller can drop native strong references.
    pub(crate) fn drain_released(&mut self) -> Vec<WrapperBody> {
        let released: Vec<ReleasedWrapper> = std::mem::take(&mut *self.queue.lock());
        released
            .into_iter()
            .filter_map(|r| self.pools[r.kind.pool_index()].reclaim(r.index, r.gen))
            .collect()
    }

    /// Total slots ever created for a kind (pools never shrink).
    pub(crate) fn capacity(&self, kind: WrapperKind) -> usize {
        self.pools[kind.pool_index()].capacity()
    }

    /// Slots currently checked out for a kind.
    pub(crate) fn in_use(&self, kind: WrapperKind) -> usize {
        self.pools[kind.pool_index()].in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_id_fixture() -> ObjectId {
        // Any live-looking id works; pools never dereference it.
        let mut world = rivet_reflect::World::new();
        let class = world.register_class(rivet_reflect::ClassDef::builder("T").build());
        world.spawn(class).unwrap()
    }

    #[test]
    fn test_checkout_uses_prewarmed_slots() {
        let mut pools = WrapperPools::new(4);
        let id = object_id_fixture();
        let h = pools.checkout(WrapperBody::Object { target: id });
        assert_eq!(pools.capacity(WrapperKind::Object), 4);
        assert_eq!(pools.in_use(WrapperKind::Object), 1);
        assert!(pools.body_of(&h).is_some());
    }

    #[test]
    fn test_pool_reuse_preserves_slot_identity() {
        let mut pools = WrapperPools::new(0);
        let id = object_id_fixture();

        let first: Vec<u32> = (0..5)
            .map(|_| pools.checkout(WrapperBody::Object { target: id }).slot_index())
            .collect();
        // All handles dropped above; reclaim them.
        let reclaimed = pools.drain_released();
        assert_eq!(reclaimed.len(), 5);

        let mut second: Vec<u32> = (0..5)
            .map(|_| pools.checkout(WrapperBody::Object { target: id }).slot_index())
            .collect();
        let mut expected = first.clone();
        expected.sort_unstable();
        second.sort_unstable();
        assert_eq!(second, expected);
        // No growth past the original five slots.
        assert_eq!(pools.capacity(WrapperKind::Object), 5);
    }

    #[test]
    fn test_stale_handle_resolves_to_nothing() {
        let mut pools = WrapperPools::new(1);
        let id = object_id_fixture();
        let h = pools.checkout(WrapperBody::Object { target: id });
        let stale = h.clone();
        drop(h);
        drop(stale);
        assert_eq!(pools.drain_released().len(), 1);

        // Slot is reused under a new generation; the old address is dead.
        let fresh = pools.checkout(WrapperBody::Object { target: id });
        assert_eq!(fresh.slot_index(), 0);
        assert!(pools.body_of(&fresh).is_some());
    }

    #[test]
    fn test_clones_share_one_release() {
        let mut pools = WrapperPools::new(1);
        let id = object_id_fixture();
        let h = pools.checkout(WrapperBody::Object { target: id });
        let c1 = h.clone();
        let c2 = h.clone();
        drop(h);
        drop(c1);
        assert!(pools.drain_released().is_empty());
        drop(c2);
        assert_eq!(pools.drain_released().len(), 1);
        // Double-drain finds nothing.
        assert!(pools.drain_released().is_empty());
    }

    #[test]
    fn test_kinds_use_distinct_pools() {
        let mut pools = WrapperPools::new(0);
        let id = object_id_fixture();
        let _o = pools.checkout(WrapperBody::Object { target: id });
        let mut world = rivet_reflect::World::new();
        let handler = world.signals_mut().create_handler(None);
        let _h = pools.checkout(WrapperBody::Handler { handler });
        assert_eq!(pools.in_use(WrapperKind::Object), 1);
        assert_eq!(pools.in_use(WrapperKind::Handler), 1);
        assert_eq!(pools.in_use(WrapperKind::Method), 0);
    }
}
