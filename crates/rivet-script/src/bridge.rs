//! The bridge proper: member resolution on wrappers, wrapper checkout,
//! native call dispatch, and the global-function namespace tables.
//!
//! Resolution follows the first-match-wins order: typed attribute →
//! declared property → method → event → handler slot → nil. Misses are
//! silent (optionally logged at debug level) — exploratory scripting must
//! never fault. All operations against an orphaned wrapper resolve to nil
//! or report false; nothing here panics across the boundary.

use rustc_hash::FxHashMap;

use rivet_reflect::{DynFunc, EventId, HandlerId, ObjectId, World};

use crate::context::ContextOptions;
use crate::error::ScriptError;
use crate::marshal;
use crate::value::ScriptValue;
use crate::wrapper::{EventOp, WrapperBody, WrapperHandle, WrapperPools};

/// One registered global function.
struct GlobalRecord {
    name: String,
    namespace: String,
    func: DynFunc,
}

#[derive(Default)]
struct NamespaceNode {
    children: FxHashMap<String, NamespaceNode>,
    funcs: FxHashMap<String, DynFunc>,
}

/// Registration records plus the namespace tables they are bound into.
///
/// The records are the durable registration state; the tables are rebuilt
/// from them on every `set_source_code`.
#[derive(Default)]
pub(crate) struct GlobalTable {
    records: Vec<GlobalRecord>,
    root: NamespaceNode,
}

impl GlobalTable {
    pub(crate) fn add(&mut self, name: &str, namespace: &str, func: DynFunc) {
        Self::bind(&mut self.root, name, namespace, &func);
        self.records.push(GlobalRecord {
            name: name.to_string(),
            namespace: namespace.to_string(),
            func,
        });
    }

    fn bind(root: &mut NamespaceNode, name: &str, namespace: &str, func: &DynFunc) {
        let mut node = root;
        if !namespace.is_empty() {
            for part in namespace.split('.') {
                node = node.children.entry(part.to_string()).or_default();
            }
        }
        node.funcs.insert(name.to_string(), func.clone());
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.root = NamespaceNode::default();
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Re-bind every record into a fresh namespace table.
    pub(crate) fn rebuild(&mut self) {
        self.root = NamespaceNode::default();
        for record in &self.records {
            Self::bind(&mut self.root, &record.name, &record.namespace, &record.func);
        }
    }

    /// Resolve through an explicit namespace string, with diagnostics for
    /// each way the path can miss.
    pub(crate) fn lookup(&self, namespace: &str, name: &str) -> Result<DynFunc, ScriptError> {
        let mut node = &self.root;
        if !namespace.is_empty() {
            for part in namespace.split('.') {
                node = node
                    .children
                    .get(part)
                    .ok_or_else(|| ScriptError::UnknownNamespace(namespace.to_string()))?;
            }
        }
        node.funcs.get(name).cloned().ok_or_else(|| {
            let full = if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{namespace}.{name}")
            };
            ScriptError::UnknownFunction(full)
        })
    }

    /// Resolve a dotted path (namespace parts plus the function name).
    pub(crate) fn lookup_path(&self, path: &[String]) -> Option<DynFunc> {
        let (name, namespaces) = path.split_last()?;
        let mut node = &self.root;
        for part in namespaces {
            node = node.children.get(part.as_str())?;
        }
        node.funcs.get(name.as_str()).cloned()
    }
}

/// What a member name resolved to on an object wrapper.
enum Resolved {
    Attr(rivet_reflect::DynValue),
    Prop(String),
    Method(usize),
    Event(EventId),
    Slot(HandlerId),
    Miss,
}

/// Native world + wrapper pools + registered globals: everything the
/// interpreter and the call protocol drive.
pub(crate) struct Bridge {
    pub(crate) world: World,
    pub(crate) pools: WrapperPools,
    pub(crate) globals: GlobalTable,
    pub(crate) opts: ContextOptions,
}

impl Bridge {
    pub(crate) fn new(world: World, opts: ContextOptions) -> Self {
        Self {
            world,
            pools: WrapperPools::new(opts.initial_pool_capacity),
            globals: GlobalTable::default(),
            opts,
        }
    }

    pub(crate) fn into_world(self) -> World {
        self.world
    }

    /// Check an object wrapper out of the pool, taking a strong reference
    /// on the native object. A null/dead target yields nil, not a wrapper.
    pub(crate) fn wrap_object(&mut self, id: ObjectId) -> ScriptValue {
        if !self.world.is_alive(id) {
            return ScriptValue::Nil;
        }
        self.world.retain(id);
        ScriptValue::Wrapper(self.pools.checkout(WrapperBody::Object { target: id }))
    }

    /// Check a handler wrapper out of the pool.
    pub(crate) fn wrap_handler(&mut self, handler: HandlerId) -> ScriptValue {
        if !self.world.signals().is_handler_alive(handler) {
            return ScriptValue::Nil;
        }
        ScriptValue::Wrapper(self.pools.checkout(WrapperBody::Handler { handler }))
    }

    fn miss(&self, kind: &str, name: &str) -> ScriptValue {
        if self.opts.log_resolution_misses {
            log::debug!("unresolved {kind} member '{name}'");
        }
        ScriptValue::Nil
    }

    /// Resolve a member name on a wrapper value.
    pub(crate) fn resolve_member(&mut self, handle: &WrapperHandle, name: &str) -> ScriptValue {
        let Some(body) = self.pools.body_of(handle).copied() else {
            return ScriptValue::Nil;
        };
        match body {
            WrapperBody::Object { target } => self.resolve_object_member(target, name),
            WrapperBody::Event { event } => match name {
                "connect" => ScriptValue::Wrapper(self.pools.checkout(WrapperBody::EventMethod {
                    event,
                    op: EventOp::Connect,
                })),
                "disconnect" => {
                    ScriptValue::Wrapper(self.pools.checkout(WrapperBody::EventMethod {
                        event,
                        op: EventOp::Disconnect,
                    }))
                }
                _ => self.miss("event", name),
            },
            WrapperBody::Method { .. }
            | WrapperBody::Handler { .. }
            | WrapperBody::EventMethod { .. } => self.miss(body.kind().name(), name),
        }
    }

    fn resolve_object_member(&mut self, target: ObjectId, name: &str) -> ScriptValue {
        // Orphaned wrapper: the native object is gone, resolution is nil.
        let Some(class) = self.world.objects().class_of(target) else {
            return ScriptValue::Nil;
        };
        let resolved = {
            let Some(def) = self.world.class(class) else {
                return ScriptValue::Nil;
            };
            if let Some(value) = self.world.attr(target, name) {
                Resolved::Attr(value)
            } else if let Some(text) = def.prop(name) {
                Resolved::Prop(text.to_string())
            } else if let Some(index) = def.method_index(name) {
                Resolved::Method(index)
            } else if let Some(event) = self.world.event(target, name) {
                Resolved::Event(event)
            } else if let Some(handler) = self.world.slot_handler(target, name) {
                Resolved::Slot(handler)
            } else {
                Resolved::Miss
            }
        };
        match resolved {
            Resolved::Attr(value) => {
                marshal::dyn_to_script(&mut self.world, &mut self.pools, &value)
            }
            Resolved::Prop(text) => ScriptValue::Str(text),
            Resolved::Method(index) => {
                ScriptValue::Wrapper(self.pools.checkout(WrapperBody::Method {
                    target,
                    class,
                    index,
                }))
            }
            Resolved::Event(event) => {
                ScriptValue::Wrapper(self.pools.checkout(WrapperBody::Event { event }))
            }
            Resolved::Slot(handler) => {
                ScriptValue::Wrapper(self.pools.checkout(WrapperBody::Handler { handler }))
            }
            Resolved::Miss => self.miss("object", name),
        }
    }

    /// Write an attribute through an object wrapper. Returns false on any
    /// miss (wrong wrapper kind, orphaned target, unknown attribute).
    pub(crate) fn set_member(
        &mut self,
        handle: &WrapperHandle,
        name: &str,
        value: &ScriptValue,
    ) -> bool {
        let Some(WrapperBody::Object { target }) = self.pools.body_of(handle).copied() else {
            return false;
        };
        let Some(class) = self.world.objects().class_of(target) else {
            return false;
        };
        let tag = {
            let Some(def) = self.world.class(class) else {
                return false;
            };
            let Some(index) = def.attr_index(name) else {
                if self.opts.log_resolution_misses {
                    log::debug!("assignment to unknown attribute '{name}'");
                }
                return false;
            };
            def.attr_at(index).map(|a| a.tag)
        };
        let Some(tag) = tag else {
            return false;
        };
        let dyn_value = marshal::script_to_dyn(&self.pools, tag, value);
        self.world.set_attr(target, name, dyn_value).is_ok()
    }

    /// Invoke a registered native callable with script arguments. A
    /// callable with unknown parameter shapes goes through the document
    /// fallback encoding.
    pub(crate) fn call_native(&mut self, func: &DynFunc, args: &[ScriptValue]) -> ScriptValue {
        let ret = if func.signature().has_unknown_params() {
            let doc = marshal::script_args_to_doc(func.signature(), args);
            func.call_doc(&doc)
        } else {
            let dyn_args = marshal::script_args_to_dyn(&self.pools, func.signature(), args);
            func.call_args(&dyn_args)
        };
        marshal::dyn_to_script(&mut self.world, &mut self.pools, &ret)
    }

    /// Invoke a callable wrapper (method, handler, or event pseudo-method).
    pub(crate) fn call_wrapper(
        &mut self,
        handle: &WrapperHandle,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let Some(body) = self.pools.body_of(handle).copied() else {
            return Ok(ScriptValue::Nil);
        };
        match body {
            WrapperBody::Method {
                target,
                class,
                index,
            } => {
                if !self.world.is_alive(target) {
                    return Ok(ScriptValue::Nil);
                }
                let Some(method) = self
                    .world
                    .class(class)
                    .and_then(|def| def.method_at(index))
                    .map(|m| m.method.clone())
                else {
                    return Ok(ScriptValue::Nil);
                };
                let dyn_args = marshal::script_args_to_dyn(&self.pools, method.signature(), args);
                let ret = method.call_args(&mut self.world, target, &dyn_args);
                Ok(marshal::dyn_to_script(
                    &mut self.world,
                    &mut self.pools,
                    &ret,
                ))
            }
            WrapperBody::Handler { handler } => {
                match self.world.signals().handler_callable(handler) {
                    Some(func) => Ok(self.call_native(&func, args)),
                    None => Ok(ScriptValue::Nil),
                }
            }
            WrapperBody::EventMethod { event, op } => {
                Ok(ScriptValue::Bool(self.event_op(event, op, args)))
            }
            WrapperBody::Object { .. } | WrapperBody::Event { .. } => Err(ScriptError::Runtime(
                format!("a {} wrapper is not callable", body.kind().name()),
            )),
        }
    }

    /// Built-in connect/disconnect. Validates handler-vs-event signature
    /// compatibility before mutating connections; rejections are logged.
    fn event_op(&mut self, event: EventId, op: EventOp, args: &[ScriptValue]) -> bool {
        let Some(first) = args.first() else {
            log::warn!("{}: expected a handler argument", op_name(op));
            return false;
        };
        let Some(handle) = first.as_wrapper() else {
            log::warn!("{}: argument is not a handler wrapper", op_name(op));
            return false;
        };
        let Some(WrapperBody::Handler { handler }) = self.pools.body_of(handle).copied() else {
            log::warn!("{}: argument is not a handler wrapper", op_name(op));
            return false;
        };
        let signals = self.world.signals_mut();
        match op {
            EventOp::Connect => {
                let compatible = match (
                    signals.event_signature(event),
                    signals.handler_signature(handler),
                ) {
                    (Some(event_sig), Some(handler_sig)) => event_sig.compatible(handler_sig),
                    // Nothing to validate against; liveness is checked below.
                    _ => true,
                };
                if !compatible {
                    log::warn!(
                        "rejected connect: handler signature {} does not match event signature {}",
                        signals
                            .handler_signature(handler)
                            .map(|s| s.display())
                            .unwrap_or_default(),
                        signals
                            .event_signature(event)
                            .map(|s| s.display())
                            .unwrap_or_default(),
                    );
                    return false;
                }
                match signals.connect(event, handler) {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("rejected connect: {e}");
                        false
                    }
                }
            }
            EventOp::Disconnect => {
                if !signals.is_event_alive(event) || !signals.is_handler_alive(handler) {
                    return false;
                }
                signals.disconnect(event, handler);
                true
            }
        }
    }

    /// Resolve a dotted call path against the namespace tables.
    pub(crate) fn lookup_global_path(&self, path: &[String]) -> Option<DynFunc> {
        self.globals.lookup_path(path)
    }

    /// Drain the wrapper release queue; reclaimed object wrappers drop
    /// their native strong reference here.
    pub(crate) fn collect_released(&mut self) {
        for body in self.pools.drain_released() {
            if let WrapperBody::Object { target } = body {
                self.world.release(target);
            }
        }
    }
}

fn op_name(op: EventOp) -> &'static str {
    match op {
        EventOp::Connect => "connect",
        EventOp::Disconnect => "disconnect",
    }
}
