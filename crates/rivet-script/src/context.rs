//! The script context: engine lifecycle, host registration surface, and
//! the begin/push/end/get-return call protocol.
//!
//! A `ScriptContext` is the explicit engine handle: create one around a
//! `World`, register global functions while the engine is in its setup
//! phase, then `set_source_code` compiles and runs the script (closing
//! registration). `shutdown` hands the world back. There is no hidden
//! global state anywhere in the engine.

use std::sync::Arc;

use rivet_reflect::{DynFunc, HandlerId, ObjectId, World};

use crate::ast::Program;
use crate::bridge::Bridge;
use crate::error::ScriptError;
use crate::interp::Interp;
use crate::parser;
use crate::value::ScriptValue;
use crate::wrapper::WrapperKind;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Wrapper pool slots pre-created per kind; pools grow past this on
    /// demand and never shrink.
    pub initial_pool_capacity: usize,
    /// Maximum arguments one protocol call may push.
    pub max_call_args: usize,
    /// Log member-resolution misses at debug level.
    pub log_resolution_misses: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            initial_pool_capacity: 8,
            max_call_args: 16,
            log_resolution_misses: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Registration open; no source loaded yet.
    Setup,
    /// Source has been compiled at least once; registration closed.
    Live,
}

#[derive(Clone)]
enum CallTarget {
    Native(DynFunc),
    Script(String),
}

/// One in-flight protocol call: the resolved target, the pushed argument
/// stack, and (after `end_call`) the pending result. This is the call's
/// scratch state; it is released when the return value is extracted.
struct ActiveCall {
    name: String,
    target: CallTarget,
    args: Vec<ScriptValue>,
    result: Option<ScriptValue>,
}

/// The embedded engine handle.
pub struct ScriptContext {
    phase: Phase,
    bridge: Bridge,
    interp: Interp,
    program: Option<Arc<Program>>,
    pinned: Vec<(String, ObjectId)>,
    call: Option<ActiveCall>,
    last: ScriptValue,
}

impl ScriptContext {
    /// Create a context around a world with default options.
    pub fn new(world: World) -> Self {
        Self::with_options(world, ContextOptions::default())
    }

    /// Create a context with explicit options.
    pub fn with_options(world: World, options: ContextOptions) -> Self {
        Self {
            phase: Phase::Setup,
            bridge: Bridge::new(world, options),
            interp: Interp::new(),
            program: None,
            pinned: Vec::new(),
            call: None,
            last: ScriptValue::Nil,
        }
    }

    /// Tear the engine down and hand the world back. Engine-held wrappers
    /// are reclaimed and their native strong references released first.
    pub fn shutdown(mut self) -> World {
        self.call = None;
        self.last = ScriptValue::Nil;
        self.interp.reset();
        self.program = None;
        self.bridge.collect_released();
        self.bridge.into_world()
    }

    /// The wrapped native world.
    pub fn world(&self) -> &World {
        &self.bridge.world
    }

    /// The wrapped native world, mutably.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.bridge.world
    }

    /// Engine options.
    pub fn options(&self) -> &ContextOptions {
        &self.bridge.opts
    }

    /// Whether source has been compiled (registration closed).
    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    /// Value of the last `set_source_code` top-level run.
    pub fn last_result(&self) -> &ScriptValue {
        &self.last
    }

    // ========================================================================
    // Host registration surface
    // ========================================================================

    /// Register a global function under an optional dotted namespace.
    /// Only valid during the setup phase.
    pub fn add_global_function(
        &mut self,
        name: &str,
        func: DynFunc,
        namespace: &str,
    ) -> Result<(), ScriptError> {
        if self.phase == Phase::Live {
            return Err(ScriptError::RegistrationClosed);
        }
        if !is_valid_ident(name) {
            return Err(ScriptError::InvalidName(name.to_string()));
        }
        if !namespace.is_empty() && !namespace.split('.').all(is_valid_ident) {
            return Err(ScriptError::InvalidName(namespace.to_string()));
        }
        self.bridge.globals.add(name, namespace, func);
        Ok(())
    }

    /// Remove every registered global function. Only valid during the
    /// setup phase.
    pub fn remove_all_global_functions(&mut self) -> Result<(), ScriptError> {
        if self.phase == Phase::Live {
            return Err(ScriptError::RegistrationClosed);
        }
        self.bridge.globals.clear();
        Ok(())
    }

    /// Number of registered global functions.
    pub fn global_function_count(&self) -> usize {
        self.bridge.globals.len()
    }

    /// Expose a native object as a global script variable. The binding is
    /// re-established (with a fresh wrapper) on every `set_source_code`.
    pub fn push_object(&mut self, name: &str, id: ObjectId) -> Result<(), ScriptError> {
        if !is_valid_ident(name) {
            return Err(ScriptError::InvalidName(name.to_string()));
        }
        self.pinned.retain(|(n, _)| n != name);
        self.pinned.push((name.to_string(), id));
        if self.program.is_some() {
            let value = self.bridge.wrap_object(id);
            self.interp.define_global(name, value);
        }
        Ok(())
    }

    // ========================================================================
    // Source lifecycle
    // ========================================================================

    /// Compile and immediately execute top-level source. All engine-side
    /// state is discarded and rebuilt: the global scope is cleared,
    /// registered functions are re-bound into their namespace tables, and
    /// pinned objects are re-wrapped. Compile and runtime failures are
    /// logged and returned.
    pub fn set_source_code(&mut self, source: &str) -> Result<(), ScriptError> {
        let program = match parser::parse(source) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("script compile failed: {e}");
                return Err(e);
            }
        };

        self.phase = Phase::Live;
        self.call = None;
        self.last = ScriptValue::Nil;
        self.interp.reset();
        self.bridge.globals.rebuild();
        self.program = Some(Arc::new(program));
        // Old wrapper bindings died with the scope; reclaim them before
        // handing out fresh ones.
        self.bridge.collect_released();

        for (name, id) in self.pinned.clone() {
            let value = self.bridge.wrap_object(id);
            self.interp.define_global(&name, value);
        }

        let program = match &self.program {
            Some(p) => p.clone(),
            None => return Ok(()),
        };
        let result = self.interp.run_program(&mut self.bridge, &program);
        self.bridge.collect_released();
        match result {
            Ok(value) => {
                self.last = value;
                Ok(())
            }
            Err(e) => {
                log::warn!("script execution failed: {e}");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Call protocol
    // ========================================================================

    /// Begin a call to a global-namespace function.
    pub fn begin_call(&mut self, name: &str) -> Result<(), ScriptError> {
        self.begin_call_in(name, "")
    }

    /// Begin a call, resolving `name` inside a dotted namespace.
    /// Registered natives resolve first, then script-defined functions
    /// (global namespace only). Failure to resolve is logged and returned.
    pub fn begin_call_in(&mut self, name: &str, namespace: &str) -> Result<(), ScriptError> {
        if let Some(call) = &self.call {
            if call.result.is_none() {
                return Err(ScriptError::CallInProgress);
            }
        }
        // An executed-but-unread previous call is discarded.
        self.call = None;

        let target = match self.bridge.globals.lookup(namespace, name) {
            Ok(func) => CallTarget::Native(func),
            Err(e) => {
                let script_fn = namespace.is_empty()
                    && self
                        .program
                        .as_ref()
                        .map(|p| p.functions.contains_key(name))
                        .unwrap_or(false);
                if script_fn {
                    CallTarget::Script(name.to_string())
                } else {
                    log::warn!("begin_call failed: {e}");
                    return Err(e);
                }
            }
        };
        self.call = Some(ActiveCall {
            name: if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{namespace}.{name}")
            },
            target,
            args: Vec::new(),
            result: None,
        });
        Ok(())
    }

    fn push_value(&mut self, value: ScriptValue) -> Result<(), ScriptError> {
        let max = self.bridge.opts.max_call_args;
        let call = self.call.as_mut().ok_or(ScriptError::NoActiveCall)?;
        if call.result.is_some() {
            return Err(ScriptError::NoActiveCall);
        }
        if call.args.len() >= max {
            log::warn!("call '{}': argument limit {max} exceeded", call.name);
            return Err(ScriptError::TooManyArguments(max));
        }
        call.args.push(value);
        Ok(())
    }

    /// Push a boolean argument.
    pub fn push_arg_bool(&mut self, v: bool) -> Result<(), ScriptError> {
        self.push_value(ScriptValue::Bool(v))
    }

    /// Push a 32-bit integer argument.
    pub fn push_arg_int(&mut self, v: i32) -> Result<(), ScriptError> {
        self.push_value(ScriptValue::Int(v as i64))
    }

    /// Push a 64-bit integer argument.
    pub fn push_arg_long(&mut self, v: i64) -> Result<(), ScriptError> {
        self.push_value(ScriptValue::Int(v))
    }

    /// Push a 32-bit float argument.
    pub fn push_arg_float(&mut self, v: f32) -> Result<(), ScriptError> {
        self.push_value(ScriptValue::Float(v as f64))
    }

    /// Push a 64-bit float argument.
    pub fn push_arg_double(&mut self, v: f64) -> Result<(), ScriptError> {
        self.push_value(ScriptValue::Float(v))
    }

    /// Push a string argument.
    pub fn push_arg_str(&mut self, v: &str) -> Result<(), ScriptError> {
        self.push_value(ScriptValue::Str(v.to_string()))
    }

    /// Push a native object argument (wrapped; nil when dead).
    pub fn push_arg_object(&mut self, id: ObjectId) -> Result<(), ScriptError> {
        let value = self.bridge.wrap_object(id);
        self.push_value(value)
    }

    /// Push an already-built script value.
    pub fn push_arg_value(&mut self, value: ScriptValue) -> Result<(), ScriptError> {
        self.push_value(value)
    }

    /// Execute the active call. Failures are trapped at the boundary: the
    /// error is logged and returned, and the call state is discarded.
    pub fn end_call(&mut self) -> Result<(), ScriptError> {
        let (target, args) = {
            let call = self.call.as_ref().ok_or(ScriptError::NoActiveCall)?;
            if call.result.is_some() {
                return Err(ScriptError::NoActiveCall);
            }
            (call.target.clone(), call.args.clone())
        };

        let result = match target {
            CallTarget::Native(func) => Ok(self.bridge.call_native(&func, &args)),
            CallTarget::Script(name) => {
                let program = self
                    .program
                    .clone()
                    .ok_or_else(|| ScriptError::Runtime("no source loaded".to_string()))?;
                self.interp
                    .call_function(&mut self.bridge, &program, &name, &args)
            }
        };
        self.bridge.collect_released();

        match result {
            Ok(value) => {
                if let Some(call) = self.call.as_mut() {
                    call.result = Some(value);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(call) = self.call.take() {
                    log::warn!("call '{}' failed: {e}", call.name);
                }
                Err(e)
            }
        }
    }

    /// Take the executed call's result, releasing the call scratch state
    /// (argument stack and return slot).
    fn take_result(&mut self) -> Result<ScriptValue, ScriptError> {
        let call = self.call.take().ok_or(ScriptError::NoActiveCall)?;
        match call.result {
            Some(value) => {
                self.bridge.collect_released();
                Ok(value)
            }
            None => {
                self.call = Some(call);
                Err(ScriptError::CallNotExecuted)
            }
        }
    }

    /// Extract the return value as-is.
    pub fn get_return_value(&mut self) -> Result<ScriptValue, ScriptError> {
        self.take_result()
    }

    /// Extract the return value as a boolean.
    pub fn get_return_bool(&mut self) -> Result<bool, ScriptError> {
        Ok(self.take_result()?.truthy())
    }

    /// Extract the return value as a 32-bit integer.
    pub fn get_return_int(&mut self) -> Result<i32, ScriptError> {
        Ok(self.take_result()?.as_int() as i32)
    }

    /// Extract the return value as a 64-bit integer.
    pub fn get_return_long(&mut self) -> Result<i64, ScriptError> {
        Ok(self.take_result()?.as_int())
    }

    /// Extract the return value as a 32-bit float.
    pub fn get_return_float(&mut self) -> Result<f32, ScriptError> {
        Ok(self.take_result()?.as_float() as f32)
    }

    /// Extract the return value as a 64-bit float.
    pub fn get_return_double(&mut self) -> Result<f64, ScriptError> {
        Ok(self.take_result()?.as_float())
    }

    /// Extract the return value as a string (empty for nil).
    pub fn get_return_str(&mut self) -> Result<String, ScriptError> {
        Ok(self.take_result()?.coerce_str())
    }

    /// Extract the return value as a native object id, when the call
    /// returned a live object wrapper.
    pub fn get_return_object(&mut self) -> Result<Option<ObjectId>, ScriptError> {
        let value = self.take_result()?;
        let target = crate::marshal::object_target(&self.bridge.pools, &value);
        // Dropping `value` queues the wrapper; reclaim it now.
        drop(value);
        self.bridge.collect_released();
        Ok(target)
    }

    // ========================================================================
    // Wrapper access and diagnostics
    // ========================================================================

    /// Wrap a native object as a script value (nil when dead).
    pub fn wrap_object(&mut self, id: ObjectId) -> ScriptValue {
        self.bridge.wrap_object(id)
    }

    /// Wrap a handler as a script value (nil when dead).
    pub fn wrap_handler(&mut self, handler: HandlerId) -> ScriptValue {
        self.bridge.wrap_handler(handler)
    }

    /// Resolve a member on a wrapper value, as the script would.
    pub fn resolve_member(&mut self, value: &ScriptValue, name: &str) -> ScriptValue {
        let out = match value {
            ScriptValue::Wrapper(handle) => self.bridge.resolve_member(handle, name),
            _ => ScriptValue::Nil,
        };
        self.bridge.collect_released();
        out
    }

    /// Read a global script variable.
    pub fn global(&self, name: &str) -> Option<ScriptValue> {
        self.interp.global(name)
    }

    /// Drain the wrapper release queue now. Reclamation also happens
    /// after every evaluation and protocol step; this is for hosts that
    /// dropped wrapper values outside any call.
    pub fn reclaim_wrappers(&mut self) {
        self.bridge.collect_released();
    }

    /// Pool slots ever created for a wrapper kind.
    pub fn wrapper_capacity(&self, kind: WrapperKind) -> usize {
        self.bridge.pools.capacity(kind)
    }

    /// Pool slots currently checked out for a wrapper kind.
    pub fn wrappers_in_use(&self, kind: WrapperKind) -> usize {
        self.bridge.pools.in_use(kind)
    }

    /// Enumerate the current protocol argument stack and the global
    /// scope; the text is also emitted through the logging collaborator.
    pub fn dump_value_stack(&self) -> String {
        let mut out = String::new();
        match &self.call {
            Some(call) => {
                out.push_str(&format!("call '{}': {} argument(s)\n", call.name, call.args.len()));
                for (i, arg) in call.args.iter().enumerate() {
                    out.push_str(&format!(
                        "  [{}] {} = {}\n",
                        i,
                        arg.type_name(),
                        arg.to_display()
                    ));
                }
                if let Some(result) = &call.result {
                    out.push_str(&format!("  result = {}\n", result.to_display()));
                }
            }
            None => out.push_str("no active call\n"),
        }
        out.push_str(&format!("globals: {}\n", self.interp.globals().len()));
        for (name, value) in self.interp.globals() {
            out.push_str(&format!(
                "  {} : {} = {}\n",
                name,
                value.type_name(),
                value.to_display()
            ));
        }
        log::debug!("{out}");
        out
    }
}

fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_validation() {
        assert!(is_valid_ident("Add"));
        assert!(is_valid_ident("_private2"));
        assert!(!is_valid_ident(""));
        assert!(!is_valid_ident("2x"));
        assert!(!is_valid_ident("a-b"));
    }

    #[test]
    fn test_registration_closes_when_live() {
        let mut ctx = ScriptContext::new(World::new());
        ctx.add_global_function("Nop", DynFunc::wrap0(|| {}), "")
            .unwrap();
        assert_eq!(ctx.global_function_count(), 1);

        ctx.set_source_code("let x = 1;").unwrap();
        assert!(ctx.is_live());
        assert!(matches!(
            ctx.add_global_function("Late", DynFunc::wrap0(|| {}), ""),
            Err(ScriptError::RegistrationClosed)
        ));
        assert!(matches!(
            ctx.remove_all_global_functions(),
            Err(ScriptError::RegistrationClosed)
        ));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut ctx = ScriptContext::new(World::new());
        assert!(matches!(
            ctx.add_global_function("bad name", DynFunc::wrap0(|| {}), ""),
            Err(ScriptError::InvalidName(_))
        ));
        assert!(matches!(
            ctx.add_global_function("ok", DynFunc::wrap0(|| {}), "bad..ns"),
            Err(ScriptError::InvalidName(_))
        ));
    }

    #[test]
    fn test_protocol_misuse_errors() {
        let mut ctx = ScriptContext::new(World::new());
        assert!(matches!(
            ctx.push_arg_int(1),
            Err(ScriptError::NoActiveCall)
        ));
        assert!(matches!(ctx.end_call(), Err(ScriptError::NoActiveCall)));
        assert!(matches!(
            ctx.get_return_value(),
            Err(ScriptError::NoActiveCall)
        ));
        assert!(matches!(
            ctx.begin_call("Missing"),
            Err(ScriptError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_argument_limit() {
        let mut ctx = ScriptContext::with_options(
            World::new(),
            ContextOptions {
                max_call_args: 2,
                ..ContextOptions::default()
            },
        );
        ctx.add_global_function("Nop", DynFunc::wrap0(|| {}), "")
            .unwrap();
        ctx.begin_call("Nop").unwrap();
        ctx.push_arg_int(1).unwrap();
        ctx.push_arg_int(2).unwrap();
        assert!(matches!(
            ctx.push_arg_int(3),
            Err(ScriptError::TooManyArguments(2))
        ));
    }

    #[test]
    fn test_stack_dump_lists_args() {
        let mut ctx = ScriptContext::new(World::new());
        ctx.add_global_function("Nop", DynFunc::wrap0(|| {}), "")
            .unwrap();
        ctx.begin_call("Nop").unwrap();
        ctx.push_arg_int(7).unwrap();
        ctx.push_arg_str("hey").unwrap();
        let dump = ctx.dump_value_stack();
        assert!(dump.contains("call 'Nop'"));
        assert!(dump.contains("[0] int = 7"));
        assert!(dump.contains("[1] string = hey"));
    }
}
