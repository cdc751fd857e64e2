//! Type-erased callables.
//!
//! `DynFunc` wraps a free function or closure behind a `Signature`;
//! `Method` is the class-bound flavor that additionally receives the
//! `World` and a receiver object. Both share the same lenient calling
//! convention: missing arguments are filled with tag defaults and excess
//! arguments are ignored, so an untrusted call site can never cause a
//! crash through arity alone.

use std::sync::Arc;

use crate::encode::{self, ParamMap};
use crate::object::{ObjectId, World};
use crate::params::DynParams;
use crate::signature::Signature;
use crate::value::{DynValue, TypeTag};

/// Invocation closure for a free callable.
pub type InvokeFn = Arc<dyn Fn(&mut DynParams) + Send + Sync>;

/// Invocation closure for a class method.
pub type MethodFn = Arc<dyn Fn(&mut World, ObjectId, &mut DynParams) + Send + Sync>;

/// Fill argument slots for a signature from the provided values.
///
/// Each declared parameter is coerced to its tag; missing parameters get
/// the tag default; extra values are dropped.
fn fill_slots(sig: &Signature, args: &[DynValue]) -> Vec<DynValue> {
    (0..sig.param_count())
        .map(|i| {
            let tag = sig.param_tag(i);
            match args.get(i) {
                Some(v) => v.coerce(tag),
                None => DynValue::default_for(tag),
            }
        })
        .collect()
}

/// Conversion between Rust types and dynamic values, used by the typed
/// `wrap*` constructors. Reads are lenient (mismatch yields the default).
pub trait DynType: Sized {
    /// The tag this Rust type maps to.
    const TAG: TypeTag;

    /// Read a value of this type out of a dynamic value.
    fn from_dyn(value: &DynValue) -> Self;

    /// Convert into a dynamic value.
    fn into_dyn(self) -> DynValue;
}

impl DynType for () {
    const TAG: TypeTag = TypeTag::Void;
    fn from_dyn(_: &DynValue) -> Self {}
    fn into_dyn(self) -> DynValue {
        DynValue::Void
    }
}

impl DynType for bool {
    const TAG: TypeTag = TypeTag::Bool;
    fn from_dyn(value: &DynValue) -> Self {
        value.as_bool()
    }
    fn into_dyn(self) -> DynValue {
        DynValue::Bool(self)
    }
}

impl DynType for i32 {
    const TAG: TypeTag = TypeTag::Int;
    fn from_dyn(value: &DynValue) -> Self {
        value.as_int()
    }
    fn into_dyn(self) -> DynValue {
        DynValue::Int(self)
    }
}

impl DynType for i64 {
    const TAG: TypeTag = TypeTag::Long;
    fn from_dyn(value: &DynValue) -> Self {
        value.as_long()
    }
    fn into_dyn(self) -> DynValue {
        DynValue::Long(self)
    }
}

impl DynType for f32 {
    const TAG: TypeTag = TypeTag::Float;
    fn from_dyn(value: &DynValue) -> Self {
        value.as_float()
    }
    fn into_dyn(self) -> DynValue {
        DynValue::Float(self)
    }
}

impl DynType for f64 {
    const TAG: TypeTag = TypeTag::Double;
    fn from_dyn(value: &DynValue) -> Self {
        value.as_double()
    }
    fn into_dyn(self) -> DynValue {
        DynValue::Double(self)
    }
}

impl DynType for String {
    const TAG: TypeTag = TypeTag::Str;
    fn from_dyn(value: &DynValue) -> Self {
        value.as_str().to_string()
    }
    fn into_dyn(self) -> DynValue {
        DynValue::Str(self)
    }
}

impl DynType for Option<ObjectId> {
    const TAG: TypeTag = TypeTag::Object;
    fn from_dyn(value: &DynValue) -> Self {
        value.as_object()
    }
    fn into_dyn(self) -> DynValue {
        DynValue::Object(self)
    }
}

/// Type-erased free callable: a signature plus a shared invoke closure.
///
/// Cloning is value-semantic through the shared immutable closure, so a
/// registration record can keep its own copy beyond the binding site.
#[derive(Clone)]
pub struct DynFunc {
    sig: Signature,
    invoke: InvokeFn,
}

impl DynFunc {
    /// Wrap a raw invoke closure under an explicit signature.
    pub fn new(sig: Signature, f: impl Fn(&mut DynParams) + Send + Sync + 'static) -> Self {
        Self {
            sig,
            invoke: Arc::new(f),
        }
    }

    /// The callable's signature.
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// Typed-struct call path: invoke over an existing slot view.
    pub fn call(&self, params: &mut DynParams) {
        (self.invoke)(params);
    }

    /// Invoke with positional values; returns the (possibly void) result.
    pub fn call_args(&self, args: &[DynValue]) -> DynValue {
        let mut slots = fill_slots(&self.sig, args);
        let mut ret = DynValue::default_for(self.sig.return_tag());
        let ret_slot = if self.sig.return_tag() == TypeTag::Void {
            None
        } else {
            Some(&mut ret)
        };
        let mut params = DynParams::new(ret_slot, &mut slots);
        (self.invoke)(&mut params);
        ret
    }

    /// String-encoded call path (key-value map text form).
    pub fn call_encoded(&self, text: &str) -> DynValue {
        self.call_args(&encode::decode_args(&self.sig, text))
    }

    /// Document-encoded call path.
    pub fn call_doc(&self, doc: &ParamMap) -> DynValue {
        self.call_args(&encode::decode_doc(&self.sig, doc))
    }

    /// String-encoded call returning the result's text form; empty when
    /// the callable returns nothing.
    pub fn call_encoded_with_return(&self, text: &str) -> String {
        self.call_encoded(text).to_text()
    }

    /// Document-encoded call returning the result's text form.
    pub fn call_doc_with_return(&self, doc: &ParamMap) -> String {
        self.call_doc(doc).to_text()
    }

    /// Wrap an argument-less function.
    pub fn wrap0<R, F>(f: F) -> Self
    where
        R: DynType,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let sig = Signature::new(R::TAG, &[]);
        Self::new(sig, move |p| {
            let r = f();
            p.set_return(r.into_dyn());
        })
    }

    /// Wrap a one-argument function.
    pub fn wrap1<A, R, F>(f: F) -> Self
    where
        A: DynType,
        R: DynType,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let sig = Signature::new(R::TAG, &[A::TAG]);
        Self::new(sig, move |p| {
            let a = A::from_dyn(p.arg(0).unwrap_or(&DynValue::Void));
            p.set_return(f(a).into_dyn());
        })
    }

    /// Wrap a two-argument function.
    pub fn wrap2<A, B, R, F>(f: F) -> Self
    where
        A: DynType,
        B: DynType,
        R: DynType,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        let sig = Signature::new(R::TAG, &[A::TAG, B::TAG]);
        Self::new(sig, move |p| {
            let a = A::from_dyn(p.arg(0).unwrap_or(&DynValue::Void));
            let b = B::from_dyn(p.arg(1).unwrap_or(&DynValue::Void));
            p.set_return(f(a, b).into_dyn());
        })
    }

    /// Wrap a three-argument function.
    pub fn wrap3<A, B, C, R, F>(f: F) -> Self
    where
        A: DynType,
        B: DynType,
        C: DynType,
        R: DynType,
        F: Fn(A, B, C) -> R + Send + Sync + 'static,
    {
        let sig = Signature::new(R::TAG, &[A::TAG, B::TAG, C::TAG]);
        Self::new(sig, move |p| {
            let a = A::from_dyn(p.arg(0).unwrap_or(&DynValue::Void));
            let b = B::from_dyn(p.arg(1).unwrap_or(&DynValue::Void));
            let c = C::from_dyn(p.arg(2).unwrap_or(&DynValue::Void));
            p.set_return(f(a, b, c).into_dyn());
        })
    }

    /// Wrap a four-argument function.
    pub fn wrap4<A, B, C, D, R, F>(f: F) -> Self
    where
        A: DynType,
        B: DynType,
        C: DynType,
        D: DynType,
        R: DynType,
        F: Fn(A, B, C, D) -> R + Send + Sync + 'static,
    {
        let sig = Signature::new(R::TAG, &[A::TAG, B::TAG, C::TAG, D::TAG]);
        Self::new(sig, move |p| {
            let a = A::from_dyn(p.arg(0).unwrap_or(&DynValue::Void));
            let b = B::from_dyn(p.arg(1).unwrap_or(&DynValue::Void));
            let c = C::from_dyn(p.arg(2).unwrap_or(&DynValue::Void));
            let d = D::from_dyn(p.arg(3).unwrap_or(&DynValue::Void));
            p.set_return(f(a, b, c, d).into_dyn());
        })
    }
}

impl std::fmt::Debug for DynFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynFunc").field("sig", &self.sig).finish()
    }
}

/// Class-bound callable. Receives the world and a receiver object id in
/// addition to the positional slots.
#[derive(Clone)]
pub struct Method {
    sig: Signature,
    invoke: MethodFn,
}

impl Method {
    /// Wrap a raw method closure under an explicit signature.
    pub fn new(
        sig: Signature,
        f: impl Fn(&mut World, ObjectId, &mut DynParams) + Send + Sync + 'static,
    ) -> Self {
        Self {
            sig,
            invoke: Arc::new(f),
        }
    }

    /// The method's signature (receiver excluded).
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// Invoke over an existing slot view.
    pub fn call(&self, world: &mut World, receiver: ObjectId, params: &mut DynParams) {
        (self.invoke)(world, receiver, params);
    }

    /// Invoke with positional values; missing arguments are filled with
    /// tag defaults, excess arguments ignored.
    pub fn call_args(&self, world: &mut World, receiver: ObjectId, args: &[DynValue]) -> DynValue {
        let mut slots = fill_slots(&self.sig, args);
        let mut ret = DynValue::default_for(self.sig.return_tag());
        let ret_slot = if self.sig.return_tag() == TypeTag::Void {
            None
        } else {
            Some(&mut ret)
        };
        let mut params = DynParams::new(ret_slot, &mut slots);
        (self.invoke)(world, receiver, &mut params);
        ret
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method").field("sig", &self.sig).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_wrap2_add() {
        let add = DynFunc::wrap2(|a: i32, b: i32| a + b);
        assert_eq!(add.signature().display(), "int(int,int)");
        let out = add.call_args(&[DynValue::Int(2), DynValue::Int(3)]);
        assert_eq!(out, DynValue::Int(5));
    }

    #[test]
    fn test_missing_args_default_filled() {
        let f = DynFunc::wrap3(|a: i32, s: String, b: bool| format!("{a}|{s}|{b}"));
        let out = f.call_args(&[DynValue::Int(9)]);
        assert_eq!(out, DynValue::Str("9||false".into()));
    }

    #[test]
    fn test_excess_args_ignored() {
        let f = DynFunc::wrap1(|a: i32| a * 2);
        let out = f.call_args(&[DynValue::Int(4), DynValue::Int(100), DynValue::Bool(true)]);
        assert_eq!(out, DynValue::Int(8));
    }

    #[test]
    fn test_void_return_has_no_slot() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let f = DynFunc::wrap0(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(f.call_args(&[]), DynValue::Void);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clone_shares_behavior() {
        let f = DynFunc::wrap1(|a: i32| a + 1);
        let g = f.clone();
        assert_eq!(g.call_args(&[DynValue::Int(1)]), DynValue::Int(2));
        assert!(f.signature().compatible(g.signature()));
    }

    #[test]
    fn test_encoded_call_with_return() {
        let f = DynFunc::wrap2(|a: i32, b: i32| a * b);
        let text = r#"{"arg0":6,"arg1":7}"#;
        assert_eq!(f.call_encoded_with_return(text), "42");
    }

    #[test]
    fn test_malformed_encoded_call_defaults() {
        let f = DynFunc::wrap2(|a: i32, b: i32| a + b);
        assert_eq!(f.call_encoded("not json at all"), DynValue::Int(0));
    }
}
