//! Rivet reflection core.
//!
//! The pieces the script bridge is built on: scalar type tags and dynamic
//! values, callable signatures, type-erased callables with typed /
//! string-encoded / document-encoded call paths, the event/handler signal
//! hub, and the reflected class/object model behind the `World` facade.
//!
//! Everything here is engine-agnostic: nothing in this crate knows that a
//! script engine exists. The bridge crate (`rivet-script`) drives these
//! types from the script side.

pub mod class;
pub mod encode;
pub mod error;
pub mod func;
pub mod object;
pub mod params;
pub mod signal;
pub mod signature;
pub mod value;

pub use class::{
    AttrDef, ClassBuilder, ClassDef, ClassId, ClassRegistry, EventDef, MethodDef, PropDef,
    SlotDef, SlotFactory,
};
pub use encode::ParamMap;
pub use error::ReflectError;
pub use func::{DynFunc, DynType, InvokeFn, Method, MethodFn};
pub use object::{ObjectId, ObjectRegistry, World};
pub use params::DynParams;
pub use signal::{EventId, HandlerId, SignalHub};
pub use signature::Signature;
pub use value::{DynValue, TypeTag};
