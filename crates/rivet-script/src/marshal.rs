//! Bidirectional value marshalling between script values and dynamic
//! native values.
//!
//! Script→native conversion is driven by the declared parameter tag and
//! uses the narrowest correct conversion; anything that does not convert
//! cleanly falls back to the tag's default rather than failing. Script
//! strings are copied into owned native storage here, so the native side
//! always sees stable text for the duration of the call.
//!
//! Native→script conversion is the inverse; an object reference coming
//! back from native code checks a pooled object wrapper out of the
//! bridge's pools (or yields nil when the object is null or dead).

use serde_json::Value as JsonValue;

use rivet_reflect::{DynValue, ParamMap, Signature, TypeTag, World};

use crate::value::ScriptValue;
use crate::wrapper::{WrapperBody, WrapperPools};

/// Convert one script value to the dynamic value of a declared tag.
pub(crate) fn script_to_dyn(pools: &WrapperPools, tag: TypeTag, v: &ScriptValue) -> DynValue {
    match tag {
        TypeTag::Void | TypeTag::Invalid => DynValue::Void,
        TypeTag::Bool => DynValue::Bool(v.truthy()),
        TypeTag::Int => DynValue::Int(v.as_int() as i32),
        TypeTag::Long => DynValue::Long(v.as_int()),
        TypeTag::Float => DynValue::Float(v.as_float() as f32),
        TypeTag::Double => DynValue::Double(v.as_float()),
        TypeTag::Str => DynValue::Str(to_native_text(v)),
        TypeTag::Object => DynValue::Object(object_target(pools, v)),
    }
}

/// Build the positional argument list a signature expects. Missing
/// arguments get tag defaults; excess script arguments are ignored.
pub(crate) fn script_args_to_dyn(
    pools: &WrapperPools,
    sig: &Signature,
    args: &[ScriptValue],
) -> Vec<DynValue> {
    (0..sig.param_count())
        .map(|i| {
            let tag = sig.param_tag(i);
            match args.get(i) {
                Some(v) => script_to_dyn(pools, tag, v),
                None => DynValue::default_for(tag),
            }
        })
        .collect()
}

/// Generic document encoding of script arguments, used when the callable
/// declares unknown parameter shapes.
pub(crate) fn script_args_to_doc(sig: &Signature, args: &[ScriptValue]) -> ParamMap {
    let mut doc = ParamMap::new();
    for (i, v) in args.iter().enumerate() {
        let json = match v {
            ScriptValue::Nil => JsonValue::Null,
            ScriptValue::Bool(b) => JsonValue::Bool(*b),
            ScriptValue::Int(i) => JsonValue::Number((*i).into()),
            ScriptValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ScriptValue::Str(s) => JsonValue::String(s.clone()),
            // Wrapper handles are process-local; they do not encode.
            ScriptValue::Wrapper(_) => JsonValue::Null,
        };
        doc.insert(sig.param_key(i), json);
    }
    doc
}

/// Convert a dynamic native value back to a script value. Object
/// references check a pooled wrapper out (taking a native strong
/// reference); null or dead references yield nil.
pub(crate) fn dyn_to_script(
    world: &mut World,
    pools: &mut WrapperPools,
    v: &DynValue,
) -> ScriptValue {
    match v {
        DynValue::Void => ScriptValue::Nil,
        DynValue::Bool(b) => ScriptValue::Bool(*b),
        DynValue::Int(i) => ScriptValue::Int(*i as i64),
        DynValue::Long(l) => ScriptValue::Int(*l),
        DynValue::Float(f) => ScriptValue::Float(*f as f64),
        DynValue::Double(d) => ScriptValue::Float(*d),
        DynValue::Str(s) => ScriptValue::Str(s.clone()),
        DynValue::Object(None) => ScriptValue::Nil,
        DynValue::Object(Some(id)) => {
            if world.is_alive(*id) {
                world.retain(*id);
                ScriptValue::Wrapper(pools.checkout(WrapperBody::Object { target: *id }))
            } else {
                ScriptValue::Nil
            }
        }
    }
}

/// The wrapped object id behind a script value, when it is an object
/// wrapper whose slot is still live.
pub(crate) fn object_target(pools: &WrapperPools, v: &ScriptValue) -> Option<rivet_reflect::ObjectId> {
    let handle = v.as_wrapper()?;
    match pools.body_of(handle) {
        Some(WrapperBody::Object { target }) => Some(*target),
        _ => None,
    }
}

fn to_native_text(v: &ScriptValue) -> String {
    match v {
        ScriptValue::Nil | ScriptValue::Wrapper(_) => String::new(),
        other => other.to_display(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_to_dyn_scalars() {
        let pools = WrapperPools::new(0);
        assert_eq!(
            script_to_dyn(&pools, TypeTag::Int, &ScriptValue::Int(7)),
            DynValue::Int(7)
        );
        assert_eq!(
            script_to_dyn(&pools, TypeTag::Bool, &ScriptValue::Int(2)),
            DynValue::Bool(true)
        );
        assert_eq!(
            script_to_dyn(&pools, TypeTag::Str, &ScriptValue::Int(5)),
            DynValue::Str("5".into())
        );
        assert_eq!(
            script_to_dyn(&pools, TypeTag::Str, &ScriptValue::Nil),
            DynValue::Str(String::new())
        );
        assert_eq!(
            script_to_dyn(&pools, TypeTag::Object, &ScriptValue::Int(5)),
            DynValue::Object(None)
        );
    }

    #[test]
    fn test_arg_fill_and_truncation() {
        let pools = WrapperPools::new(0);
        let sig = Signature::new(
            TypeTag::Void,
            &[TypeTag::Int, TypeTag::Str, TypeTag::Double],
        );
        let args = script_args_to_dyn(&pools, &sig, &[ScriptValue::Int(1)]);
        assert_eq!(
            args,
            vec![
                DynValue::Int(1),
                DynValue::Str(String::new()),
                DynValue::Double(0.0)
            ]
        );

        let excess = script_args_to_dyn(
            &pools,
            &Signature::new(TypeTag::Void, &[TypeTag::Int]),
            &[ScriptValue::Int(1), ScriptValue::Int(2), ScriptValue::Int(3)],
        );
        assert_eq!(excess.len(), 1);
    }

    #[test]
    fn test_dyn_to_script_scalars() {
        let mut world = World::new();
        let mut pools = WrapperPools::new(0);
        assert!(matches!(
            dyn_to_script(&mut world, &mut pools, &DynValue::Void),
            ScriptValue::Nil
        ));
        assert!(matches!(
            dyn_to_script(&mut world, &mut pools, &DynValue::Long(9)),
            ScriptValue::Int(9)
        ));
        assert!(matches!(
            dyn_to_script(&mut world, &mut pools, &DynValue::Object(None)),
            ScriptValue::Nil
        ));
    }

    #[test]
    fn test_object_roundtrip_through_wrapper() {
        let mut world = World::new();
        let class = world.register_class(rivet_reflect::ClassDef::builder("T").build());
        let id = world.spawn(class).unwrap();
        let mut pools = WrapperPools::new(0);

        let v = dyn_to_script(&mut world, &mut pools, &DynValue::Object(Some(id)));
        assert_eq!(world.strong_count(id), 2);
        assert_eq!(object_target(&pools, &v), Some(id));
        assert_eq!(
            script_to_dyn(&pools, TypeTag::Object, &v),
            DynValue::Object(Some(id))
        );
    }

    #[test]
    fn test_dead_object_marshals_to_nil() {
        let mut world = World::new();
        let class = world.register_class(rivet_reflect::ClassDef::builder("T").build());
        let id = world.spawn(class).unwrap();
        world.destroy(id);
        let mut pools = WrapperPools::new(0);
        assert!(matches!(
            dyn_to_script(&mut world, &mut pools, &DynValue::Object(Some(id))),
            ScriptValue::Nil
        ));
    }
}
