//! Integration tests for the reflection core: classes, objects, signals,
//! and the type-erased call paths working together.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use rivet_reflect::{
    ClassDef, DynFunc, DynValue, Method, ParamMap, Signature, SignalHub, TypeTag, World,
};

fn damage_class() -> ClassDef {
    let apply = Method::new(
        Signature::with_names(TypeTag::Int, &[("amount", TypeTag::Int)]),
        |world, receiver, params| {
            let amount = params.arg_int(0);
            let hp = world.attr(receiver, "hp").map(|v| v.as_int()).unwrap_or(0);
            let left = hp - amount;
            let _ = world.set_attr(receiver, "hp", DynValue::Int(left));
            let _ = world.emit(receiver, "OnDamaged", &[DynValue::Int(left)]);
            params.set_return(DynValue::Int(left));
        },
    );
    ClassDef::builder("Unit")
        .attr_with("hp", DynValue::Int(100))
        .prop("kind", "unit")
        .method("ApplyDamage", apply)
        .event("OnDamaged", Signature::with_names(TypeTag::Void, &[("hp", TypeTag::Int)]))
        .build()
}

#[test]
fn test_method_emits_event_with_arguments() {
    let mut world = World::new();
    let class = world.register_class(damage_class());
    let unit = world.spawn(class).unwrap();

    let seen = Arc::new(AtomicI64::new(-1));
    let sink = seen.clone();
    let watcher = DynFunc::wrap1(move |hp: i32| {
        sink.store(hp as i64, Ordering::SeqCst);
    });
    let handler = world.signals_mut().create_handler(Some(watcher));
    let event = world.event(unit, "OnDamaged").unwrap();
    world.signals_mut().connect(event, handler).unwrap();

    let left = world
        .call_method(unit, "ApplyDamage", &[DynValue::Int(30)])
        .unwrap();
    assert_eq!(left, DynValue::Int(70));
    assert_eq!(seen.load(Ordering::SeqCst), 70);
    assert_eq!(world.attr(unit, "hp"), Some(DynValue::Int(70)));
}

#[test]
fn test_document_emission_uses_parameter_names() {
    let mut world = World::new();
    let class = world.register_class(damage_class());
    let unit = world.spawn(class).unwrap();

    let seen = Arc::new(AtomicI64::new(-1));
    let sink = seen.clone();
    let watcher = DynFunc::wrap1(move |hp: i32| {
        sink.store(hp as i64, Ordering::SeqCst);
    });
    let handler = world.signals_mut().create_handler(Some(watcher));
    let event = world.event(unit, "OnDamaged").unwrap();
    world.signals_mut().connect(event, handler).unwrap();

    let mut doc = ParamMap::new();
    doc.insert("hp".to_string(), serde_json::json!(12));
    world.emit_doc(unit, "OnDamaged", &doc).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 12);

    // String-encoded emission with a missing key falls back to defaults.
    world.emit_encoded(unit, "OnDamaged", "{}").unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn test_destroying_object_detaches_its_handlers() {
    // Two objects: destroying the listener must sever its connection to
    // the other object's event.
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = hits.clone();
    let listener_class = ClassDef::builder("Listener")
        .slot_with("OnPing", move |_receiver| {
            let sink = sink.clone();
            DynFunc::wrap0(move || {
                sink.fetch_add(1, Ordering::SeqCst);
            })
        })
        .build();
    let source_class = ClassDef::builder("Source")
        .event("OnPing", Signature::default())
        .build();

    let mut world = World::new();
    let listener_class = world.register_class(listener_class);
    let source_class = world.register_class(source_class);
    let listener = world.spawn(listener_class).unwrap();
    let source = world.spawn(source_class).unwrap();

    let event = world.event(source, "OnPing").unwrap();
    let handler = world.slot_handler(listener, "OnPing").unwrap();
    world.signals_mut().connect(event, handler).unwrap();

    world.emit(source, "OnPing", &[]).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    world.destroy(listener);
    assert_eq!(world.signals().connection_count(event), 0);
    world.emit(source, "OnPing", &[]).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_string_return_call_path() {
    let describe = DynFunc::wrap2(|name: String, level: i32| format!("{name}:{level}"));
    let text = describe.call_encoded_with_return(r#"{"arg0":"kara","arg1":3}"#);
    assert_eq!(text, "kara:3");

    // Void-returning callables report an empty string.
    let silent = DynFunc::wrap0(|| {});
    assert_eq!(silent.call_encoded_with_return("{}"), "");
}

#[test]
fn test_standalone_hub_symmetry_under_churn() {
    let mut hub = SignalHub::new();
    let sig = Signature::default();
    let e1 = hub.create_event(sig.clone());
    let e2 = hub.create_event(sig.clone());
    let h = hub.create_handler(Some(DynFunc::wrap0(|| {})));

    hub.connect(e1, h).unwrap();
    hub.connect(e2, h).unwrap();
    hub.connect(e1, h).unwrap();
    assert_eq!(hub.attachments(h).len(), 3);

    hub.disconnect(e1, h);
    assert_eq!(hub.connection_count(e1), 1);
    assert_eq!(hub.attachments(h).len(), 2);

    hub.destroy_handler(h);
    assert_eq!(hub.connection_count(e1), 0);
    assert_eq!(hub.connection_count(e2), 0);
}
