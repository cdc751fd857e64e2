//! Generic fallback parameter encodings.
//!
//! When no specialized typed conversion path exists, arguments travel as a
//! structured key-value map: the document form is a JSON object keyed by
//! the signature's parameter keys, and the string form is that object's
//! serialized text. Decoding is best-effort — absent or malformed entries
//! fill with the parameter tag's default, never a hard failure, because
//! script-provided formatting is untrusted.
//!
//! Object references do not round-trip through text; they encode as null.

use serde_json::{Map, Number, Value as JsonValue};

use crate::signature::Signature;
use crate::value::{DynValue, TypeTag};

/// Document form of an argument set: parameter key → JSON value.
pub type ParamMap = Map<String, JsonValue>;

/// Encode positional arguments into the document form.
pub fn encode_doc(sig: &Signature, args: &[DynValue]) -> ParamMap {
    let mut doc = ParamMap::new();
    for i in 0..sig.param_count() {
        let value = match args.get(i) {
            Some(v) => to_json(v),
            None => to_json(&DynValue::default_for(sig.param_tag(i))),
        };
        doc.insert(sig.param_key(i), value);
    }
    doc
}

/// Encode positional arguments into the string form.
pub fn encode_args(sig: &Signature, args: &[DynValue]) -> String {
    serde_json::to_string(&JsonValue::Object(encode_doc(sig, args)))
        .unwrap_or_else(|_| "{}".to_string())
}

/// Decode the document form into positional arguments, one per declared
/// parameter, filling defaults for anything absent or unusable.
pub fn decode_doc(sig: &Signature, doc: &ParamMap) -> Vec<DynValue> {
    (0..sig.param_count())
        .map(|i| {
            let tag = sig.param_tag(i);
            match doc.get(&sig.param_key(i)) {
                Some(j) => from_json(tag, j),
                None => DynValue::default_for(tag),
            }
        })
        .collect()
}

/// Decode the string form. Text that fails to parse as a JSON object
/// yields an all-defaults argument set.
pub fn decode_args(sig: &Signature, text: &str) -> Vec<DynValue> {
    match serde_json::from_str::<JsonValue>(text) {
        Ok(JsonValue::Object(map)) => decode_doc(sig, &map),
        _ => {
            log::debug!("malformed encoded argument set, filling defaults: {text:?}");
            (0..sig.param_count())
                .map(|i| DynValue::default_for(sig.param_tag(i)))
                .collect()
        }
    }
}

fn to_json(v: &DynValue) -> JsonValue {
    match v {
        DynValue::Void => JsonValue::Null,
        DynValue::Bool(b) => JsonValue::Bool(*b),
        DynValue::Int(i) => JsonValue::Number((*i).into()),
        DynValue::Long(l) => JsonValue::Number((*l).into()),
        DynValue::Float(f) => number_or_null(*f as f64),
        DynValue::Double(d) => number_or_null(*d),
        DynValue::Str(s) => JsonValue::String(s.clone()),
        // Handles are process-local; they must not leak through text.
        DynValue::Object(_) => JsonValue::Null,
    }
}

fn number_or_null(d: f64) -> JsonValue {
    match Number::from_f64(d) {
        Some(n) => JsonValue::Number(n),
        None => JsonValue::Null,
    }
}

fn from_json(tag: TypeTag, j: &JsonValue) -> DynValue {
    let bridged = match j {
        JsonValue::Null => DynValue::Void,
        JsonValue::Bool(b) => DynValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                DynValue::Long(i)
            } else {
                DynValue::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        JsonValue::String(s) => DynValue::Str(s.clone()),
        // Nested structures have no scalar mapping.
        JsonValue::Array(_) | JsonValue::Object(_) => DynValue::Void,
    };
    bridged.coerce(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig2() -> Signature {
        Signature::with_names(TypeTag::Void, &[("a", TypeTag::Int), ("b", TypeTag::Str)])
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let sig = sig2();
        let args = vec![DynValue::Int(5), DynValue::Str("x;=\"y".into())];
        let text = encode_args(&sig, &args);
        let back = decode_args(&sig, &text);
        assert_eq!(back, args);
    }

    #[test]
    fn test_separator_chars_in_strings_survive() {
        // The quoting fragility of ad hoc Name=Value forms: a value that
        // contains the field separator must still round-trip.
        let sig = Signature::with_names(TypeTag::Void, &[("s", TypeTag::Str)]);
        let args = vec![DynValue::Str("a=b,c=d{\"}".into())];
        let back = decode_args(&sig, &encode_args(&sig, &args));
        assert_eq!(back, args);
    }

    #[test]
    fn test_missing_keys_fill_defaults() {
        let sig = sig2();
        let back = decode_args(&sig, r#"{"b":"only"}"#);
        assert_eq!(back, vec![DynValue::Int(0), DynValue::Str("only".into())]);
    }

    #[test]
    fn test_garbage_text_fills_all_defaults() {
        let sig = sig2();
        let back = decode_args(&sig, "a=1;b=2");
        assert_eq!(back, vec![DynValue::Int(0), DynValue::Str(String::new())]);
    }

    #[test]
    fn test_object_refs_encode_as_null() {
        let sig = Signature::new(TypeTag::Void, &[TypeTag::Object]);
        let doc = encode_doc(&sig, &[DynValue::Object(None)]);
        assert_eq!(doc.get("arg0"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_number_coercion_across_tags() {
        let sig = Signature::new(TypeTag::Void, &[TypeTag::Double, TypeTag::Int]);
        let back = decode_args(&sig, r#"{"arg0":2,"arg1":"17"}"#);
        assert_eq!(back, vec![DynValue::Double(2.0), DynValue::Int(17)]);
    }
}
