//! Callable signatures: an ordered parameter tag list plus a return tag.
//!
//! Signatures are immutable once built and are owned by the callable or
//! event they describe. Out-of-range queries return `TypeTag::Invalid`
//! rather than erroring, keeping the interface total.

use std::fmt;

use smallvec::SmallVec;

use crate::value::TypeTag;

/// Immutable parameter/return type description.
///
/// The default signature has no parameters and no return value; it is the
/// polymorphic root for argument-less entities such as property accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    ret: TypeTag,
    params: SmallVec<[TypeTag; 4]>,
    // Empty, or one name per parameter; names key the fallback encoding.
    names: SmallVec<[String; 4]>,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            ret: TypeTag::Void,
            params: SmallVec::new(),
            names: SmallVec::new(),
        }
    }
}

impl Signature {
    /// Build a signature from a return tag and parameter tags.
    pub fn new(ret: TypeTag, params: &[TypeTag]) -> Self {
        Self {
            ret,
            params: SmallVec::from_slice(params),
            names: SmallVec::new(),
        }
    }

    /// Build a signature with named parameters. Names become the keys of
    /// the key-value fallback encoding.
    pub fn with_names(ret: TypeTag, params: &[(&str, TypeTag)]) -> Self {
        Self {
            ret,
            params: params.iter().map(|(_, t)| *t).collect(),
            names: params.iter().map(|(n, _)| (*n).to_string()).collect(),
        }
    }

    /// Return type tag.
    pub fn return_tag(&self) -> TypeTag {
        self.ret
    }

    /// Number of declared parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Parameter tag at `index`; `Invalid` when out of range.
    pub fn param_tag(&self, index: usize) -> TypeTag {
        self.params.get(index).copied().unwrap_or(TypeTag::Invalid)
    }

    /// Key for parameter `index` in the fallback encoding: the declared
    /// name when present, `argN` otherwise.
    pub fn param_key(&self, index: usize) -> String {
        match self.names.get(index) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("arg{index}"),
        }
    }

    /// True when any parameter tag is `Invalid` — such signatures are
    /// routed through the generic fallback encoding.
    pub fn has_unknown_params(&self) -> bool {
        self.params.iter().any(|t| *t == TypeTag::Invalid)
    }

    /// Structural compatibility: same return tag and parameter tags.
    pub fn compatible(&self, other: &Signature) -> bool {
        self.ret == other.ret && self.params == other.params
    }

    /// Human-readable form, e.g. `"void(int,float)"`.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ret.name())?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(p.name())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_signature() {
        let sig = Signature::default();
        assert_eq!(sig.return_tag(), TypeTag::Void);
        assert_eq!(sig.param_count(), 0);
        assert_eq!(sig.display(), "void()");
    }

    #[test]
    fn test_out_of_range_is_invalid() {
        let sig = Signature::new(TypeTag::Int, &[TypeTag::Bool]);
        assert_eq!(sig.param_tag(0), TypeTag::Bool);
        assert_eq!(sig.param_tag(1), TypeTag::Invalid);
        assert_eq!(sig.param_tag(100), TypeTag::Invalid);
    }

    #[test]
    fn test_display_form() {
        let sig = Signature::new(TypeTag::Void, &[TypeTag::Int, TypeTag::Float]);
        assert_eq!(sig.display(), "void(int,float)");
    }

    #[test]
    fn test_param_keys() {
        let named = Signature::with_names(
            TypeTag::Void,
            &[("amount", TypeTag::Int), ("label", TypeTag::Str)],
        );
        assert_eq!(named.param_key(0), "amount");
        assert_eq!(named.param_key(1), "label");

        let unnamed = Signature::new(TypeTag::Void, &[TypeTag::Int]);
        assert_eq!(unnamed.param_key(0), "arg0");
    }

    #[test]
    fn test_compatibility() {
        let a = Signature::new(TypeTag::Int, &[TypeTag::Int, TypeTag::Int]);
        let b = Signature::new(TypeTag::Int, &[TypeTag::Int, TypeTag::Int]);
        let c = Signature::new(TypeTag::Int, &[TypeTag::Int]);
        assert!(a.compatible(&b));
        assert!(!a.compatible(&c));
    }
}
