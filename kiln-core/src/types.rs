//! Type descriptors and the type registry.
//!
//! Built-in descriptors are created once per registry and handed out as
//! shared `TypeRef`s, so two lookups of the same name return the very same
//! allocation. Function types are built per signature by the analyzer.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::CoreError;

/// Shared, immutable handle to a type descriptor.
pub type TypeRef = Rc<TypeInfo>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Integer,
    UnsignedInteger,
    Float,
    /// Reserved for struct types; nothing constructs it yet.
    Composite,
    String,
    Function,
    Boolean,
}

/// Parameter and return types of a function type.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<TypeRef>,
    pub ret: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub kind: TypeKind,
    /// Width in bits for numeric and boolean kinds, zero otherwise.
    pub bits: u32,
    pub name: String,
    /// Present exactly when `kind` is `Function`.
    pub signature: Option<Signature>,
}

impl TypeInfo {
    pub fn basic(name: impl Into<String>, kind: TypeKind, bits: u32) -> Self {
        TypeInfo {
            kind,
            bits,
            name: name.into(),
            signature: None,
        }
    }

    pub fn function(params: Vec<TypeRef>, ret: Option<TypeRef>) -> Self {
        let mut name = String::from("fn(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                name.push_str(", ");
            }
            name.push_str(&param.name);
        }
        name.push(')');
        if let Some(ret) = &ret {
            name.push_str(" -> ");
            name.push_str(&ret.name);
        }
        TypeInfo {
            kind: TypeKind::Function,
            bits: 0,
            name,
            signature: Some(Signature { params, ret }),
        }
    }

    /// Integer, float or boolean: the operand kinds binary operators accept.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Integer | TypeKind::UnsignedInteger | TypeKind::Float | TypeKind::Boolean
        )
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == TypeKind::Boolean
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Structural type identity.
///
/// Kinds and widths must agree; function types additionally need the same
/// arity, pairwise-matching parameters and matching return types. Display
/// names are not compared and there are no implicit conversions.
pub fn types_match(a: &TypeInfo, b: &TypeInfo) -> bool {
    if a.kind != b.kind || a.bits != b.bits {
        return false;
    }
    match (&a.signature, &b.signature) {
        (None, None) => true,
        (Some(sa), Some(sb)) => {
            sa.params.len() == sb.params.len()
                && sa
                    .params
                    .iter()
                    .zip(sb.params.iter())
                    .all(|(pa, pb)| types_match(pa, pb))
                && match (&sa.ret, &sb.ret) {
                    (None, None) => true,
                    (Some(ra), Some(rb)) => types_match(ra, rb),
                    _ => false,
                }
        }
        _ => false,
    }
}

/// Built-in types seeded into every registry.
const BUILTIN_TYPES: &[(&str, TypeKind, u32)] = &[
    ("i8", TypeKind::Integer, 8),
    ("i16", TypeKind::Integer, 16),
    ("i32", TypeKind::Integer, 32),
    ("i64", TypeKind::Integer, 64),
    ("u8", TypeKind::UnsignedInteger, 8),
    ("u16", TypeKind::UnsignedInteger, 16),
    ("u32", TypeKind::UnsignedInteger, 32),
    ("u64", TypeKind::UnsignedInteger, 64),
    ("f32", TypeKind::Float, 32),
    ("f64", TypeKind::Float, 64),
    ("b32", TypeKind::Boolean, 32),
    ("string", TypeKind::String, 0),
];

/// Mapping from type name to descriptor.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeRef>,
}

impl TypeRegistry {
    /// Registry pre-populated with the built-in types.
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            types: HashMap::with_capacity(BUILTIN_TYPES.len()),
        };
        for &(name, kind, bits) in BUILTIN_TYPES {
            registry.register(TypeInfo::basic(name, kind, bits));
        }
        registry
    }

    /// Add a named type; an existing entry with the same name is replaced.
    pub fn register(&mut self, info: TypeInfo) -> TypeRef {
        let handle = Rc::new(info);
        self.types.insert(handle.name.clone(), Rc::clone(&handle));
        handle
    }

    /// `None` means "no such type"; callers decide whether that is an error.
    pub fn get(&self, name: &str) -> Option<TypeRef> {
        self.types.get(name).cloned()
    }

    /// Lookup for names the analyzer relies on being present.
    pub(crate) fn builtin(&self, name: &str) -> Result<TypeRef, CoreError> {
        self.get(name)
            .ok_or_else(|| CoreError::internal(None, format!("built-in type `{name}` is missing")))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_identity_stable() {
        let registry = TypeRegistry::new();
        let first = registry.get("i64").expect("i64");
        let second = registry.get("i64").expect("i64");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.kind, TypeKind::Integer);
        assert_eq!(first.bits, 64);
    }

    #[test]
    fn unknown_names_are_absent() {
        let registry = TypeRegistry::new();
        assert!(registry.get("point").is_none());
        assert_eq!(registry.len(), BUILTIN_TYPES.len());
    }

    #[test]
    fn structural_match_compares_kind_and_width() {
        let registry = TypeRegistry::new();
        let i64_ty = registry.get("i64").unwrap();
        let u64_ty = registry.get("u64").unwrap();
        let f64_ty = registry.get("f64").unwrap();
        let other_i64 = TypeInfo::basic("long", TypeKind::Integer, 64);
        assert!(types_match(&i64_ty, &i64_ty));
        assert!(types_match(&i64_ty, &other_i64));
        assert!(!types_match(&i64_ty, &u64_ty));
        assert!(!types_match(&i64_ty, &f64_ty));
        assert!(!types_match(&i64_ty, &registry.get("i32").unwrap()));
    }

    #[test]
    fn function_types_match_by_signature() {
        let registry = TypeRegistry::new();
        let i64_ty = registry.get("i64").unwrap();
        let f64_ty = registry.get("f64").unwrap();
        let a = TypeInfo::function(vec![i64_ty.clone(), i64_ty.clone()], Some(i64_ty.clone()));
        let b = TypeInfo::function(vec![i64_ty.clone(), i64_ty.clone()], Some(i64_ty.clone()));
        let fewer = TypeInfo::function(vec![i64_ty.clone()], Some(i64_ty.clone()));
        let other_ret = TypeInfo::function(vec![i64_ty.clone(), i64_ty.clone()], Some(f64_ty));
        let no_ret = TypeInfo::function(vec![i64_ty.clone(), i64_ty], None);
        assert!(types_match(&a, &b));
        assert!(!types_match(&a, &fewer));
        assert!(!types_match(&a, &other_ret));
        assert!(!types_match(&a, &no_ret));
        assert_eq!(a.name, "fn(i64, i64) -> i64");
    }

    #[test]
    fn boolean_counts_as_arithmetic() {
        let registry = TypeRegistry::new();
        assert!(registry.get("b32").unwrap().is_arithmetic());
        assert!(!registry.get("string").unwrap().is_arithmetic());
    }
}
