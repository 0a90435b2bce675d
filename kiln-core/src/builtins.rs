//! Host-provided builtin functions.
//!
//! This module only describes the builtins. The virtual machine that runs
//! the bytecode implements them; the generator lowers a call to one of
//! these names to `CALL <id>`.

use std::rc::Rc;

use crate::error::CoreError;
use crate::scope::ScopeStack;
use crate::span::Span;
use crate::types::{TypeInfo, TypeRegistry};

/// Metadata about a single builtin symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Name at the language level (e.g., `print_i64`).
    pub name: &'static str,

    /// Operand of the `CALL` instruction.
    pub id: u16,

    /// Parameter type names, resolved through the type registry.
    pub params: &'static [&'static str],

    /// Return type name, if the builtin produces a value.
    pub ret: Option<&'static str>,
}

/// The complete list of builtins known to the core.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "print_i64",
        id: 0,
        params: &["i64"],
        ret: None,
    },
    BuiltinDescriptor {
        name: "print_f64",
        id: 1,
        params: &["f64"],
        ret: None,
    },
    BuiltinDescriptor {
        name: "print_b32",
        id: 2,
        params: &["b32"],
        ret: None,
    },
    BuiltinDescriptor {
        name: "pow_i64",
        id: 3,
        params: &["i64", "i64"],
        ret: Some("i64"),
    },
    BuiltinDescriptor {
        name: "sqrt_f64",
        id: 4,
        params: &["f64"],
        ret: Some("f64"),
    },
];

/// Look up a builtin by its language-level name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|b| b.name == name)
}

impl BuiltinDescriptor {
    /// Function type of the builtin.
    pub fn function_type(&self, registry: &TypeRegistry) -> Result<TypeInfo, CoreError> {
        let params = self
            .params
            .iter()
            .map(|name| registry.builtin(name))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = self.ret.map(|name| registry.builtin(name)).transpose()?;
        Ok(TypeInfo::function(params, ret))
    }
}

/// Bind every builtin in the session scope.
pub fn declare_builtins(registry: &TypeRegistry, scopes: &mut ScopeStack) -> Result<(), CoreError> {
    for builtin in BUILTINS {
        let ty = Rc::new(builtin.function_type(registry)?);
        scopes.declare(builtin.name, ty, Span::default())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    #[test]
    fn ids_are_unique_and_match_position() {
        for (i, builtin) in BUILTINS.iter().enumerate() {
            assert_eq!(builtin.id as usize, i, "{}", builtin.name);
        }
    }

    #[test]
    fn builtin_types_resolve() {
        let registry = TypeRegistry::new();
        let pow = find_builtin("pow_i64").unwrap().function_type(&registry).unwrap();
        assert_eq!(pow.kind, TypeKind::Function);
        assert_eq!(pow.name, "fn(i64, i64) -> i64");
        assert!(find_builtin("printf").is_none());
    }

    #[test]
    fn declared_builtins_are_visible() {
        let registry = TypeRegistry::new();
        let mut scopes = ScopeStack::new(4);
        declare_builtins(&registry, &mut scopes).unwrap();
        assert_eq!(scopes.session_symbols().len(), BUILTINS.len());
        assert!(scopes.lookup("print_f64").is_some());
    }
}
