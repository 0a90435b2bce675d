//! Name resolution and type checking for one statement.
//!
//! The analyzer walks the tree produced by the parser, resolves every
//! identifier through the scope stack, and stores the resolved type on each
//! value-producing node. Type identity is structural, see
//! [`types_match`](crate::types::types_match).
//!
//! Statement-level forms (`if`, blocks, function definitions) carry no type.
//! Function definitions are only meaningful as type annotations and are
//! resolved by [`Analyzer::resolve_type`].

use std::rc::Rc;

use crate::ast::{Expr, ExprKind, Literal, Root};
use crate::error::CoreError;
use crate::scope::{Scope, ScopeStack};
use crate::span::Span;
use crate::types::{TypeInfo, TypeKind, TypeRef, TypeRegistry, types_match};

/// Analyze a whole statement.
///
/// On success the statement's root scope is returned still closed over its
/// bindings; the caller commits it to the session once the rest of the
/// pipeline has succeeded. On failure every scope opened here is abandoned.
pub fn analyze(
    root: &mut Root<'_>,
    registry: &TypeRegistry,
    scopes: &mut ScopeStack,
) -> Result<Scope, CoreError> {
    let mut analyzer = Analyzer::new(registry, scopes);
    let result = analyzer.check_root(root);
    if result.is_err() {
        scopes.abandon();
    }
    result
}

pub struct Analyzer<'a> {
    registry: &'a TypeRegistry,
    scopes: &'a mut ScopeStack,
}

impl<'a> Analyzer<'a> {
    pub fn new(registry: &'a TypeRegistry, scopes: &'a mut ScopeStack) -> Self {
        Analyzer { registry, scopes }
    }

    fn check_root(&mut self, root: &mut Root<'_>) -> Result<Scope, CoreError> {
        self.scopes.push(root.token.span)?;
        for expr in &mut root.expressions {
            self.analyze_expression(expr)?;
        }
        let end = root
            .expressions
            .last()
            .map_or(root.token.span, |expr| expr.span());
        self.scopes.pop(end)
    }

    /// Type of `expr`, or `None` for forms that produce no value.
    pub fn analyze_expression(&mut self, expr: &mut Expr<'_>) -> Result<Option<TypeRef>, CoreError> {
        let span = expr.span();
        let ty = match &mut expr.kind {
            ExprKind::Declaration {
                name,
                annotation,
                init,
            } => {
                let declared = match annotation {
                    Some(annotation) => {
                        let declared = self.resolve_type(annotation)?;
                        let init_ty = self.analyze_value(init)?;
                        must_match(&declared, &init_ty, init.span())?;
                        declared
                    }
                    None => self.analyze_value(init)?,
                };
                self.scopes
                    .declare(name.text(), Rc::clone(&declared), name.span)?;
                Some(declared)
            }
            ExprKind::Call { callee, args } => {
                let callee_ty = self.analyze_value(callee)?;
                let Some(signature) = callee_ty.signature.as_ref() else {
                    return Err(CoreError::NotCallable {
                        span: callee.span(),
                        found: callee_ty.name.clone(),
                    });
                };
                if signature.params.len() != args.len() {
                    return Err(CoreError::Arity {
                        span,
                        expected: signature.params.len(),
                        found: args.len(),
                    });
                }
                for (param, arg) in signature.params.iter().zip(args.iter_mut()) {
                    let arg_ty = self.analyze_value(arg)?;
                    must_match(param, &arg_ty, arg.span())?;
                }
                signature.ret.clone()
            }
            ExprKind::Block(children) => {
                self.scopes.push(span)?;
                for child in children.iter_mut() {
                    self.analyze_expression(child)?;
                }
                self.scopes.pop(span)?;
                None
            }
            ExprKind::String => Some(self.registry.builtin("string")?),
            ExprKind::Literal(lit) => Some(self.literal_type(*lit)?),
            ExprKind::Identifier => {
                let name = expr.token.text();
                let symbol = self
                    .scopes
                    .lookup(name)
                    .ok_or_else(|| CoreError::UndefinedIdentifier {
                        span,
                        name: name.to_string(),
                    })?;
                Some(Rc::clone(&symbol.ty))
            }
            ExprKind::Binary { left, right, .. } => {
                let left_ty = self.analyze_value(left)?;
                let right_ty = self.analyze_value(right)?;
                require_arithmetic(&left_ty, left.span())?;
                require_arithmetic(&right_ty, right.span())?;
                must_match(&left_ty, &right_ty, right.span())?;
                Some(left_ty)
            }
            ExprKind::If { condition, then } => {
                let cond_ty = self.analyze_value(condition)?;
                if !cond_ty.is_boolean() {
                    return Err(CoreError::TypeMismatch {
                        span: condition.span(),
                        expected: "b32".to_string(),
                        found: cond_ty.name.clone(),
                    });
                }
                // The branch may not run, so nothing it declares outlives it.
                self.scopes.push(then.span())?;
                self.analyze_expression(then)?;
                self.scopes.pop(then.span())?;
                None
            }
            ExprKind::FunctionDef { .. } => {
                return Err(CoreError::syntax(
                    span,
                    "a function definition is only valid as a type",
                ));
            }
        };
        expr.ty = ty.clone();
        Ok(ty)
    }

    /// Like [`analyze_expression`](Self::analyze_expression) but the node
    /// must produce a value.
    fn analyze_value(&mut self, expr: &mut Expr<'_>) -> Result<TypeRef, CoreError> {
        match self.analyze_expression(expr)? {
            Some(ty) => Ok(ty),
            None => Err(CoreError::TypeMismatch {
                span: expr.span(),
                expected: "a value".to_string(),
                found: format!("{} without a value", expr.kind_name()),
            }),
        }
    }

    /// Resolve a type annotation: a type name or a function signature.
    pub fn resolve_type(&mut self, expr: &mut Expr<'_>) -> Result<TypeRef, CoreError> {
        let span = expr.span();
        let kind_name = expr.kind_name();
        let ty = match &mut expr.kind {
            ExprKind::Identifier => self.named_type(expr.token.text(), span)?,
            ExprKind::FunctionDef { args, ret, .. } => {
                let params = args
                    .iter()
                    .map(|arg| self.named_type(arg.type_name.text(), arg.type_name.span))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret = match ret {
                    Some(ret) => Some(self.resolve_type(ret)?),
                    None => None,
                };
                Rc::new(TypeInfo::function(params, ret))
            }
            _ => {
                return Err(CoreError::syntax(
                    span,
                    format!("expected a type, got {kind_name}"),
                ));
            }
        };
        expr.ty = Some(Rc::clone(&ty));
        Ok(ty)
    }

    fn named_type(&self, name: &str, span: Span) -> Result<TypeRef, CoreError> {
        self.registry.get(name).ok_or_else(|| CoreError::UnknownType {
            span,
            name: name.to_string(),
        })
    }

    fn literal_type(&self, lit: Literal) -> Result<TypeRef, CoreError> {
        let name = match lit {
            Literal::Char(_) => "i8",
            Literal::Int(_) => "i64",
            Literal::Float(_) => "f64",
            Literal::Bool(_) => "b32",
        };
        self.registry.builtin(name)
    }
}

fn must_match(expected: &TypeInfo, found: &TypeInfo, span: Span) -> Result<(), CoreError> {
    if types_match(expected, found) {
        Ok(())
    } else {
        Err(CoreError::TypeMismatch {
            span,
            expected: expected.name.clone(),
            found: found.name.clone(),
        })
    }
}

fn require_arithmetic(ty: &TypeInfo, span: Span) -> Result<(), CoreError> {
    if ty.is_arithmetic() {
        return Ok(());
    }
    Err(CoreError::TypeMismatch {
        span,
        expected: "integer, float or boolean".to_string(),
        found: match ty.kind {
            TypeKind::Function => format!("function `{}`", ty.name),
            _ => ty.name.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex_statement;
    use crate::parser::parse_tokens;

    fn check(source: &str, scopes: &mut ScopeStack, registry: &TypeRegistry) -> Result<(), CoreError> {
        let tokens = lex_statement(source)?;
        let mut root = parse_tokens(&tokens, scopes.max_depth())?;
        let scope = analyze(&mut root, registry, scopes)?;
        scopes.commit(scope);
        Ok(())
    }

    /// Session with `add: fn(i64, i64) -> i64` in scope.
    fn session() -> (ScopeStack, TypeRegistry) {
        let registry = TypeRegistry::new();
        let i64_ty = registry.get("i64").unwrap();
        let mut scopes = ScopeStack::new(16);
        let add = TypeInfo::function(vec![i64_ty.clone(), i64_ty.clone()], Some(i64_ty));
        scopes.declare("add", Rc::new(add), Span::point(0)).unwrap();
        (scopes, registry)
    }

    #[test]
    fn annotated_declaration_resolves_to_builtin_descriptor() {
        let registry = TypeRegistry::new();
        let mut scopes = ScopeStack::new(16);
        let tokens = lex_statement("x: i64 = 5;").unwrap();
        let mut root = parse_tokens(&tokens, scopes.max_depth()).unwrap();
        analyze(&mut root, &registry, &mut scopes).unwrap();
        let ty = root.expressions[0].ty.as_ref().unwrap();
        assert!(Rc::ptr_eq(ty, &registry.get("i64").unwrap()));
    }

    #[test]
    fn inferred_declaration_takes_initializer_type() {
        let (mut scopes, registry) = session();
        check("y := 2.5;", &mut scopes, &registry).unwrap();
        assert_eq!(scopes.lookup("y").unwrap().ty.name, "f64");
        check("c := 'a';", &mut scopes, &registry).unwrap();
        assert_eq!(scopes.lookup("c").unwrap().ty.name, "i8");
    }

    #[test]
    fn redeclaration_in_one_statement_is_rejected() {
        let (mut scopes, registry) = session();
        let err = check("x: i64 = 1 x: i64 = 2;", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::Redeclaration { ref name, .. } if name == "x"));
        assert_eq!(scopes.depth(), 0);
        assert!(scopes.lookup("x").is_none());
    }

    #[test]
    fn redeclaration_across_statements_is_rejected() {
        let (mut scopes, registry) = session();
        check("x: i64 = 1;", &mut scopes, &registry).unwrap();
        let err = check("x: i64 = 2;", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::Redeclaration { .. }));
    }

    #[test]
    fn annotation_mismatch_is_rejected() {
        let (mut scopes, registry) = session();
        let err = check("x: i32 = 5;", &mut scopes, &registry).unwrap_err();
        assert!(matches!(
            err,
            CoreError::TypeMismatch { ref expected, ref found, .. } if expected == "i32" && found == "i64"
        ));
    }

    #[test]
    fn call_checks_arity_and_argument_types() {
        let (mut scopes, registry) = session();
        let err = check("add(1);", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::Arity { expected: 2, found: 1, .. }));

        let err = check("add(1, \"two\");", &mut scopes, &registry).unwrap_err();
        assert!(matches!(
            err,
            CoreError::TypeMismatch { ref expected, ref found, .. } if expected == "i64" && found == "string"
        ));

        check("r := add(1, 2);", &mut scopes, &registry).unwrap();
        assert_eq!(scopes.lookup("r").unwrap().ty.name, "i64");
    }

    #[test]
    fn calling_a_non_function_is_rejected() {
        let (mut scopes, registry) = session();
        check("n := 3;", &mut scopes, &registry).unwrap();
        let err = check("n(1);", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::NotCallable { ref found, .. } if found == "i64"));
    }

    #[test]
    fn undefined_identifier_is_rejected() {
        let (mut scopes, registry) = session();
        let err = check("y := z + 1;", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::UndefinedIdentifier { ref name, .. } if name == "z"));
    }

    #[test]
    fn unknown_annotation_is_rejected() {
        let (mut scopes, registry) = session();
        let err = check("p: point = 1;", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::UnknownType { ref name, .. } if name == "point"));
    }

    #[test]
    fn binary_operands_must_agree() {
        let (mut scopes, registry) = session();
        check("a := 1 + 2 * 3;", &mut scopes, &registry).unwrap();
        assert!(matches!(
            check("b := 1 + 2.0;", &mut scopes, &registry),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check("s := \"a\" + \"b\";", &mut scopes, &registry),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn blocks_balance_scopes_and_hide_inner_names() {
        let (mut scopes, registry) = session();
        check("{ { inner := 1 } }", &mut scopes, &registry).unwrap();
        assert_eq!(scopes.pushes(), scopes.pops());
        assert_eq!(scopes.pushes(), 3);
        assert!(scopes.lookup("inner").is_none());

        let err = check("{ { inner := 1 } inner }", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::UndefinedIdentifier { .. }));
    }

    #[test]
    fn if_requires_boolean_condition() {
        let (mut scopes, registry) = session();
        check("if true add(1, 2);", &mut scopes, &registry).unwrap();
        let err = check("if 1 add(1, 2);", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { ref expected, .. } if expected == "b32"));
    }

    #[test]
    fn if_branch_declarations_stay_in_the_branch() {
        let (mut scopes, registry) = session();
        check("if false y := 1;", &mut scopes, &registry).unwrap();
        assert_eq!(scopes.pushes(), 2);
        assert_eq!(scopes.pushes(), scopes.pops());
        assert!(scopes.lookup("y").is_none());

        let err = check("z := y;", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::UndefinedIdentifier { ref name, .. } if name == "y"));
    }

    #[test]
    fn function_annotation_builds_function_type() {
        let (mut scopes, registry) = session();
        check("f: fn f(a: i64, b: i64) -> i64 = add;", &mut scopes, &registry).unwrap();
        let f = scopes.lookup("f").unwrap();
        assert_eq!(f.ty.kind, TypeKind::Function);
        assert_eq!(f.ty.name, "fn(i64, i64) -> i64");

        let err = check("g: fn g(a: i64) -> i64 = add;", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn function_definition_is_not_a_value() {
        let (mut scopes, registry) = session();
        let err = check("h := fn h(a: i64);", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn statement_forms_have_no_value() {
        let (mut scopes, registry) = session();
        let err = check("v := { 1 };", &mut scopes, &registry).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { ref expected, .. } if expected == "a value"));
    }
}
