//! Bytecode generation from an analyzed tree.
//!
//! Locals live in numbered slots. Each scope depth owns a frame of slots
//! that starts at the parent frame's next free slot; leaving a block drops
//! its frame so sibling blocks reuse the same numbers. The root frame
//! persists across statements so later statements can load earlier
//! declarations.
//!
//! Jump targets are absolute offsets into the session's whole program,
//! which is the concatenation of every statement's stream in order.

use crate::ast::{Expr, ExprKind, Literal, Root};
use crate::builtins::find_builtin;
use crate::bytecode::{ArithClass, ArithOp, Bytecode, Opcode, StorageClass};
use crate::error::CoreError;
use crate::lexer::TokenKind;
use crate::span::Span;
use crate::types::{TypeInfo, TypeRef};

#[derive(Debug, Clone, Default)]
struct SlotFrame {
    bindings: Vec<(String, u16)>,
    next: u16,
}

#[derive(Debug, Clone)]
pub struct CodegenContext {
    frames: Vec<SlotFrame>,
    /// Program offset at which the next statement's code starts.
    origin: usize,
}

impl Default for CodegenContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CodegenContext {
    pub fn new() -> Self {
        CodegenContext {
            frames: vec![SlotFrame::default()],
            origin: 0,
        }
    }

    /// Slot bindings that outlive the current statement.
    pub fn root_slots(&self) -> impl Iterator<Item = (&str, u16)> + '_ {
        self.frames[0]
            .bindings
            .iter()
            .map(|(name, slot)| (name.as_str(), *slot))
    }

    pub fn origin(&self) -> usize {
        self.origin
    }

    pub fn slot_of(&self, name: &str) -> Option<u16> {
        self.frames.iter().rev().find_map(|frame| {
            frame
                .bindings
                .iter()
                .rev()
                .find(|(bound, _)| bound == name)
                .map(|(_, slot)| *slot)
        })
    }

    fn current_frame(&mut self) -> Result<&mut SlotFrame, CoreError> {
        self.frames
            .last_mut()
            .ok_or_else(|| CoreError::internal(None, "slot frame stack is empty"))
    }

    fn bind_slot(&mut self, name: &str, span: Span) -> Result<u16, CoreError> {
        let frame = self.current_frame()?;
        let slot = frame.next;
        frame.next = slot
            .checked_add(1)
            .ok_or_else(|| CoreError::unsupported(span, "too many live variables"))?;
        frame.bindings.push((name.to_string(), slot));
        Ok(slot)
    }

    fn open_frame(&mut self) -> Result<(), CoreError> {
        let next = self.current_frame()?.next;
        self.frames.push(SlotFrame {
            bindings: Vec::new(),
            next,
        });
        Ok(())
    }

    fn close_frame(&mut self, span: Span) -> Result<(), CoreError> {
        if self.frames.len() <= 1 {
            return Err(CoreError::internal(Some(span), "closing the root slot frame"));
        }
        self.frames.pop();
        Ok(())
    }

    /// Lower a whole statement into a fresh buffer.
    ///
    /// Top-level expressions that produce a value leave it on the stack.
    pub fn generate_bytecode(&mut self, root: &Root<'_>, capacity: usize) -> Result<Bytecode, CoreError> {
        let mut code = Bytecode::with_capacity(capacity);
        for expr in &root.expressions {
            self.generate(expr, &mut code)?;
        }
        self.origin += code.len();
        Ok(code)
    }

    /// Append the instructions for one analyzed expression to `code`.
    pub fn generate(&mut self, expr: &Expr<'_>, code: &mut Bytecode) -> Result<(), CoreError> {
        match &expr.kind {
            ExprKind::Declaration { name, init, .. } => {
                self.generate(init, code)?;
                let class = storage_class(typed(expr)?, expr.span())?;
                let slot = self.bind_slot(name.text(), name.span)?;
                code.emit(class.store()?);
                code.push_word(slot);
            }
            ExprKind::Identifier => {
                let name = expr.token.text();
                let Some(slot) = self.slot_of(name) else {
                    if find_builtin(name).is_some() {
                        return Err(CoreError::unsupported(
                            expr.span(),
                            format!("builtin `{name}` can only be called"),
                        ));
                    }
                    return Err(CoreError::internal(
                        Some(expr.span()),
                        format!("no slot bound to `{name}`"),
                    ));
                };
                let class = storage_class(typed(expr)?, expr.span())?;
                code.emit(class.load()?);
                code.push_word(slot);
            }
            ExprKind::Literal(lit) => match *lit {
                Literal::Char(byte) => {
                    code.emit(Opcode::PushB);
                    code.push_byte(byte);
                }
                Literal::Int(value) => {
                    code.emit(Opcode::PushQW);
                    code.push_qword(value as u64);
                }
                Literal::Float(value) => {
                    code.emit(Opcode::PushQW);
                    code.push_qword(value.to_bits());
                }
                Literal::Bool(value) => {
                    code.emit(Opcode::PushDW);
                    code.push_dword(u32::from(value));
                }
            },
            ExprKind::String => {
                return Err(CoreError::unsupported(
                    expr.span(),
                    "string constants have no bytecode form yet",
                ));
            }
            ExprKind::Binary { left, right, op } => {
                self.generate(left, code)?;
                self.generate(right, code)?;
                let arith = match op.kind {
                    TokenKind::Plus => ArithOp::Add,
                    TokenKind::Minus => ArithOp::Sub,
                    TokenKind::Star => ArithOp::Mul,
                    TokenKind::Slash => ArithOp::Div,
                    other => {
                        return Err(CoreError::unsupported(
                            op.span,
                            format!("operator {} is not lowered", other.describe()),
                        ));
                    }
                };
                let ty = typed(expr)?;
                let class = ArithClass::of(ty).ok_or_else(|| {
                    CoreError::unsupported(
                        op.span,
                        format!("no arithmetic instructions for `{}`", ty.name),
                    )
                })?;
                code.emit(arith.opcode(class)?);
            }
            ExprKind::Call { callee, args } => {
                let Some(name) = callee.identifier() else {
                    return Err(CoreError::unsupported(
                        callee.span(),
                        "only named functions can be called",
                    ));
                };
                // A slot means a local holding a function value, even if it
                // shadows a builtin.
                let builtin = match self.slot_of(name) {
                    Some(_) => None,
                    None => find_builtin(name),
                };
                let Some(builtin) = builtin else {
                    return Err(CoreError::unsupported(
                        callee.span(),
                        format!("`{name}` is not a builtin; calls through function values are not lowered"),
                    ));
                };
                for arg in args {
                    self.generate(arg, code)?;
                }
                code.emit(Opcode::Call);
                code.push_word(builtin.id);
            }
            ExprKind::If { condition, then } => {
                self.generate(condition, code)?;
                code.emit(Opcode::JmpF);
                let patch_at = code.len();
                code.push_word(0);
                self.open_frame()?;
                self.generate(then, code)?;
                self.discard_value(then, code)?;
                self.close_frame(expr.span())?;
                let target = u16::try_from(self.origin + code.len()).map_err(|_| {
                    CoreError::unsupported(expr.span(), "jump target beyond 64 KiB of program")
                })?;
                code.patch_word(patch_at, target)?;
            }
            ExprKind::Block(children) => {
                self.open_frame()?;
                for child in children {
                    self.generate(child, code)?;
                    self.discard_value(child, code)?;
                }
                self.close_frame(expr.span())?;
            }
            ExprKind::FunctionDef { .. } => {
                return Err(CoreError::internal(
                    Some(expr.span()),
                    "function definition reached code generation",
                ));
            }
        }
        Ok(())
    }

    /// Pop the value `expr` left on the stack, if any.
    fn discard_value(&self, expr: &Expr<'_>, code: &mut Bytecode) -> Result<(), CoreError> {
        if matches!(expr.kind, ExprKind::Declaration { .. }) {
            return Ok(());
        }
        if let Some(ty) = &expr.ty {
            code.emit(storage_class(ty, expr.span())?.drop_op()?);
        }
        Ok(())
    }
}

fn typed<'e>(expr: &'e Expr<'_>) -> Result<&'e TypeRef, CoreError> {
    expr.ty.as_ref().ok_or_else(|| {
        CoreError::internal(
            Some(expr.span()),
            format!("{} reached code generation without a type", expr.kind_name()),
        )
    })
}

fn storage_class(ty: &TypeInfo, span: Span) -> Result<StorageClass, CoreError> {
    StorageClass::of(ty).ok_or_else(|| {
        CoreError::unsupported(span, format!("values of type `{}` cannot be stored", ty.name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::declare_builtins;
    use crate::bytecode::disassemble;
    use crate::lexer::lex_statement;
    use crate::parser::parse_tokens;
    use crate::scope::ScopeStack;
    use crate::typecheck::analyze;
    use crate::types::TypeRegistry;

    struct Harness {
        registry: TypeRegistry,
        scopes: ScopeStack,
        ctx: CodegenContext,
    }

    impl Harness {
        fn new() -> Self {
            let registry = TypeRegistry::new();
            let mut scopes = ScopeStack::new(32);
            declare_builtins(&registry, &mut scopes).unwrap();
            Harness {
                registry,
                scopes,
                ctx: CodegenContext::new(),
            }
        }

        fn compile(&mut self, source: &str) -> Result<Vec<u8>, CoreError> {
            let tokens = lex_statement(source)?;
            let mut root = parse_tokens(&tokens, self.scopes.max_depth())?;
            let scope = analyze(&mut root, &self.registry, &mut self.scopes)?;
            let code = self.ctx.generate_bytecode(&root, 64)?;
            self.scopes.commit(scope);
            Ok(code.into_bytes())
        }

        fn listing(&mut self, source: &str) -> Vec<String> {
            let bytes = self.compile(source).expect("compile");
            disassemble(&bytes)
                .expect("disassemble")
                .iter()
                .map(|instr| {
                    let text = instr.to_string();
                    text[6..].to_string()
                })
                .collect()
        }
    }

    #[test]
    fn declaration_pushes_then_stores() {
        let mut h = Harness::new();
        let bytes = h.compile("x: i64 = 5;").unwrap();
        assert_eq!(
            bytes,
            vec![
                Opcode::PushQW as u8,
                0, 0, 0, 0, 0, 0, 0, 5,
                Opcode::StoreB as u8 + 3,
                0x00, 0x00,
            ]
        );
    }

    #[test]
    fn later_statements_load_earlier_slots() {
        let mut h = Harness::new();
        h.compile("a := 1;").unwrap();
        h.compile("b := 2;").unwrap();
        assert_eq!(
            h.listing("c := a + b;"),
            vec!["LOADQW slot 0", "LOADQW slot 1", "ADDQW", "STOREQW slot 2"]
        );
    }

    #[test]
    fn binary_lowers_post_order() {
        let mut h = Harness::new();
        assert_eq!(
            h.listing("y := 1.5 * 2.0 - 0.5;"),
            vec![
                format!("PUSHQW {}", 1.5f64.to_bits() as i64),
                format!("PUSHQW {}", 2.0f64.to_bits() as i64),
                "MULF64".to_string(),
                format!("PUSHQW {}", 0.5f64.to_bits() as i64),
                "SUBF64".to_string(),
                "STOREF64 slot 0".to_string(),
            ]
        );
    }

    #[test]
    fn booleans_use_the_dword_class() {
        let mut h = Harness::new();
        assert_eq!(
            h.listing("t := true + false;"),
            vec!["PUSHDW 1", "PUSHDW 0", "ADDDW", "STOREDW slot 0"]
        );
    }

    #[test]
    fn char_literal_pushes_one_byte() {
        let mut h = Harness::new();
        let bytes = h.compile("c := 'A';").unwrap();
        assert_eq!(&bytes[..2], &[Opcode::PushB as u8, b'A']);
        assert_eq!(bytes[2], Opcode::StoreB as u8);
    }

    #[test]
    fn builtin_call_pushes_arguments_then_calls() {
        let mut h = Harness::new();
        assert_eq!(
            h.listing("p := pow_i64(2, 10);"),
            vec!["PUSHQW 2", "PUSHQW 10", "CALL builtin #3", "STOREQW slot 0"]
        );
    }

    #[test]
    fn if_jumps_past_then_branch_and_drops_its_value() {
        let mut h = Harness::new();
        assert_eq!(
            h.listing("if true pow_i64(2, 2);"),
            vec![
                "PUSHDW 1",
                "JMPF -> 001e",
                "PUSHQW 2",
                "PUSHQW 2",
                "CALL builtin #3",
                "DROPQW",
            ]
        );
    }

    #[test]
    fn jump_targets_are_program_absolute() {
        let mut h = Harness::new();
        h.compile("a := 1;").unwrap();
        let listing = h.listing("if true print_i64(a);");
        // `a := 1;` occupies 12 bytes.
        assert_eq!(listing[1], "JMPF -> 001a");
    }

    #[test]
    fn sibling_blocks_reuse_slots() {
        let mut h = Harness::new();
        h.compile("outer := 1;").unwrap();
        assert_eq!(
            h.listing("{ a := 2 } { b := 3 }"),
            vec!["PUSHQW 2", "STOREQW slot 1", "PUSHQW 3", "STOREQW slot 1"]
        );
        assert_eq!(h.ctx.slot_of("a"), None);
        assert_eq!(h.ctx.slot_of("outer"), Some(0));
    }

    #[test]
    fn if_branch_slots_are_released() {
        let mut h = Harness::new();
        h.compile("a := 1;").unwrap();
        let listing = h.listing("if true b := 2;");
        assert_eq!(listing[2..], ["PUSHQW 2", "STOREQW slot 1"]);
        assert_eq!(h.ctx.slot_of("b"), None);
        assert_eq!(h.listing("c := 3;"), vec!["PUSHQW 3", "STOREQW slot 1"]);
    }

    #[test]
    fn block_expression_values_are_dropped() {
        let mut h = Harness::new();
        assert_eq!(h.listing("{ 1 }"), vec!["PUSHQW 1", "DROPQW"]);
    }

    #[test]
    fn unsupported_constructs_are_reported() {
        let mut h = Harness::new();
        assert!(matches!(
            h.compile("s := \"hi\";"),
            Err(CoreError::Unsupported { .. })
        ));
        assert!(matches!(
            h.compile("m := 7 % 2;"),
            Err(CoreError::Unsupported { .. })
        ));
        assert!(matches!(
            h.compile("c := 'a' + 'b';"),
            Err(CoreError::Unsupported { .. })
        ));
        assert!(matches!(
            h.compile("f := print_i64;"),
            Err(CoreError::Unsupported { .. })
        ));
    }
}
