//! Syntax tree for one statement.
//!
//! Nodes own their children and borrow the tokens that introduced them from
//! the statement's token vector, so a tree never outlives the statement it
//! was parsed from. The analyzer fills in `Expr::ty`.

use crate::lexer::Token;
use crate::span::Span;
use crate::types::TypeRef;

/// Root of one statement: every top-level expression up to the terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Root<'t> {
    pub token: &'t Token,
    pub expressions: Vec<Expr<'t>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr<'t> {
    pub kind: ExprKind<'t>,
    /// Token that introduced the node, for diagnostics.
    pub token: &'t Token,
    /// Resolved type, set by the analyzer for value-producing expressions.
    pub ty: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind<'t> {
    /// `fn name(args) [-> ret]`
    FunctionDef {
        name: &'t Token,
        args: Vec<FunctionArg<'t>>,
        ret: Option<Box<Expr<'t>>>,
    },
    /// `if condition then`
    If {
        condition: Box<Expr<'t>>,
        then: Box<Expr<'t>>,
    },
    Binary {
        left: Box<Expr<'t>>,
        right: Box<Expr<'t>>,
        op: &'t Token,
    },
    Identifier,
    Literal(Literal),
    /// String constant; the text lives on the token.
    String,
    /// `{ expr* }`
    Block(Vec<Expr<'t>>),
    /// `name : [type] = init`
    Declaration {
        name: &'t Token,
        annotation: Option<Box<Expr<'t>>>,
        init: Box<Expr<'t>>,
    },
    /// `callee(args, ...)`
    Call {
        callee: Box<Expr<'t>>,
        args: Vec<Expr<'t>>,
    },
}

/// One parameter of a function definition.
///
/// When the `: type` part is omitted the identifier itself stands in for
/// the type name.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArg<'t> {
    pub name: &'t Token,
    pub type_name: &'t Token,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Char(u8),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl<'t> Expr<'t> {
    pub fn new(kind: ExprKind<'t>, token: &'t Token) -> Self {
        Expr {
            kind,
            token,
            ty: None,
        }
    }

    pub fn span(&self) -> Span {
        self.token.span
    }

    /// Identifier text for `Identifier` nodes.
    pub fn identifier(&self) -> Option<&'t str> {
        match self.kind {
            ExprKind::Identifier => Some(self.token.text()),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ExprKind::FunctionDef { .. } => "function definition",
            ExprKind::If { .. } => "if",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Identifier => "identifier",
            ExprKind::Literal(_) => "literal",
            ExprKind::String => "string",
            ExprKind::Block(_) => "block",
            ExprKind::Declaration { .. } => "declaration",
            ExprKind::Call { .. } => "call",
        }
    }
}

/// Indented one-node-per-line dump, used by `--emit ast`.
pub fn dump(root: &Root<'_>) -> String {
    let mut out = String::from("Root\n");
    for expr in &root.expressions {
        dump_expr(expr, 1, &mut out);
    }
    out
}

fn dump_expr(expr: &Expr<'_>, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    let label = match &expr.kind {
        ExprKind::FunctionDef { name, args, .. } => {
            let params: Vec<String> = args
                .iter()
                .map(|arg| format!("{}: {}", arg.name.text(), arg.type_name.text()))
                .collect();
            format!("FunctionDef {}({})", name.text(), params.join(", "))
        }
        ExprKind::If { .. } => "If".to_string(),
        ExprKind::Binary { op, .. } => format!("Binary {}", op.kind.describe()),
        ExprKind::Identifier => format!("Identifier {}", expr.token.text()),
        ExprKind::Literal(lit) => format!("Literal {lit:?}"),
        ExprKind::String => format!("String {:?}", expr.token.text()),
        ExprKind::Block(_) => "Block".to_string(),
        ExprKind::Declaration { name, .. } => format!("Declaration {}", name.text()),
        ExprKind::Call { args, .. } => format!("Call/{}", args.len()),
    };
    out.push_str(&label);
    if let Some(ty) = &expr.ty {
        out.push_str(" : ");
        out.push_str(&ty.name);
    }
    out.push('\n');

    match &expr.kind {
        ExprKind::FunctionDef { ret, .. } => {
            if let Some(ret) = ret {
                dump_expr(ret, depth + 1, out);
            }
        }
        ExprKind::If { condition, then } => {
            dump_expr(condition, depth + 1, out);
            dump_expr(then, depth + 1, out);
        }
        ExprKind::Binary { left, right, .. } => {
            dump_expr(left, depth + 1, out);
            dump_expr(right, depth + 1, out);
        }
        ExprKind::Block(children) => {
            for child in children {
                dump_expr(child, depth + 1, out);
            }
        }
        ExprKind::Declaration {
            annotation, init, ..
        } => {
            if let Some(annotation) = annotation {
                dump_expr(annotation, depth + 1, out);
            }
            dump_expr(init, depth + 1, out);
        }
        ExprKind::Call { callee, args } => {
            dump_expr(callee, depth + 1, out);
            for arg in args {
                dump_expr(arg, depth + 1, out);
            }
        }
        ExprKind::Identifier | ExprKind::Literal(_) | ExprKind::String => {}
    }
}
