//! Lexical scopes for name resolution.
//!
//! A statement's scopes live on a stack: the root scope at depth 1 and one
//! more per nested block. Bindings that survive a successful statement are
//! promoted into the session scope, which sits below the stack and is
//! consulted last.

use crate::error::CoreError;
use crate::span::Span;
use crate::types::TypeRef;

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    symbols: Vec<Symbol>,
    opened_at: Span,
}

impl Scope {
    pub fn new(opened_at: Span) -> Self {
        Scope {
            symbols: Vec::new(),
            opened_at,
        }
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|sym| sym.name == name)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn opened_at(&self) -> Span {
        self.opened_at
    }

    fn insert(&mut self, symbol: Symbol) -> Result<(), CoreError> {
        if self.find(&symbol.name).is_some() {
            return Err(CoreError::Redeclaration {
                span: symbol.span,
                name: symbol.name,
            });
        }
        self.symbols.push(symbol);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    session: Scope,
    max_depth: usize,
    pushes: usize,
    pops: usize,
}

impl ScopeStack {
    pub fn new(max_depth: usize) -> Self {
        ScopeStack {
            scopes: Vec::new(),
            session: Scope::default(),
            max_depth,
            pushes: 0,
            pops: 0,
        }
    }

    /// Number of open statement scopes.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn push(&mut self, opened_at: Span) -> Result<(), CoreError> {
        if self.scopes.len() >= self.max_depth {
            return Err(CoreError::ScopeOverflow {
                span: opened_at,
                limit: self.max_depth,
            });
        }
        self.scopes.push(Scope::new(opened_at));
        self.pushes += 1;
        Ok(())
    }

    pub fn pop(&mut self, closed_at: Span) -> Result<Scope, CoreError> {
        let scope = self
            .scopes
            .pop()
            .ok_or(CoreError::ScopeUnderflow { span: closed_at })?;
        self.pops += 1;
        Ok(scope)
    }

    /// Innermost scope first, then outward, then the session scope.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.find(name))
            .or_else(|| self.session.find(name))
    }

    /// Bind `name` in the innermost scope.
    ///
    /// A name may shadow outer bindings but not repeat within one scope. The
    /// root scope and the session scope count as one scope for this check.
    pub fn declare(&mut self, name: &str, ty: TypeRef, span: Span) -> Result<(), CoreError> {
        let at_root = self.scopes.len() == 1;
        if at_root && self.session.find(name).is_some() {
            return Err(CoreError::Redeclaration {
                span,
                name: name.to_string(),
            });
        }
        let symbol = Symbol {
            name: name.to_string(),
            ty,
            span,
        };
        match self.scopes.last_mut() {
            Some(scope) => scope.insert(symbol),
            None => self.session.insert(symbol),
        }
    }

    /// Keep the bindings of a finished root scope for later statements.
    pub fn commit(&mut self, root: Scope) {
        self.session.symbols.extend(root.symbols);
    }

    /// Drop any statement scopes still open after a failure.
    pub fn abandon(&mut self) {
        self.scopes.clear();
    }

    /// Forget everything, including session bindings.
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.session = Scope::default();
        self.pushes = 0;
        self.pops = 0;
    }

    pub fn session_symbols(&self) -> &[Symbol] {
        self.session.symbols()
    }

    pub fn pushes(&self) -> usize {
        self.pushes
    }

    pub fn pops(&self) -> usize {
        self.pops
    }
}
