use std::path::Path;

use crate::ast::Root;
use crate::builtins::declare_builtins;
use crate::bytecode::Bytecode;
use crate::codegen::CodegenContext;
use crate::error::CoreError;
use crate::lexer::{Lexer, Token};
use crate::parser::parse_tokens;
use crate::scope::{ScopeStack, Symbol};
use crate::typecheck::analyze;
use crate::types::TypeRegistry;

/// Knobs for a compilation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deepest allowed nesting of scopes, the statement's root included.
    pub max_scope_depth: usize,
    /// Initial capacity in bytes of each statement's output buffer.
    pub bytecode_capacity: usize,
    /// Declare the host builtins in the session scope.
    pub builtins: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_scope_depth: 256,
            bytecode_capacity: 64 * 1024,
            builtins: true,
        }
    }
}

/// Pipeline state shared by every statement compiled in one session.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    registry: TypeRegistry,
    scopes: ScopeStack,
    codegen: CodegenContext,
}

/// Hooks for watching a statement move through the pipeline.
///
/// Every method has an empty default; the CLI's `--verbose` mode overrides
/// them to dump intermediate stages.
pub trait StageObserver {
    fn tokens(&mut self, _tokens: &[Token]) {}
    fn analyzed(&mut self, _root: &Root<'_>) {}
}

struct Quiet;

impl StageObserver for Quiet {}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let registry = TypeRegistry::new();
        let mut scopes = ScopeStack::new(config.max_scope_depth);
        if config.builtins {
            declare_builtins(&registry, &mut scopes)?;
        }
        Ok(Session {
            config,
            registry,
            scopes,
            codegen: CodegenContext::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Symbols visible to the next statement, builtins included.
    pub fn symbols(&self) -> &[Symbol] {
        self.scopes.session_symbols()
    }

    /// Persistent slot bindings in declaration order.
    pub fn slots(&self) -> Vec<(String, u16)> {
        self.codegen
            .root_slots()
            .map(|(name, slot)| (name.to_string(), slot))
            .collect()
    }

    /// Total bytes emitted so far.
    pub fn program_len(&self) -> usize {
        self.codegen.origin()
    }

    /// Forget every declaration and start over with a fresh session.
    pub fn reset(&mut self) -> Result<(), CoreError> {
        *self = Session::new(self.config.clone())?;
        Ok(())
    }

    /// Compile one line of input, which may hold several statements.
    ///
    /// A missing trailing newline is supplied. The line compiles as a unit:
    /// if any statement fails, nothing from the line is kept.
    pub fn compile_line(&mut self, line: &str) -> Result<Bytecode, CoreError> {
        self.compile_line_with(line, &mut Quiet)
    }

    pub fn compile_line_with(
        &mut self,
        line: &str,
        observer: &mut dyn StageObserver,
    ) -> Result<Bytecode, CoreError> {
        if line.ends_with('\n') {
            self.compile_source(line, observer)
        } else {
            self.compile_source(&format!("{line}\n"), observer)
        }
    }

    /// Compile a whole source file as one unit.
    pub fn compile_file(&mut self, path: impl AsRef<Path>) -> Result<Bytecode, CoreError> {
        let source = std::fs::read_to_string(path)?;
        self.compile_line(&source)
    }

    fn compile_source(
        &mut self,
        source: &str,
        observer: &mut dyn StageObserver,
    ) -> Result<Bytecode, CoreError> {
        let scopes = self.scopes.clone();
        let codegen = self.codegen.clone();
        let result = self.compile_statements(source, observer);
        if result.is_err() {
            self.scopes = scopes;
            self.codegen = codegen;
        }
        result
    }

    fn compile_statements(
        &mut self,
        source: &str,
        observer: &mut dyn StageObserver,
    ) -> Result<Bytecode, CoreError> {
        let mut out = Bytecode::new();
        let mut lexer = Lexer::new(source);
        while !lexer.is_exhausted() {
            let tokens = lexer.lex_statement()?;
            if tokens[0].kind.is_terminator() {
                continue;
            }
            observer.tokens(&tokens);
            let code = self.compile_tokens(&tokens, observer)?;
            out.extend(&code);
        }
        Ok(out)
    }

    fn compile_tokens(
        &mut self,
        tokens: &[Token],
        observer: &mut dyn StageObserver,
    ) -> Result<Bytecode, CoreError> {
        let mut root = parse_tokens(tokens, self.config.max_scope_depth)?;
        let scope = analyze(&mut root, &self.registry, &mut self.scopes)?;
        observer.analyzed(&root);
        let code = self
            .codegen
            .generate_bytecode(&root, self.config.bytecode_capacity)?;
        self.scopes.commit(scope);
        Ok(code)
    }
}
