//! Core compiler pipeline for the kiln expression language.
//!
//! Each statement goes through:
//!
//!   statement text
//!     -> lexer     (tokens up to `;` or end of line)
//!     -> parser    (syntax tree borrowing the tokens)
//!     -> typecheck (scopes + resolved types)
//!     -> codegen   (stack-machine bytecode)
//!
//! [`Session`] threads the type registry, the scope stack and the slot
//! table through that pipeline, statement after statement. Front ends
//! (the CLI, the REPL) should drive a `Session` rather than the stages
//! directly.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, scopes, type checking
// ---------------------------------------------------------------------

pub mod types;
pub mod scope;
pub mod typecheck;

// ---------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------

pub mod builtins;

// ---------------------------------------------------------------------
// Back-end: bytecode, code generation and session orchestration
// ---------------------------------------------------------------------

pub mod bytecode;
pub mod codegen;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use bytecode::{Bytecode, Instruction, disassemble};
pub use compiler::{Session, SessionConfig, StageObserver};
pub use diagnostic::Diagnostic;
pub use error::CoreError;
