//! Core of the Geode compiler.
//!
//! The pipeline is roughly:
//!
//!   source .g
//!     -> lexer        (tokens)
//!     -> parser       (speculative precedence climbing, component chains)
//!     -> lower        (scopes, casts, function instantiation, basic blocks)
//!     -> codegen_llvm (textual LLVM IR)
//!
//! The CLI and any other front end should depend on this crate rather
//! than reimplementing the pipeline.

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
// Semantic layers: types, casts, scopes and function resolution
// ---------------------------------------------------------------------

pub mod types;
pub mod builtins;
pub mod casts;
pub mod scope;
pub mod functions;
pub mod mangle;

// ---------------------------------------------------------------------
// Back-end: IR, lowering, LLVM text and compiler orchestration
// ---------------------------------------------------------------------

pub mod ir;
pub mod lower;
pub mod codegen_llvm;
pub mod sources;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompilationArtifact, CompileOptions, compile, emit_llvm_ir};
pub use diagnostic::Diagnostic;
pub use error::CoreError;
pub use sources::{SourceFile, load_sources};
