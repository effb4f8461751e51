//! Cinder compiler core: front-end and C emission for the Cinder language.
//!
//! Compilation is a single-parse pipeline run twice over the same token
//! stream. The scanner turns `.cdr` sources into tokens, then the parser
//! walks them in two passes sharing one symbol [`table::Table`]: the
//! declaration pass registers every type, function and constant (with type
//! errors suppressed and output discarded), and the main pass checks
//! everything and emits C through [`cgen::CGen`], which supports textual
//! backpatching for constructs whose prefix is only known after their
//! operands. The [`compiler`] module drives whole invocations: module
//! resolution, import and struct dependency ordering, and assembly of the
//! final translation unit on top of the embedded C runtime.

pub mod cgen;
pub mod compiler;
pub mod depgraph;
pub mod diag;
pub mod error;
pub mod parser;
pub mod scanner;
pub mod table;
pub mod typeexpr;

pub use compiler::{compile_files, compile_str, register_builtins, CompilationArtifact, Opts};
pub use error::CoreError;
