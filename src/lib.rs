//! Cypheri front end: lexer, parser and bytecode emitter for the Cypheri
//! scripting language.
//!
//! # Pipeline
//!
//! ```text
//! Source text (UTF-8)
//!     │
//!     ▼
//! ┌───────────┐
//! │  Lexer     │  tokenize(): tokens + string-literal pool, identifiers
//! └────┬──────┘  interned into the shared NameTable
//!      │
//!      ▼
//! ┌───────────┐
//! │  Parser    │  parse(): recursive descent (statements) + Pratt
//! └────┬──────┘  (expressions), emitting instructions directly
//!      │
//!      ▼
//! BytecodeModule (in-memory; executed by the VM, dumped by the drivers)
//! ```
//!
//! The pipeline is single-threaded and performs no I/O. Both stages report
//! at most one [`errors::SyntaxError`]: the first fault stops the run.

pub mod bytecode;
pub mod errors;
pub mod lexer;
pub mod nametable;
pub mod parser;
pub mod token;
