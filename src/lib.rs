//! # lua-formatter
//!
//! Source-to-source Lua deobfuscation. Sources (plain text, compiled chunks
//! or shell payloads) are parsed into an arena AST with a scope tree that
//! tracks every variable's value, reads and writes. Rewrite passes run over
//! it to a fixed point and the result is printed back as formatted Lua.
//!
//! ## Pipeline
//!
//! 1. [`codec`] decodes bytes; bytes above ASCII survive as private use chars.
//! 2. [`decompile`] turns compiled chunks into text with an external tool.
//! 3. [`parse`] produces the serialized tree, [`Ast`] loads it.
//! 4. [`step`] drives the passes; [`transform`] schedules them per mode.
//! 5. The printer renders the tree; the codec encodes it back to bytes.
//!
//! ## Pass guarantees
//!
//! - A binding is inlined only when it has exactly one read since its last
//!   write, the value is known and the read site sees the same binding.
//! - Loops and closures block every rewrite that would change how many times
//!   a value is evaluated.
//! - Removal is deferred to the end of the walk that requested it.

pub mod ast;
pub mod cache;
pub mod codec;
pub mod config;
pub mod decompile;
pub mod discovery;
pub mod error;
pub mod lexer;
pub mod logging;
pub mod node;
pub mod operator;
pub mod parse;
mod printer;
pub mod scope;
mod serialize;
pub mod stack;
pub mod state;
pub mod step;
pub mod transform;
pub mod visitor;

#[cfg(test)]
mod decompile_tests;
#[cfg(test)]
mod lexer_tests;
#[cfg(test)]
mod node_tests;
#[cfg(test)]
mod parse_tests;
#[cfg(test)]
mod step_tests;
#[cfg(test)]
mod transform_tests;

pub use ast::Ast;
pub use config::FormatOptions;
pub use error::{FormatError, Result};
pub use transform::{deobfuscate_source, format_dir, format_file, format_source, Mode};
