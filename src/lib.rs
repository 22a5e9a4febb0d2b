//! A WebAssembly binary and text format toolkit.
//!
//! wasmith reads and writes the WebAssembly binary module format, parses the
//! text (S-expression) format, resolves symbolic names, expands inline
//! sugar, converts text modules to binary modules, and performs structural
//! validation.
//!
//! # Modules
//!
//! - [`binary`] -- Binary format decoder and encoder over a [`binary::Module`].
//! - [`text`] -- Text format lexer, tokenizer, parser, resolver, and the
//!   text-to-binary converter.
//! - [`validate`] -- Structural validation: index ranges, constant
//!   expressions, segment bounds.
//! - [`features`] -- Proposal feature flags gating every post-MVP construct.
//! - [`span`], [`leb128`] -- The byte-window and variable-length integer
//!   primitives everything else is built on.
//!
//! # Example
//!
//! Compile a text module to binary, validate it, and read it back:
//!
//! ```
//! use wasmith::features::Features;
//!
//! let module = wasmith::text::to_binary(r#"
//!     (module
//!         (func (export "add") (param i32 i32) (result i32)
//!             local.get 0
//!             local.get 1
//!             i32.add))
//! "#).unwrap();
//!
//! let features = Features::mvp();
//! wasmith::validate::validate(&module, &features).unwrap();
//!
//! let bytes = wasmith::binary::write(&module);
//! assert_eq!(&bytes[0..4], b"\0asm");
//!
//! let back = wasmith::binary::read(&bytes, &features).unwrap();
//! assert_eq!(back, module);
//! ```
//!
//! # Errors
//!
//! Nothing panics on malformed input: every stage reports
//! [`error::Error`] values carrying a byte offset, a message, and the stack
//! of context labels in effect when the error was produced.
//!
//! # Specification
//!
//! Targets the [WebAssembly core specification](https://webassembly.github.io/spec/core/)
//! plus the standard extension proposals (SIMD, reference types, bulk
//! memory, exceptions, tail calls, threads, multi-value, multi-memory),
//! each individually feature-gated.

pub mod binary;
pub mod error;
pub mod features;
pub mod leb128;
pub mod span;
pub mod text;
pub mod validate;
