//! Text format support: lexing, parsing, name resolution, and lowering.
//!
//! The pipeline is a composition of independently usable stages:
//!
//! ```text
//! source --lexer/tokenizer--> tokens --parser--> TextModule
//!        --resolver--> resolved TextModule --convert--> binary Module
//! ```
//!
//! [`to_binary`] runs the whole pipeline.

pub mod ast;
pub mod convert;
pub mod lexer;
pub mod names;
pub mod parser;
pub mod resolver;
pub mod token;
pub mod tokenizer;

pub use ast::TextModule;
pub use convert::convert;
pub use lexer::Lexer;
pub use parser::parse;
pub use resolver::resolve;
pub use tokenizer::Tokenizer;

use crate::binary::Module;
use crate::error::Error;

/// Parses, resolves, and lowers text source into a binary [`Module`].
///
/// Later stages are skipped as soon as a stage reports errors.
pub fn to_binary(source: &str) -> Result<Module, Vec<Error>> {
    let mut module = parse(source).map_err(|e| vec![e])?;
    resolve(&mut module)?;
    convert(&module)
}
