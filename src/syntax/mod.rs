//! Delphi front end: tokens, conditional compilation, syntax tree and parser.

pub mod ast;
pub mod directives;
pub mod parser;
pub mod token;
pub mod visit;

pub use parser::{parse_source, ParsedFile};
