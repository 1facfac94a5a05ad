//! Backtick command language
//!
//! `` `ddd` my-app `e` `` → Down ×3, text " my-app ", Enter

mod parser;

pub use parser::{describe, has_command_syntax, parse, Key, ParseError, ParsedSegment};
