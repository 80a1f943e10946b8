pub mod expr;
pub mod lexer;
pub mod parse;
pub mod preprocess;
pub mod print;
pub mod types;

pub use parse::{parse_translation_unit, ParseError, ParseOptions};
