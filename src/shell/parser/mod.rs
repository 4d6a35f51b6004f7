pub mod ast;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;

pub use ast::{Command, Redirection, Separator};
pub use lexer::tokenize;
pub use parser::parse;
