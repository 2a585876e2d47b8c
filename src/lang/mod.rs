/*!
# Rust Language Module

This Rust module provides lexical analysis and parsing of the BASIC language.

Source is handled one physical line at a time. Block structure (IF blocks,
loops, procedures, TYPE blocks) is not resolved here: the parser produces a
flat stream of statements and the compiler in [`crate::mach`] pairs openers
with closers.

*/

pub type Column = std::ops::Range<usize>;

#[macro_use]
mod error;
mod ident;
mod lex;
mod line;
mod parse;
mod token;

pub use error::Error;
pub use error::ErrorCode;
pub use ident::Ident;
pub use lex::lex;
pub use line::Line;
pub use parse::parse;
pub use token::{Literal, Operator, Token, Word};

pub mod ast;
