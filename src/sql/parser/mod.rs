//! Parses raw SQL strings into a structured Abstract Syntax Tree, accepting
//! or rejecting dialect-specific syntax for a given dialect version.

pub mod ast;
mod lexer;
mod parser;

pub use lexer::{Keyword, Lexer, Token, is_ident};
pub use parser::Parser;

/// Formats an identifier for display in SQL, quoting it if it isn't a plain
/// unreserved identifier.
pub fn format_ident(ident: &str) -> String {
    let lowercase = ident.to_lowercase();
    if is_ident(ident) && Keyword::try_from(lowercase.as_str()).is_err() {
        return ident.to_string();
    }
    format!("\"{}\"", ident.replace('"', "\"\""))
}
