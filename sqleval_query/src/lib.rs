//! Structural SQL comparison for the exact-match metric.
//!
//! Queries are parsed into a Spider-shaped tree whose columns are resolved
//! against a `tables.json` schema, then reduced to a canonical form in which
//! literal values, select-list order and foreign-key aliasing no longer matter.

pub mod ast;
pub mod exact;
pub mod lexer;
pub mod parser;
pub mod schema;

pub use exact::{exact_match, ExactMatcher};
pub use parser::parse;
pub use schema::{DatabaseDefinition, ForeignKeyMap, Schema, SchemaCatalog, SchemaError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}
