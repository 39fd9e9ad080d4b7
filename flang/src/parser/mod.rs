pub mod error;
mod markup;

pub use error::ParseError;

use crate::tree::IntermediateTreeElement;

/// Markup front end: grammar source text in, intermediate tree out.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse the source into the tree rooted at its single top-level element.
    pub fn parse(&self) -> Result<IntermediateTreeElement, Vec<ParseError>> {
        markup::parse_document(&self.source, self.file_id)
    }
}
