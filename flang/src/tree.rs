use std::collections::HashMap;
use std::ops::Range;

/// Tag given to text runs when they are lifted into the tree.
pub const TEXT_TAG: &str = "text";

/// A node of the generic attributed tree produced by a front end.
///
/// Children keep their source order: the order encodes concatenation.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateTreeElement {
    pub name: String,
    pub value: ElementValue,
    pub attributes: HashMap<String, String>,
    /// Byte span in the source file. Empty for trees built in code.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Text(String),
    Children(Vec<IntermediateTreeElement>),
}

impl IntermediateTreeElement {
    /// An element with child nodes.
    pub fn element<'a>(
        name: impl Into<String>,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
        children: Vec<IntermediateTreeElement>,
    ) -> Self {
        IntermediateTreeElement {
            name: name.into(),
            value: ElementValue::Children(children),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            span: 0..0,
        }
    }

    /// A literal text run.
    pub fn text(value: impl Into<String>) -> Self {
        IntermediateTreeElement {
            name: TEXT_TAG.to_string(),
            value: ElementValue::Text(value.into()),
            attributes: HashMap::new(),
            span: 0..0,
        }
    }

    pub fn with_span(mut self, span: Range<usize>) -> Self {
        self.span = span;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    pub fn children(&self) -> &[IntermediateTreeElement] {
        match &self.value {
            ElementValue::Children(children) => children,
            ElementValue::Text(_) => &[],
        }
    }
}
