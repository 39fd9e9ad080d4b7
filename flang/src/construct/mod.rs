pub mod builder;
pub mod reference;

use std::collections::HashMap;
use std::ops::Range;

use crate::pattern::PredicatePattern;
use crate::construct::reference::ReferenceTarget;

/// Index of a construct within its file's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstructId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    /// Matched in place (the default).
    Matcher,
    /// A template that only takes part through a `use` reference.
    Definition,
}

/// The closed set of construct kinds, keyed by markup tag.
#[derive(Debug, Clone)]
pub enum ConstructKind {
    /// `<component>`: children matched/generated in sequence.
    Component { component_type: ComponentType },
    /// `<predicate>`: a named regex leaf.
    Predicate { pattern: PredicatePattern },
    /// Literal text, verbatim in both directions.
    RawText,
    /// `<rule>`: carried in the tree, inert for matching and generation.
    Rule,
    /// `<choice>`: the first alternative that succeeds wins.
    Choice,
    /// `<use>`: transparent pointer to another construct.
    Reference { target: ReferenceTarget },
}

impl ConstructKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ConstructKind::Component { .. } => "component",
            ConstructKind::Predicate { .. } => "predicate",
            ConstructKind::RawText => "text",
            ConstructKind::Rule => "rule",
            ConstructKind::Choice => "choice",
            ConstructKind::Reference { .. } => "use",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChildrenOrValue {
    Children(Vec<ConstructId>),
    Value(String),
}

/// One typed node of a grammar.
#[derive(Debug, Clone)]
pub struct Construct {
    pub kind: ConstructKind,
    pub children_or_value: ChildrenOrValue,
    pub attributes: HashMap<String, String>,
    /// `file:path` references found anywhere in this subtree.
    pub external_dependencies: Vec<String>,
    /// Only used to derive `path`; the arena owns every construct.
    pub parent: Option<ConstructId>,
    /// The declared local name, if any.
    pub symbol: Option<String>,
    /// Dotted location, unique within the file.
    pub path: String,
    pub span: Range<usize>,
}

impl Construct {
    pub fn children(&self) -> &[ConstructId] {
        match &self.children_or_value {
            ChildrenOrValue::Children(children) => children,
            ChildrenOrValue::Value(_) => &[],
        }
    }

    pub fn value(&self) -> Option<&str> {
        match &self.children_or_value {
            ChildrenOrValue::Value(value) => Some(value),
            ChildrenOrValue::Children(_) => None,
        }
    }

    /// Definitions and rules never take part in a sequence directly.
    pub fn is_inert(&self) -> bool {
        matches!(
            self.kind,
            ConstructKind::Rule
                | ConstructKind::Component {
                    component_type: ComponentType::Definition
                }
        )
    }

    pub fn is_matchable(&self) -> bool {
        !self.is_inert()
    }

    /// Whether matching this construct yields a mapping rather than a string.
    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            ConstructKind::Component { .. } | ConstructKind::Choice
        )
    }
}
