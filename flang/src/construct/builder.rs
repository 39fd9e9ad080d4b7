use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use indexmap::IndexMap;
use thiserror::Error;

use crate::construct::reference::ReferenceTarget;
use crate::construct::{ChildrenOrValue, ComponentType, Construct, ConstructId, ConstructKind};
use crate::object::FlangObject;
use crate::pattern::PredicatePattern;
use crate::tree::{ElementValue, IntermediateTreeElement, TEXT_TAG};

/// A grammar that cannot be turned into a construct tree.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("unknown construct kind <{tag}>")]
    UnknownConstructKind { tag: String, span: Range<usize> },

    #[error("the root element must be <component>, found <{tag}>")]
    RootNotComponent { tag: String, span: Range<usize> },

    #[error("<{tag}> is missing the required '{attribute}' attribute")]
    MissingAttribute {
        tag: &'static str,
        attribute: &'static str,
        span: Range<usize>,
    },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        pattern: String,
        message: String,
        span: Range<usize>,
    },

    #[error("<{tag}> cannot have child content")]
    UnexpectedContent { tag: &'static str, span: Range<usize> },

    #[error("invalid component type '{value}' (expected 'matcher' or 'definition')")]
    InvalidComponentType { value: String, span: Range<usize> },

    #[error("duplicate symbol '{path}'")]
    DuplicateSymbol { path: String, span: Range<usize> },
}

impl BuildError {
    pub fn span(&self) -> Range<usize> {
        match self {
            BuildError::UnknownConstructKind { span, .. }
            | BuildError::RootNotComponent { span, .. }
            | BuildError::MissingAttribute { span, .. }
            | BuildError::InvalidPattern { span, .. }
            | BuildError::UnexpectedContent { span, .. }
            | BuildError::InvalidComponentType { span, .. }
            | BuildError::DuplicateSymbol { span, .. } => span.clone(),
        }
    }

    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![Label::primary(file_id, self.span())])
    }
}

/// Turns one file's intermediate tree into a [`FlangObject`].
///
/// The placeholder counter lives on the builder, so building the same tree
/// twice yields the same paths.
#[derive(Debug, Default)]
pub struct Builder {
    counter: usize,
    constructs: Vec<Construct>,
    symbols: IndexMap<String, ConstructId>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        mut self,
        name: &str,
        file_id: usize,
        tree: &IntermediateTreeElement,
    ) -> Result<FlangObject, BuildError> {
        if tree.name != "component" {
            return Err(BuildError::RootNotComponent {
                tag: tree.name.clone(),
                span: tree.span.clone(),
            });
        }

        let root_id = self
            .build_construct(tree, None, true, true)?
            .ok_or_else(|| BuildError::RootNotComponent {
                tag: tree.name.clone(),
                span: tree.span.clone(),
            })?;

        let root = &self.constructs[root_id.0];
        let root_path = root.path.clone();
        let mut external_dependencies: Vec<String> = Vec::new();
        for dependency in &root.external_dependencies {
            if !external_dependencies.contains(dependency) {
                external_dependencies.push(dependency.clone());
            }
        }

        Ok(FlangObject::new(
            name.to_string(),
            file_id,
            root_path,
            root_id,
            self.symbols,
            external_dependencies,
            self.constructs,
        ))
    }

    fn build_construct(
        &mut self,
        element: &IntermediateTreeElement,
        parent: Option<ConstructId>,
        first: bool,
        last: bool,
    ) -> Result<Option<ConstructId>, BuildError> {
        let span = element.span.clone();
        let kind = construct_kind(element)?;

        let children_or_value = match &kind {
            ConstructKind::RawText => {
                let text = raw_text(element)?;
                let text = if first { strip_leading_newline(&text) } else { &text };
                let text = if last { strip_trailing_newline(text) } else { text };
                if text.is_empty() {
                    return Ok(None);
                }
                ChildrenOrValue::Value(text.to_string())
            }
            ConstructKind::Predicate { .. } | ConstructKind::Reference { .. } => {
                if !element.children().is_empty()
                    || matches!(&element.value, ElementValue::Text(t) if !t.is_empty())
                {
                    return Err(BuildError::UnexpectedContent {
                        tag: kind.tag(),
                        span,
                    });
                }
                ChildrenOrValue::Children(Vec::new())
            }
            _ => ChildrenOrValue::Children(Vec::new()),
        };

        let symbol = match &kind {
            ConstructKind::RawText => None,
            _ => element
                .attribute("name")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };
        let local = match &symbol {
            Some(symbol) => symbol.clone(),
            None => self.placeholder(kind.tag()),
        };
        let path = match parent {
            Some(parent) => format!("{}.{}", self.constructs[parent.0].path, local),
            None => local,
        };

        if self.symbols.contains_key(&path) {
            return Err(BuildError::DuplicateSymbol { path, span });
        }

        let mut external_dependencies = Vec::new();
        if let ConstructKind::Reference { target } = &kind {
            external_dependencies.extend(target.dependency());
        }

        let id = ConstructId(self.constructs.len());
        self.symbols.insert(path.clone(), id);
        self.constructs.push(Construct {
            kind,
            children_or_value,
            attributes: element.attributes.clone(),
            external_dependencies,
            parent,
            symbol,
            path,
            span,
        });

        if self.constructs[id.0].value().is_none() {
            let elements = child_elements(element);
            let count = elements.len();
            let mut children = Vec::with_capacity(count);
            let mut dependencies = Vec::new();

            for (idx, child) in elements.iter().enumerate() {
                if let Some(child_id) =
                    self.build_construct(child, Some(id), idx == 0, idx + 1 == count)?
                {
                    dependencies.extend(self.constructs[child_id.0].external_dependencies.clone());
                    children.push(child_id);
                }
            }

            let construct = &mut self.constructs[id.0];
            construct.children_or_value = ChildrenOrValue::Children(children);
            construct.external_dependencies.extend(dependencies);
        }

        Ok(Some(id))
    }

    fn placeholder(&mut self, tag: &str) -> String {
        let symbol = format!("{}@{}", tag, self.counter);
        self.counter += 1;
        symbol
    }
}

fn construct_kind(element: &IntermediateTreeElement) -> Result<ConstructKind, BuildError> {
    let span = element.span.clone();
    let kind = match element.name.as_str() {
        "component" => {
            let component_type = match element.attribute("type") {
                None | Some("matcher") => ComponentType::Matcher,
                Some("definition") => ComponentType::Definition,
                Some(other) => {
                    return Err(BuildError::InvalidComponentType {
                        value: other.to_string(),
                        span,
                    });
                }
            };
            ConstructKind::Component { component_type }
        }
        "predicate" => {
            let raw = element
                .attribute("pattern")
                .ok_or(BuildError::MissingAttribute {
                    tag: "predicate",
                    attribute: "pattern",
                    span: span.clone(),
                })?;
            let pattern = PredicatePattern::compile(raw).map_err(|e| BuildError::InvalidPattern {
                pattern: raw.to_string(),
                message: e.to_string(),
                span: span.clone(),
            })?;
            ConstructKind::Predicate { pattern }
        }
        TEXT_TAG => ConstructKind::RawText,
        "rule" => ConstructKind::Rule,
        "choice" => ConstructKind::Choice,
        "use" => {
            let raw = element.attribute("ref").ok_or(BuildError::MissingAttribute {
                tag: "use",
                attribute: "ref",
                span: span.clone(),
            })?;
            ConstructKind::Reference {
                target: ReferenceTarget::parse(raw),
            }
        }
        other => {
            return Err(BuildError::UnknownConstructKind {
                tag: other.to_string(),
                span,
            });
        }
    };
    Ok(kind)
}

/// The literal of a text node. An explicit `<text>` element may only hold text.
fn raw_text(element: &IntermediateTreeElement) -> Result<String, BuildError> {
    match &element.value {
        ElementValue::Text(text) => Ok(text.clone()),
        ElementValue::Children(children) => {
            let mut text = String::new();
            for child in children {
                match &child.value {
                    ElementValue::Text(run) if child.name == TEXT_TAG => text.push_str(run),
                    _ => {
                        return Err(BuildError::UnexpectedContent {
                            tag: "text",
                            span: child.span.clone(),
                        });
                    }
                }
            }
            Ok(text)
        }
    }
}

/// Children of a composite element; a bare text value becomes one text child.
fn child_elements(element: &IntermediateTreeElement) -> Vec<IntermediateTreeElement> {
    match &element.value {
        ElementValue::Children(children) => children.clone(),
        ElementValue::Text(text) if text.is_empty() => Vec::new(),
        ElementValue::Text(text) => {
            vec![IntermediateTreeElement::text(text.clone()).with_span(element.span.clone())]
        }
    }
}

fn strip_leading_newline(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

fn strip_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}
