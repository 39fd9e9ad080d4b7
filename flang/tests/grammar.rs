use codespan_reporting::diagnostic::Severity;
use flang::parser::Parser;
use flang::pattern::{PredicatePattern, expand};
use flang::{
    BuildError, Builder, ComponentType, ConstructKind, ElementValue, FlangObject,
    IntermediateTreeElement, ReferenceTarget,
};

fn parse(source: &str) -> IntermediateTreeElement {
    Parser::new(source.to_string(), 0)
        .parse()
        .expect("parse failed")
}

fn parse_err(source: &str) -> String {
    let errors = Parser::new(source.to_string(), 0)
        .parse()
        .expect_err("expected a parse error");
    errors[0].message.clone()
}

fn build(source: &str) -> Result<FlangObject, BuildError> {
    Builder::new().build("main", 0, &parse(source))
}

fn paths(object: &FlangObject) -> Vec<&str> {
    object.symbols.keys().map(|k| k.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

#[test]
fn text_runs_and_elements_keep_order() {
    let tree = parse(r#"<component name="r">a<predicate pattern="x"/>b</component>"#);
    assert_eq!(tree.name, "component");
    assert_eq!(tree.attribute("name"), Some("r"));
    let names: Vec<&str> = tree.children().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["text", "predicate", "text"]);
    assert_eq!(tree.children()[0].value, ElementValue::Text("a".to_string()));
}

#[test]
fn entities_are_decoded() {
    let tree = parse(r#"<c p="&lt;&#65;&#x42;">&amp;&gt;&quot;&apos;</c>"#);
    assert_eq!(tree.attribute("p"), Some("<AB"));
    assert_eq!(
        tree.children()[0].value,
        ElementValue::Text("&>\"'".to_string())
    );
}

#[test]
fn comments_and_prolog_are_skipped() {
    let tree = parse("<?xml version=\"1.0\"?>\n<!-- head -->\n<c>a<!-- mid -->b</c>\n<!-- tail -->");
    assert_eq!(tree.children().len(), 1);
    assert_eq!(tree.children()[0].value, ElementValue::Text("ab".to_string()));
}

#[test]
fn cdata_is_literal_text() {
    let tree = parse("<c><![CDATA[<not a tag> & more]]></c>");
    assert_eq!(
        tree.children()[0].value,
        ElementValue::Text("<not a tag> & more".to_string())
    );
}

#[test]
fn markup_errors() {
    assert!(parse_err("<a><b></a>").contains("mismatched closing tag"));
    assert!(parse_err("<a>").contains("unclosed element"));
    assert!(parse_err("<a/><b/>").contains("after the root element"));
    assert!(parse_err(r#"<a x="1" x="2"/>"#).contains("duplicate attribute"));
    assert!(parse_err("<a>&nbsp;</a>").contains("unknown entity"));
    assert!(parse_err(r#"<a x="<"/>"#).contains("not allowed"));
    assert!(parse_err("").contains("expected a root element"));
}

#[test]
fn parse_error_spans() {
    let errors = Parser::new("<a><b></c></a>".to_string(), 7)
        .parse()
        .unwrap_err();
    assert_eq!(errors[0].span, 6..10);
    assert_eq!(errors[0].file_id, 7);
    assert!(!errors[0].notes.is_empty());

    let diagnostic = errors[0].to_diagnostic();
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.notes, errors[0].notes);
    assert_eq!(diagnostic.labels[0].range, 6..10);
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[test]
fn paths_and_placeholders() {
    let object = build(
        r#"<component name="r">a<predicate pattern="x"/><component name="inner"><predicate name="p" pattern="y"/></component></component>"#,
    )
    .unwrap();
    assert_eq!(object.root, "r");
    assert_eq!(
        paths(&object),
        ["r", "r.text@0", "r.predicate@1", "r.inner", "r.inner.p"]
    );
}

#[test]
fn building_twice_is_deterministic() {
    let source = r#"<component name="r">a<choice><predicate pattern="x"/>b</choice></component>"#;
    let first = build(source).unwrap();
    let second = build(source).unwrap();
    assert_eq!(paths(&first), paths(&second));
}

#[test]
fn parents_and_children_line_up() {
    let object = build(r#"<component name="r"><component name="c">x</component></component>"#).unwrap();
    let inner = object.lookup("r.c").unwrap();
    assert_eq!(object.parent(inner).unwrap().path, "r");
    let root = object.root_component();
    assert_eq!(root.children(), [inner]);
    let text = object.get(object.get(inner).children()[0]);
    assert!(matches!(text.kind, ConstructKind::RawText));
    assert_eq!(text.value(), Some("x"));
}

#[test]
fn edge_newlines_are_stripped() {
    let object = build("<component name=\"r\">\nhello\n</component>").unwrap();
    let text = object.get(object.root_component().children()[0]);
    assert_eq!(text.value(), Some("hello"));

    // A run holding nothing but the newline disappears.
    let object = build("<component name=\"r\">\n<predicate name=\"p\" pattern=\"x\"/>\n</component>").unwrap();
    assert_eq!(object.root_component().children().len(), 1);
}

#[test]
fn construct_kinds() {
    let object = build(
        r#"<component name="r"><component name="d" type="definition">x</component><rule name="note">y</rule><use ref="other:a.b" name="u"/></component>"#,
    )
    .unwrap();

    let d = object.get(object.lookup("r.d").unwrap());
    assert!(matches!(
        d.kind,
        ConstructKind::Component {
            component_type: ComponentType::Definition
        }
    ));
    assert!(d.is_inert());
    assert!(object.get(object.lookup("r.note").unwrap()).is_inert());

    let u = object.get(object.lookup("r.u").unwrap());
    match &u.kind {
        ConstructKind::Reference { target } => {
            assert_eq!(
                target,
                &ReferenceTarget::External {
                    file: "other".to_string(),
                    path: "a.b".to_string()
                }
            );
        }
        other => panic!("expected a reference, got {:?}", other),
    }
    assert_eq!(object.external_dependencies, ["other:a.b"]);
}

#[test]
fn reference_targets() {
    assert_eq!(
        ReferenceTarget::parse("a.b"),
        ReferenceTarget::Local("a.b".to_string())
    );
    let target = ReferenceTarget::parse("./dir/x:y:root.item");
    assert_eq!(target.file(), Some("dir/x:y"));
    assert_eq!(target.path(), "root.item");
}

#[test]
fn builder_errors() {
    assert!(matches!(
        build(r#"<predicate pattern="x"/>"#),
        Err(BuildError::RootNotComponent { .. })
    ));
    assert!(matches!(
        build(r#"<component name="r"><widget/></component>"#),
        Err(BuildError::UnknownConstructKind { .. })
    ));
    assert!(matches!(
        build(r#"<component name="r"><predicate name="p"/></component>"#),
        Err(BuildError::MissingAttribute {
            attribute: "pattern",
            ..
        })
    ));
    assert!(matches!(
        build(r#"<component name="r"><use name="u"/></component>"#),
        Err(BuildError::MissingAttribute { attribute: "ref", .. })
    ));
    assert!(matches!(
        build(r#"<component name="r"><predicate name="p" pattern="(x"/></component>"#),
        Err(BuildError::InvalidPattern { .. })
    ));
    assert!(matches!(
        build(r#"<component name="r"><predicate name="p" pattern="x">y</predicate></component>"#),
        Err(BuildError::UnexpectedContent { .. })
    ));
    assert!(matches!(
        build(r#"<component name="r" type="macro"/>"#),
        Err(BuildError::InvalidComponentType { .. })
    ));
    assert!(matches!(
        build(r#"<component name="r"><predicate name="p" pattern="x"/><predicate name="p" pattern="y"/></component>"#),
        Err(BuildError::DuplicateSymbol { .. })
    ));
}

#[test]
fn build_error_has_source_span() {
    let source = r#"<component name="r"><widget/></component>"#;
    let err = build(source).unwrap_err();
    assert_eq!(&source[err.span()], "<widget/>");
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[test]
fn builtins_expand_in_groups() {
    assert_eq!(expand("{vname}="), r"(?:[A-Za-z]\w+)=");
    assert_eq!(expand(r"\d{2,4}"), r"\d{2,4}");
    assert_eq!(expand("{nope}"), "{nope}");
}

#[test]
fn predicate_is_anchored() {
    let pattern = PredicatePattern::compile("{number}").unwrap();
    assert_eq!(pattern.match_at("x-12.5y", 1), Some(6));
    assert_eq!(pattern.match_at("x12", 0), None);
    assert!(pattern.accepts("0"));
    assert!(!pattern.accepts("12a"));
}

#[test]
fn string_builtin() {
    let pattern = PredicatePattern::compile("{string}").unwrap();
    assert!(pattern.accepts(r#""double""#));
    assert!(pattern.accepts("'single'"));
    assert!(!pattern.accepts(r#""mixed'"#));
}
