use std::io::Write;

use flang_engine::{EngineError, FileId, MemoryLoader, Session, SessionOptions, Spec};

const IMPORT: &str = r#"<component name="import">from <predicate name="module" pattern="{vname}"/> import <predicate name="object" pattern="{vname}"/></component>"#;

fn session() -> Session {
    Session::with_loader(MemoryLoader::new(), SessionOptions::default())
}

fn session_with(options: SessionOptions) -> Session {
    Session::with_loader(MemoryLoader::new(), options)
}

fn load(session: &mut Session, source: &str) -> FileId {
    session.load_source("main", source).expect("load failed")
}

fn spec(pairs: &[(&str, &str)]) -> Spec {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn import_statement_matches() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    let found = s.match_text(g, "from json import dumps").unwrap();
    assert_eq!(
        found,
        Some(spec(&[("module", "json"), ("object", "dumps")]))
    );
}

#[test]
fn import_statement_generates() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    let text = s
        .generate(g, &spec(&[("module", "itertools"), ("object", "chain")]))
        .unwrap();
    assert_eq!(text, "from itertools import chain");
}

#[test]
fn round_trip() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    let input = "from collections import OrderedDict";
    let found = s.match_text(g, input).unwrap().unwrap();
    assert_eq!(s.generate(g, &found).unwrap(), input);
}

#[test]
fn generation_follows_declaration_order() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="pair"><predicate name="b" pattern="\d+"/>-<predicate name="a" pattern="\d+"/></component>"#,
    );
    let found = s.match_tree(g, "12-34").unwrap().unwrap();
    let keys: Vec<&str> = found.fields().unwrap().keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["b", "a"]);
    assert_eq!(
        s.generate(g, &spec(&[("a", "34"), ("b", "12")])).unwrap(),
        "12-34"
    );
}

#[test]
fn child_order_decides_what_matches() {
    let mut s = session();
    let literal_first = load(
        &mut s,
        r#"<component name="r">A<predicate name="n" pattern="{number}"/></component>"#,
    );
    let number_first = s
        .load_source(
            "swapped",
            r#"<component name="r"><predicate name="n" pattern="{number}"/>A</component>"#,
        )
        .unwrap();

    assert_eq!(
        s.match_text(literal_first, "A123").unwrap(),
        Some(spec(&[("n", "123")]))
    );
    assert!(s.match_text(number_first, "A123").unwrap_err().is_no_match());
    assert_eq!(
        s.match_text(number_first, "123A").unwrap(),
        Some(spec(&[("n", "123")]))
    );
}

#[test]
fn nested_components_are_namespaced() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="root"><component name="outer">[<predicate name="x" pattern="\d+"/>|<component name="inner"><predicate name="x" pattern="[a-z]+"/></component>]</component></component>"#,
    );
    let found = s.match_text(g, "[1|ab]").unwrap().unwrap();
    assert_eq!(found, spec(&[("outer.x", "1"), ("outer.inner.x", "ab")]));
    assert_eq!(s.generate(g, &found).unwrap(), "[1|ab]");
}

#[test]
fn match_tree_positions() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    let found = s.match_tree(g, "from json import dumps").unwrap().unwrap();
    assert_eq!(found.position.start, 0);
    assert_eq!(found.position.end, 22);
    let module = found.get("module").unwrap();
    assert_eq!(module.text(), Some("json"));
    assert_eq!((module.position.start, module.position.end), (5, 9));
}

#[test]
fn no_backtracking() {
    let grammar = r#"<component name="r"><predicate name="word" pattern="[a-z0-9]+"/><predicate name="n" pattern="{number}"/></component>"#;

    let mut s = session();
    let g = load(&mut s, grammar);
    match s.match_text(g, "abc123") {
        Err(EngineError::NoMatch { path, position }) => {
            assert_eq!(path, "main:r.n");
            assert_eq!(position, 6);
        }
        other => panic!("expected NoMatch, got {:?}", other),
    }

    let mut lenient = session_with(SessionOptions {
        stop_on_error: false,
        ..SessionOptions::default()
    });
    let g = load(&mut lenient, grammar);
    assert_eq!(lenient.match_text(g, "abc123").unwrap(), None);
}

#[test]
fn literal_must_match_at_cursor() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r">ab<predicate name="n" pattern="{number}"/></component>"#,
    );
    assert!(s.match_text(g, "abc123").unwrap_err().is_no_match());
    assert_eq!(s.match_text(g, "ab123").unwrap(), Some(spec(&[("n", "123")])));
}

#[test]
fn trailing_input() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    match s.match_text(g, "from json import dumps!") {
        Err(EngineError::NoMatch { path, position }) => {
            assert_eq!(path, "main:import");
            assert_eq!(position, 22);
        }
        other => panic!("expected NoMatch, got {:?}", other),
    }

    let mut relaxed = session_with(SessionOptions {
        allow_trailing: true,
        ..SessionOptions::default()
    });
    let g = load(&mut relaxed, IMPORT);
    let found = relaxed.match_tree(g, "from json import dumps!").unwrap().unwrap();
    assert_eq!(found.position.end, 22);
}

#[test]
fn same_file_twice_is_ambiguous() {
    let mut s = session();
    load(&mut s, IMPORT);
    let before = s.symbols().len();
    match s.load_source("main", IMPORT) {
        Err(EngineError::AmbiguousSymbol { key }) => assert_eq!(key, "main:import"),
        other => panic!("expected AmbiguousSymbol, got {:?}", other),
    }
    assert_eq!(s.symbols().len(), before);
}

#[test]
fn cyclic_imports_load_each_file_once() {
    let loader = MemoryLoader::new()
        .with(
            "a",
            r#"<component name="a"><component name="word" type="definition"><predicate name="w" pattern="[a-z]+"/></component><use ref="b:b.num"/></component>"#,
        )
        .with(
            "b",
            r#"<component name="b"><component name="num" type="definition"><predicate name="n" pattern="\d+"/></component><use ref="a:a.word"/></component>"#,
        );
    let mut s = Session::with_loader(loader, SessionOptions::default());
    let a = s.load_file("a").unwrap();

    assert_eq!(s.object(FileId(1)).unwrap().name, "b");
    assert!(matches!(
        s.object(FileId(2)),
        Err(EngineError::UnknownGrammar(2))
    ));
    assert!(s.symbols().get("a:a.word").is_some());
    assert!(s.symbols().get("b:b.num.n").is_some());

    let found = s.match_text(a, "42").unwrap().unwrap();
    assert_eq!(found, spec(&[("num.n", "42")]));
    assert_eq!(s.generate(a, &found).unwrap(), "42");
}

#[test]
fn unresolved_reference_rolls_back() {
    let mut s = session();
    let err = s
        .load_source(
            "main",
            r#"<component name="r"><use ref="r.missing"/></component>"#,
        )
        .unwrap_err();
    match &err {
        EngineError::UnresolvedReference {
            reference, file, ..
        } => {
            assert_eq!(reference, "r.missing");
            assert_eq!(file, "main");
        }
        other => panic!("expected UnresolvedReference, got {:?}", other),
    }
    assert_eq!(err.to_diagnostics().len(), 1);
    assert!(s.symbols().is_empty());
    assert!(s.registry().file_by_name("main").is_none());
}

#[test]
fn missing_dependency_rolls_back_whole_load() {
    let loader = MemoryLoader::new().with(
        "lib",
        r#"<component name="lib"><use ref="gone:x"/></component>"#,
    );
    let mut s = Session::with_loader(loader, SessionOptions::default());
    let err = s
        .load_source(
            "main",
            r#"<component name="r"><use ref="lib:lib"/></component>"#,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Io(_)), "got {:?}", err);
    assert!(s.symbols().is_empty());

    // A later, unrelated load starts from a clean slate.
    let g = load(&mut s, IMPORT);
    assert_eq!(g, FileId(0));
}

#[test]
fn self_reference_hits_the_depth_limit() {
    let mut s = session();
    let err = s
        .load_source("main", r#"<component name="r"><use ref="r.a" name="a"/></component>"#)
        .unwrap_err();
    assert!(matches!(err, EngineError::RecursionLimit { .. }), "got {:?}", err);
}

#[test]
fn unbounded_expansion_hits_the_depth_limit() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r"><component name="again" type="definition">x<use ref="r.again"/></component><use ref="r.again"/></component>"#,
    );
    let text = "x".repeat(400);
    let err = s.match_text(g, &text).unwrap_err();
    assert!(matches!(err, EngineError::RecursionLimit { .. }), "got {:?}", err);
}

#[test]
fn definitions_are_used_by_reference() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="greeting"><component name="who" type="definition"><predicate name="name" pattern="{vname}"/></component>hello <use ref="greeting.who" name="first"/> and <use ref="greeting.who" name="second"/></component>"#,
    );
    let found = s.match_text(g, "hello bob and alice").unwrap().unwrap();
    assert_eq!(
        found,
        spec(&[("first.name", "bob"), ("second.name", "alice")])
    );
    assert_eq!(s.generate(g, &found).unwrap(), "hello bob and alice");
}

#[test]
fn unnamed_use_records_under_target_symbol() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r"><component name="num" type="definition"><predicate name="d" pattern="\d+"/></component>#<use ref="r.num"/></component>"#,
    );
    let found = s.match_text(g, "#12").unwrap().unwrap();
    assert_eq!(found, spec(&[("num.d", "12")]));
    assert_eq!(s.generate(g, &found).unwrap(), "#12");
}

#[test]
fn fields_recorded_twice_are_rejected() {
    let grammars = [
        // Sibling and reference both record under `n`.
        r#"<component name="r"><predicate name="n" pattern="\d+"/>=<use ref="r.n"/></component>"#,
        // The anonymous group splices its `x` next to the outer one.
        r#"<component name="r"><predicate name="x" pattern="\d"/>-<component><predicate name="x" pattern="\d"/></component></component>"#,
        // Same through an anonymous choice.
        r#"<component name="r"><predicate name="x" pattern="\d"/><choice><predicate name="x" pattern="[a-z]"/>!</choice></component>"#,
    ];
    for grammar in grammars {
        let mut s = session();
        match s.load_source("main", grammar) {
            Err(EngineError::FieldCollision { field, path }) => {
                assert!(field == "n" || field == "x", "field {}", field);
                assert_eq!(path, "main:r");
            }
            other => panic!("expected FieldCollision for {}, got {:?}", grammar, other),
        }
        assert!(s.symbols().is_empty());
    }
}

#[test]
fn choice_alternatives_may_share_fields() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r"><choice><component>+<predicate name="x" pattern="\d"/></component><component>-<predicate name="x" pattern="\d"/></component></choice></component>"#,
    );
    assert_eq!(s.match_text(g, "+3").unwrap(), Some(spec(&[("x", "3")])));
    assert_eq!(s.match_text(g, "-4").unwrap(), Some(spec(&[("x", "4")])));
}

#[test]
fn root_definition_is_not_matchable() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r" type="definition">x</component>"#,
    );
    assert!(matches!(
        s.match_text(g, "x"),
        Err(EngineError::NotMatchable { .. })
    ));
    assert!(matches!(
        s.generate(g, &Spec::new()),
        Err(EngineError::NotMatchable { .. })
    ));
}

#[test]
fn used_rule_round_trips() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r"><rule name="note">ignored</rule>x<use ref="r.note"/></component>"#,
    );
    let found = s.match_text(g, "x").unwrap().unwrap();
    assert_eq!(found, spec(&[("note", "")]));
    assert_eq!(s.generate(g, &found).unwrap(), "x");
}

#[test]
fn rules_are_inert() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r"><rule name="note">ignored</rule>x<predicate name="d" pattern="\d"/></component>"#,
    );
    assert_eq!(s.match_text(g, "x7").unwrap(), Some(spec(&[("d", "7")])));
    assert_eq!(s.generate(g, &spec(&[("d", "7")])).unwrap(), "x7");
}

#[test]
fn anonymous_component_is_transparent() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="r">(<component><predicate name="x" pattern="\d"/>,<predicate name="y" pattern="\d"/></component>)</component>"#,
    );
    let found = s.match_text(g, "(1,2)").unwrap().unwrap();
    assert_eq!(found, spec(&[("x", "1"), ("y", "2")]));
    assert_eq!(s.generate(g, &found).unwrap(), "(1,2)");
}

#[test]
fn choice_picks_first_matching_alternative() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="value"><choice name="v"><predicate name="num" pattern="{number}"/><predicate name="str" pattern="{string}"/></choice></component>"#,
    );
    assert_eq!(
        s.match_text(g, "'hi'").unwrap(),
        Some(spec(&[("v.str", "'hi'")]))
    );
    assert_eq!(
        s.match_text(g, "-1.5").unwrap(),
        Some(spec(&[("v.num", "-1.5")]))
    );
    assert!(s.match_text(g, "nope").unwrap_err().is_no_match());

    assert_eq!(s.generate(g, &spec(&[("v.str", "\"x\"")])).unwrap(), "\"x\"");
    assert_eq!(s.generate(g, &spec(&[("v.num", "3")])).unwrap(), "3");
}

#[test]
fn choice_of_literals_round_trips() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="expr"><predicate name="l" pattern="\d+"/><choice name="op"><component name="plus">+</component><component name="minus">-</component></choice><predicate name="r" pattern="\d+"/></component>"#,
    );
    let found = s.match_text(g, "4-2").unwrap().unwrap();
    assert_eq!(found, spec(&[("l", "4"), ("op.minus", ""), ("r", "2")]));
    assert_eq!(s.generate(g, &found).unwrap(), "4-2");
}

#[test]
fn choice_reports_first_error() {
    let mut s = session();
    let g = load(
        &mut s,
        r#"<component name="value"><choice name="v"><predicate name="num" pattern="{number}"/><predicate name="str" pattern="{string}"/></choice></component>"#,
    );
    match s.generate(g, &spec(&[("v.num", "abc")])) {
        Err(EngineError::InvalidFieldValue { field, value, .. }) => {
            assert_eq!(field, "num");
            assert_eq!(value, "abc");
        }
        other => panic!("expected InvalidFieldValue, got {:?}", other),
    }
}

#[test]
fn choice_stays_with_mentioned_alternative() {
    let grammar = r#"<component name="r"><choice name="v"><predicate name="n" pattern="{number}"/><text>none</text></choice></component>"#;

    for strict_spec in [true, false] {
        let mut s = session_with(SessionOptions {
            strict_spec,
            ..SessionOptions::default()
        });
        let g = load(&mut s, grammar);
        match s.generate(g, &spec(&[("v.n", "abc")])) {
            Err(EngineError::InvalidFieldValue { field, value, .. }) => {
                assert_eq!(field, "n");
                assert_eq!(value, "abc");
            }
            other => panic!("expected InvalidFieldValue, got {:?}", other),
        }
        assert_eq!(s.generate(g, &spec(&[("v.n", "7")])).unwrap(), "7");
        assert_eq!(s.generate(g, &Spec::new()).unwrap(), "none");
    }
}

#[test]
fn missing_field() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    match s.generate(g, &spec(&[("module", "os")])) {
        Err(EngineError::MissingField { field, path }) => {
            assert_eq!(field, "object");
            assert_eq!(path, "main:import.object");
        }
        other => panic!("expected MissingField, got {:?}", other),
    }
}

#[test]
fn value_must_fit_pattern() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    assert!(matches!(
        s.generate(g, &spec(&[("module", "os"), ("object", "1x")])),
        Err(EngineError::InvalidFieldValue { .. })
    ));
}

#[test]
fn leftover_fields() {
    let full = spec(&[("module", "os"), ("object", "path"), ("extra", "1")]);

    let mut s = session();
    let g = load(&mut s, IMPORT);
    match s.generate(g, &full) {
        Err(EngineError::SpecMismatch { leftover }) => assert_eq!(leftover, ["extra"]),
        other => panic!("expected SpecMismatch, got {:?}", other),
    }

    let mut relaxed = session_with(SessionOptions {
        strict_spec: false,
        ..SessionOptions::default()
    });
    let g = load(&mut relaxed, IMPORT);
    assert_eq!(relaxed.generate(g, &full).unwrap(), "from os import path");
}

#[test]
fn completion_from_closest_sample() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    s.match_text(g, "from os import path").unwrap();
    s.match_text(g, "from json import dumps").unwrap();
    assert_eq!(s.samples().len(), 2);

    let completed = s.complete(&spec(&[("module", "json")])).unwrap();
    assert_eq!(completed, spec(&[("module", "json"), ("object", "dumps")]));

    // Nothing in common: the first sample wins the tie.
    let completed = s.complete(&spec(&[("module", "sys")])).unwrap();
    assert_eq!(completed, spec(&[("module", "sys"), ("object", "path")]));
}

#[test]
fn completion_is_idempotent() {
    let mut s = session();
    let g = load(&mut s, IMPORT);
    s.match_text(g, "from json import dumps").unwrap();
    let partial = spec(&[("object", "loads")]);
    let once = s.complete(&partial).unwrap();
    assert_eq!(s.complete(&once).unwrap(), once);
    assert_eq!(s.generate(g, &once).unwrap(), "from json import loads");
}

#[test]
fn completion_without_samples() {
    let s = session();
    assert!(matches!(
        s.complete(&spec(&[("module", "json")])),
        Err(EngineError::NoSamples)
    ));
}

#[test]
fn generate_completed_uses_grammar_samples() {
    let mut s = session();
    let import = load(&mut s, IMPORT);
    let other = s
        .load_source(
            "other",
            r#"<component name="kv"><predicate name="module" pattern="\w+"/>=<predicate name="v" pattern="\w+"/></component>"#,
        )
        .unwrap();
    s.match_text(other, "json=1").unwrap();
    assert!(matches!(
        s.generate_completed(import, &spec(&[("module", "json")])),
        Err(EngineError::NoSamples)
    ));

    s.match_text(import, "from json import dumps").unwrap();
    assert_eq!(
        s.generate_completed(import, &spec(&[("module", "json")])).unwrap(),
        "from json import dumps"
    );
    assert_eq!(s.samples().iter().next().unwrap().grammar, "other:kv");
}

#[test]
fn failed_match_records_nothing() {
    let mut s = session_with(SessionOptions {
        stop_on_error: false,
        ..SessionOptions::default()
    });
    let g = load(&mut s, IMPORT);
    assert_eq!(s.match_text(g, "import json").unwrap(), None);
    assert!(s.samples().is_empty());
}

#[test]
fn inline_markup_load() {
    let mut s = session();
    let g = s.load(r#"<component name="r">hi</component>"#).unwrap();
    assert_eq!(s.grammar_key(g).unwrap(), "<inline-0>:r");
    assert_eq!(s.generate(g, &Spec::new()).unwrap(), "hi");
}

#[test]
fn malformed_grammar_has_diagnostic() {
    let mut s = session();
    let err = s
        .load_source("main", r#"<component name="r"><predicate name="x"/></component>"#)
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedGrammar { .. }), "got {:?}", err);
    assert_eq!(err.to_diagnostics().len(), 1);
    // The rolled back source stays available to render the diagnostic.
    if let EngineError::MalformedGrammar { file_id, .. } = &err {
        assert!(s.files().get(*file_id).is_ok());
    }
    assert!(s.object(FileId(0)).is_err());

    let err = s.load_source("main", "<component name=\"r\">").unwrap_err();
    assert!(matches!(err, EngineError::Parse { .. }), "got {:?}", err);
    assert!(!err.to_diagnostics().is_empty());
}

#[test]
fn grammar_files_on_disk() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    let lib_path = dir.path().join("words.flang");
    let mut lib_file = std::fs::File::create(&lib_path).unwrap();
    write!(
        lib_file,
        r#"<component name="words">
<component name="ident" type="definition"><predicate name="name" pattern="{{vname}}"/></component>
</component>"#
    )
    .unwrap();

    let main_path = dir.path().join("main.flang");
    let mut main_file = std::fs::File::create(&main_path).unwrap();
    write!(
        main_file,
        r#"<component name="call"><use ref="./words.flang:words.ident" name="fn"/>()</component>"#
    )
    .unwrap();

    let mut s = Session::new(SessionOptions::default());
    let g = s.load(main_path.to_str().unwrap()).unwrap();
    assert_eq!(s.grammar_key(g).unwrap(), "main.flang:call");
    assert!(s.symbols().get("words.flang:words.ident.name").is_some());

    let found = s.match_text(g, "run()").unwrap().unwrap();
    assert_eq!(found, spec(&[("fn.name", "run")]));
    assert_eq!(s.generate(g, &found).unwrap(), "run()");

    // Already loaded as a dependency.
    let words = s.load_path(&lib_path).unwrap();
    assert_eq!(words, FileId(1));
    assert_eq!(s.load_path(&main_path).unwrap(), g);
}

#[test]
fn same_file_name_in_two_directories() {
    let first = tempfile::tempdir().expect("failed to create temp dir");
    let second = tempfile::tempdir().expect("failed to create temp dir");
    let first_path = first.path().join("g.flang");
    let second_path = second.path().join("g.flang");
    std::fs::write(&first_path, r#"<component name="g">first</component>"#).unwrap();
    std::fs::write(&second_path, r#"<component name="g">second</component>"#).unwrap();

    let mut s = Session::new(SessionOptions::default());
    let a = s.load_path(&first_path).unwrap();
    let b = s.load_path(&second_path).unwrap();
    assert_ne!(a, b);
    assert_eq!(s.grammar_key(a).unwrap(), "g.flang:g");
    assert_ne!(s.grammar_key(b).unwrap(), "g.flang:g");
    assert!(s.grammar_key(b).unwrap().ends_with("g.flang:g"));

    assert_eq!(s.generate(a, &Spec::new()).unwrap(), "first");
    assert_eq!(s.generate(b, &Spec::new()).unwrap(), "second");
}
