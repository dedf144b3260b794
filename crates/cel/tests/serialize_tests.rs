use cel::{EnvOptions, Environment, serialize_ast};
use pretty_assertions::assert_eq;

/// Round-trip: parsing the serialization yields a structurally equal AST.
fn round_trip(env: &Environment, source: &str) -> String {
    let first = env.parse(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    let rendered = serialize_ast(first.ast());
    let second = env
        .parse(&rendered)
        .unwrap_or_else(|e| panic!("serialized form '{rendered}' of '{source}': {e}"));
    assert_eq!(second.ast(), first.ast(), "source: {source}, serialized: {rendered}");
    rendered
}

#[test]
fn canonical_forms() {
    let env = Environment::new();
    assert_eq!(round_trip(&env, "1+2 * 3"), "1 + 2 * 3");
    assert_eq!(round_trip(&env, "(1+2)*3"), "(1 + 2) * 3");
    assert_eq!(round_trip(&env, "a && b || c"), "a && b || c");
    assert_eq!(round_trip(&env, "a ? b : c ? d : e"), "a ? b : c ? d : e");
    assert_eq!(round_trip(&env, "f(1, 2)[0].g"), "f(1, 2)[0].g");
    assert_eq!(round_trip(&env, "[1, 2, 3]"), "[1, 2, 3]");
    assert_eq!(round_trip(&env, "{ \"a\" : 1 }"), "{\"a\": 1}");
    assert_eq!(round_trip(&env, "!x"), "!x");
    assert_eq!(round_trip(&env, "5u"), "5u");
}

#[test]
fn parenthesization_preserves_structure() {
    let env = Environment::new();
    // Right-nested subtraction and division must keep their parentheses.
    assert_eq!(round_trip(&env, "a - (b - c)"), "a - (b - c)");
    assert_eq!(round_trip(&env, "a / (b * c)"), "a / (b * c)");
    assert_eq!(round_trip(&env, "(a + b) * c"), "(a + b) * c");
    assert_eq!(round_trip(&env, "-(a + b)"), "-(a + b)");
    assert_eq!(round_trip(&env, "(a ? b : c) + 1"), "(a ? b : c) + 1");
    assert_eq!(round_trip(&env, "(a || b) && c"), "(a || b) && c");
    // Left-nested forms need no parentheses.
    assert_eq!(round_trip(&env, "(a - b) - c"), "a - b - c");
}

#[test]
fn member_chains_and_calls() {
    let env = Environment::new();
    assert_eq!(round_trip(&env, "a.b.c(1).d[2]"), "a.b.c(1).d[2]");
    assert_eq!(round_trip(&env, "(a + b).size()"), "(a + b).size()");
    assert_eq!(round_trip(&env, "x.filter(i, i > 0).map(i, i * 2)"), "x.filter(i, i > 0).map(i, i * 2)");
}

#[test]
fn literal_rendering() {
    let env = Environment::new();
    assert_eq!(round_trip(&env, "1.5"), "1.5");
    assert_eq!(round_trip(&env, "1.0"), "1.0");
    assert_eq!(round_trip(&env, "true"), "true");
    assert_eq!(round_trip(&env, "null"), "null");
    assert_eq!(round_trip(&env, r#"'hi'"#), r#""hi""#);
    assert_eq!(round_trip(&env, r#""line\nbreak""#), r#""line\nbreak""#);
    assert_eq!(round_trip(&env, r#"b"\x00abc""#), r#"b"\x00abc""#);
    assert_eq!(round_trip(&env, r#"r"raw\n""#), r#""raw\\n""#);
    assert_eq!(round_trip(&env, "'''multi\nline'''"), r#""multi\nline""#);
}

#[test]
fn optional_syntax_round_trips() {
    let env = Environment::with_options(EnvOptions::new().enable_optional_types(true));
    assert_eq!(round_trip(&env, "a.?b.c"), "a.?b.c");
    assert_eq!(round_trip(&env, "m[?\"k\"]"), "m[?\"k\"]");
    assert_eq!(round_trip(&env, "a.?b.orValue(1)"), "a.?b.orValue(1)");
}

#[test]
fn whitespace_and_comments_normalize_away() {
    let env = Environment::new();
    let a = env.parse("1 +  2 // note\n * 3").unwrap();
    let b = env.parse("1+2*3").unwrap();
    assert_eq!(serialize_ast(a.ast()), serialize_ast(b.ast()));
}

#[test]
fn ast_json_externalization_round_trips() {
    let env = Environment::with_options(EnvOptions::new().enable_optional_types(true));
    for source in [
        "1 + 2 * 3",
        "x ? y.z : [1, 2u, 1.5]",
        r#"{"a": b"bytes", "c": null}"#,
        r#"user.roles.exists(r, r == "admin")"#,
        "a.?b[?0].orValue(-1)",
        "!(x in [1, 2])",
        "type(x) == type(1)",
    ] {
        let program = env.parse(source).unwrap();
        let json = program.ast().to_json();
        // Through a JSON string and back.
        let text = serde_json::to_string(&json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let rebuilt = cel::ExprLoc::from_json(&parsed).unwrap();
        assert_eq!(&rebuilt, program.ast(), "source: {source}");
    }
}

#[test]
fn json_tags_follow_the_operator_labels() {
    let env = Environment::new();
    let program = env.parse("1 + 2").unwrap();
    assert_eq!(program.ast().to_json(), serde_json::json!(["+", 1, 2]));

    let program = env.parse("size(\"a\")").unwrap();
    assert_eq!(program.ast().to_json(), serde_json::json!(["call", "size", ["a"]]));

    let program = env.parse("x.size()").unwrap();
    assert_eq!(
        program.ast().to_json(),
        serde_json::json!(["rcall", "size", ["id", "x"], []])
    );

    let program = env.parse("5u").unwrap();
    assert_eq!(program.ast().to_json(), serde_json::json!(["uint", 5]));
}
