use cel::{CelError, EnvOptions, Environment, ParseLimits};

fn parse_err(source: &str) -> CelError {
    Environment::new().parse(source).expect_err("expected a parse error")
}

fn parse_err_with(limits: ParseLimits, source: &str) -> CelError {
    Environment::with_options(EnvOptions::new().limits(limits))
        .parse(source)
        .expect_err("expected a parse error")
}

#[test]
fn syntax_errors_render_an_excerpt_with_a_caret() {
    let err = parse_err("1 + * 2");
    let rendered = err.to_string();
    assert!(rendered.starts_with("parse error:"), "got: {rendered}");
    assert!(rendered.contains("1 + * 2"), "got: {rendered}");
    let caret_line = rendered.lines().last().unwrap_or_default();
    assert_eq!(caret_line.trim_end().chars().last(), Some('^'), "got: {rendered}");
    // The caret must sit under the offending token.
    assert_eq!(caret_line.find('^'), Some("  1 + ".len()), "got: {rendered}");
}

#[test]
fn trailing_input_is_rejected() {
    let err = parse_err("1 2");
    assert!(err.message().contains("unexpected trailing"), "got: {err}");
}

#[test]
fn unterminated_strings() {
    assert!(parse_err(r#""abc"#).message().contains("unterminated"));
    assert!(parse_err("'''abc").message().contains("unterminated"));
}

#[test]
fn invalid_escapes() {
    assert!(parse_err(r#""\q""#).message().contains("invalid escape"));
    assert!(parse_err(r#""\ud800""#).message().contains("invalid code point"));
    assert!(parse_err(r#"b"\U00000041""#).message().contains("not allowed in bytes"));
}

#[test]
fn integer_literal_bounds() {
    assert!(parse_err("9223372036854775808").message().contains("out of range"));
    assert!(parse_err("-9223372036854775809").message().contains("out of range"));
    assert!(Environment::new().parse("-9223372036854775808").is_ok());
    assert!(Environment::new().parse("18446744073709551615u").is_ok());
}

#[test]
fn uint_suffix_is_rejected_on_doubles() {
    assert!(parse_err("1.5u").message().contains("floating literal"));
}

#[test]
fn ast_node_budget() {
    let err = parse_err_with(ParseLimits::default().max_ast_nodes(4), "1 + 2 + 3 + 4");
    assert!(err.message().contains("max_ast_nodes"), "got: {err}");
}

#[test]
fn nesting_depth() {
    let err = parse_err_with(ParseLimits::default().max_depth(5), "[[[[[[1]]]]]]");
    assert!(err.message().contains("max_depth"), "got: {err}");

    let err = parse_err_with(ParseLimits::default().max_depth(5), "a.b.c.d.e.f.g");
    assert!(err.message().contains("max_depth"), "got: {err}");

    let err = parse_err_with(ParseLimits::default().max_depth(5), "f(f(f(f(f(f(1))))))");
    assert!(err.message().contains("max_depth"), "got: {err}");
}

#[test]
fn list_element_limit() {
    let err = parse_err_with(ParseLimits::default().max_list_elements(3), "[1, 2, 3, 4]");
    assert!(err.message().contains("max_list_elements"), "got: {err}");
    assert!(
        Environment::with_options(EnvOptions::new().limits(ParseLimits::default().max_list_elements(3)))
            .parse("[1, 2, 3]")
            .is_ok()
    );
}

#[test]
fn map_entry_limit() {
    let err = parse_err_with(ParseLimits::default().max_map_entries(2), "{1: 1, 2: 2, 3: 3}");
    assert!(err.message().contains("max_map_entries"), "got: {err}");
}

#[test]
fn call_argument_limit() {
    let err = parse_err_with(ParseLimits::default().max_call_arguments(3), "f(1, 2, 3, 4)");
    assert!(err.message().contains("max_call_arguments"), "got: {err}");
}

#[test]
fn optional_syntax_requires_the_option() {
    let err = parse_err("a.?b");
    assert!(err.message().contains("enable_optional_types"), "got: {err}");
    let err = parse_err("a[?0]");
    assert!(err.message().contains("enable_optional_types"), "got: {err}");

    let enabled = Environment::with_options(EnvOptions::new().enable_optional_types(true));
    assert!(enabled.parse("a.?b").is_ok());
    assert!(enabled.parse("a[?0]").is_ok());
}

#[test]
fn parse_error_offsets_are_byte_offsets() {
    let CelError::Parse(err) = parse_err("12 + }") else {
        panic!("expected a parse error");
    };
    assert_eq!(err.offset(), 5);
}

#[test]
fn comments_are_stripped() {
    let program = Environment::new().parse("1 + // one\n2").unwrap();
    let equivalent = Environment::new().parse("1 + 2").unwrap();
    assert_eq!(program.ast(), equivalent.ast());
}
