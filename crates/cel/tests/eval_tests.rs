use cel::{CelError, Context, EnvOptions, Environment, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Value {
    Environment::new()
        .evaluate(source, &Context::new())
        .unwrap_or_else(|e| panic!("{source}: {e}"))
}

fn run_err(source: &str) -> CelError {
    Environment::new()
        .evaluate(source, &Context::new())
        .expect_err("expected an evaluation error")
}

fn json_ctx(json: serde_json::Value) -> Context {
    let serde_json::Value::Object(fields) = json else {
        panic!("context must be an object");
    };
    fields
        .into_iter()
        .map(|(k, v)| (k, Value::from_json(&v).unwrap()))
        .collect()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("1 + 2 * 3"), Value::Int(7));
    assert_eq!(run("(1 + 2) * 3"), Value::Int(9));
    assert_eq!(run("7 % 3"), Value::Int(1));
    assert_eq!(run("10 / 3"), Value::Int(3));
    assert_eq!(run("2u + 3u"), Value::Uint(5));
    assert_eq!(run("1.5 * 2.0"), Value::Double(3.0));
}

#[test]
fn comprehension_over_context_data() {
    let ctx = json_ctx(serde_json::json!({"user": {"roles": ["user", "admin"]}}));
    let program = Environment::new()
        .parse(r#"user.roles.exists(r, r == "admin")"#)
        .unwrap();
    assert_eq!(program.evaluate(&ctx).unwrap(), Value::Bool(true));
}

#[test]
fn size_counts_unicode_scalars() {
    assert_eq!(run(r#"size("hello 😄")"#), Value::Int(7));
    assert_eq!(run(r#""hello 😄".size()"#), Value::Int(7));
    // Bytes count bytes, not scalars.
    assert_eq!(run(r#"size(b"abc")"#), Value::Int(3));
    assert_eq!(run(r#"size(bytes("😄"))"#), Value::Int(4));
}

#[test]
fn duration_arithmetic() {
    assert_eq!(run(r#"duration("1h") + duration("30m")"#), Value::Duration(5_400_000));
    assert_eq!(run(r#"duration("1h") - duration("90m")"#), Value::Duration(-1_800_000));
    assert_eq!(run(r#"-duration("1s")"#), Value::Duration(-1_000));
}

#[test]
fn timestamp_day_of_week() {
    // 2023-12-25 was a Monday; Sunday is 0.
    assert_eq!(run(r#"timestamp("2023-12-25T12:00:00Z").getDayOfWeek()"#), Value::Int(1));
}

#[test]
fn integer_overflow_is_fatal() {
    let err = run_err("9223372036854775807 + 1");
    assert!(err.message().contains("integer overflow"), "got: {err}");
    let err = run_err("-9223372036854775808 - 1");
    assert!(err.message().contains("integer overflow"), "got: {err}");
    let err = run_err("-(-9223372036854775808)");
    assert!(err.message().contains("integer overflow"), "got: {err}");
}

#[test]
fn uint_underflow_is_fatal() {
    let err = run_err("0u - 1u");
    assert!(err.message().contains("unsigned integer overflow"), "got: {err}");
    let err = run_err("18446744073709551615u + 1u");
    assert!(err.message().contains("unsigned integer overflow"), "got: {err}");
}

#[test]
fn division_and_modulo_by_zero() {
    assert!(run_err("1 / 0").message().contains("division by zero"));
    assert!(run_err("1 % 0").message().contains("modulo by zero"));
    // Doubles follow IEEE-754 instead of failing.
    assert_eq!(run("1.0 / 0.0"), Value::Double(f64::INFINITY));
}

#[test]
fn short_circuit_skips_the_right_operand() {
    // The right operands would fail if evaluated.
    assert_eq!(run("true || 1 / 0 > 0"), Value::Bool(true));
    assert_eq!(run("false && 1 / 0 > 0"), Value::Bool(false));
    assert_eq!(run("false || true"), Value::Bool(true));
    assert_eq!(run("true ? 1 : 1 / 0"), Value::Int(1));
    assert_eq!(run("false ? 1 / 0 : 2"), Value::Int(2));
}

#[test]
fn logical_operands_must_be_bool() {
    let err = run_err("true && dyn(1)");
    assert!(err.message().contains("must be bool"), "got: {err}");
}

#[test]
fn ternary_condition_must_be_bool() {
    let err = run_err("dyn(1) ? 2 : 3");
    assert!(err.message().contains("ternary condition must be bool"), "got: {err}");
}

#[test]
fn membership() {
    assert_eq!(run("2 in [1, 2, 3]"), Value::Bool(true));
    assert_eq!(run("4 in [1, 2, 3]"), Value::Bool(false));
    assert_eq!(run(r#""a" in {"a": 1, "b": 2}"#), Value::Bool(true));
    assert_eq!(run(r#""c" in {"a": 1, "b": 2}"#), Value::Bool(false));
    // Numerically equal int and uint keys are the same key.
    assert_eq!(run("1u in {1: true}"), Value::Bool(true));
}

#[test]
fn map_literal_duplicate_keys_last_write_wins() {
    assert_eq!(run(r#"{"a": 1, "a": 2}["a"]"#), Value::Int(2));
}

#[test]
fn member_and_index_access() {
    let ctx = json_ctx(serde_json::json!({"m": {"a": {"b": [10, 20]}}}));
    let env = Environment::new();
    assert_eq!(env.evaluate("m.a.b[1]", &ctx).unwrap(), Value::Int(20));
    assert_eq!(env.evaluate(r#"m["a"].b[0]"#, &ctx).unwrap(), Value::Int(10));

    let err = env.evaluate("m.missing", &ctx).expect_err("absent key");
    assert!(err.message().contains("No such key: missing"), "got: {err}");

    let err = env.evaluate("m.a.b[0.5]", &ctx).expect_err("double index");
    assert!(err.message().contains("no such overload"), "got: {err}");
}

#[test]
fn reserved_identifiers_are_rejected_at_evaluation() {
    let mut ctx = Context::new();
    ctx.insert("while".to_owned(), Value::Int(1));
    let err = Environment::new().evaluate("while", &ctx).expect_err("reserved");
    assert!(err.message().contains("reserved identifier"), "got: {err}");
    // As a map key, the same word is fine.
    assert_eq!(run(r#"{"while": 1}["while"]"#), Value::Int(1));
}

#[test]
fn unknown_variable_at_runtime() {
    let err = run_err("missing");
    assert!(err.message().contains("Unknown variable 'missing'"), "got: {err}");
}

#[test]
fn comprehension_macros() {
    assert_eq!(run("[1, 2, 3].all(x, x > 0)"), Value::Bool(true));
    assert_eq!(run("[1, 2, 3].all(x, x > 1)"), Value::Bool(false));
    assert_eq!(run("[].all(x, x > 0)"), Value::Bool(true));
    assert_eq!(run("[1, 2, 3].exists(x, x == 2)"), Value::Bool(true));
    assert_eq!(run("[1, 2, 3].exists_one(x, x > 2)"), Value::Bool(true));
    assert_eq!(run("[1, 2, 3].exists_one(x, x > 1)"), Value::Bool(false));
    assert_eq!(run("[1, 2, 3, 4].filter(x, x % 2 == 0)"), run("[2, 4]"));
    assert_eq!(run("[1, 2, 3].map(x, x * 2)"), run("[2, 4, 6]"));
    assert_eq!(run("[1, 2, 3, 4].map(x, x % 2 == 0, x * 10)"), run("[20, 40]"));
    // Maps iterate keys; filter yields keys.
    assert_eq!(run(r#"{"a": 1, "b": 2}.filter(k, k == "a")"#), run(r#"["a"]"#));
    assert_eq!(run(r#"{"a": 1}.all(k, k.startsWith("a"))"#), Value::Bool(true));
}

#[test]
fn macro_predicate_must_return_bool() {
    let err = run_err("[1, 2].all(x, x + 1)");
    assert!(
        err.message()
            .contains("all(x, predicate) predicate must return bool, got 'int'"),
        "got: {err}"
    );
}

#[test]
fn macro_variable_shadowing_is_scoped() {
    let ctx = json_ctx(serde_json::json!({"x": 100}));
    let env = Environment::new();
    // Inside the macro, `x` is the element; outside, the context value.
    assert_eq!(
        env.evaluate("[1].map(x, x).size() + x", &ctx).unwrap(),
        Value::Int(101)
    );
    // Nested macros shadow innermost-last.
    assert_eq!(
        run("[[1, 2]].all(x, x.all(x, x > 0))"),
        Value::Bool(true)
    );
}

#[test]
fn has_macro() {
    let ctx = json_ctx(serde_json::json!({"m": {"a": 1}}));
    let env = Environment::new();
    assert_eq!(env.evaluate("has(m.a)", &ctx).unwrap(), Value::Bool(true));
    assert_eq!(env.evaluate("has(m.b)", &ctx).unwrap(), Value::Bool(false));
}

#[test]
fn conversions() {
    assert_eq!(run("int(2.9)"), Value::Int(2));
    assert_eq!(run("int(-2.9)"), Value::Int(-2));
    assert_eq!(run(r#"int("42")"#), Value::Int(42));
    assert_eq!(run("uint(42)"), Value::Uint(42));
    assert_eq!(run("double(1)"), Value::Double(1.0));
    assert_eq!(run("string(1.0)"), Value::string("1"));
    assert_eq!(run("string(1.5)"), Value::string("1.5"));
    assert_eq!(run("string(true)"), Value::string("true"));
    assert_eq!(run(r#"bytes("abc")"#), Value::bytes(b"abc".to_vec()));
    assert_eq!(run(r#"string(b"abc")"#), Value::string("abc"));
    assert_eq!(run(r#"string(duration("1h30m"))"#), Value::string("5400s"));

    assert!(run_err(r#"int("abc")"#).message().contains("cannot convert"));
    assert!(run_err("uint(-1)").message().contains("unsigned integer overflow"));
    assert!(run_err("int(1e300)").message().contains("integer overflow"));
}

#[test]
fn bool_conversion_accepts_the_canonical_strings() {
    for (text, expected) in [
        ("1", true),
        ("0", false),
        ("t", true),
        ("f", false),
        ("true", true),
        ("false", false),
        ("TRUE", true),
        ("FALSE", false),
        ("True", true),
        ("False", false),
    ] {
        assert_eq!(run(&format!("bool(\"{text}\")")), Value::Bool(expected), "bool(\"{text}\")");
    }
    for bad in ["T", "F", "yes", "no", "tRuE", ""] {
        assert!(
            run_err(&format!("bool(\"{bad}\")")).message().contains("cannot convert"),
            "bool(\"{bad}\") should fail"
        );
    }
}

#[test]
fn string_methods() {
    assert_eq!(run(r#""hello".startsWith("he")"#), Value::Bool(true));
    assert_eq!(run(r#""hello".endsWith("lo")"#), Value::Bool(true));
    assert_eq!(run(r#""hello".contains("ell")"#), Value::Bool(true));
    assert_eq!(run(r#""  hi  ".trim()"#), Value::string("hi"));
    assert_eq!(run(r#""Mixed".lowerAscii()"#), Value::string("mixed"));
    assert_eq!(run(r#""Mixed".upperAscii()"#), Value::string("MIXED"));
    assert_eq!(run(r#""a,b,c".split(",")"#), run(r#"["a", "b", "c"]"#));
    assert_eq!(run(r#""a,b,c".split(",", 0)"#), run("[]"));
    assert_eq!(run(r#""a,b,c".split(",", -1)"#), run(r#"["a", "b", "c"]"#));
    assert_eq!(run(r#""a,b,c".split(",", 2)"#), run(r#"["a", "b,c"]"#));
}

#[test]
fn regex_matches_is_unanchored() {
    assert_eq!(run(r#""wildebeest".matches("[ae]+")"#), Value::Bool(true));
    assert_eq!(run(r#"matches("wildebeest", "^wild")"#), Value::Bool(true));
    assert_eq!(run(r#""cat".matches("^dog$")"#), Value::Bool(false));
    let err = run_err(r#""x".matches("[unclosed")"#);
    assert!(err.message().contains("invalid regular expression"), "got: {err}");
}

#[test]
fn bytes_methods() {
    assert_eq!(run(r#"b"\x01\xab".hex()"#), Value::string("01ab"));
    assert_eq!(run(r#"b"foo".base64()"#), Value::string("Zm9v"));
    assert_eq!(run(r#"b"abc".at(1)"#), Value::Int(98));
    assert!(run_err(r#"b"abc".at(5)"#).message().contains("index out of range"));
}

#[test]
fn type_function_and_type_equality() {
    assert_eq!(run("type(1) == type(2)"), Value::Bool(true));
    assert_eq!(run("type(1) == type(1u)"), Value::Bool(false));
    assert_eq!(run(r#"string(type("x"))"#), Value::string("string"));
    // Ordering on types is not an overload.
    let err = run_err("type(1) < type(2)");
    assert!(err.message().contains("no such overload"), "got: {err}");
}

#[test]
fn equality_via_dyn_crosses_numeric_tags() {
    assert_eq!(run("dyn(1) == dyn(1.0)"), Value::Bool(true));
    assert_eq!(run("dyn(1) == dyn(1u)"), Value::Bool(true));
    assert_eq!(run("dyn(1) == dyn(1.5)"), Value::Bool(false));
    assert_eq!(run("dyn(1) == dyn(\"1\")"), Value::Bool(false));
}

#[test]
fn nan_comparisons_are_false() {
    assert_eq!(run("0.0 / 0.0 < 1.0"), Value::Bool(false));
    assert_eq!(run("0.0 / 0.0 >= 1.0"), Value::Bool(false));
    assert_eq!(run("dyn(0.0 / 0.0) == dyn(0.0 / 0.0)"), Value::Bool(false));
}

#[test]
fn cross_numeric_ordering() {
    assert_eq!(run("1 < 1.5"), Value::Bool(true));
    assert_eq!(run("2u > 1"), Value::Bool(true));
    assert_eq!(run("1 <= 1u"), Value::Bool(true));
}

#[test]
fn string_comparison_and_concatenation() {
    assert_eq!(run(r#""abc" < "abd""#), Value::Bool(true));
    assert_eq!(run(r#""foo" + "bar""#), Value::string("foobar"));
    assert_eq!(run(r#"b"ab" + b"cd""#), Value::bytes(b"abcd".to_vec()));
    assert_eq!(run("[1, 2] + [3]"), run("[1, 2, 3]"));
}

#[test]
fn list_concatenation_checks_element_types_at_runtime() {
    assert_eq!(run("[] + [1]"), run("[1]"));
    // The evaluate-only path skips the checker, so the handler itself
    // rejects mismatched element types.
    let err = run_err(r#"[1] + ["a"]"#);
    assert!(
        err.message().contains("no such overload: list<int> + list<string>"),
        "got: {err}"
    );
    let err = run_err(r#"dyn([1, 2]) + dyn(["a"])"#);
    assert!(err.message().contains("no such overload"), "got: {err}");
}

#[test]
fn repeated_evaluation_is_deterministic() {
    let program = Environment::new().parse("[1, 2, 3].map(x, x * x)").unwrap();
    let ctx = Context::new();
    let first = program.evaluate(&ctx).unwrap();
    let second = program.evaluate(&ctx).unwrap();
    assert_eq!(first, second);
}

#[test]
fn environment_snapshot_isolates_programs() {
    let mut env = Environment::with_options(EnvOptions::new().unlisted_variables_are_dyn(true));
    env.register_function("answer(): int", |_| Ok(Value::Int(42))).unwrap();
    let program = env.parse("answer()").unwrap();
    assert_eq!(program.evaluate(&Context::new()).unwrap(), Value::Int(42));

    // A later conflicting registration must not affect the parsed program.
    env.register_function("answer(int): int", |_| Ok(Value::Int(0))).unwrap();
    assert_eq!(program.evaluate(&Context::new()).unwrap(), Value::Int(42));
}

#[test]
fn tracer_records_visited_nodes() {
    let program = Environment::new().parse("1 + 2").unwrap();
    let mut tracer = cel::RecordingTracer::new();
    program.evaluate_with_tracer(&Context::new(), &mut tracer).unwrap();
    assert_eq!(tracer.tags(), vec!["+", "lit", "lit"]);
}

#[test]
fn custom_function_and_operator_registration() {
    let mut env = Environment::new();
    env.register_function("string.shout(): string", |args| match &args[0] {
        Value::String(s) => Ok(Value::string(s.to_uppercase())),
        _ => Err(cel::EvalError::new("expected a string")),
    })
    .unwrap();
    assert_eq!(env.evaluate(r#""hi".shout()"#, &Context::new()).unwrap(), Value::string("HI"));
}
