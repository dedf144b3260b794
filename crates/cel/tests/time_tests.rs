use cel::{Context, Environment, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Value {
    Environment::new()
        .evaluate(source, &Context::new())
        .unwrap_or_else(|e| panic!("{source}: {e}"))
}

#[test]
fn duration_strings() {
    assert_eq!(run(r#"duration("1h")"#), Value::Duration(3_600_000));
    assert_eq!(run(r#"duration("1h30m")"#), Value::Duration(5_400_000));
    assert_eq!(run(r#"duration("1.5h")"#), Value::Duration(5_400_000));
    assert_eq!(run(r#"duration("2m3s")"#), Value::Duration(123_000));
    assert_eq!(run(r#"duration("250ms")"#), Value::Duration(250));
    assert_eq!(run(r#"duration("-1m")"#), Value::Duration(-60_000));
    // Repeated units sum.
    assert_eq!(run(r#"duration("1h1h")"#), Value::Duration(7_200_000));

    let err = Environment::new()
        .evaluate(r#"duration("5 parsecs")"#, &Context::new())
        .expect_err("bad duration");
    assert!(err.message().contains("unrecognized duration"), "got: {err}");
}

#[test]
fn timestamp_construction() {
    // String and integer forms agree.
    assert_eq!(
        run(r#"timestamp("2023-12-25T12:00:00Z") == timestamp(1703505600)"#),
        Value::Bool(true)
    );
    // Offsets normalize to the same instant.
    assert_eq!(
        run(r#"timestamp("2023-12-25T13:00:00+01:00") == timestamp("2023-12-25T12:00:00Z")"#),
        Value::Bool(true)
    );
    let err = Environment::new()
        .evaluate(r#"timestamp("yesterday")"#, &Context::new())
        .expect_err("bad timestamp");
    assert!(err.message().contains("unrecognized timestamp"), "got: {err}");
}

#[test]
fn timestamp_accessors_in_utc() {
    let prefix = r#"timestamp("2023-12-25T23:45:06.789Z")"#;
    assert_eq!(run(&format!("{prefix}.getFullYear()")), Value::Int(2023));
    assert_eq!(run(&format!("{prefix}.getMonth()")), Value::Int(11), "getMonth is 0-based");
    assert_eq!(run(&format!("{prefix}.getDate()")), Value::Int(25), "getDate is 1-based");
    assert_eq!(run(&format!("{prefix}.getDayOfMonth()")), Value::Int(24), "getDayOfMonth is 0-based");
    assert_eq!(run(&format!("{prefix}.getDayOfWeek()")), Value::Int(1), "Monday, Sunday=0");
    assert_eq!(run(&format!("{prefix}.getDayOfYear()")), Value::Int(358), "0-based day of year");
    assert_eq!(run(&format!("{prefix}.getHours()")), Value::Int(23));
    assert_eq!(run(&format!("{prefix}.getMinutes()")), Value::Int(45));
    assert_eq!(run(&format!("{prefix}.getSeconds()")), Value::Int(6));
    assert_eq!(run(&format!("{prefix}.getMilliseconds()")), Value::Int(789));
}

#[test]
fn timestamp_accessors_with_timezone() {
    let prefix = r#"timestamp("2023-12-25T23:45:00Z")"#;
    // IANA zone: New York is UTC-5 in December.
    assert_eq!(run(&format!("{prefix}.getHours(\"America/New_York\")")), Value::Int(18));
    assert_eq!(run(&format!("{prefix}.getDate(\"America/New_York\")")), Value::Int(25));
    // Crossing midnight changes the date fields.
    assert_eq!(run(&format!("{prefix}.getDate(\"Asia/Tokyo\")")), Value::Int(26));
    assert_eq!(run(&format!("{prefix}.getDayOfWeek(\"Asia/Tokyo\")")), Value::Int(2));
    // Fixed offsets work without the tz database.
    assert_eq!(run(&format!("{prefix}.getHours(\"+01:00\")")), Value::Int(0));
    assert_eq!(run(&format!("{prefix}.getHours(\"-08:00\")")), Value::Int(15));

    let err = Environment::new()
        .evaluate(&format!("{prefix}.getHours(\"Mars/Olympus\")"), &Context::new())
        .expect_err("bad timezone");
    assert!(err.message().contains("unrecognized timezone"), "got: {err}");
}

#[test]
fn timestamp_arithmetic() {
    assert_eq!(
        run(r#"timestamp("2023-12-25T12:00:00Z") + duration("1h30m") == timestamp("2023-12-25T13:30:00Z")"#),
        Value::Bool(true)
    );
    assert_eq!(
        run(r#"timestamp("2023-12-25T12:00:00Z") - duration("12h") == timestamp("2023-12-25T00:00:00Z")"#),
        Value::Bool(true)
    );
    assert_eq!(
        run(r#"timestamp("2023-12-25T12:00:00Z") - timestamp("2023-12-25T11:00:00Z")"#),
        Value::Duration(3_600_000)
    );
    assert_eq!(
        run(r#"duration("1h") + timestamp("2023-12-25T12:00:00Z") == timestamp("2023-12-25T13:00:00Z")"#),
        Value::Bool(true)
    );
}

#[test]
fn time_ordering() {
    assert_eq!(
        run(r#"timestamp("2023-01-01T00:00:00Z") < timestamp("2024-01-01T00:00:00Z")"#),
        Value::Bool(true)
    );
    assert_eq!(run(r#"duration("90s") > duration("1m")"#), Value::Bool(true));
}

#[test]
fn canonical_time_strings() {
    assert_eq!(
        run(r#"string(timestamp("2023-12-25T12:00:00Z"))"#),
        Value::string("2023-12-25T12:00:00Z")
    );
    assert_eq!(
        run(r#"string(timestamp("2023-12-25T12:00:00.500Z"))"#),
        Value::string("2023-12-25T12:00:00.500Z")
    );
    assert_eq!(run(r#"string(duration("1h30m"))"#), Value::string("5400s"));
    assert_eq!(run(r#"string(duration("-500ms"))"#), Value::string("-0.5s"));
}

#[test]
fn unix_seconds_conversion() {
    assert_eq!(run(r#"int(timestamp("2023-12-25T12:00:00Z"))"#), Value::Int(1_703_505_600));
}
