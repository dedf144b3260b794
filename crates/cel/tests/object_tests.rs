use std::sync::Arc;

use cel::{CelObject, Context, Environment, Value};

/// A host type for the tests, registered as `Account`.
#[derive(Debug)]
struct Account {
    name: &'static str,
    balance: Value,
}

impl CelObject for Account {
    fn type_name(&self) -> &str {
        "Account"
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::string(self.name)),
            "balance" => Some(self.balance.clone()),
            _ => None,
        }
    }
}

/// A second registered type, to exercise identity mismatches.
#[derive(Debug)]
struct Widget;

impl CelObject for Widget {
    fn type_name(&self) -> &str {
        "Widget"
    }

    fn field(&self, _name: &str) -> Option<Value> {
        None
    }
}

fn account_env() -> Environment {
    let mut env = Environment::new();
    env.register_type(
        "Account",
        Some(vec![
            ("name".to_owned(), "string".to_owned()),
            ("balance".to_owned(), "int".to_owned()),
        ]),
    )
    .unwrap();
    env.register_variable("acct", "Account").unwrap();
    env
}

fn account_ctx(balance: Value) -> Context {
    let mut ctx = Context::new();
    ctx.insert(
        "acct".to_owned(),
        Value::Object(Arc::new(Account {
            name: "alice",
            balance,
        })),
    );
    ctx
}

#[test]
fn declared_fields_are_readable_and_typed() {
    let env = account_env();
    let ctx = account_ctx(Value::Int(100));
    assert_eq!(env.evaluate("acct.name", &ctx).unwrap(), Value::string("alice"));
    assert_eq!(env.evaluate("acct.balance + 1", &ctx).unwrap(), Value::Int(101));

    // The checker knows the declared field types.
    assert_eq!(env.check("acct.balance + 1").unwrap().result_type, cel::CelType::Int);
    let err = env.check("acct.balance + \"x\"").expect_err("type mismatch");
    assert!(err.message().contains("no such overload: int + string"), "got: {err}");
}

#[test]
fn undeclared_field_access_fails() {
    let env = account_env();
    let ctx = account_ctx(Value::Int(100));
    let err = env.evaluate("acct.secret", &ctx).expect_err("undeclared field");
    assert!(err.message().contains("No such key: secret"), "got: {err}");

    // Statically too.
    let err = env.check("acct.secret").expect_err("undeclared field");
    assert!(err.message().contains("undeclared field 'secret'"), "got: {err}");
}

#[test]
fn field_type_enforcement_at_read() {
    let env = account_env();
    // The instance lies about its declared type: balance is a string.
    let ctx = account_ctx(Value::string("lots"));
    let err = env.evaluate("acct.balance", &ctx).expect_err("wrongly-typed field");
    assert!(err.message().contains("Field 'balance' is not of type 'int'"), "got: {err}");
}

#[test]
fn instance_identity_is_verified() {
    let mut env = account_env();
    env.register_type("Widget", None).unwrap();
    let mut ctx = Context::new();
    ctx.insert("acct".to_owned(), Value::Object(Arc::new(Widget)));
    let err = env.evaluate("acct.name", &ctx).expect_err("wrong instance type");
    assert!(
        err.message().contains("not an instance of type 'Account'"),
        "got: {err}"
    );

    // A plain value fails the same verification.
    let mut ctx = Context::new();
    ctx.insert("acct".to_owned(), Value::Int(5));
    let err = env.evaluate("acct.name", &ctx).expect_err("not an object");
    assert!(
        err.message().contains("not an instance of type 'Account'"),
        "got: {err}"
    );
}

#[test]
fn types_without_field_declarations_read_any_field() {
    let mut env = Environment::new();
    env.register_type("Account", None).unwrap();
    env.register_variable("acct", "Account").unwrap();
    let ctx = account_ctx(Value::Int(1));
    assert_eq!(env.evaluate("acct.name", &ctx).unwrap(), Value::string("alice"));
    let err = env.evaluate("acct.missing", &ctx).expect_err("absent field");
    assert!(err.message().contains("No such key: missing"), "got: {err}");
}

#[test]
fn has_on_objects() {
    let env = account_env();
    let ctx = account_ctx(Value::Int(1));
    assert_eq!(env.evaluate("has(acct.name)", &ctx).unwrap(), Value::Bool(true));
    // Undeclared fields are absent rather than errors under has().
    assert_eq!(env.evaluate("has(acct.secret)", &ctx).unwrap(), Value::Bool(false));
}

#[test]
fn duplicate_type_registration_is_rejected() {
    let mut env = Environment::new();
    env.register_type("Account", None).unwrap();
    assert!(env.register_type("Account", None).is_err());
}

#[test]
fn variables_of_unknown_object_types_are_rejected() {
    let mut env = Environment::new();
    assert!(env.register_variable("acct", "Account").is_err());
}
