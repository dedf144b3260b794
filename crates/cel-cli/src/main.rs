use std::{env, process::ExitCode};

use cel::{Context, Environment, Value};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let expression = match args.get(1) {
        Some(expression) => expression,
        None => {
            eprintln!("usage: cel '<expression>' ['<json context>']");
            return ExitCode::FAILURE;
        }
    };

    let ctx = match args.get(2) {
        None => Context::new(),
        Some(raw) => match parse_context(raw) {
            Ok(ctx) => ctx,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
    };

    let environment = Environment::new();
    match environment.evaluate(expression, &ctx) {
        Ok(value) => {
            println!("{}", value.to_json());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Parses the optional second argument: a JSON object mapping variable
/// names to values.
fn parse_context(raw: &str) -> Result<Context, String> {
    let json: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| format!("invalid context JSON: {err}"))?;
    let serde_json::Value::Object(fields) = json else {
        return Err("context must be a JSON object".to_owned());
    };
    let mut ctx = Context::new();
    for (name, value) in fields {
        let value = Value::from_json(&value).map_err(|err| format!("invalid context value for '{name}': {err}"))?;
        ctx.insert(name, value);
    }
    Ok(ctx)
}
