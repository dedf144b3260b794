//! String methods.
//!
//! `size` counts Unicode scalar values, not bytes. `matches` is RE2-style
//! and unanchored; an invalid pattern is a fatal evaluation error.
//! `split(delim, limit)` follows CEL semantics: limit 0 yields an empty
//! list, -1 removes the cap, N yields the first N-1 splits plus the
//! remainder.

use regex::Regex;

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    value::Value,
};

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("string.startsWith(string): bool", |args| {
        let (s, arg) = string_pair(args)?;
        Ok(Value::Bool(s.starts_with(arg)))
    })?;
    registry.register_function("string.endsWith(string): bool", |args| {
        let (s, arg) = string_pair(args)?;
        Ok(Value::Bool(s.ends_with(arg)))
    })?;
    registry.register_function("string.contains(string): bool", |args| {
        let (s, arg) = string_pair(args)?;
        Ok(Value::Bool(s.contains(arg)))
    })?;
    registry.register_function("string.matches(string): bool", |args| {
        let (s, pattern) = string_pair(args)?;
        regex_match(s, pattern)
    })?;
    // Free-function form of matches, same semantics.
    registry.register_function("matches(string, string): bool", |args| {
        let (s, pattern) = string_pair(args)?;
        regex_match(s, pattern)
    })?;
    registry.register_function("string.size(): int", |args| {
        let s = single_string(args)?;
        Ok(scalar_count(s))
    })?;
    registry.register_function("size(string): int", |args| {
        let s = single_string(args)?;
        Ok(scalar_count(s))
    })?;
    registry.register_function("string.trim(): string", |args| {
        let s = single_string(args)?;
        Ok(Value::string(s.trim()))
    })?;
    registry.register_function("string.lowerAscii(): string", |args| {
        let s = single_string(args)?;
        Ok(Value::string(s.to_ascii_lowercase()))
    })?;
    registry.register_function("string.upperAscii(): string", |args| {
        let s = single_string(args)?;
        Ok(Value::string(s.to_ascii_uppercase()))
    })?;
    registry.register_function("string.split(string): list<string>", |args| {
        let (s, delim) = string_pair(args)?;
        Ok(split_with_limit(s, delim, -1))
    })?;
    registry.register_function("string.split(string, int): list<string>", |args| {
        let (s, delim) = string_pair(args)?;
        let [_, _, Value::Int(limit)] = args else {
            return Err(EvalError::new("expected an int limit"));
        };
        Ok(split_with_limit(s, delim, *limit))
    })?;
    Ok(())
}

fn single_string(args: &[Value]) -> Result<&str, EvalError> {
    match args {
        [Value::String(s), ..] => Ok(s),
        _ => Err(EvalError::new("expected a string receiver")),
    }
}

fn string_pair(args: &[Value]) -> Result<(&str, &str), EvalError> {
    match args {
        [Value::String(a), Value::String(b), ..] => Ok((a, b)),
        _ => Err(EvalError::new("expected string arguments")),
    }
}

fn scalar_count(s: &str) -> Value {
    Value::Int(s.chars().count() as i64)
}

fn regex_match(s: &str, pattern: &str) -> Result<Value, EvalError> {
    let re = Regex::new(pattern)
        .map_err(|e| EvalError::new(format!("invalid regular expression: {e}")))?;
    Ok(Value::Bool(re.is_match(s)))
}

/// CEL split: `limit == 0` → `[]`; `limit < 0` → unlimited; `limit == N` →
/// first N-1 splits, then the remainder as the final element. An empty
/// delimiter splits into Unicode scalar values.
fn split_with_limit(s: &str, delim: &str, limit: i64) -> Value {
    if limit == 0 {
        return Value::list(Vec::new());
    }
    let pieces: Vec<Value> = if delim.is_empty() {
        let chars = s.chars().map(|c| Value::string(c.to_string()));
        if limit < 0 {
            chars.collect()
        } else {
            // First N-1 single characters, remainder joined as the last piece.
            let cap = limit as usize;
            let mut out: Vec<Value> = Vec::new();
            let mut rest = s;
            while out.len() + 1 < cap {
                let Some(c) = rest.chars().next() else { break };
                out.push(Value::string(c.to_string()));
                rest = &rest[c.len_utf8()..];
            }
            if !rest.is_empty() || out.is_empty() {
                out.push(Value::string(rest));
            }
            out
        }
    } else if limit < 0 {
        s.split(delim).map(Value::string).collect()
    } else {
        s.splitn(limit as usize, delim).map(Value::string).collect()
    };
    Value::list(pieces)
}
