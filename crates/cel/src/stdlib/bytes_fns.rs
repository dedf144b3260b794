//! Bytes methods.
//!
//! `size` is the byte count (strings count scalars; bytes count bytes).
//! `hex` and `base64` render encodings; `string` decodes UTF-8 and fails on
//! invalid input.

use std::fmt::Write as _;

use crate::{
    error::{EvalError, RegistrationError},
    registry::Registry,
    value::Value,
};

const BASE64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub(super) fn install(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_function("bytes.size(): int", |args| {
        let b = receiver(args)?;
        Ok(Value::Int(b.len() as i64))
    })?;
    registry.register_function("size(bytes): int", |args| {
        let b = receiver(args)?;
        Ok(Value::Int(b.len() as i64))
    })?;
    registry.register_function("bytes.at(int): int", |args| {
        let b = receiver(args)?;
        let [_, Value::Int(index)] = args else {
            return Err(EvalError::new("expected an int index"));
        };
        usize::try_from(*index)
            .ok()
            .and_then(|i| b.get(i))
            .map(|byte| Value::Int(i64::from(*byte)))
            .ok_or_else(|| EvalError::new(format!("index out of range: {index}")))
    })?;
    registry.register_function("bytes.hex(): string", |args| {
        let b = receiver(args)?;
        let mut out = String::with_capacity(b.len() * 2);
        for byte in b {
            let _ = write!(out, "{byte:02x}");
        }
        Ok(Value::string(out))
    })?;
    registry.register_function("bytes.base64(): string", |args| {
        let b = receiver(args)?;
        Ok(Value::string(base64_encode(b)))
    })?;
    registry.register_function("bytes.string(): string", |args| {
        let b = receiver(args)?;
        match std::str::from_utf8(b) {
            Ok(s) => Ok(Value::string(s)),
            Err(_) => Err(EvalError::new("bytes are not valid UTF-8")),
        }
    })?;
    Ok(())
}

fn receiver(args: &[Value]) -> Result<&[u8], EvalError> {
    match args {
        [Value::Bytes(b), ..] => Ok(b),
        _ => Err(EvalError::new("expected a bytes receiver")),
    }
}

/// Standard-alphabet base64 with padding.
fn base64_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied().unwrap_or(0);
        let b2 = chunk.get(2).copied().unwrap_or(0);
        out.push(char::from(BASE64_ALPHABET[usize::from(b0 >> 2)]));
        out.push(char::from(BASE64_ALPHABET[usize::from((b0 & 0x03) << 4 | b1 >> 4)]));
        if chunk.len() > 1 {
            out.push(char::from(BASE64_ALPHABET[usize::from((b1 & 0x0f) << 2 | b2 >> 6)]));
        } else {
            out.push('=');
        }
        if chunk.len() > 2 {
            out.push(char::from(BASE64_ALPHABET[usize::from(b2 & 0x3f)]));
        } else {
            out.push('=');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_known_vectors() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
        assert_eq!(base64_encode(b"foobar"), "Zm9vYmFy");
    }
}
