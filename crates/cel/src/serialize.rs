//! Canonical source serialization.
//!
//! Walks an AST and emits CEL source with precedence-aware
//! parenthesization. The right operand of a left-associative operator is
//! parenthesized when its precedence matches the parent's, so `a / (b * c)`
//! and `a - (b - c)` keep their structure. Round-trip property: parsing the
//! output yields an AST structurally equal to the input (positions aside).

use std::fmt::Write;

use crate::ast::{Expr, ExprLoc, Literal, UnaryOp};

/// Precedence of unary application.
const UNARY_PREC: u8 = 7;
/// Precedence of postfix forms (member, index, call) and primaries.
const POSTFIX_PREC: u8 = 8;

/// Serializes `ast` to canonical source.
#[must_use]
pub(crate) fn to_source(ast: &ExprLoc) -> String {
    let mut out = String::new();
    write_expr(&mut out, ast, 0);
    out
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Ternary { .. } => 0,
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { .. } => UNARY_PREC,
        _ => POSTFIX_PREC,
    }
}

/// Writes `node`, parenthesized if it binds looser than `min_prec`.
fn write_expr(out: &mut String, node: &ExprLoc, min_prec: u8) {
    if precedence(&node.expr) < min_prec {
        out.push('(');
        write_expr(out, node, 0);
        out.push(')');
        return;
    }
    match &node.expr {
        Expr::Literal(lit) => write_literal(out, lit),
        Expr::Ident(name) => out.push_str(name),
        Expr::Member { object, field, optional } => {
            write_expr(out, object, POSTFIX_PREC);
            out.push_str(if *optional { ".?" } else { "." });
            out.push_str(field);
        }
        Expr::Index { object, index, optional } => {
            write_expr(out, object, POSTFIX_PREC);
            out.push_str(if *optional { "[?" } else { "[" });
            write_expr(out, index, 0);
            out.push(']');
        }
        Expr::Unary { op, operand } => {
            out.push_str(op.symbol());
            // `--x` would lex as two tokens and re-parse identically, but a
            // space keeps the canonical form unambiguous to the eye.
            if *op == UnaryOp::Neg && matches!(operand.expr, Expr::Unary { op: UnaryOp::Neg, .. }) {
                out.push(' ');
            }
            write_expr(out, operand, UNARY_PREC);
        }
        Expr::Binary { left, op, right } => {
            write_expr(out, left, op.precedence());
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, right, op.precedence() + 1);
        }
        Expr::Ternary { cond, then, otherwise } => {
            write_expr(out, cond, 1);
            out.push_str(" ? ");
            write_expr(out, then, 0);
            out.push_str(" : ");
            write_expr(out, otherwise, 0);
        }
        Expr::Call { function, args } => {
            out.push_str(function);
            write_args(out, args);
        }
        Expr::MethodCall { receiver, method, args } => {
            write_expr(out, receiver, POSTFIX_PREC);
            out.push('.');
            out.push_str(method);
            write_args(out, args);
        }
        Expr::ListLit(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item, 0);
            }
            out.push(']');
        }
        Expr::MapLit(entries) => {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, key, 0);
                out.push_str(": ");
                write_expr(out, value, 0);
            }
            out.push('}');
        }
    }
}

fn write_args(out: &mut String, args: &[ExprLoc]) {
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, arg, 0);
    }
    out.push(')');
}

fn write_literal(out: &mut String, lit: &Literal) {
    match lit {
        Literal::Null => out.push_str("null"),
        Literal::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Literal::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Literal::Uint(u) => {
            let _ = write!(out, "{u}u");
        }
        Literal::Double(d) => {
            // ryu output is lossless and re-parses to the same bits.
            let mut buffer = ryu::Buffer::new();
            out.push_str(buffer.format(*d));
        }
        Literal::String(s) => write_string_literal(out, s),
        Literal::Bytes(b) => write_bytes_literal(out, b),
    }
}

fn write_string_literal(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\v"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_bytes_literal(out: &mut String, bytes: &[u8]) {
    out.push_str("b\"");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7e => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('"');
}
