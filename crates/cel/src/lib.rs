#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked or bounded")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts follow validated bounds checks")]

mod ast;
mod check;
mod env;
mod error;
mod eval;
mod parse;
mod registry;
mod serialize;
mod stdlib;
mod token;
mod tracer;
mod types;
mod value;

pub use crate::{
    ast::{BinaryOp, CodeRange, Expr, ExprLoc, Literal, UnaryOp},
    env::{Checked, Context, EnvOptions, Environment, ParseLimits, Program, check, evaluate, parse, serialize_ast},
    error::{CelError, EvalError, ParseError, RegistrationError, TypeError},
    token::{RESERVED_WORDS, is_reserved_word},
    tracer::{EvalTracer, NoopTracer, RecordingTracer, TraceEvent},
    types::CelType,
    value::{CelMap, CelObject, Key, Value},
};
