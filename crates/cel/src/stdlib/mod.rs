//! The built-in library.
//!
//! Installs the standard operators, conversions, string/bytes/timestamp/
//! duration methods and comprehension macros into a fresh registry. One
//! submodule per concern:
//!
//! - [`arithmetic`]: `+ - * / %`, unary `!`/`-`, concatenation, time arithmetic
//! - [`compare`]: relational operators, including cross-numeric ordering
//! - [`convert`]: `int()`, `uint()`, `double()`, `string()`, `bool()`,
//!   `bytes()`, `timestamp()`, `duration()`, `type()`, `dyn()`
//! - [`strings`]: string methods
//! - [`bytes_fns`]: bytes methods
//! - [`collections`]: polymorphic `size`, membership (`in`)
//! - [`time`]: timestamp accessors, duration parsing
//! - [`macros`]: `has()` and the comprehension macros
//! - [`optional`]: the `optional` namespace and methods (option-gated)

mod arithmetic;
mod bytes_fns;
mod collections;
mod compare;
mod convert;
mod macros;
mod optional;
mod strings;
mod time;

pub(crate) use time::parse_duration;

use crate::{env::EnvOptions, error::RegistrationError, registry::Registry};

/// Installs the standard library.
///
/// # Panics
/// Panics if a built-in signature fails to register; the signatures are
/// static, so this indicates a bug in the library itself.
pub(crate) fn install(registry: &mut Registry, options: &EnvOptions) {
    try_install(registry, options).expect("standard library signatures are valid");
}

fn try_install(registry: &mut Registry, options: &EnvOptions) -> Result<(), RegistrationError> {
    arithmetic::install(registry)?;
    compare::install(registry)?;
    convert::install(registry)?;
    strings::install(registry)?;
    bytes_fns::install(registry)?;
    collections::install(registry)?;
    time::install(registry)?;
    macros::install(registry)?;
    if options.enable_optional_types {
        optional::install(registry)?;
    }
    Ok(())
}
