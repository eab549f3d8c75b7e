use std::io;

use ansi_term::Style;

use crate::evaluator::{Error, Result};
use crate::value::Value;

pub fn print_expr_to(mut out: impl io::Write, expr: &Value) -> io::Result<()> {
    write!(&mut out, "{}", expr)
}

/// print_error_to writes `error` the way users see it: its kind, then its message.
pub fn print_error_to(mut out: impl io::Write, error: &Error) -> io::Result<()> {
    write!(&mut out, "{}: {}", error.kind(), error)
}

/// println_to writes each result on a line of its own, errors painted with `error_style`.
pub fn println_to(
    mut out: impl io::Write,
    results: &[Result<Value>],
    error_style: Style,
) -> io::Result<()> {
    for result in results {
        match result {
            Ok(expr) => print_expr_to(&mut out, expr)?,
            Err(e) => {
                write!(&mut out, "{}", error_style.prefix())?;
                print_error_to(&mut out, e)?;
                write!(&mut out, "{}", error_style.suffix())?;
            }
        }
        writeln!(&mut out)?;
    }
    out.flush()
}
