use std::io;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::Zero;

use super::env::Env;
use super::evaluator::{Error, HostFn, Result};
use crate::value::{format_list, Arity, Primitive, Symbol, Value};

fn type_error(name: &str, expected: &str, got: &Value) -> Error {
    Error::Type(format!(
        "`{}` expects {}, got {} `{}`",
        name,
        expected,
        got.type_name(),
        got
    ))
}

fn number<'a>(name: &str, value: &'a Value) -> Result<&'a BigInt> {
    match value {
        Value::Number(n) => Ok(n),
        other => Err(type_error(name, "a number", other)),
    }
}

fn numbers<'a>(name: &str, args: &'a [Value]) -> Result<(&'a BigInt, &'a BigInt)> {
    Ok((number(name, &args[0])?, number(name, &args[1])?))
}

fn nonzero<'a>(divisor: &'a BigInt) -> Result<&'a BigInt> {
    if divisor.is_zero() {
        Err(Error::DivisionByZero)
    } else {
        Ok(divisor)
    }
}

fn add(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("+", args)?;
    Ok(Value::Number(a + b))
}

fn sub(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("-", args)?;
    Ok(Value::Number(a - b))
}

fn mul(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("*", args)?;
    Ok(Value::Number(a * b))
}

// Division rounds toward negative infinity so that `(+ (* (/ a b) b) (% a b))` is `a`.
fn div(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("/", args)?;
    Ok(Value::Number(a.div_floor(nonzero(b)?)))
}

// The result takes the sign of the divisor: (% -5 10) is 5.
fn modulo(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("%", args)?;
    Ok(Value::Number(a.mod_floor(nonzero(b)?)))
}

fn bit_and(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("&", args)?;
    Ok(Value::Number(a & b))
}

fn bit_or(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("|", args)?;
    Ok(Value::Number(a | b))
}

fn bit_xor(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("^", args)?;
    Ok(Value::Number(a ^ b))
}

// Two's complement: (~ n) is (- -1 n).
fn bit_not(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let n = number("~", &args[0])?;
    Ok(Value::Number(!n.clone()))
}

fn eq(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    Ok(Value::Bool(args[0] == args[1]))
}

fn neq(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    Ok(Value::Bool(args[0] != args[1]))
}

fn lt(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("<", args)?;
    Ok(Value::Bool(a < b))
}

fn gt(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers(">", args)?;
    Ok(Value::Bool(a > b))
}

fn le(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers("<=", args)?;
    Ok(Value::Bool(a <= b))
}

fn ge(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let (a, b) = numbers(">=", args)?;
    Ok(Value::Bool(a >= b))
}

fn not(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    match &args[0] {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(type_error("not", "a boolean", other)),
    }
}

fn head(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    match &args[0] {
        Value::Pair(pair) => Ok(pair.head.clone()),
        other => Err(type_error("head", "a pair", other)),
    }
}

fn tail(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    match &args[0] {
        Value::Pair(pair) => Ok(pair.tail.clone()),
        other => Err(type_error("tail", "a pair", other)),
    }
}

fn cons(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn list(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    Ok(Value::list(args.to_vec()))
}

fn is_null(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    Ok(Value::Bool(args[0].is_nil()))
}

// (:: (list 1 2) (list 3) ...) joins proper lists end to end.
fn concat(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    let mut items = vec![];
    for arg in args {
        let mut elements = arg
            .to_vec()
            .ok_or_else(|| type_error("::", "a list", arg))?;
        items.append(&mut elements);
    }
    Ok(Value::list(items))
}

fn display(args: &[Value], out: &mut dyn io::Write) -> Result<Value> {
    for arg in args {
        write!(out, "{}", arg.display())?;
    }
    writeln!(out)?;
    Ok(Value::Nil)
}

fn error(args: &[Value], _: &mut dyn io::Write) -> Result<Value> {
    Err(Error::User(format_list(args)))
}

static PRELUDE_BINDINGS: &[(&str, Arity, HostFn)] = &[
    ("+", Arity::Exactly(2), add),
    ("-", Arity::Exactly(2), sub),
    ("*", Arity::Exactly(2), mul),
    ("/", Arity::Exactly(2), div),
    ("%", Arity::Exactly(2), modulo),
    ("&", Arity::Exactly(2), bit_and),
    ("|", Arity::Exactly(2), bit_or),
    ("^", Arity::Exactly(2), bit_xor),
    ("~", Arity::Exactly(1), bit_not),
    ("=", Arity::Exactly(2), eq),
    ("!=", Arity::Exactly(2), neq),
    ("<", Arity::Exactly(2), lt),
    (">", Arity::Exactly(2), gt),
    ("<=", Arity::Exactly(2), le),
    (">=", Arity::Exactly(2), ge),
    ("not", Arity::Exactly(1), not),
    ("head", Arity::Exactly(1), head),
    ("tail", Arity::Exactly(1), tail),
    ("cons", Arity::Exactly(2), cons),
    ("list", Arity::AtLeast(0), list),
    ("null?", Arity::Exactly(1), is_null),
    ("::", Arity::AtLeast(2), concat),
    ("display", Arity::AtLeast(0), display),
    ("error", Arity::AtLeast(0), error),
];

/// env builds a fresh global frame holding every primitive.
pub fn env() -> Env {
    let bindings = PRELUDE_BINDINGS
        .iter()
        .map(|&(name, arity, host_fn)| {
            (
                Symbol::new(name),
                Value::Primitive(Primitive {
                    name,
                    arity,
                    host_fn,
                }),
            )
        })
        .collect::<Vec<(Symbol, Value)>>();
    let env = Env::new();
    env.add_bindings(bindings.as_slice());
    env
}
