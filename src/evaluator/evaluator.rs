use std::collections::HashMap;
use std::convert;
use std::io;
use std::rc::Rc;
use std::result;

use lazy_static::lazy_static;
use thiserror::Error;
use tracing::trace;

use super::env::Env;
use crate::reader::Error as ReaderError;
use crate::value::{Arity, Closure, Symbol, Value};

pub type Result<T> = result::Result<T, Error>;

/// HostFn is the native implementation of a primitive. `out` receives anything the
/// primitive prints.
pub type HostFn = fn(args: &[Value], out: &mut dyn io::Write) -> Result<Value>;

#[derive(Debug, PartialEq, Clone, Error)]
pub enum Error {
    #[error("{0}")]
    Read(ReaderError),
    #[error("unbound name `{0}`")]
    UnboundName(Symbol),
    /// Arity indicates a procedure called with a number of arguments it does not accept.
    #[error("`{name}` expects {expected} argument(s), got {provided}")]
    Arity {
        name: String,
        expected: Arity,
        provided: usize,
    },
    #[error("{0}")]
    Type(String),
    /// Syntax indicates a special form whose shape is wrong, e.g. `(if #t)`.
    #[error("malformed `{form}`: {reason}")]
    Syntax { form: &'static str, reason: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0}")]
    Io(String),
    /// User carries the message of an explicit `error` call.
    #[error("{0}")]
    User(String),
}

impl Error {
    /// kind names the failure category reported to users.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Read(_) => "ReadError",
            Error::UnboundName(_) => "UnboundNameError",
            Error::Arity { .. } => "ArityError",
            Error::Type(_) => "TypeError",
            Error::Syntax { .. } => "SyntaxError",
            Error::DivisionByZero => "ArithmeticError",
            Error::Io(_) => "IOError",
            Error::User(_) => "UserError",
        }
    }

    pub(crate) fn syntax(form: &'static str, reason: impl Into<String>) -> Self {
        Error::Syntax {
            form,
            reason: reason.into(),
        }
    }
}

impl convert::From<ReaderError> for Error {
    fn from(reader_error: ReaderError) -> Self {
        Error::Read(reader_error)
    }
}

impl convert::From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        Error::Io(io_error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SpecialForm {
    Define,
    Lambda,
    If,
    Let,
    And,
    Or,
    Quote,
    Begin,
    Set,
}

lazy_static! {
    static ref SPECIAL_FORMS: HashMap<Symbol, SpecialForm> = {
        let mut forms = HashMap::new();

        forms.insert(Symbol::new("define"), SpecialForm::Define);
        forms.insert(Symbol::new("lambda"), SpecialForm::Lambda);
        forms.insert(Symbol::new("if"), SpecialForm::If);
        forms.insert(Symbol::new("let"), SpecialForm::Let);
        forms.insert(Symbol::new("and"), SpecialForm::And);
        forms.insert(Symbol::new("or"), SpecialForm::Or);
        forms.insert(Symbol::new("quote"), SpecialForm::Quote);
        forms.insert(Symbol::new("begin"), SpecialForm::Begin);
        forms.insert(Symbol::new("set!"), SpecialForm::Set);

        forms
    };
}

/// Step is what one round of evaluation produced: either a finished value, or an
/// expression in tail position that the caller's loop evaluates next.
enum Step {
    Done(Value),
    Continue(Value, Env),
}

/// eval_expr evaluates `expr` in `env`. Calls in tail position (the branches of `if`,
/// the last operand of `and`/`or`, the bodies of `let`, `begin` and closures) reuse this
/// loop instead of growing the host stack.
pub fn eval_expr(expr: &Value, env: &Env, out: &mut dyn io::Write) -> Result<Value> {
    let mut expr = expr.clone();
    let mut env = env.clone();

    loop {
        let (first, rest) = match &expr {
            Value::Symbol(symbol) => return env.lookup(*symbol),
            Value::Pair(pair) => (pair.head.clone(), pair.tail.clone()),
            _ => return Ok(expr.clone()),
        };

        let step = match special_form(&first) {
            Some(form) => eval_special_form(form, &rest, &env, out)?,
            None => {
                let op = eval_expr(&first, &env, out)?;
                let args = eval_args(&rest, &env, out)?;
                apply_step(&op, args, out)?
            }
        };

        match step {
            Step::Done(value) => return Ok(value),
            Step::Continue(next_expr, next_env) => {
                expr = next_expr;
                env = next_env;
            }
        }
    }
}

/// apply calls `op` with already evaluated `args`.
pub fn apply(op: &Value, args: Vec<Value>, out: &mut dyn io::Write) -> Result<Value> {
    match apply_step(op, args, out)? {
        Step::Done(value) => Ok(value),
        Step::Continue(expr, env) => eval_expr(&expr, &env, out),
    }
}

fn special_form(first: &Value) -> Option<SpecialForm> {
    match first {
        Value::Symbol(symbol) => SPECIAL_FORMS.get(symbol).copied(),
        _ => None,
    }
}

fn eval_args(exprs: &Value, env: &Env, out: &mut dyn io::Write) -> Result<Vec<Value>> {
    let exprs = exprs
        .to_vec()
        .ok_or_else(|| Error::syntax("application", "arguments must form a proper list"))?;
    let mut args = Vec::with_capacity(exprs.len());
    for expr in &exprs {
        args.push(eval_expr(expr, env, out)?);
    }
    Ok(args)
}

fn apply_step(op: &Value, args: Vec<Value>, out: &mut dyn io::Write) -> Result<Step> {
    match op {
        Value::Primitive(primitive) => {
            if !primitive.arity.accepts(args.len()) {
                return Err(Error::Arity {
                    name: primitive.name.to_owned(),
                    expected: primitive.arity,
                    provided: args.len(),
                });
            }
            trace!(primitive = primitive.name, args = args.len(), "apply");
            (primitive.host_fn)(&args, out).map(Step::Done)
        }
        Value::Closure(closure) => {
            trace!(procedure = closure.display_name(), args = args.len(), "apply");
            let local_env = closure
                .env
                .extend(closure.display_name(), &closure.params, args)?;
            eval_body(&closure.body, local_env, out)
        }
        other => Err(Error::Type(format!(
            "cannot apply {} `{}`",
            other.type_name(),
            other
        ))),
    }
}

/// eval_body evaluates all but the last form of a non-empty body and hands the last one
/// back in tail position.
fn eval_body(body: &[Value], env: Env, out: &mut dyn io::Write) -> Result<Step> {
    match body.split_last() {
        Some((last, init)) => {
            for form in init {
                eval_expr(form, &env, out)?;
            }
            Ok(Step::Continue(last.clone(), env))
        }
        None => Ok(Step::Done(Value::Nil)),
    }
}

fn operands(form: &'static str, rest: &Value) -> Result<Vec<Value>> {
    rest.to_vec()
        .ok_or_else(|| Error::syntax(form, "operands must form a proper list"))
}

fn expect_symbol(form: &'static str, expr: &Value) -> Result<Symbol> {
    match expr {
        Value::Symbol(symbol) => Ok(*symbol),
        other => Err(Error::syntax(
            form,
            format!("expected a symbol, got `{}`", other),
        )),
    }
}

fn expect_bool(form: &'static str, value: Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(Error::Type(format!(
            "`{}` needs a boolean, got {} `{}`",
            form,
            other.type_name(),
            other
        ))),
    }
}

fn eval_special_form(
    form: SpecialForm,
    rest: &Value,
    env: &Env,
    out: &mut dyn io::Write,
) -> Result<Step> {
    match form {
        SpecialForm::Define => eval_define(rest, env, out),
        SpecialForm::Lambda => eval_lambda(rest, env),
        SpecialForm::If => eval_if(rest, env, out),
        SpecialForm::Let => eval_let(rest, env, out),
        SpecialForm::And => eval_logical("and", false, rest, env, out),
        SpecialForm::Or => eval_logical("or", true, rest, env, out),
        SpecialForm::Quote => eval_quote(rest),
        SpecialForm::Begin => eval_begin(rest, env, out),
        SpecialForm::Set => eval_set(rest, env, out),
    }
}

fn make_closure(
    form: &'static str,
    name: Option<Symbol>,
    params: &Value,
    body: &[Value],
    env: &Env,
) -> Result<Value> {
    let params = params
        .to_vec()
        .ok_or_else(|| Error::syntax(form, "parameters must form a proper list"))?
        .iter()
        .map(|param| expect_symbol(form, param))
        .collect::<Result<Vec<_>>>()?;
    if body.is_empty() {
        return Err(Error::syntax(form, "missing body"));
    }

    Ok(Value::Closure(Rc::new(Closure {
        name,
        params,
        body: body.to_vec(),
        env: env.clone(),
    })))
}

// (define <symbol> <expr>)
// (define (<name> <params>...) <body>...)
fn eval_define(rest: &Value, env: &Env, out: &mut dyn io::Write) -> Result<Step> {
    let exprs = operands("define", rest)?;
    let (target, body) = exprs
        .split_first()
        .ok_or_else(|| Error::syntax("define", "missing name"))?;

    let (name, value) = match target {
        Value::Symbol(name) => match body {
            [expr] => (*name, eval_expr(expr, env, out)?),
            _ => {
                return Err(Error::syntax(
                    "define",
                    "a symbol definition takes exactly one expression",
                ))
            }
        },
        Value::Pair(signature) => {
            let name = expect_symbol("define", &signature.head)?;
            let closure = make_closure("define", Some(name), &signature.tail, body, env)?;
            (name, closure)
        }
        other => {
            return Err(Error::syntax(
                "define",
                format!("cannot bind `{}`", other),
            ))
        }
    };

    env.define(name, value);
    Ok(Step::Done(Value::Symbol(name)))
}

// (lambda (<params>...) <body>...)
fn eval_lambda(rest: &Value, env: &Env) -> Result<Step> {
    let exprs = operands("lambda", rest)?;
    let (params, body) = exprs
        .split_first()
        .ok_or_else(|| Error::syntax("lambda", "missing parameter list"))?;
    make_closure("lambda", None, params, body, env).map(Step::Done)
}

// (if <test> <then> <else>)
fn eval_if(rest: &Value, env: &Env, out: &mut dyn io::Write) -> Result<Step> {
    match operands("if", rest)?.as_slice() {
        [test, then, otherwise] => {
            let branch = if expect_bool("if", eval_expr(test, env, out)?)? {
                then
            } else {
                otherwise
            };
            Ok(Step::Continue(branch.clone(), env.clone()))
        }
        exprs => Err(Error::syntax(
            "if",
            format!("expected test, then and else, got {} operand(s)", exprs.len()),
        )),
    }
}

// (let ((<name> <expr>)...) <body>...)
// Bindings are evaluated in order, each seeing the ones before it.
fn eval_let(rest: &Value, env: &Env, out: &mut dyn io::Write) -> Result<Step> {
    let exprs = operands("let", rest)?;
    let (bindings, body) = exprs
        .split_first()
        .ok_or_else(|| Error::syntax("let", "missing bindings"))?;
    if body.is_empty() {
        return Err(Error::syntax("let", "missing body"));
    }
    let bindings = bindings
        .to_vec()
        .ok_or_else(|| Error::syntax("let", "bindings must form a proper list"))?;

    let local_env = Env::with_parent(env);
    for binding in bindings {
        match binding.to_vec().as_deref() {
            Some([name, expr]) => {
                let name = expect_symbol("let", name)?;
                let value = eval_expr(expr, &local_env, out)?;
                local_env.define(name, value);
            }
            _ => {
                return Err(Error::syntax(
                    "let",
                    format!("expected (name expr), got `{}`", binding),
                ))
            }
        }
    }
    eval_body(body, local_env, out)
}

// (and <expr>...) / (or <expr>...)
// Evaluation stops at the first operand equal to `short_circuit`.
fn eval_logical(
    form: &'static str,
    short_circuit: bool,
    rest: &Value,
    env: &Env,
    out: &mut dyn io::Write,
) -> Result<Step> {
    let exprs = operands(form, rest)?;
    match exprs.split_last() {
        None => Ok(Step::Done(Value::Bool(!short_circuit))),
        Some((last, init)) => {
            for expr in init {
                if expect_bool(form, eval_expr(expr, env, out)?)? == short_circuit {
                    return Ok(Step::Done(Value::Bool(short_circuit)));
                }
            }
            Ok(Step::Continue(last.clone(), env.clone()))
        }
    }
}

// (quote <datum>)
fn eval_quote(rest: &Value) -> Result<Step> {
    match operands("quote", rest)?.as_slice() {
        [datum] => Ok(Step::Done(datum.clone())),
        _ => Err(Error::syntax("quote", "expected exactly one datum")),
    }
}

// (begin <expr>...)
fn eval_begin(rest: &Value, env: &Env, out: &mut dyn io::Write) -> Result<Step> {
    let exprs = operands("begin", rest)?;
    if exprs.is_empty() {
        return Err(Error::syntax("begin", "needs at least one expression"));
    }
    eval_body(&exprs, env.clone(), out)
}

// (set! <symbol> <expr>)
fn eval_set(rest: &Value, env: &Env, out: &mut dyn io::Write) -> Result<Step> {
    match operands("set!", rest)?.as_slice() {
        [target, expr] => {
            let name = expect_symbol("set!", target)?;
            let value = eval_expr(expr, env, out)?;
            env.set(name, value)?;
            Ok(Step::Done(Value::Nil))
        }
        _ => Err(Error::syntax("set!", "expected a symbol and one expression")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::prelude;
    use super::*;
    use crate::reader;

    fn run_eval(input: &str) -> Vec<Result<Value>> {
        let env = prelude::env();
        let mut out = vec![];
        reader::read(input)
            .unwrap()
            .iter()
            .map(|expr| eval_expr(expr, &env, &mut out))
            .collect()
    }

    fn eval_last(input: &str) -> Result<Value> {
        run_eval(input).pop().unwrap()
    }

    fn num(n: i64) -> Value {
        Value::number(n)
    }

    #[test]
    fn test_env_simple() {
        let env = prelude::env();
        let mut out = vec![];
        let exprs = reader::read("(define foo 333) foo").unwrap();

        let result = eval_expr(&exprs[0], &env, &mut out).unwrap();
        assert_eq!(Value::symbol("foo"), result);

        let result = eval_expr(&exprs[1], &env, &mut out).unwrap();
        assert_eq!(num(333), result);
    }

    #[test]
    fn test_simple_closures() {
        let results = run_eval(
            "
            (define (add-b a) (+ a b))
            (add-b 12)
            (define b 12)
            (add-b 12)",
        );
        assert_eq!(results[0], Ok(Value::symbol("add-b")));
        assert_eq!(results[1], Err(Error::UnboundName(Symbol::new("b"))));
        assert_eq!(results[3], Ok(num(24)));
    }

    #[test]
    fn closures_outlive_their_frame() {
        let result = eval_last(
            "
            (define (make-adder n) (lambda (x) (+ x n)))
            (define add-five (make-adder 5))
            (define n 100)
            (add-five 1)",
        );
        assert_eq!(result, Ok(num(6)));
    }

    #[test]
    fn closures_share_their_frame() {
        let result = eval_last(
            "
            (define (make-counter)
              (let ((count 0))
                (lambda () (set! count (+ count 1)) count)))
            (define a (make-counter))
            (define b (make-counter))
            (a) (a) (b)
            (list (a) (b))",
        );
        assert_eq!(result, Ok(Value::list(vec![num(3), num(2)])));
    }

    #[test]
    fn let_binds_sequentially() {
        assert_eq!(eval_last("(let ((a 1) (b (+ a 1))) b)"), Ok(num(2)));
        assert_eq!(
            eval_last(
                "(let ((q:r (list 7 3))
                       (q (head q:r))
                       (r (head (tail q:r))))
                   (+ (* q 10) r))"
            ),
            Ok(num(73))
        );
    }

    #[test]
    fn let_does_not_leak_bindings() {
        let results = run_eval("(let ((inner 1)) inner) inner");
        assert_eq!(results[0], Ok(num(1)));
        assert_eq!(results[1], Err(Error::UnboundName(Symbol::new("inner"))));
    }

    #[test]
    fn if_requires_a_boolean_test() {
        assert_eq!(eval_last("(if (< 1 2) 10 20)"), Ok(num(10)));
        assert_eq!(eval_last("(if #f 10 20)"), Ok(num(20)));
        match eval_last("(if 0 10 20)") {
            Err(Error::Type(_)) => {}
            other => panic!("expected a type error, got {:?}", other),
        }
        match eval_last("(if #t 10)") {
            Err(Error::Syntax { form: "if", .. }) => {}
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn if_only_evaluates_the_taken_branch() {
        assert_eq!(eval_last("(if #t 1 (error \"not taken\"))"), Ok(num(1)));
    }

    #[test]
    fn and_or_short_circuit() {
        assert_eq!(eval_last("(and #t #f (error \"unreached\"))"), Ok(Value::Bool(false)));
        assert_eq!(eval_last("(or #f #t (error \"unreached\"))"), Ok(Value::Bool(true)));
        assert_eq!(eval_last("(and #t 5)"), Ok(num(5)));
        assert_eq!(eval_last("(or #f 5)"), Ok(num(5)));
        assert_eq!(eval_last("(and)"), Ok(Value::Bool(true)));
        assert_eq!(eval_last("(or)"), Ok(Value::Bool(false)));
    }

    #[test]
    fn deep_tail_recursion_does_not_grow_the_stack() {
        let result = eval_last(
            "
            (define (count-down n acc)
              (if (= n 0)
                  acc
                  (count-down (- n 1) (+ acc 1))))
            (count-down 100000 0)",
        );
        assert_eq!(result, Ok(num(100000)));
    }

    #[test]
    fn non_tail_recursion_reaches_hundreds_deep() {
        let result = eval_last(
            "
            (define (sum-to n)
              (if (= n 0) 0 (+ n (sum-to (- n 1)))))
            (sum-to 500)",
        );
        assert_eq!(result, Ok(num(125250)));
    }

    #[test]
    fn reports_wrong_arity() {
        assert_eq!(
            eval_last("(define (f a b) a) (f 1)"),
            Err(Error::Arity {
                name: "f".into(),
                expected: Arity::Exactly(2),
                provided: 1,
            })
        );
        assert_eq!(
            eval_last("(+ 1 2 3)"),
            Err(Error::Arity {
                name: "+".into(),
                expected: Arity::Exactly(2),
                provided: 3,
            })
        );
    }

    #[test]
    fn cannot_apply_non_procedures() {
        match eval_last("(5 1 2)") {
            Err(e @ Error::Type(_)) => assert_eq!(e.kind(), "TypeError"),
            other => panic!("expected a type error, got {:?}", other),
        }
    }

    #[test]
    fn error_aborts_the_form() {
        let env = prelude::env();
        let mut out = vec![];
        let exprs = reader::read(r#"(begin (display "before") (error "msg" 42) (display "after"))"#)
            .unwrap();
        let result = eval_expr(&exprs[0], &env, &mut out);
        assert_eq!(result, Err(Error::User("msg 42".into())));
        assert_eq!(String::from_utf8(out).unwrap(), "before\n");
    }

    #[test]
    fn procedures_are_values() {
        assert_eq!(
            eval_last("(define (bin-op fun a b) (fun a b)) (bin-op + 2 3)"),
            Ok(num(5))
        );
        assert_eq!(
            eval_last("((lambda (y) ((lambda (x) (+ x y)) 2)) 3)"),
            Ok(num(5))
        );
    }

    #[test]
    fn can_quote_data() {
        assert_eq!(eval_last("'x"), Ok(Value::symbol("x")));
        assert_eq!(
            eval_last("'(1 (a))"),
            Ok(Value::list(vec![num(1), Value::list(vec![Value::symbol("a")])]))
        );
    }

    #[test]
    fn apply_runs_closures_to_completion() {
        let env = prelude::env();
        let mut out = vec![];
        let exprs = reader::read("(lambda (a b) (* a b))").unwrap();
        let op = eval_expr(&exprs[0], &env, &mut out).unwrap();
        assert_eq!(apply(&op, vec![num(6), num(7)], &mut out), Ok(num(42)));
    }

    macro_rules! eval_tests {
        ($($name:ident: $value:expr,)*) => {
            $(
                #[test]
                fn $name() {
                    let (input, expected): (&str, Vec<Value>) = $value;
                    let expected_results: Vec<Result<Value>> = expected.into_iter().map(|expr| Ok(expr)).collect();

                    let results = run_eval(input);

                    assert_eq!(expected_results, results);
                }
            )*
        }
    }

    eval_tests! {
        can_eval_empty: ("", vec![]),
        can_eval_literals: (r#"#t #f 33 "hi" ()"#, vec![
            Value::Bool(true),
            Value::Bool(false),
            num(33),
            Value::string("hi"),
            Value::Nil,
        ]),
        can_eval_simple_arith: ("(+ 2 2) (- 10 (* 2 (/ 9 3)))", vec![num(4), num(4)]),
        can_eval_lambda: ("((lambda (a) (+ a 1)) 1)", vec![num(2)]),
        can_eval_define_forms: ("(define x 2) (define (sq n) (* n n)) (sq x)", vec![
            Value::symbol("x"),
            Value::symbol("sq"),
            num(4),
        ]),
        can_eval_redefinition: ("(define x 1) (define x 2) x", vec![
            Value::symbol("x"),
            Value::symbol("x"),
            num(2),
        ]),
        can_eval_begin_and_set: ("(define x 1) (begin (set! x (+ x 1)) x)", vec![
            Value::symbol("x"),
            num(2),
        ]),
        can_eval_recursion: ("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1))))) (fact 25)", vec![
            Value::symbol("fact"),
            Value::Number("15511210043330985984000000".parse().unwrap()),
        ]),
    }
}
