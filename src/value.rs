use std::fmt;
use std::mem;
use std::rc::Rc;

use internment::Intern;
use itertools::Itertools;
use num_bigint::BigInt;

use crate::evaluator::{Env, HostFn};

/// Symbol is an interned name; two symbols with the same text are the same symbol.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(Intern<String>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Symbol(Intern::new(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value is every runtime value of the language. The reader produces values too: a
/// program is a tree of pairs, symbols and literals.
#[derive(Clone, Debug)]
pub enum Value {
    /// The empty list. Also serves as the unit value returned by side-effecting forms.
    Nil,
    Bool(bool),
    Number(BigInt),
    String(Rc<str>),
    Symbol(Symbol),
    Pair(Rc<Pair>),
    Primitive(Primitive),
    Closure(Rc<Closure>),
}

#[derive(Debug)]
pub struct Pair {
    pub head: Value,
    pub tail: Value,
}

// Pairs this one owns alone are unlinked onto a work list, so dropping a long or deeply
// nested list takes constant stack.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut pending = vec![];
        self.unlink(&mut pending);
        while let Some(pair) = pending.pop() {
            if let Ok(mut pair) = Rc::try_unwrap(pair) {
                pair.unlink(&mut pending);
            }
        }
    }
}

impl Pair {
    fn unlink(&mut self, pending: &mut Vec<Rc<Pair>>) {
        for slot in &mut [&mut self.head, &mut self.tail] {
            if let Value::Pair(pair) = mem::replace(&mut **slot, Value::Nil) {
                pending.push(pair);
            }
        }
    }
}

/// Arity is the argument count a procedure accepts.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

#[derive(Clone, Copy)]
pub struct Primitive {
    pub name: &'static str,
    pub arity: Arity,
    pub host_fn: HostFn,
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Primitive({})", self.name)
    }
}

/// Closure pairs a parameter list and body with the frame it was created in.
pub struct Closure {
    pub name: Option<Symbol>,
    pub params: Vec<Symbol>,
    pub body: Vec<Value>,
    pub env: Env,
}

impl Closure {
    pub fn display_name(&self) -> &str {
        self.name.as_ref().map_or("lambda", Symbol::as_str)
    }
}

// The captured frame is left out: it usually contains the closure itself.
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("body", &self.body)
            .finish()
    }
}

impl Value {
    pub fn number(n: impl Into<BigInt>) -> Self {
        Value::Number(n.into())
    }

    pub fn string(s: &str) -> Self {
        Value::String(s.into())
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Symbol::new(name))
    }

    pub fn cons(head: Value, tail: Value) -> Self {
        Value::Pair(Rc::new(Pair { head, tail }))
    }

    /// list builds a right-nested chain of pairs terminated by `Nil`.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, head| Value::cons(head, tail))
    }

    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            _ => false,
        }
    }

    /// to_vec returns the elements of a proper list, or `None` if `self` is not one.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut items = vec![];
        let mut cursor = self;
        loop {
            match cursor {
                Value::Nil => return Some(items),
                Value::Pair(pair) => {
                    items.push(pair.head.clone());
                    cursor = &pair.tail;
                }
                _ => return None,
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::Primitive(_) | Value::Closure(_) => "procedure",
        }
    }

    /// display renders the value the way the `display` primitive prints it: strings
    /// without their quotes.
    pub fn display(&self) -> Displayed {
        Displayed(self)
    }

    fn fmt_with(&self, f: &mut fmt::Formatter, quote_strings: bool) -> fmt::Result {
        use self::Value::*;

        match self {
            Nil => write!(f, "()"),
            Bool(true) => write!(f, "#t"),
            Bool(false) => write!(f, "#f"),
            Number(n) => write!(f, "{}", n),
            String(s) if quote_strings => write!(f, r#""{}""#, s),
            String(s) => write!(f, "{}", s),
            Symbol(s) => write!(f, "{}", s),
            Pair(_) => self.fmt_pair(f, quote_strings),
            Primitive(p) => write!(f, "#<primitive {}>", p.name),
            Closure(c) => match c.name {
                Some(name) => write!(f, "#<procedure {}>", name),
                None => write!(f, "#<lambda>"),
            },
        }
    }

    fn fmt_pair(&self, f: &mut fmt::Formatter, quote_strings: bool) -> fmt::Result {
        write!(f, "(")?;
        let mut cursor = self;
        let mut first = true;
        loop {
            match cursor {
                Value::Pair(pair) => {
                    if !first {
                        write!(f, " ")?;
                    }
                    pair.head.fmt_with(f, quote_strings)?;
                    first = false;
                    cursor = &pair.tail;
                }
                Value::Nil => break,
                tail => {
                    write!(f, " . ")?;
                    tail.fmt_with(f, quote_strings)?;
                    break;
                }
            }
        }
        write!(f, ")")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_with(f, true)
    }
}

pub struct Displayed<'a>(&'a Value);

impl<'a> fmt::Display for Displayed<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt_with(f, false)
    }
}

/// Numbers compare numerically, lists element-wise and procedures by identity. Tails
/// are walked in a loop; only elements recurse.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        use self::Value::*;

        let (mut left, mut right) = (self, other);
        loop {
            return match (left, right) {
                (Nil, Nil) => true,
                (Bool(a), Bool(b)) => a == b,
                (Number(a), Number(b)) => a == b,
                (String(a), String(b)) => a == b,
                (Symbol(a), Symbol(b)) => a == b,
                (Pair(a), Pair(b)) => {
                    if Rc::ptr_eq(a, b) {
                        true
                    } else if a.head != b.head {
                        false
                    } else {
                        left = &a.tail;
                        right = &b.tail;
                        continue;
                    }
                }
                (Primitive(a), Primitive(b)) => a.name == b.name,
                (Closure(a), Closure(b)) => Rc::ptr_eq(a, b),
                _ => false,
            };
        }
    }
}

/// format_list joins the displayed elements of `values` with single spaces.
pub fn format_list(values: &[Value]) -> String {
    values.iter().map(Value::display).join(" ")
}
