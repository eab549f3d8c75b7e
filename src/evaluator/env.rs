use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use itertools::Itertools;

use super::evaluator::{Error, Result};
use crate::value::{Arity, Symbol, Value};

type Scope = HashMap<Symbol, Value>;

#[derive(Default)]
struct Frame {
    bindings: Scope,
    parent: Option<Env>,
}

/// Env is a shared handle to one frame of a lexical environment chain. Every closure
/// created while a frame is active holds a handle to it, so the frame lives as long as
/// the longest of them.
#[derive(Clone, Default)]
pub struct Env(Rc<RefCell<Frame>>);

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: &Env) -> Self {
        Env(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    /// define binds or rebinds `symbol` in this frame only.
    pub fn define(&self, symbol: Symbol, value: Value) {
        self.0.borrow_mut().bindings.insert(symbol, value);
    }

    pub fn add_bindings(&self, bindings: &[(Symbol, Value)]) {
        let mut frame = self.0.borrow_mut();
        bindings.iter().for_each(|(k, v)| {
            frame.bindings.insert(*k, v.clone());
        })
    }

    /// lookup returns the value bound to `symbol` in the nearest frame that binds it.
    pub fn lookup(&self, symbol: Symbol) -> Result<Value> {
        let mut env = self.clone();
        loop {
            let parent = {
                let frame = env.0.borrow();
                if let Some(value) = frame.bindings.get(&symbol) {
                    return Ok(value.clone());
                }
                frame.parent.clone()
            };
            match parent {
                Some(parent) => env = parent,
                None => return Err(Error::UnboundName(symbol)),
            }
        }
    }

    /// set rebinds `symbol` in the nearest frame that already binds it.
    pub fn set(&self, symbol: Symbol, value: Value) -> Result<()> {
        let mut env = self.clone();
        loop {
            let parent = {
                let mut frame = env.0.borrow_mut();
                if let Some(slot) = frame.bindings.get_mut(&symbol) {
                    *slot = value;
                    return Ok(());
                }
                frame.parent.clone()
            };
            match parent {
                Some(parent) => env = parent,
                None => return Err(Error::UnboundName(symbol)),
            }
        }
    }

    /// extend creates a child frame binding each of `params` to the matching `args`.
    pub fn extend(&self, name: &str, params: &[Symbol], args: Vec<Value>) -> Result<Env> {
        if params.len() != args.len() {
            return Err(Error::Arity {
                name: name.to_owned(),
                expected: Arity::Exactly(params.len()),
                provided: args.len(),
            });
        }
        let child = Env::with_parent(self);
        child
            .0
            .borrow_mut()
            .bindings
            .extend(params.iter().copied().zip(args));
        Ok(child)
    }
}

// Only this frame's names are shown; values may refer back to the frame itself.
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let frame = self.0.borrow();
        write!(
            f,
            "Env (some-parent? {:?}) [{}]",
            frame.parent.is_some(),
            frame.bindings.keys().map(Symbol::as_str).sorted().format(" ")
        )
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let frame = self.0.borrow();
        write!(f, "Env (some-parent? {:?}) {{", frame.parent.is_some())?;
        write!(
            f,
            "{}",
            frame
                .bindings
                .iter()
                .sorted_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()))
                .map(|(k, v)| format!("{} {}", k, v))
                .format(" ")
        )?;
        write!(f, "}}")
    }
}
