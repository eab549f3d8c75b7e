mod env;
mod evaluator;
pub mod prelude;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error as ThisError;
use tracing::debug;

use crate::reader::{Position, Reader};
use crate::value::Value;

pub use self::env::Env;
pub use self::evaluator::{apply, eval_expr, Error, HostFn, Result};

/// LoadError is why loading a program stopped.
#[derive(Debug, ThisError)]
pub enum LoadError {
    #[error("could not read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    /// Form points at the top-level form that failed to read or evaluate.
    #[error("{position}: {}: {error}", .error.kind())]
    Form { position: Position, error: Error },
}

impl LoadError {
    pub fn position(&self) -> Option<Position> {
        match self {
            LoadError::Io { .. } => None,
            LoadError::Form { position, .. } => Some(*position),
        }
    }
}

/// Interpreter owns a global frame with every primitive installed and the sink that
/// `display` writes to. State persists across calls, so definitions made by one program
/// or REPL form are visible to the next.
pub struct Interpreter<W = io::Stdout> {
    globals: Env,
    out: W,
}

impl Interpreter<io::Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Interpreter<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: io::Write> Interpreter<W> {
    pub fn with_output(out: W) -> Self {
        Self {
            globals: prelude::env(),
            out,
        }
    }

    pub fn globals(&self) -> &Env {
        &self.globals
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// eval_one evaluates one program-data tree in the global frame.
    pub fn eval_one(&mut self, expr: &Value) -> Result<Value> {
        let globals = self.globals.clone();
        self.eval_in(expr, &globals)
    }

    pub fn eval_in(&mut self, expr: &Value, env: &Env) -> Result<Value> {
        let result = eval_expr(expr, env, &mut self.out);
        self.out.flush()?;
        result
    }

    /// load reads and evaluates every top-level form of `input` in order, returning their
    /// values. The first form that fails to read or evaluate stops the load; bindings made
    /// by earlier forms are kept.
    pub fn load(&mut self, input: &str) -> std::result::Result<Vec<Value>, LoadError> {
        let mut values = vec![];
        for form in Reader::new(input) {
            let form = form.map_err(|e| LoadError::Form {
                position: e.position(),
                error: e.into(),
            })?;
            debug!(position = %form.position, form = %form.expr, "evaluating form");
            let value = self.eval_one(&form.expr).map_err(|error| LoadError::Form {
                position: form.position,
                error,
            })?;
            values.push(value);
        }
        Ok(values)
    }

    pub fn load_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> std::result::Result<Vec<Value>, LoadError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loading file");
        self.load(&input)
    }
}
