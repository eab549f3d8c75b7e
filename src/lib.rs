pub mod evaluator;
pub mod printer;
pub mod reader;
pub mod repl;
pub mod value;

pub use self::evaluator::{Env, Error, Interpreter, LoadError};
pub use self::value::{Symbol, Value};
