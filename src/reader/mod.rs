mod lexer;
mod parser;

use self::lexer::{Lexer, Token};

pub use self::parser::{Error, Form, Position, Reader, Result, MAX_DEPTH};

/// read parses every top-level form of `input`.
pub fn read(input: &str) -> Result<Vec<crate::value::Value>> {
    Reader::new(input)
        .map(|result| result.map(|form| form.expr))
        .collect()
}

/// ReadOne is the outcome of reading a single form from buffered interactive input.
#[derive(Debug, PartialEq)]
pub enum ReadOne<'input> {
    /// A complete form and the input that follows it.
    Form(crate::value::Value, &'input str),
    /// The buffer holds no form yet, or a form that is still open.
    NeedMoreInput,
    Error(Error),
}

pub fn read_one(input: &str) -> ReadOne {
    let mut reader = Reader::new(input);
    match reader.next() {
        None => ReadOne::NeedMoreInput,
        Some(Ok(form)) => ReadOne::Form(form.expr, reader.remaining()),
        Some(Err(e)) if e.is_incomplete() => ReadOne::NeedMoreInput,
        Some(Err(e)) => ReadOne::Error(e),
    }
}

/// is_blank reports whether `input` holds nothing but whitespace and comments.
pub fn is_blank(input: &str) -> bool {
    Lexer::new(input).all(|result| match result {
        Ok((_, Token::Comment(_))) => true,
        _ => false,
    })
}
