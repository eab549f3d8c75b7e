use std::fmt;
use std::result;

use num_bigint::BigInt;
use thiserror::Error;

use super::lexer::{Error as LexerError, Lexer, Token};
use crate::value::Value;

pub type Result<T> = result::Result<T, Error>;

const QUOTE_SYMBOL: &str = "quote";
const TRUE_LITERAL: &str = "#t";
const FALSE_LITERAL: &str = "#f";

/// MAX_DEPTH bounds how deeply lists and quotes may nest in one form.
pub const MAX_DEPTH: usize = 256;

/// Position is a 1-based line and column in the source text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// locate finds the line and column of the byte `offset` in `input`.
    pub fn locate(input: &str, offset: usize) -> Self {
        let before = &input[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |index| index + 1);
        let column = before[line_start..].chars().count() + 1;
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, PartialEq, Clone, Error)]
pub enum Error {
    /// UnbalancedDelimiter points at a `)` with no matching `(`.
    #[error("unexpected `)` at {0}")]
    UnbalancedDelimiter(Position),
    /// UnterminatedList points at the `(` of a list the input ended inside of.
    #[error("unterminated list starting at {0}")]
    UnterminatedList(Position),
    #[error("unterminated string starting at {0}")]
    UnterminatedString(Position),
    /// MissingQuotedForm points at a `'` with nothing after it.
    #[error("nothing to quote after `'` at {0}")]
    MissingQuotedForm(Position),
    /// NestedTooDeep points at the `(` or `'` that went past `MAX_DEPTH` levels.
    #[error("forms nest more than {} levels deep at {0}", MAX_DEPTH)]
    NestedTooDeep(Position),
}

impl Error {
    /// is_incomplete reports whether more input could turn the failed read into a form.
    pub fn is_incomplete(&self) -> bool {
        match self {
            Error::UnbalancedDelimiter(_) | Error::NestedTooDeep(_) => false,
            Error::UnterminatedList(_)
            | Error::UnterminatedString(_)
            | Error::MissingQuotedForm(_) => true,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Error::UnbalancedDelimiter(position)
            | Error::UnterminatedList(position)
            | Error::UnterminatedString(position)
            | Error::MissingQuotedForm(position)
            | Error::NestedTooDeep(position) => *position,
        }
    }
}

/// Form is one top-level program-data tree and where it starts in the source.
#[derive(Debug, PartialEq, Clone)]
pub struct Form {
    pub expr: Value,
    pub position: Position,
}

/// Reader lazily reads the top-level forms of a source text in order. After the first
/// error it yields nothing more.
pub struct Reader<'input> {
    input: &'input str,
    lexer: Lexer<'input>,
    depth: usize,
    failed: bool,
}

impl<'input> Reader<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            lexer: Lexer::new(input),
            depth: 0,
            failed: false,
        }
    }

    /// remaining is the input the reader has not consumed yet.
    pub fn remaining(&mut self) -> &'input str {
        &self.input[self.lexer.offset()..]
    }

    fn locate(&self, offset: usize) -> Position {
        Position::locate(self.input, offset)
    }

    /// next_token skips comments, which carry no meaning.
    fn next_token(&mut self) -> Option<Result<(usize, Token<'input>)>> {
        loop {
            match self.lexer.next()? {
                Ok((_, Token::Comment(_))) => continue,
                Ok(token) => return Some(Ok(token)),
                Err(LexerError::UnterminatedString(offset)) => {
                    return Some(Err(Error::UnterminatedString(self.locate(offset))))
                }
            }
        }
    }

    fn parse_form(&mut self, offset: usize, token: Token<'input>) -> Result<Value> {
        match token {
            Token::Open => self.nested(offset, |reader| reader.parse_list(offset)),
            Token::Close => Err(Error::UnbalancedDelimiter(self.locate(offset))),
            Token::Quote => self.nested(offset, |reader| reader.parse_quote(offset)),
            Token::Number(input) => Ok(parse_number(input)),
            Token::String(input) => Ok(Value::string(input)),
            Token::Symbol(input) => Ok(parse_symbol(input)),
            Token::Comment(_) => unreachable!("comments are skipped by next_token"),
        }
    }

    fn nested<P>(&mut self, offset: usize, parse: P) -> Result<Value>
    where
        P: FnOnce(&mut Self) -> Result<Value>,
    {
        if self.depth == MAX_DEPTH {
            return Err(Error::NestedTooDeep(self.locate(offset)));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_list(&mut self, open_offset: usize) -> Result<Value> {
        let mut nodes = vec![];
        loop {
            match self.next_token() {
                None => return Err(Error::UnterminatedList(self.locate(open_offset))),
                Some(result) => match result? {
                    (_, Token::Close) => return Ok(Value::list(nodes)),
                    (offset, token) => nodes.push(self.parse_form(offset, token)?),
                },
            }
        }
    }

    fn parse_quote(&mut self, quote_offset: usize) -> Result<Value> {
        match self.next_token() {
            None => Err(Error::MissingQuotedForm(self.locate(quote_offset))),
            Some(result) => {
                let (offset, token) = result?;
                let quoted = self.parse_form(offset, token)?;
                Ok(Value::list(vec![Value::symbol(QUOTE_SYMBOL), quoted]))
            }
        }
    }
}

impl<'input> Iterator for Reader<'input> {
    type Item = Result<Form>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.next_token()?.and_then(|(offset, token)| {
            let expr = self.parse_form(offset, token)?;
            Ok(Form {
                expr,
                position: self.locate(offset),
            })
        });
        self.failed = result.is_err();
        Some(result)
    }
}

fn parse_number(value: &str) -> Value {
    let digits = value.strip_prefix('+').unwrap_or(value);
    match digits.parse::<BigInt>() {
        Ok(number) => Value::Number(number),
        // the lexer only hands over sign-and-digit lexemes
        Err(_) => Value::symbol(value),
    }
}

fn parse_symbol(value: &str) -> Value {
    match value {
        TRUE_LITERAL => Value::Bool(true),
        FALSE_LITERAL => Value::Bool(false),
        symbol => Value::symbol(symbol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_parse(input: &str) -> Result<Vec<Value>> {
        Reader::new(input)
            .map(|result| result.map(|form| form.expr))
            .collect()
    }

    fn list(items: Vec<Value>) -> Value {
        Value::list(items)
    }

    fn sym(name: &str) -> Value {
        Value::symbol(name)
    }

    fn num(n: i64) -> Value {
        Value::number(n)
    }

    macro_rules! parse_tests {
        ($($name:ident: $value:expr,)*) => {
            $(
                #[test]
                fn $name() {
                    let (input, expected): (&str, Vec<Value>) = $value;
                    let result = run_parse(input).unwrap();
                    assert_eq!(expected, result);
                }
            )*
        }
    }

    parse_tests! {
        can_parse_empty_input: ("", vec![]),
        can_parse_only_comments: ("; nothing here\n;; or here", vec![]),
        can_parse_booleans: ("#t #f", vec![Value::Bool(true), Value::Bool(false)]),
        can_parse_numbers: ("3 -4 +5", vec![num(3), num(-4), num(5)]),
        can_parse_big_numbers: ("123456789012345678901234567890", vec![
            Value::Number("123456789012345678901234567890".parse().unwrap())
        ]),
        can_parse_empty_string: (r#""""#, vec![Value::string("")]),
        can_parse_strings: (r#""hi, there""#, vec![Value::string("hi, there")]),
        can_parse_symbols: ("+ a b x:y odd?", vec![
            sym("+"),
            sym("a"),
            sym("b"),
            sym("x:y"),
            sym("odd?"),
        ]),
        can_parse_empty_list: ("()", vec![Value::Nil]),
        can_parse_list: ("( + 1 2)", vec![list(vec![sym("+"), num(1), num(2)])]),
        can_parse_nested_lists: ("(()) ()", vec![list(vec![Value::Nil]), Value::Nil]),
        can_parse_quotes: ("'x '(1 2)", vec![
            list(vec![sym("quote"), sym("x")]),
            list(vec![sym("quote"), list(vec![num(1), num(2)])]),
        ]),
        can_parse_define: (r#"
            ; is it odd?
            (define (odd? n)
              (= (% n 2) 1)) ; trailing
        "#, vec![
            list(vec![
                sym("define"),
                list(vec![sym("odd?"), sym("n")]),
                list(vec![
                    sym("="),
                    list(vec![sym("%"), sym("n"), num(2)]),
                    num(1),
                ]),
            ])
        ]),
    }

    #[test]
    fn can_parse_unbalanced_lists() {
        let input = "(";
        let result = run_parse(input);
        assert_eq!(
            result,
            Err(Error::UnterminatedList(Position { line: 1, column: 1 }))
        );

        let input = ")";
        let result = run_parse(input);
        assert_eq!(
            result,
            Err(Error::UnbalancedDelimiter(Position { line: 1, column: 1 }))
        );

        let input = "hi there)";
        let result = run_parse(input);
        assert_eq!(
            result,
            Err(Error::UnbalancedDelimiter(Position { line: 1, column: 9 }))
        );

        let input = "(a\n  (b c)";
        let result = run_parse(input);
        assert_eq!(
            result,
            Err(Error::UnterminatedList(Position { line: 1, column: 1 }))
        );
    }

    #[test]
    fn can_parse_unterminated_strings() {
        let input = "\n  (display \"hi)";
        let result = run_parse(input);
        assert_eq!(
            result,
            Err(Error::UnterminatedString(Position { line: 2, column: 12 }))
        );
    }

    #[test]
    fn can_parse_dangling_quote() {
        let result = run_parse("(list 1) '");
        assert_eq!(
            result,
            Err(Error::MissingQuotedForm(Position { line: 1, column: 10 }))
        );
    }

    #[test]
    fn reader_is_lazy_and_stops_after_an_error() {
        let mut reader = Reader::new("(+ 1 2)\n  foo ) bar");
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.position, Position { line: 1, column: 1 });
        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.expr, sym("foo"));
        assert_eq!(second.position, Position { line: 2, column: 3 });
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn can_parse_deep_nesting_up_to_the_limit() {
        let input = format!("{}{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        let result = run_parse(&input).unwrap();
        assert_eq!(result.len(), 1);

        let quotes = format!("{}x", "'".repeat(MAX_DEPTH));
        assert!(run_parse(&quotes).is_ok());
    }

    #[test]
    fn can_parse_nesting_past_the_limit() {
        let depth = 100_000;
        let input = format!("\n {}{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(
            run_parse(&input),
            Err(Error::NestedTooDeep(Position {
                line: 2,
                column: MAX_DEPTH + 2,
            }))
        );

        let quotes = format!("(list {}x)", "'".repeat(depth));
        match run_parse(&quotes) {
            Err(e @ Error::NestedTooDeep(_)) => assert!(!e.is_incomplete()),
            other => panic!("expected a nesting error, got {:?}", other),
        }
    }

    #[test]
    fn can_classify_incomplete_errors() {
        assert!(Error::UnterminatedList(Position { line: 1, column: 1 }).is_incomplete());
        assert!(!Error::UnbalancedDelimiter(Position { line: 1, column: 1 }).is_incomplete());
    }
}
