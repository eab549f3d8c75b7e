use std::collections::HashSet;
use std::iter::Peekable;
use std::result;
use std::str::CharIndices;

use lazy_static::lazy_static;

const OPEN_PAREN: char = '(';
const CLOSE_PAREN: char = ')';
const COMMENT_CHAR: char = ';';
const STRING_CHAR: char = '"';
const NEWLINE_CHAR: char = '\n';
const QUOTE_CHAR: char = '\'';

lazy_static! {
    /// DELIMITER_CHARS end an atom even without surrounding whitespace
    static ref DELIMITER_CHARS: HashSet<char> =
        [OPEN_PAREN, CLOSE_PAREN, COMMENT_CHAR, STRING_CHAR]
            .iter()
            .copied()
            .collect();
}

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, PartialEq)]
pub enum Error {
    /// UnterminatedString holds the byte offset of the opening quote.
    UnterminatedString(usize),
}

/// Token is one lexeme of source text. Atoms borrow their text from the input.
#[derive(Debug, PartialEq)]
pub enum Token<'input> {
    Open,
    Close,
    Quote,
    Number(&'input str),
    String(&'input str),
    Comment(&'input str),
    Symbol(&'input str),
}

/// Lexer splits source text into tokens, yielding each with the byte offset it starts at.
#[derive(Debug)]
pub struct Lexer<'input> {
    input: &'input str,
    chars: Peekable<CharIndices<'input>>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// offset is the byte index of the next unread char.
    pub fn offset(&mut self) -> usize {
        let len = self.input.len();
        self.chars.peek().map_or(len, |&(index, _)| index)
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    /// span_while consumes chars matching `predicate` and returns the text consumed.
    fn span_while(&mut self, predicate: impl Fn(char) -> bool) -> &'input str {
        let start = self.offset();
        while self.chars.peek().map_or(false, |&(_, ch)| predicate(ch)) {
            self.bump();
        }
        let end = self.offset();
        &self.input[start..end]
    }

    fn punctuation(&mut self, token: Token<'input>) -> Result<Token<'input>> {
        self.bump();
        Ok(token)
    }

    // Strings run to the next `"`; there are no escapes.
    fn string(&mut self, start: usize) -> Result<Token<'input>> {
        self.bump();
        let text = self.span_while(|ch| ch != STRING_CHAR);
        match self.bump() {
            Some((_, STRING_CHAR)) => Ok(Token::String(text)),
            _ => Err(Error::UnterminatedString(start)),
        }
    }

    fn comment(&mut self) -> Result<Token<'input>> {
        self.bump();
        Ok(Token::Comment(self.span_while(|ch| ch != NEWLINE_CHAR)))
    }

    fn atom(&mut self) -> Result<Token<'input>> {
        let lexeme = self.span_while(is_atomic);
        if is_number(lexeme) {
            Ok(Token::Number(lexeme))
        } else {
            Ok(Token::Symbol(lexeme))
        }
    }
}

fn is_atomic(ch: char) -> bool {
    !ch.is_whitespace() && !DELIMITER_CHARS.contains(&ch)
}

/// is_number recognizes an optional sign followed by at least one ascii digit.
fn is_number(lexeme: &str) -> bool {
    let digits = lexeme
        .strip_prefix(|ch: char| ch == '-' || ch == '+')
        .unwrap_or(lexeme);
    !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit())
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<(usize, Token<'input>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.span_while(char::is_whitespace);

        let &(start, ch) = self.chars.peek()?;
        let token = match ch {
            OPEN_PAREN => self.punctuation(Token::Open),
            CLOSE_PAREN => self.punctuation(Token::Close),
            QUOTE_CHAR => self.punctuation(Token::Quote),
            STRING_CHAR => self.string(start),
            COMMENT_CHAR => self.comment(),
            _ => self.atom(),
        };
        Some(token.map(|token| (start, token)))
    }
}
