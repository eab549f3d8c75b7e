use std::env;
use std::io;
use std::path::PathBuf;

use ansi_term::{Color, Style};
use linefeed::{Interface, ReadResult, Terminal};
use tracing::warn;

use crate::evaluator::{self, Interpreter};
use crate::printer;
use crate::reader::{self, ReadOne};
use crate::value::Value;

static HISTORY_FILE: &str = "lisby.history";
static HISTORY_VAR: &str = "LISBY_HISTORY";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub history_file: PathBuf,
    pub prompt: String,
    /// continuation_prompt is shown while the forms typed so far are still open.
    pub continuation_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_file: PathBuf::from(HISTORY_FILE),
            prompt: ">> ".into(),
            continuation_prompt: ":: ".into(),
        }
    }
}

impl Config {
    /// from_env is the default config with `LISBY_HISTORY` overriding the history file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env::var_os(HISTORY_VAR) {
            config.history_file = PathBuf::from(path);
        }
        config
    }
}

/// Session collects input line by line and evaluates each form as soon as it is
/// complete. A form may span several lines and a line may hold several forms.
pub struct Session<W = io::Stdout> {
    interpreter: Interpreter<W>,
    buffer: String,
}

impl<W: io::Write> Session<W> {
    pub fn new(interpreter: Interpreter<W>) -> Self {
        Self {
            interpreter,
            buffer: String::new(),
        }
    }

    pub fn interpreter(&self) -> &Interpreter<W> {
        &self.interpreter
    }

    pub fn into_interpreter(self) -> Interpreter<W> {
        self.interpreter
    }

    /// is_pending reports whether an unfinished form is waiting for more input.
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// feed appends `line` to the pending input and returns the result of every form it
    /// completed. A read error discards the pending input; an evaluation error only ends
    /// the form that raised it.
    pub fn feed(&mut self, line: &str) -> Vec<evaluator::Result<Value>> {
        self.buffer.push_str(line);
        self.buffer.push('\n');

        let mut results = vec![];
        loop {
            let next = match reader::read_one(&self.buffer) {
                ReadOne::Form(expr, rest) => Some(Ok((expr, self.buffer.len() - rest.len()))),
                ReadOne::NeedMoreInput => None,
                ReadOne::Error(e) => Some(Err(e)),
            };
            match next {
                Some(Ok((expr, consumed))) => {
                    self.buffer.drain(..consumed);
                    results.push(self.interpreter.eval_one(&expr));
                }
                Some(Err(e)) => {
                    self.buffer.clear();
                    results.push(Err(e.into()));
                    break;
                }
                None => break,
            }
        }

        if reader::is_blank(&self.buffer) {
            self.buffer.clear();
        }
        results
    }
}

fn styled(style: Style, text: &str) -> String {
    // linefeed measures the prompt width without the bytes between \x01 and \x02
    format!(
        "\x01{prefix}\x02{text}\x01{suffix}\x02",
        prefix = style.prefix(),
        text = text,
        suffix = style.suffix()
    )
}

fn configure_reader<T: Terminal>(reader: &Interface<T>) {
    let mut reader = reader.lock_reader();
    reader.set_blink_matching_paren(true);
}

/// run reads lines from the terminal until end of input, printing the result of each
/// completed form.
pub fn run(config: &Config) -> io::Result<()> {
    let reader = Interface::new("lisby")?;
    configure_reader(&reader);

    let prompt_style = Color::Purple.bold();
    let prompt = styled(prompt_style, &config.prompt);
    let continuation_prompt = styled(prompt_style, &config.continuation_prompt);

    if let Err(e) = reader.load_history(&config.history_file) {
        if e.kind() == io::ErrorKind::NotFound {
            println!(
                "History file {} doesn't exist, not loading history.",
                config.history_file.display()
            );
        } else {
            warn!(path = %config.history_file.display(), error = %e, "could not load history");
        }
    }

    let mut session = Session::new(Interpreter::new());
    loop {
        if session.is_pending() {
            reader.set_prompt(&continuation_prompt)?;
        } else {
            reader.set_prompt(&prompt)?;
        }

        match reader.read_line()? {
            ReadResult::Input(input) => {
                if input.trim().is_empty() && !session.is_pending() {
                    continue;
                }
                reader.add_history_unique(input.clone());
                let results = session.feed(&input);
                printer::println_to(io::stdout().lock(), &results, Color::Red.normal())?;
            }
            ReadResult::Eof => {
                println!("^D");
                break;
            }
            ReadResult::Signal(signal) => {
                println!("signal: {:?}", signal);
                break;
            }
        }
    }

    if let Err(e) = reader.save_history(&config.history_file) {
        warn!(path = %config.history_file.display(), error = %e, "could not save history");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Error;
    use crate::value::Symbol;

    fn session() -> Session<Vec<u8>> {
        Session::new(Interpreter::with_output(vec![]))
    }

    #[test]
    fn evaluates_every_form_on_a_line() {
        let mut session = session();
        let results = session.feed("(define x 2) (* x 21)");
        assert_eq!(results, vec![Ok(Value::symbol("x")), Ok(Value::number(42))]);
        assert!(!session.is_pending());
    }

    #[test]
    fn waits_for_forms_spanning_lines() {
        let mut session = session();
        assert!(session.feed("(define (f n)").is_empty());
        assert!(session.is_pending());
        assert_eq!(session.feed("  (+ n 1))   (f"), vec![Ok(Value::symbol("f"))]);
        assert!(session.is_pending());
        assert_eq!(session.feed("41)"), vec![Ok(Value::number(42))]);
        assert!(!session.is_pending());
    }

    #[test]
    fn strings_may_span_lines() {
        let mut session = session();
        assert!(session.feed("(display \"one").is_empty());
        assert_eq!(session.feed("two\")"), vec![Ok(Value::Nil)]);
        let out = session.into_interpreter().into_output();
        assert_eq!(String::from_utf8(out).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn comments_leave_nothing_pending() {
        let mut session = session();
        assert_eq!(session.feed("1 ; the number one"), vec![Ok(Value::number(1))]);
        assert!(!session.is_pending());
        assert!(session.feed("; only a comment").is_empty());
        assert!(!session.is_pending());
    }

    #[test]
    fn errors_do_not_end_the_session() {
        let mut session = session();
        let results = session.feed("(define y 1) missing (+ y 1)");
        assert_eq!(
            results,
            vec![
                Ok(Value::symbol("y")),
                Err(Error::UnboundName(Symbol::new("missing"))),
                Ok(Value::number(2)),
            ]
        );

        let results = session.feed(") (+ y 5)");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap_err().kind(), "ReadError");
        assert!(!session.is_pending());

        assert_eq!(session.feed("y"), vec![Ok(Value::number(1))]);
        assert_eq!(
            session.interpreter().globals().lookup(Symbol::new("y")),
            Ok(Value::number(1))
        );
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.history_file, PathBuf::from("lisby.history"));
        assert_eq!(config.prompt, ">> ");
        assert_eq!(config.continuation_prompt, ":: ");
    }

    #[test]
    fn history_file_comes_from_the_environment() {
        env::set_var(HISTORY_VAR, "/tmp/lisby-test.history");
        let config = Config::from_env();
        env::remove_var(HISTORY_VAR);
        assert_eq!(config.history_file, PathBuf::from("/tmp/lisby-test.history"));
        assert_eq!(config.prompt, Config::default().prompt);
    }
}
