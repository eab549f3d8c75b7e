use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use tracing_subscriber::EnvFilter;

use lisby::evaluator::{Interpreter, LoadError};
use lisby::repl;

fn install_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LISBY_LOG").unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .with_writer(io::stderr)
        .init();
}

fn report(path: &Path, error: &LoadError) {
    match error {
        LoadError::Io { .. } => eprintln!("{}", error),
        LoadError::Form { .. } => eprintln!("{}:{}", path.display(), error),
    }
}

fn main() -> io::Result<()> {
    install_logging();

    let paths = env::args_os().skip(1).map(PathBuf::from).collect::<Vec<_>>();
    if paths.is_empty() {
        return repl::run(&repl::Config::from_env());
    }

    let mut interpreter = Interpreter::new();
    for path in &paths {
        if let Err(e) = interpreter.load_file(path) {
            report(path, &e);
            process::exit(1);
        }
    }
    Ok(())
}
