mod class;
mod environment;
mod error;
mod function;
mod interpreter;
mod object;
mod parser;
mod resolver;
mod scanner;
mod syntax;
mod token;

use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser as ClapParser;
use log::debug;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use error::ErrorReporter;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;

/// A tree-walking interpreter for Lox.
///
/// Takes at most one positional argument itself; a second is rejected with
/// the book's own "Usage: ..." message and exit code 64 (§6) rather than
/// clap's default argument-count diagnostic, so `args` collects everything
/// positional and main() does the count check by hand.
#[derive(ClapParser)]
#[command(name = "lox-interpreter-rs", version, about)]
struct Cli {
    /// Script to run; omit to start an interactive REPL.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

struct Lox {
    interpreter: Interpreter,
    reporter: ErrorReporter,
}

impl Lox {
    fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
            reporter: ErrorReporter::new(),
        }
    }

    fn run_file(&mut self, path: &str) -> io::Result<ExitCode> {
        let source = fs::read_to_string(path)?;
        self.run(&source);

        if self.reporter.had_error() {
            Ok(ExitCode::from(65))
        } else if self.reporter.had_runtime_error() {
            Ok(ExitCode::from(70))
        } else {
            Ok(ExitCode::SUCCESS)
        }
    }

    fn run_prompt(&mut self) -> io::Result<ExitCode> {
        let mut editor = DefaultEditor::new().map_err(io::Error::other)?;

        loop {
            match editor.readline("> ") {
                Ok(line) if line.is_empty() => break,
                Ok(line) => {
                    let _ = editor.add_history_entry(&line);
                    self.reporter.reset();
                    self.run(&line);
                }
                Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
                Err(err) => return Err(io::Error::other(err)),
            }
        }

        Ok(ExitCode::SUCCESS)
    }

    fn run(&mut self, source: &str) {
        let tokens = Scanner::new(source, &self.reporter).scan_tokens();
        debug!("scanned {} tokens", tokens.len());

        let statements = Parser::new(tokens, &self.reporter).parse();
        if self.reporter.had_error() {
            return;
        }

        // The resolver pokes resolution data directly into the interpreter
        // as it walks; by the time it returns, the interpreter has
        // everything it needs for the run below.
        Resolver::new(&mut self.interpreter, &self.reporter).resolve(&statements);
        if self.reporter.had_error() {
            return;
        }

        self.interpreter.interpret(&statements, &self.reporter);
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    if cli.args.len() > 1 {
        let _ = writeln!(io::stderr(), "Usage: lox-interpreter-rs [script]");
        return ExitCode::from(64);
    }

    let mut lox = Lox::new();

    let result = match cli.args.first() {
        Some(path) => lox.run_file(path),
        None => lox.run_prompt(),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            let _ = writeln!(io::stderr(), "{err}");
            ExitCode::from(64)
        }
    }
}
