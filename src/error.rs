use std::cell::Cell;

use thiserror::Error;

use crate::object::Value;
use crate::token::{Token, TokenKind};

/// Single process-wide sink for diagnostics, with two sticky flags. The
/// REPL resets `had_error` between lines; `had_runtime_error` is likewise
/// cleared per line since it is not sticky across REPL input.
#[derive(Default)]
pub struct ErrorReporter {
    had_error: Cell<bool>,
    had_runtime_error: Cell<bool>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn had_error(&self) -> bool {
        self.had_error.get()
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error.get()
    }

    pub fn reset(&self) {
        self.had_error.set(false);
        self.had_runtime_error.set(false);
    }

    pub fn error_at_line(&self, line: u32, message: &str) {
        self.report(line, "", message);
    }

    pub fn error_at_token(&self, token: &Token, message: &str) {
        if token.kind == TokenKind::Eof {
            self.report(token.line, " at end", message);
        } else {
            self.report(token.line, &format!(" at '{}'", token.lexeme), message);
        }
    }

    pub fn runtime_error(&self, error: &RuntimeError) {
        eprintln!("{error}\n[line {}]", error.line());
        self.had_runtime_error.set(true);
    }

    fn report(&self, line: u32, where_: &str, message: &str) {
        eprintln!("[line {line}] Error{where_}: {message}");
        self.had_error.set(true);
    }
}

/// Runtime-error taxonomy: type mismatches, undefined variable/property,
/// arity mismatch, division by zero, call of a non-callable value.
/// Always carries the token whose line the error is reported against.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Operand must be a number.")]
    OperandMustBeNumber { token: Token },

    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers { token: Token },

    #[error("Operands must be two numbers or two strings.")]
    OperandsMustBeNumbersOrStrings { token: Token },

    #[error("Float division must be non-zero.")]
    DivisionByZero { token: Token },

    #[error("Undefined variable '{}'.", name.lexeme)]
    UndefinedVariable { name: Token },

    #[error("Undefined property '{}'.", name.lexeme)]
    UndefinedProperty { name: Token },

    #[error("Only instances have properties.")]
    NotAnInstance { token: Token },

    #[error("Can only call functions and classes.")]
    NotCallable { token: Token },

    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch {
        token: Token,
        expected: usize,
        got: usize,
    },

    #[error("Superclass must be a class.")]
    SuperclassMustBeClass { token: Token },
}

impl RuntimeError {
    pub fn line(&self) -> u32 {
        match self {
            RuntimeError::OperandMustBeNumber { token }
            | RuntimeError::OperandsMustBeNumbers { token }
            | RuntimeError::OperandsMustBeNumbersOrStrings { token }
            | RuntimeError::DivisionByZero { token }
            | RuntimeError::NotAnInstance { token }
            | RuntimeError::NotCallable { token }
            | RuntimeError::ArityMismatch { token, .. }
            | RuntimeError::SuperclassMustBeClass { token } => token.line,
            RuntimeError::UndefinedVariable { name } | RuntimeError::UndefinedProperty { name } => {
                name.line
            }
        }
    }
}

/// What statement execution actually returns. `Return` is not an error —
/// it is the control-transfer sentinel for a `return` statement, unwound
/// only as far as the nearest enclosing function call. Keeping it out of
/// `RuntimeError` itself means the `?` operator can never accidentally
/// treat a `return` as a reportable failure.
#[derive(Debug)]
pub enum Signal {
    Error(RuntimeError),
    Return(Value),
}

impl From<RuntimeError> for Signal {
    fn from(error: RuntimeError) -> Self {
        Signal::Error(error)
    }
}
