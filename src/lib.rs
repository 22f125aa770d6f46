//! Lispy - a small interpreter for a parenthesized-expression language
//!
//! This crate reads S-expression source text, builds a syntax tree and evaluates it
//! against a lexically scoped environment. It supports first-class closures,
//! self-referential `let` bindings, staged `quote`/`eval`, partial application
//! through `curry`, and proper tail calls: `if`, `cond`, `begin`, `let`, `eval` and
//! closure application all run on an explicit evaluation loop, so recursive user
//! programs do not grow the host stack.
//!
//! ```scheme
//! (+ 1 2)                                   ; => 3
//! '(1 (+ 2 3) 4)                            ; => (1 (+ 2 3) 4)
//! (list 1 (+ 2 3) 4)                        ; => (1 5 4)
//! (let foo (lambda (x) (if (< x 0) 0 (foo (- x 1))))
//!   (foo 1000000))                          ; => 0
//! ((curry (+ 1)) 41)                        ; => 42
//! ```
//!
//! ## Modules
//!
//! - `reader`: tokenizer and recursive-descent reader
//! - `ast`: values, numbers, closures and builtins; canonical printing
//! - `evaluator`: the trampolined evaluator and the environment model
//! - `builtinops`: the builtin registry handed to the evaluator at startup
//! - `session`: prelude loading and the per-expression error boundary

use std::fmt;

/// Maximum reader nesting depth (lists and quote markers).
/// Deeper input is rejected instead of exhausting the stack while reading.
pub const MAX_PARSE_DEPTH: usize = 512;

/// Maximum nesting of non-tail evaluations (arguments, `list` elements, tests).
/// Tail positions run on the trampoline and never count against this limit.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// The token stream ended where an expression was expected
    UnexpectedEnd,
    /// A `)` appeared where an expression was expected
    UnexpectedClose,
    /// Input ended inside a string literal
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a ParseError with a context snippet taken around `error_offset`
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let prefix_chars = input
            .get(..error_offset)
            .map_or(0, |prefix| prefix.chars().count());
        let context_start = prefix_chars.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    /// Structurally malformed special forms and runtime failures raised by builtins
    EvalError(String),
    TypeError(String),
    UnboundSymbol(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::UnboundSymbol(name) => write!(f, "UnboundSymbolError: {name}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: expression {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;
pub mod session;

pub use session::Session;

/// Evaluate a single expression in a fresh session with the standard builtins and prelude.
pub fn evaluate(source: &str) -> Result<ast::Value, Error> {
    Session::standard()?.eval_str(source)
}
