//! ez-scheme - a small tree-walking Scheme interpreter
//!
//! This crate implements a subset of R5RS Scheme: the lexical grammar of §7.1, the
//! primitive and derived expressions of §4.1/§4.2 that matter for everyday programs,
//! and a fixed library of builtin procedures over integers, booleans, symbols,
//! strings and mutable cons cells.
//!
//! ```scheme
//! (define (make-counter)
//!   (let ((n 0))
//!     (lambda () (set! n (+ n 1)) n)))
//!
//! (define c (make-counter))
//! (c) (c)
//! (write (c))        ; prints 3
//! ```
//!
//! ## Pipeline
//!
//! Source text flows through the [`lexer`] (text to tokens), the [`scheme`] parser
//! (tokens to S-expression data) and the [`evaluator`] (data to values). The
//! [`interpreter`] module ties them together behind an embedding API with a
//! persistent global environment and an injectable output sink.
//!
//! ## Semantics worth knowing
//!
//! - Only `#f` is false; `0` and `()` are true.
//! - Pairs are shared and mutable: `set-car!`/`set-cdr!` are visible through every alias.
//! - Reading an unbound variable yields `()` by default, while `set!` on an unbound
//!   variable is an error. See [`evaluator::UnboundVariablePolicy`].
//! - There is no tail-call elimination; recursion depth is bounded by
//!   [`evaluator::EvalConfig::max_depth`].
//!
//! ## Modules
//!
//! - `ast`: values, cons cells, closures and their textual representation
//! - `lexer`: the tokenizer
//! - `scheme`: the recursive-descent parser
//! - `evaluator`: environments, special forms and procedure application
//! - `builtinops`: the builtin procedure registry
//! - `interpreter`: the embedding surface
//! - `trace`: optional evaluation observers

use std::fmt;

/// Default maximum nesting of lists and quotes accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 512;

/// Default maximum nesting of `eval`/`apply` calls before evaluation is aborted.
/// A non-tail Scheme call nests about three of them, so this allows a few
/// thousand nested calls; the evaluator grows its stack to match.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// A token that cannot start or continue a datum at this position
    UnexpectedToken,
    /// Input ended before a list was closed
    UnmatchedParentheses,
    /// The `.` marker used more than once or not right before the last element
    InvalidDot,
    /// A numeral whose digits do not fit the fixed-precision integer type
    InvalidNumber,
    /// A `cond` clause after the `else` clause (raised while desugaring)
    MisplacedElse,
    /// Nesting exceeded the configured maximum parse depth
    TooDeeplyNested,
}

/// A source coordinate as computed by [`scheme::position_to_coordinate`]: a
/// 1-based line and the column counted from the preceding line break.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Coordinate {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}, column {}]", self.line, self.column)
    }
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Where the error occurred; always present for errors raised by the parser
    pub coordinate: Option<Coordinate>,
    /// The problematic token, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        coordinate: Option<Coordinate>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            coordinate,
            found,
        }
    }

    /// Create a ParseError without a source position (used by desugaring)
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError positioned at a byte offset of `input`
    pub fn at(kind: ParseErrorKind, message: impl Into<String>, input: &str, offset: usize) -> Self {
        let coordinate = scheme::position_to_coordinate(input, offset);
        Self::new(kind, message, Some(coordinate), None)
    }

    /// Attach the offending token text
    pub fn with_found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// No lexical rule matched at this byte offset
    LexError { offset: usize },
    ParseError(ParseError),
    /// `set!` on a name no frame binds (or a read under the strict policy)
    UnboundVariable(String),
    ArityError {
        procedure: String,
        expected: usize,
        got: usize,
    },
    /// An expression that is neither a well-formed special form nor an application
    UnknownForm(String),
    /// A native procedure rejected its arguments
    BuiltinError { name: String, message: String },
    /// Evaluation nested deeper than the configured limit
    DepthExceeded(usize),
}

impl Error {
    /// Create an ArityError for a procedure description
    pub fn arity_error(procedure: impl Into<String>, expected: usize, got: usize) -> Self {
        Error::ArityError {
            procedure: procedure.into(),
            expected,
            got,
        }
    }

    pub fn builtin(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BuiltinError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True for the two error classes that abort a whole parse
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Error::LexError { .. } | Error::ParseError(_))
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
            Error::LexError { offset } => write!(f, "LexError: no token matches at offset {offset}"),
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(coordinate) = &e.coordinate {
                    write!(f, " {coordinate}")?;
                }
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                Ok(())
            }
            Error::UnboundVariable(var) => write!(f, "Unbound variable: {var}"),
            Error::ArityError {
                procedure,
                expected,
                got,
            } => {
                let problem = if got < expected {
                    "unassigned parameter"
                } else {
                    "too many arguments"
                };
                write!(
                    f,
                    "ArityError: {problem} in call to {procedure}: expected {expected} arguments, got {got}"
                )
            }
            Error::UnknownForm(msg) => write!(f, "Unknown expression: {msg}"),
            Error::BuiltinError { name, message } => write!(f, "BuiltinError: {name}: {message}"),
            Error::DepthExceeded(limit) => {
                write!(f, "Evaluation depth limit exceeded (max: {limit})")
            }
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;
pub mod lexer;
pub mod scheme;
pub mod trace;

pub use ast::Value;
pub use interpreter::{Interpreter, SharedBuffer, interpret_code};
